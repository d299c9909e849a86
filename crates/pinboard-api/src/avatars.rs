use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use pinboard_types::api::NewAvatar;
use pinboard_types::events::{ChangeKind, Table};
use pinboard_types::models::Avatar;

use crate::state::{AppState, run_db};

pub async fn list_avatars(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let rows = run_db(&state, |db| db.list_avatars()).await?;
    let avatars: Vec<Avatar> = rows.into_iter().map(|r| r.into_avatar()).collect();
    Ok(Json(avatars))
}

pub async fn create_avatar(
    State(state): State<AppState>,
    Json(req): Json<NewAvatar>,
) -> Result<impl IntoResponse, StatusCode> {
    if !req.is_valid() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let id = Uuid::new_v4();
    let row = run_db(&state, move |db| db.insert_avatar(&id.to_string(), &req)).await?;

    state.publish(Table::Avatars, ChangeKind::Insert, id);
    Ok((StatusCode::CREATED, Json(row.into_avatar())))
}

/// The path id wins over whatever id the body carries.
pub async fn update_avatar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut avatar): Json<Avatar>,
) -> Result<impl IntoResponse, StatusCode> {
    if !avatar.is_valid() {
        return Err(StatusCode::BAD_REQUEST);
    }
    avatar.id = id;

    let stored = avatar.clone();
    let found = run_db(&state, move |db| db.update_avatar(&stored)).await?;
    if !found {
        return Err(StatusCode::NOT_FOUND);
    }

    state.publish(Table::Avatars, ChangeKind::Update, id);
    Ok(Json(avatar))
}

pub async fn delete_avatar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let found = run_db(&state, move |db| db.delete_avatar(&id.to_string())).await?;
    if !found {
        return Err(StatusCode::NOT_FOUND);
    }

    state.publish(Table::Avatars, ChangeKind::Delete, id);
    Ok(StatusCode::NO_CONTENT)
}
