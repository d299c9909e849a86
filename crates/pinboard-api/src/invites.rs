use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use pinboard_types::api::NewInvite;
use pinboard_types::events::{ChangeKind, Table};
use pinboard_types::models::Invite;

use crate::state::{AppState, run_db};

pub async fn list_invites(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let rows = run_db(&state, |db| db.list_invites()).await?;
    let invites: Vec<Invite> = rows.into_iter().map(|r| r.into_invite()).collect();
    Ok(Json(invites))
}

pub async fn get_invite(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = run_db(&state, move |db| db.get_invite(&email))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(row.into_invite()))
}

pub async fn create_invite(
    State(state): State<AppState>,
    Json(req): Json<NewInvite>,
) -> Result<impl IntoResponse, StatusCode> {
    let email = req.clean_email().ok_or(StatusCode::BAD_REQUEST)?;

    let key = email.clone();
    let row = run_db(&state, move |db| db.insert_invite(&key)).await?;

    state.publish(Table::Invites, ChangeKind::Insert, email);
    Ok((StatusCode::CREATED, Json(row.into_invite())))
}

pub async fn delete_invite(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let key = email.clone();
    let found = run_db(&state, move |db| db.delete_invite(&key)).await?;
    if !found {
        return Err(StatusCode::NOT_FOUND);
    }

    state.publish(Table::Invites, ChangeKind::Delete, email);
    Ok(StatusCode::NO_CONTENT)
}
