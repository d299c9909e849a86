use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use pinboard_types::api::{AvatarSelection, DeletedCount, NewAccount, RoleUpdate};
use pinboard_types::events::{ChangeKind, Table};
use pinboard_types::models::Account;

use crate::state::{AppState, run_db};

pub async fn list_accounts(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let rows = run_db(&state, |db| db.list_accounts()).await?;
    let accounts: Vec<Account> = rows.into_iter().map(|r| r.into_account()).collect();
    Ok(Json(accounts))
}

pub async fn find_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = run_db(&state, move |db| db.find_account_by_email(&email))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(row.into_account()))
}

pub async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<NewAccount>,
) -> Result<impl IntoResponse, StatusCode> {
    if !req.is_valid() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let id = Uuid::new_v4();
    let row = run_db(&state, move |db| db.insert_account(&id.to_string(), &req)).await?;

    state.publish(Table::Accounts, ChangeKind::Insert, id);
    Ok((StatusCode::CREATED, Json(row.into_account())))
}

pub async fn set_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RoleUpdate>,
) -> Result<impl IntoResponse, StatusCode> {
    let found = run_db(&state, move |db| db.set_account_role(&id.to_string(), req.role)).await?;
    if !found {
        return Err(StatusCode::NOT_FOUND);
    }

    state.publish(Table::Accounts, ChangeKind::Update, id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_avatar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AvatarSelection>,
) -> Result<impl IntoResponse, StatusCode> {
    let found = run_db(&state, move |db| {
        db.set_account_avatar(&id.to_string(), &req.avatar, &req.hint)
    })
    .await?;
    if !found {
        return Err(StatusCode::NOT_FOUND);
    }

    state.publish(Table::Accounts, ChangeKind::Update, id);
    Ok(StatusCode::NO_CONTENT)
}

/// Responds 409 while pins still reference the account; callers delete
/// `/accounts/{id}/pins` first.
pub async fn delete_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let found = run_db(&state, move |db| db.delete_account(&id.to_string())).await?;
    if !found {
        return Err(StatusCode::NOT_FOUND);
    }

    state.publish(Table::Accounts, ChangeKind::Delete, id);
    Ok(StatusCode::NO_CONTENT)
}

/// Receivers of the removed pins lose the points those pins gave them.
pub async fn delete_account_pins(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let deleted = run_db(&state, move |db| db.delete_pins_for_account(&id.to_string())).await?;

    if deleted > 0 {
        state.publish_table(Table::Pins, ChangeKind::Delete);
        state.publish_table(Table::Accounts, ChangeKind::Update);
    }
    Ok(Json(DeletedCount { deleted }))
}
