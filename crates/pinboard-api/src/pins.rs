use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, warn};
use uuid::Uuid;

use pinboard_types::api::{NewPin, ReactionTally};
use pinboard_types::events::{ChangeKind, Table};
use pinboard_types::models::Pin;

use crate::state::{AppState, run_db};

pub async fn list_pins(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let rows = run_db(&state, |db| db.list_pins()).await?;
    let pins: Vec<Pin> = rows.into_iter().map(|r| r.into_pin()).collect();
    Ok(Json(pins))
}

/// Insert the pin and credit the receiver atomically. Both accounts must exist.
pub async fn award_pin(
    State(state): State<AppState>,
    Json(req): Json<NewPin>,
) -> Result<impl IntoResponse, StatusCode> {
    let reason = req.clean_reason().ok_or(StatusCode::BAD_REQUEST)?;

    let pin_id = Uuid::new_v4();
    let row = run_db(&state, move |db| {
        db.award_pin(
            &pin_id.to_string(),
            &req.giver_id.to_string(),
            &req.receiver_id.to_string(),
            &reason,
        )
    })
    .await?
    .ok_or_else(|| {
        warn!("Pin award referenced unknown account(s)");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    let pin = row.into_pin();
    debug!("{} pinned {}", pin.giver.name, pin.receiver.name);

    state.publish(Table::Pins, ChangeKind::Insert, pin_id);
    state.publish(Table::Accounts, ChangeKind::Update, pin.receiver.id);
    Ok((StatusCode::CREATED, Json(pin)))
}

/// Delete the pin and take the point back from its receiver atomically.
pub async fn revoke_pin(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let found = run_db(&state, move |db| db.revoke_pin(&id.to_string())).await?;
    if !found {
        return Err(StatusCode::NOT_FOUND);
    }

    state.publish(Table::Pins, ChangeKind::Delete, id);
    state.publish_table(Table::Accounts, ChangeKind::Update);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_reaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let tally = run_db(&state, move |db| db.add_pin_reaction(&id.to_string()))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    state.publish(Table::Pins, ChangeKind::Update, id);
    Ok(Json(ReactionTally {
        reactions: u32::try_from(tally).unwrap_or(u32::MAX),
    }))
}
