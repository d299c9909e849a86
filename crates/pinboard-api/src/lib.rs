pub mod accounts;
pub mod avatars;
pub mod invites;
pub mod middleware;
pub mod pins;
pub mod state;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
};

use pinboard_gateway::connection;

pub use state::{AppState, AppStateInner};

/// Every table route plus the realtime socket, all behind the API key.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/accounts", get(accounts::list_accounts).post(accounts::create_account))
        .route("/accounts/by-email/{email}", get(accounts::find_by_email))
        .route("/accounts/{id}", delete(accounts::delete_account))
        .route("/accounts/{id}/role", patch(accounts::set_role))
        .route("/accounts/{id}/avatar", patch(accounts::set_avatar))
        .route("/accounts/{id}/pins", delete(accounts::delete_account_pins))
        .route("/pins", get(pins::list_pins).post(pins::award_pin))
        .route("/pins/{id}", delete(pins::revoke_pin))
        .route("/pins/{id}/reactions", post(pins::add_reaction))
        .route("/avatars", get(avatars::list_avatars).post(avatars::create_avatar))
        .route("/avatars/{id}", put(avatars::update_avatar).delete(avatars::delete_avatar))
        .route("/invites", get(invites::list_invites).post(invites::create_invite))
        .route("/invites/{email}", get(invites::get_invite).delete(invites::delete_invite))
        .route("/realtime", get(realtime_upgrade))
        .layer(from_fn_with_state(state.clone(), middleware::require_api_key))
        .with_state(state)
}

async fn realtime_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher))
}
