use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

/// Header carrying the project key, the way hosted data stores expect it.
pub const API_KEY_HEADER: &str = "apikey";

/// Reject requests that don't carry the configured key, either in the
/// `apikey` header, as a bearer token, or (for WebSocket upgrades, which
/// can't set headers from a browser) as an `apikey` query parameter.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let headers = req.headers();

    let from_header = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let from_bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let from_query = req.uri().query().and_then(|q| {
        q.split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == API_KEY_HEADER)
            .map(|(_, v)| v.to_string())
    });

    let presented = from_header
        .or(from_bearer)
        .or(from_query)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if presented != state.api_key {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}
