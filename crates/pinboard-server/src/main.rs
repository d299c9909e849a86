use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use pinboard_api::{AppState, AppStateInner};
use pinboard_gateway::Dispatcher;

/// Placeholder API keys that MUST NOT be used.
const PLACEHOLDER_KEYS: &[&str] = &["dev-key-change-me", "change-me"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pinboard=debug,pinboard_api=debug,pinboard_gateway=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let api_key = std::env::var("PINBOARD_API_KEY").unwrap_or_default();
    if api_key.is_empty() || PLACEHOLDER_KEYS.contains(&api_key.as_str()) {
        anyhow::bail!("PINBOARD_API_KEY is unset or still a placeholder; set it in .env and restart");
    }
    let db_path = std::env::var("PINBOARD_DB_PATH").unwrap_or_else(|_| "pinboard.db".into());
    let host = std::env::var("PINBOARD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PINBOARD_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = pinboard_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher: Dispatcher::new(),
        api_key,
    });

    let app = pinboard_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Pinboard server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
