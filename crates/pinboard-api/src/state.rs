use std::sync::Arc;

use axum::http::StatusCode;
use tracing::error;

use pinboard_db::{Database, is_constraint_violation};
use pinboard_gateway::Dispatcher;
use pinboard_types::events::{ChangeKind, Table, TableChange};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub api_key: String,
}

impl AppStateInner {
    pub fn publish(&self, table: Table, kind: ChangeKind, row_id: impl ToString) {
        self.dispatcher.publish(TableChange::new(table, kind, row_id));
    }

    pub fn publish_table(&self, table: Table, kind: ChangeKind) {
        self.dispatcher.publish(TableChange::whole_table(table, kind));
    }
}

/// Run a blocking DB call off the async runtime. Constraint violations map to
/// 409, everything else to 500.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StatusCode::CONFLICT
            } else {
                error!("DB error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })
}
