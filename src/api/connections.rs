//! Live EA connection snapshots for the UI.

use axum::extract::{Path, State};
use axum::Json;

use super::{AppState, ProblemDetails};
use crate::models::EaConnection;

pub async fn list_connections(State(state): State<AppState>) -> Json<Vec<EaConnection>> {
    Json(state.connections.snapshot().await)
}

pub async fn get_connection(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<EaConnection>, ProblemDetails> {
    state
        .connections
        .get(&account_id)
        .await
        .map(Json)
        .ok_or_else(|| {
            ProblemDetails::not_found(format!("no connection for account '{}'", account_id))
                .with_instance(format!("/api/connections/{}", account_id))
        })
}
