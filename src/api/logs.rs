//! Recent relay log entries for the UI, newest first.

use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::log_buffer::{drain_snapshot, LogEntry};

pub async fn get_logs(State(state): State<AppState>) -> Json<Vec<LogEntry>> {
    Json(drain_snapshot(&state.log_buffer))
}
