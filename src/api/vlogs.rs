//! Fleet-wide VLogs settings: read and toggle. A change is persisted and
//! broadcast to every EA on the global config topic.

use axum::extract::State;
use axum::Json;

use super::{AppState, ProblemDetails};
use crate::db::VLogsSettings;

const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARN", "ERROR"];

pub async fn get_vlogs_settings(
    State(state): State<AppState>,
) -> Result<Json<VLogsSettings>, ProblemDetails> {
    Ok(Json(state.db.get_vlogs_settings().await?))
}

pub async fn update_vlogs_settings(
    State(state): State<AppState>,
    Json(settings): Json<VLogsSettings>,
) -> Result<Json<VLogsSettings>, ProblemDetails> {
    if !LOG_LEVELS.contains(&settings.log_level.as_str()) {
        return Err(ProblemDetails::validation(format!(
            "log_level must be one of {:?}",
            LOG_LEVELS
        )));
    }
    if settings.enabled && settings.endpoint.trim().is_empty() {
        return Err(ProblemDetails::validation(
            "endpoint is required while log shipping is enabled",
        ));
    }

    let updated = state.db.update_vlogs_settings(&settings).await?;
    state.feed.publish_vlogs(&updated);
    let _ = state.events.send("settings_updated:vlogs".to_string());

    tracing::info!(
        enabled = updated.enabled,
        endpoint = %updated.endpoint,
        log_level = %updated.log_level,
        "updated vlogs settings"
    );
    Ok(Json(updated))
}
