//! TradeGroup endpoints: master settings, intent toggle, deletion.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::{AppState, ProblemDetails};
use crate::models::{MasterSettings, TradeGroup};

pub async fn list_trade_groups(
    State(state): State<AppState>,
) -> Result<Json<Vec<TradeGroup>>, ProblemDetails> {
    let groups = state.db.list_trade_groups().await?;
    Ok(Json(groups))
}

pub async fn get_trade_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TradeGroup>, ProblemDetails> {
    state
        .db
        .get_trade_group(&id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ProblemDetails::not_found(format!("trade group '{}' not found", id))
                .with_instance(format!("/api/trade-groups/{}", id))
        })
}

pub async fn update_master_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(settings): Json<MasterSettings>,
) -> Result<Json<TradeGroup>, ProblemDetails> {
    let updated = state.db.update_master_settings(&id, settings).await?;

    // Affix changes reach the copy pipeline immediately; the publish keeps
    // the Master EA's view of its own settings current.
    state.status.refresh_master(&id).await;
    emit_group_event(&state, &updated);

    tracing::info!(
        master_account = %id,
        config_version = updated.master_settings.config_version,
        "updated master settings"
    );
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

pub async fn toggle_trade_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<TradeGroup>, ProblemDetails> {
    let (group, changed) = state.db.set_trade_group_enabled(&id, req.enabled).await?;

    // Emit-on-change: a repeated toggle returns the record but publishes
    // nothing and emits no event.
    if changed {
        state.status.refresh_master(&id).await;
        emit_group_event(&state, &group);
        tracing::info!(master_account = %id, enabled = req.enabled, "toggled trade group");
    }

    Ok(Json(group))
}

pub async fn delete_trade_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ProblemDetails> {
    // Capture the member slaves first: after the cascade their clusters
    // shrink and every remaining membership needs a recompute.
    let members = state.db.list_members_of(&id).await?;

    state.db.delete_trade_group(&id).await?;
    let _ = state.events.send(format!("trade_group_deleted:{}", id));
    tracing::info!(master_account = %id, "deleted trade group");

    for member in &members {
        state.status.refresh_slave(&member.slave_account).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

fn emit_group_event(state: &AppState, group: &TradeGroup) {
    if let Ok(json) = serde_json::to_string(group) {
        let _ = state.events.send(format!("trade_group_updated:{}", json));
    }
}
