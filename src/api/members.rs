//! TradeGroupMember endpoints: membership CRUD and the intent toggle.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::trade_groups::ToggleRequest;
use super::{AppState, ProblemDetails};
use crate::models::{SlaveSettings, TradeGroupMember};
use crate::wire::LotCalculationMode;

/// Reject settings the slave executor could not act on.
fn validate_settings(settings: &SlaveSettings) -> Result<(), ProblemDetails> {
    if settings.lot_calculation_mode == LotCalculationMode::Multiplier {
        match settings.lot_multiplier {
            None => {
                return Err(ProblemDetails::validation(
                    "lot_multiplier is required when lot_calculation_mode is multiplier",
                ))
            }
            Some(multiplier) if multiplier < 0.0 => {
                return Err(ProblemDetails::validation(
                    "lot_multiplier must be non-negative",
                ))
            }
            _ => {}
        }
    }

    if let (Some(min), Some(max)) = (settings.source_lot_min, settings.source_lot_max) {
        if min > max {
            return Err(ProblemDetails::validation(
                "source_lot_min must not exceed source_lot_max",
            ));
        }
    }
    if settings.source_lot_min.is_some_and(|v| v < 0.0)
        || settings.source_lot_max.is_some_and(|v| v < 0.0)
    {
        return Err(ProblemDetails::validation(
            "source lot bounds must be non-negative",
        ));
    }
    if settings.limit_order_expiry_min.is_some_and(|v| v < 0) {
        return Err(ProblemDetails::validation(
            "limit_order_expiry_min must be non-negative (0 = good-till-cancel)",
        ));
    }
    if settings.market_sync_max_pips.is_some_and(|v| v < 0.0) {
        return Err(ProblemDetails::validation(
            "market_sync_max_pips must be non-negative",
        ));
    }
    if settings.max_slippage.is_some_and(|v| v < 0) {
        return Err(ProblemDetails::validation("max_slippage must be non-negative"));
    }
    if settings.max_retries < 0 {
        return Err(ProblemDetails::validation("max_retries must be non-negative"));
    }
    if settings.max_signal_delay_ms < 0 {
        return Err(ProblemDetails::validation(
            "max_signal_delay_ms must be non-negative",
        ));
    }

    Ok(())
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TradeGroupMember>>, ProblemDetails> {
    if state.db.get_trade_group(&id).await?.is_none() {
        return Err(ProblemDetails::not_found(format!(
            "trade group '{}' not found",
            id
        )));
    }
    Ok(Json(state.db.list_members_of(&id).await?))
}

pub async fn get_member(
    State(state): State<AppState>,
    Path((id, slave)): Path<(String, String)>,
) -> Result<Json<TradeGroupMember>, ProblemDetails> {
    state
        .db
        .get_member(&id, &slave)
        .await?
        .map(Json)
        .ok_or_else(|| member_not_found(&id, &slave))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub slave_account: String,
    #[serde(default)]
    pub slave_settings: Option<SlaveSettings>,
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<TradeGroupMember>), ProblemDetails> {
    if req.slave_account.trim().is_empty() {
        return Err(ProblemDetails::validation("slave_account must not be empty"));
    }
    let settings = req.slave_settings.unwrap_or_default();
    validate_settings(&settings)?;

    state.db.add_member(&id, &req.slave_account, settings).await?;

    // First evaluation + config push for the new pairing.
    state
        .status
        .publish_member_config(&id, &req.slave_account)
        .await?;

    let member = state
        .db
        .get_member(&id, &req.slave_account)
        .await?
        .ok_or_else(|| member_not_found(&id, &req.slave_account))?;
    emit_member_event(&state, &member);

    tracing::info!(
        master_account = %id,
        slave_account = %req.slave_account,
        "added trade group member"
    );
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn update_member(
    State(state): State<AppState>,
    Path((id, slave)): Path<(String, String)>,
    Json(settings): Json<SlaveSettings>,
) -> Result<Json<TradeGroupMember>, ProblemDetails> {
    validate_settings(&settings)?;

    state.db.update_member_settings(&id, &slave, settings).await?;
    state.status.publish_member_config(&id, &slave).await?;

    let member = state
        .db
        .get_member(&id, &slave)
        .await?
        .ok_or_else(|| member_not_found(&id, &slave))?;
    emit_member_event(&state, &member);

    tracing::info!(
        master_account = %id,
        slave_account = %slave,
        config_version = member.config_version,
        "updated member settings"
    );
    Ok(Json(member))
}

pub async fn toggle_member(
    State(state): State<AppState>,
    Path((id, slave)): Path<(String, String)>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<TradeGroupMember>, ProblemDetails> {
    let (member, changed) = state.db.set_member_enabled(&id, &slave, req.enabled).await?;

    if !changed {
        return Ok(Json(member));
    }

    state.status.publish_member_config(&id, &slave).await?;
    let member = state
        .db
        .get_member(&id, &slave)
        .await?
        .ok_or_else(|| member_not_found(&id, &slave))?;
    emit_member_event(&state, &member);

    tracing::info!(
        master_account = %id,
        slave_account = %slave,
        enabled = req.enabled,
        "toggled member"
    );
    Ok(Json(member))
}

pub async fn delete_member(
    State(state): State<AppState>,
    Path((id, slave)): Path<(String, String)>,
) -> Result<StatusCode, ProblemDetails> {
    state.db.delete_member(&id, &slave).await?;
    let _ = state.events.send(format!("member_deleted:{}:{}", id, slave));

    // The slave's cluster shrank; its remaining memberships may now be
    // fully connected.
    state.status.refresh_slave(&slave).await;

    tracing::info!(master_account = %id, slave_account = %slave, "deleted member");
    Ok(StatusCode::NO_CONTENT)
}

fn member_not_found(master: &str, slave: &str) -> ProblemDetails {
    ProblemDetails::not_found(format!(
        "member '{}' of trade group '{}' not found",
        slave, master
    ))
    .with_instance(format!("/api/trade-groups/{}/members/{}", master, slave))
}

fn emit_member_event(state: &AppState, member: &TradeGroupMember) {
    if let Ok(json) = serde_json::to_string(member) {
        let _ = state.events.send(format!("member_updated:{}", json));
    }
}
