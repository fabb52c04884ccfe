//! Evaluator counters and the actually bound socket ports.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::status::RuntimeStatusMetricsSnapshot;

pub async fn get_runtime_metrics(State(state): State<AppState>) -> Json<RuntimeStatusMetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[derive(Debug, Serialize)]
pub struct RuntimePortsResponse {
    pub receiver_port: u16,
    pub publisher_port: u16,
    pub is_dynamic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

pub async fn get_runtime_ports(State(state): State<AppState>) -> Json<RuntimePortsResponse> {
    let ports = &state.resolved_ports;
    Json(RuntimePortsResponse {
        receiver_port: ports.receiver_port,
        publisher_port: ports.publisher_port,
        is_dynamic: ports.is_dynamic,
        generated_at: ports.generated_at.clone(),
    })
}
