use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::bridge::BridgeStatus;
use crate::connection::ConnectionState;
use crate::noise::ErrorStats;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    #[serde(flatten)]
    pub bridge: BridgeStatus,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        bridge: state.bridge.status(),
    })
}

pub async fn get_state(State(state): State<AdminState>) -> Json<ConnectionState> {
    Json(state.bridge.get_current_state())
}

pub async fn get_errors(State(state): State<AdminState>) -> Json<ErrorStats> {
    Json(state.bridge.get_error_stats())
}
