//! Admin diagnostics API.
//!
//! Read-only views over the running bridge, behind a bearer token:
//! `/admin/status`, `/admin/state`, `/admin/errors`.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::bridge::WalletBridge;
use crate::lifecycle::Shutdown;

#[derive(Clone)]
pub struct AdminState {
    pub bridge: Arc<WalletBridge>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(bridge: Arc<WalletBridge>, api_key: &str) -> Self {
        Self {
            bridge,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/state", get(get_state))
        .route("/admin/errors", get(get_errors))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve(listener: TcpListener, state: AdminState, shutdown: Shutdown) -> std::io::Result<()> {
    let mut signal = shutdown.subscribe();
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Admin API listening");
    }
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = signal.recv().await;
        })
        .await
}
