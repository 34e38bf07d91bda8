//! Status web server.
//!
//! Exposes liveness and the number of active conversation sessions.
//! Runs on WEB_PORT (default 8080) next to the Telegram long-polling loop.

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::core::error::AppResult;
use crate::telegram::ConversationEngine;

/// Shared state for the web server.
#[derive(Clone)]
pub struct WebState {
    engine: Arc<ConversationEngine>,
    started_at: DateTime<Utc>,
}

impl WebState {
    pub fn new(engine: Arc<ConversationEngine>) -> Self {
        Self {
            engine,
            started_at: Utc::now(),
        }
    }
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/sessions", get(sessions_handler))
        .with_state(state)
}

/// Start the status web server; returns once `shutdown` is cancelled.
pub async fn start_web_server(port: u16, state: WebState, shutdown: CancellationToken) -> AppResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    log::info!("Starting web server on http://{}", addr);
    log::info!("  /health        - Health check");
    log::info!("  /api/sessions  - Active conversation sessions (JSON)");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    log::info!("Web server stopped");
    Ok(())
}

async fn health_handler(State(state): State<WebState>) -> Json<Value> {
    let uptime = Utc::now().signed_duration_since(state.started_at);
    Json(json!({
        "status": "ok",
        "uptime_secs": uptime.num_seconds(),
    }))
}

async fn sessions_handler(State(state): State<WebState>) -> Json<Value> {
    Json(json!({
        "active_sessions": state.engine.session_count(),
        "in_flight_updates": state.engine.in_flight_updates(),
    }))
}
