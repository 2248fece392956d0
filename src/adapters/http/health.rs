//! Health endpoint.
//!
//! `GET /health` always answers `200`; `status` is `degraded` when the broker
//! is configured but disconnected or the mail circuit is not closed.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::adapters::delivery::{DeliveryQueue, QueueStats};
use crate::adapters::websocket::EventRouter;
use crate::ports::{CircuitBreaker, CircuitState};

#[derive(Clone)]
pub struct HealthState {
    pub router: Arc<EventRouter>,
    pub queue: Arc<DeliveryQueue>,
    pub breaker: Arc<dyn CircuitBreaker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerStatus {
    Connected,
    Disconnected,
    /// Running single-instance, no broker configured.
    Disabled,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub server_id: Option<String>,
    pub broker: BrokerStatus,
    pub connections: usize,
    pub rooms: usize,
    pub queue: QueueStats,
    pub mail_circuit: &'static str,
}

fn circuit_label(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    }
}

pub async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    let (broker, server_id) = match state.router.bridge() {
        Some(bridge) if bridge.is_connected() => {
            (BrokerStatus::Connected, Some(bridge.server_id().to_string()))
        }
        Some(bridge) => (
            BrokerStatus::Disconnected,
            Some(bridge.server_id().to_string()),
        ),
        None => (BrokerStatus::Disabled, None),
    };
    let circuit = state.breaker.state();
    let registry = state.router.registry();

    let degraded = broker == BrokerStatus::Disconnected || circuit != CircuitState::Closed;

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" },
        server_id,
        broker,
        connections: registry.connection_count().await,
        rooms: registry.room_count().await,
        queue: state.queue.stats().await,
        mail_circuit: circuit_label(circuit),
    })
}

pub fn health_router() -> Router<HealthState> {
    Router::new().route("/health", get(health))
}
