//! Slack Events API ingress service.
//!
//! Exposes a `/slack/events` endpoint that parses each delivery into an
//! [`EventEnvelope`], hands it to the [`EventBroker`], and translates the
//! outcome into the HTTP response Slack expects.

pub mod config;
pub mod receivers;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use seb_core::{
    BrokerError, CounterMetrics, EventBroker, EventEnvelope, InMemoryTeamDirectory,
    InMemoryUserStore, MetricsFanout, RecorderMetrics, SharedEventMetrics, SharedEventReceiver,
    SharedTeamDirectory, SharedUserStore, TeamError, UserChangedReceiver,
};
use serde_json::json;

use crate::{config::IngressConfig, receivers::EventLogReceiver};

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<EventBroker>,
    pub counters: Arc<CounterMetrics>,
}

impl AppState {
    pub fn new(broker: EventBroker, counters: Arc<CounterMetrics>) -> Self {
        let sinks: Vec<SharedEventMetrics> = vec![counters.clone(), Arc::new(RecorderMetrics)];
        let fanout = MetricsFanout::new(sinks);
        Self {
            broker: Arc::new(broker.with_metrics(Arc::new(fanout))),
            counters,
        }
    }
}

/// Wires the broker with the built-in receivers and the stores selected by `cfg`.
pub fn build_state(cfg: &IngressConfig) -> Result<AppState> {
    let teams: SharedTeamDirectory = match &cfg.teams_file {
        Some(path) => Arc::new(InMemoryTeamDirectory::load_from_file(path)?),
        None => {
            tracing::warn!("TEAMS_FILE not set; every event will be rejected as unknown team");
            Arc::new(InMemoryTeamDirectory::new())
        }
    };
    let users: SharedUserStore = Arc::new(InMemoryUserStore::new());
    let receivers: Vec<SharedEventReceiver> = vec![
        Arc::new(EventLogReceiver),
        Arc::new(UserChangedReceiver::new(users)),
    ];
    let broker = EventBroker::new(receivers, teams, cfg.event_store.build());
    Ok(AppState::new(broker, Arc::new(CounterMetrics::new())))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/slack/events", post(handle))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let envelope = match EventEnvelope::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(error) => {
            tracing::warn!("slack payload parse error: {error}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state.broker.receive(&envelope, &headers).await {
        Ok(response) => (StatusCode::OK, Json(response.to_json())).into_response(),
        Err(BrokerError::Team(TeamError::NotFound { team_id })) => {
            tracing::warn!(%team_id, "event for unknown team rejected");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(BrokerError::Team(TeamError::Unavailable(error))) => {
            tracing::error!(error = %error, "team directory unavailable");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        Err(BrokerError::Escalated(error)) => {
            tracing::error!(error = %error, "receiver chain escalated");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.counters.snapshot();
    Json(json!({
        "ok": true,
        "events_received": snapshot.events_received,
        "receiver_executed": snapshot.receiver_executed,
        "receiver_execution_errors": snapshot.receiver_execution_errors,
    }))
}
