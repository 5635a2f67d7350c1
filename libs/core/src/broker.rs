//! The event broker: routes each delivery through dedup, team lookup and the
//! receiver chain.

use http::HeaderMap;
use seb_idempotency::SharedEventStore;
use seb_telemetry::{DispatchLabels, start_dispatch_span};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{Instrument, debug, error, info};

use crate::{
    envelope::{DomainEvent, EventEnvelope},
    failure::{EscalatedFailure, FailureAggregator, FailureRecord},
    metrics::SharedEventMetrics,
    receiver::{ReceiverRegistry, SharedEventReceiver},
    team::{SharedTeamDirectory, Team, TeamError},
};

/// Success-path body returned to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerResponse {
    /// Echo of a URL verification token: `{"challenge": token}`.
    Challenge(String),
    /// `{}` for accepted, duplicate and dispatched events.
    Empty,
}

impl BrokerResponse {
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        if let Self::Challenge(token) = self {
            body.insert("challenge".into(), Value::String(token.clone()));
        }
        Value::Object(body)
    }
}

impl Serialize for BrokerResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    /// The delivery was aborted before any receiver ran.
    #[error(transparent)]
    Team(#[from] TeamError),
    /// Every matching receiver ran and at least one demanded escalation.
    #[error(transparent)]
    Escalated(#[from] EscalatedFailure),
}

/// Dispatches inbound deliveries to the registered receivers.
///
/// Holds no per-delivery state; concurrent calls only share the injected
/// collaborators.
pub struct EventBroker {
    receivers: ReceiverRegistry,
    teams: SharedTeamDirectory,
    events: SharedEventStore,
    metrics: Option<SharedEventMetrics>,
}

impl EventBroker {
    pub fn new(
        receivers: impl Into<ReceiverRegistry>,
        teams: SharedTeamDirectory,
        events: SharedEventStore,
    ) -> Self {
        Self {
            receivers: receivers.into(),
            teams,
            events,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedEventMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn receivers(&self) -> &ReceiverRegistry {
        &self.receivers
    }

    pub async fn receive(
        &self,
        envelope: &EventEnvelope,
        headers: &HeaderMap,
    ) -> Result<BrokerResponse, BrokerError> {
        self.record(|m| m.events_received());

        match envelope {
            EventEnvelope::Handshake(handshake) => {
                debug!("answering url verification handshake");
                Ok(BrokerResponse::Challenge(handshake.token.clone()))
            }
            EventEnvelope::Event(event) => {
                let span = start_dispatch_span(&DispatchLabels::new(
                    &event.event_id,
                    &event.team_id,
                    &event.event_type,
                ));
                self.dispatch(event, headers).instrument(span).await
            }
        }
    }

    async fn dispatch(
        &self,
        event: &DomainEvent,
        headers: &HeaderMap,
    ) -> Result<BrokerResponse, BrokerError> {
        if !self.mark_seen(event).await {
            return Ok(BrokerResponse::Empty);
        }

        let team = self.teams.find_by_id(&event.team_id).await?;
        let chain = self.receivers.chain_for(event);
        debug!(receivers = chain.len(), "invoking receiver chain");

        self.invoke(&chain, event, headers, &team).await.evaluate()?;
        Ok(BrokerResponse::Empty)
    }

    /// Returns `false` for a duplicate. A failing store lets the event through.
    async fn mark_seen(&self, event: &DomainEvent) -> bool {
        match self.events.put_if_absent(&event.event_id).await {
            Ok(true) => {
                debug!("new event");
                true
            }
            Ok(false) => {
                info!("duplicate event dropped");
                false
            }
            Err(err) => {
                error!(error = %err, "event store check failed; continuing");
                true
            }
        }
    }

    async fn invoke(
        &self,
        chain: &[SharedEventReceiver],
        event: &DomainEvent,
        headers: &HeaderMap,
        team: &Team,
    ) -> FailureAggregator {
        let mut failures = FailureAggregator::new();
        for receiver in chain {
            self.record(|m| m.receiver_executed());
            if let Err(failure) = receiver.on_receive_event(event, headers, team).await {
                self.record(|m| m.receiver_execution_error());
                let escalate = receiver.should_escalate(&failure);
                if escalate {
                    debug!(
                        receiver = receiver.name(),
                        error = %failure,
                        "receiver escalated failure"
                    );
                } else {
                    error!(receiver = receiver.name(), error = ?failure, "event receiver failed");
                }
                failures.add(FailureRecord::new(receiver.name(), failure, escalate));
            }
        }
        failures
    }

    fn record(&self, f: impl FnOnce(&SharedEventMetrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}
