//! Pluggable event receivers and the ordered registry the broker dispatches to.

use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use tracing::debug;

use crate::{envelope::DomainEvent, team::Team};

/// Priority assigned to receivers that do not override [`EventReceiver::priority`].
/// Such receivers run after every receiver with an explicit priority.
pub const LOWEST_PRIORITY: i32 = i32::MAX;

/// A unit of work triggered by domain events.
///
/// Only [`on_receive_event`](Self::on_receive_event) is mandatory. By default a
/// receiver accepts every event, runs last, and never escalates its failures.
///
/// ```
/// use async_trait::async_trait;
/// use http::HeaderMap;
/// use seb_core::{DomainEvent, EventReceiver, Team};
///
/// struct Greeter;
///
/// #[async_trait]
/// impl EventReceiver for Greeter {
///     fn supports_event(&self, event: &DomainEvent) -> bool {
///         event.event_type == "member_joined_channel"
///     }
///
///     async fn on_receive_event(
///         &self,
///         event: &DomainEvent,
///         _headers: &HeaderMap,
///         team: &Team,
///     ) -> anyhow::Result<()> {
///         tracing::info!(team = %team.team_id, user = ?event.field("user"), "welcome");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventReceiver: Send + Sync {
    /// Identifier used in logs and failure records.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn supports_event(&self, _event: &DomainEvent) -> bool {
        true
    }

    /// Ascending: lower values run earlier.
    fn priority(&self) -> i32 {
        LOWEST_PRIORITY
    }

    async fn on_receive_event(
        &self,
        event: &DomainEvent,
        headers: &HeaderMap,
        team: &Team,
    ) -> anyhow::Result<()>;

    /// Whether `failure` must be surfaced to the broker's caller once the whole
    /// chain has run.
    fn should_escalate(&self, _failure: &anyhow::Error) -> bool {
        false
    }
}

pub type SharedEventReceiver = Arc<dyn EventReceiver>;

/// Receivers in registration order. Fixed for the lifetime of the broker.
#[derive(Clone, Default)]
pub struct ReceiverRegistry {
    receivers: Vec<SharedEventReceiver>,
}

impl ReceiverRegistry {
    pub fn new(receivers: Vec<SharedEventReceiver>) -> Self {
        Self { receivers }
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    /// Receivers supporting `event`, ordered by ascending priority. Equal
    /// priorities keep registration order.
    pub fn chain_for(&self, event: &DomainEvent) -> Vec<SharedEventReceiver> {
        let mut chain: Vec<SharedEventReceiver> = self
            .receivers
            .iter()
            .filter(|receiver| {
                let supported = receiver.supports_event(event);
                debug!(
                    receiver = receiver.name(),
                    supported,
                    event_type = %event.event_type,
                    "receiver filter"
                );
                supported
            })
            .cloned()
            .collect();
        chain.sort_by_key(|receiver| receiver.priority());
        chain
    }
}

impl From<Vec<SharedEventReceiver>> for ReceiverRegistry {
    fn from(receivers: Vec<SharedEventReceiver>) -> Self {
        Self::new(receivers)
    }
}

impl FromIterator<SharedEventReceiver> for ReceiverRegistry {
    fn from_iter<I: IntoIterator<Item = SharedEventReceiver>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
