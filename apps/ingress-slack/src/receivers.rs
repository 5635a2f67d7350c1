use async_trait::async_trait;
use axum::http::HeaderMap;
use seb_core::{DomainEvent, EventReceiver, Team};
use tracing::info;

/// Logs every dispatched event before any other receiver runs.
pub struct EventLogReceiver;

#[async_trait]
impl EventReceiver for EventLogReceiver {
    fn name(&self) -> &str {
        "event_log"
    }

    fn priority(&self) -> i32 {
        i32::MIN
    }

    async fn on_receive_event(
        &self,
        event: &DomainEvent,
        headers: &HeaderMap,
        team: &Team,
    ) -> anyhow::Result<()> {
        let retry = headers
            .get("x-slack-retry-num")
            .and_then(|value| value.to_str().ok());
        info!(
            team_name = ?team.team_name,
            subtype = ?event.subtype(),
            retry = ?retry,
            "slack event received"
        );
        Ok(())
    }
}
