use tracing::Span;

const DISPATCH_SPAN_NAME: &str = "event.dispatch";

/// Identifiers attached to every dispatch span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchLabels {
    pub event_id: String,
    pub team_id: String,
    pub event_type: String,
}

impl DispatchLabels {
    pub fn new(
        event_id: impl Into<String>,
        team_id: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            team_id: team_id.into(),
            event_type: event_type.into(),
        }
    }
}

/// Opens the span a single domain-event delivery is dispatched under.
///
/// ```
/// use seb_telemetry::{DispatchLabels, start_dispatch_span};
///
/// let span = start_dispatch_span(&DispatchLabels::new("Ev1", "T1", "message"));
/// let _guard = span.enter();
/// tracing::info!("dispatching");
/// ```
pub fn start_dispatch_span(labels: &DispatchLabels) -> Span {
    tracing::info_span!(
        DISPATCH_SPAN_NAME,
        event_id = %labels.event_id,
        team_id = %labels.team_id,
        event_type = %labels.event_type
    )
}
