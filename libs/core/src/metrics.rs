//! Counters describing broker throughput.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

pub const EVENTS_RECEIVED: &str = "slack.events.received";
pub const RECEIVER_EXECUTIONS: &str = "slack.events.receiver.executions";
pub const RECEIVER_ERRORS: &str = "slack.events.receiver.errors";

/// Sink for the broker's three monotonic counters.
pub trait EventMetrics: Send + Sync {
    fn events_received(&self);
    fn receiver_executed(&self);
    fn receiver_execution_error(&self);
}

pub type SharedEventMetrics = Arc<dyn EventMetrics>;

/// Forwards to the process-wide `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderMetrics;

impl EventMetrics for RecorderMetrics {
    fn events_received(&self) {
        ::metrics::counter!(EVENTS_RECEIVED).increment(1);
    }

    fn receiver_executed(&self) {
        ::metrics::counter!(RECEIVER_EXECUTIONS).increment(1);
    }

    fn receiver_execution_error(&self) {
        ::metrics::counter!(RECEIVER_ERRORS).increment(1);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub receiver_executed: u64,
    pub receiver_execution_errors: u64,
}

/// In-process counters, readable through [`CounterMetrics::snapshot`].
#[derive(Debug, Default)]
pub struct CounterMetrics {
    received: AtomicU64,
    executed: AtomicU64,
    errors: AtomicU64,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.received.load(Ordering::Relaxed),
            receiver_executed: self.executed.load(Ordering::Relaxed),
            receiver_execution_errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

impl EventMetrics for CounterMetrics {
    fn events_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    fn receiver_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    fn receiver_execution_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fans each increment out to several sinks.
#[derive(Clone, Default)]
pub struct MetricsFanout {
    sinks: Vec<SharedEventMetrics>,
}

impl MetricsFanout {
    pub fn new(sinks: Vec<SharedEventMetrics>) -> Self {
        Self { sinks }
    }
}

impl EventMetrics for MetricsFanout {
    fn events_received(&self) {
        self.sinks.iter().for_each(|sink| sink.events_received());
    }

    fn receiver_executed(&self) {
        self.sinks.iter().for_each(|sink| sink.receiver_executed());
    }

    fn receiver_execution_error(&self) {
        self.sinks
            .iter()
            .for_each(|sink| sink.receiver_execution_error());
    }
}
