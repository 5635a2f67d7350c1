//! Collection of receiver failures for a single delivery.
//!
//! Failures are recorded as the chain runs and judged only afterwards, so an
//! escalating receiver never stops the receivers behind it.

use std::fmt::Write as _;

use thiserror::Error;

/// One failed receiver invocation.
#[derive(Debug)]
pub struct FailureRecord {
    pub receiver: String,
    pub failure: anyhow::Error,
    pub escalate: bool,
}

impl FailureRecord {
    pub fn new(receiver: impl Into<String>, failure: anyhow::Error, escalate: bool) -> Self {
        Self {
            receiver: receiver.into(),
            failure,
            escalate,
        }
    }
}

/// Escalating failures of one delivery, in invocation order.
#[derive(Debug, Error)]
#[error("{} receiver failure(s) escalated: {}", .failures.len(), summarize(.failures))]
pub struct EscalatedFailure {
    pub failures: Vec<FailureRecord>,
}

impl EscalatedFailure {
    pub fn receivers(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|record| record.receiver.as_str())
    }
}

fn summarize(failures: &[FailureRecord]) -> String {
    let mut out = String::new();
    for (idx, record) in failures.iter().enumerate() {
        if idx > 0 {
            out.push_str("; ");
        }
        let _ = write!(out, "{}: {:#}", record.receiver, record.failure);
    }
    out
}

#[derive(Debug, Default)]
pub struct FailureAggregator {
    records: Vec<FailureRecord>,
}

impl FailureAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: FailureRecord) {
        self.records.push(record);
    }

    /// Succeeds unless at least one record escalates; then every escalating
    /// record is returned together. Non-escalating records were already logged
    /// when captured and are dropped here.
    pub fn evaluate(self) -> Result<(), EscalatedFailure> {
        let failures: Vec<FailureRecord> = self
            .records
            .into_iter()
            .filter(|record| record.escalate)
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(EscalatedFailure { failures })
        }
    }
}
