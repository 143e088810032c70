//! # Promotion Reporting
//!
//! Components report failures and completed promotions through the
//! [`PromotionReporter`] capability rather than calling a logger directly.
//! [`TracingReporter`] is the production sink; [`MemoryReporter`] captures
//! structured records for tests and embedders.

use std::sync::Mutex;
use tracing::{error, info};

use crate::error::PromotionError;

/// Sink for per-component promotion outcomes.
///
/// Implementations must be cheap to call from concurrent tasks; the pipeline
/// invokes them inline on its hot path.
pub trait PromotionReporter: Send + Sync {
    /// Record a failure raised by one pipeline component. `context` carries
    /// the affected job identifier or topic when one is known.
    fn failure(&self, operation: &'static str, error: &PromotionError, context: Option<&str>);

    /// Record a completed promotion of one topic group.
    fn promoted(&self, topic: &str, job_ids: &[String]);
}

/// Reporter that emits structured tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl TracingReporter {
    pub fn new() -> Self {
        Self
    }
}

impl PromotionReporter for TracingReporter {
    fn failure(&self, operation: &'static str, error: &PromotionError, context: Option<&str>) {
        error!(
            operation = operation,
            error = %error,
            context = context,
            "Promotion failure"
        );
    }

    fn promoted(&self, topic: &str, job_ids: &[String]) {
        info!(
            topic = topic,
            job_count = job_ids.len(),
            job_ids = %job_ids.join(","),
            "Jobs ready"
        );
    }
}

/// One captured reporter invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportedEvent {
    Failure {
        operation: &'static str,
        error: PromotionError,
        context: Option<String>,
    },
    Promoted {
        topic: String,
        job_ids: Vec<String>,
    },
}

/// Reporter that captures events in memory, in invocation order.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<ReportedEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured events in invocation order.
    pub fn events(&self) -> Vec<ReportedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Captured failures only.
    pub fn failures(&self) -> Vec<ReportedEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, ReportedEvent::Failure { .. }))
            .collect()
    }

    /// Captured promotions as `(topic, job_ids)` pairs.
    pub fn promotions(&self) -> Vec<(String, Vec<String>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportedEvent::Promoted { topic, job_ids } => Some((topic, job_ids)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl PromotionReporter for MemoryReporter {
    fn failure(&self, operation: &'static str, error: &PromotionError, context: Option<&str>) {
        self.events.lock().unwrap().push(ReportedEvent::Failure {
            operation,
            error: error.clone(),
            context: context.map(str::to_string),
        });
    }

    fn promoted(&self, topic: &str, job_ids: &[String]) {
        self.events.lock().unwrap().push(ReportedEvent::Promoted {
            topic: topic.to_string(),
            job_ids: job_ids.to_vec(),
        });
    }
}
