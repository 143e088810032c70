//! Promotion pipeline for expired delayed jobs.
//!
//! A single pass walks the delay index and pushes every job whose delay has
//! elapsed onto the ready queue for its topic:
//!
//! ```text
//! fetch_expired ──> resolve topics ──> group by topic ──> move groups
//!   (index scan)     (bounded fan-out)   (pure partition)   (bounded fan-out)
//! ```
//!
//! Passes are driven by [`PromotionTimer`], which fires one pass per interval
//! without awaiting the previous one. Every stage tolerates per-item failure:
//! a job whose lookup fails stays in the index and is retried on the next
//! pass, and a group whose move fails leaves its jobs in the index likewise.

pub mod mover;
pub mod resolver;
pub mod timer;

pub use timer::PromotionTimer;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::config::TimerConfig;
use crate::error::{PromotionError, PromotionResult};
use crate::reporter::PromotionReporter;
use crate::store::DelayStore;

/// Outcome of resolving one fetched job identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicResolution {
    /// Metadata named a destination topic for the job.
    Resolved { job_id: String, topic: String },
    /// Metadata was missing; the stale index entry was discarded.
    Orphaned { job_id: String },
    /// The metadata lookup failed; the job stays in the index for retry.
    Failed { job_id: String },
}

impl TopicResolution {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Resolved { job_id, .. } | Self::Orphaned { job_id } | Self::Failed { job_id } => {
                job_id
            }
        }
    }
}

/// Partition resolved jobs into per-topic batches.
///
/// Orphaned and failed resolutions carry no destination and are dropped here.
/// Jobs whose metadata names an empty topic are also dropped; they stay in
/// the index untouched rather than landing on a queue with no name. Within a
/// topic, jobs keep the order in which they were resolved.
pub fn group_by_topic(resolutions: &[TopicResolution]) -> HashMap<String, Vec<String>> {
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for resolution in resolutions {
        if let TopicResolution::Resolved { job_id, topic } = resolution {
            if topic.is_empty() {
                continue;
            }
            groups.entry(topic.clone()).or_default().push(job_id.clone());
        }
    }
    groups
}

/// Counters describing one completed promotion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Jobs fetched from the delay index.
    pub fetched: usize,
    /// Jobs whose metadata was missing.
    pub orphaned: usize,
    /// Jobs whose metadata lookup failed.
    pub failed_resolves: usize,
    /// Distinct topics with at least one job to move.
    pub topics: usize,
    /// Jobs moved onto ready queues.
    pub promoted_jobs: usize,
    /// Topic groups whose move failed.
    pub failed_groups: usize,
}

/// Executes promotion passes against a [`DelayStore`].
///
/// The pipeline holds no mutable state of its own; every pass reads the
/// store fresh, so concurrent passes are safe and converge on the same
/// queues. Failures inside a pass are routed through the
/// [`PromotionReporter`] rather than aborting sibling work.
pub struct PromotionPipeline<S: DelayStore> {
    store: Arc<S>,
    reporter: Arc<dyn PromotionReporter>,
    max_concurrent_resolves: usize,
    max_concurrent_moves: usize,
}

impl<S: DelayStore> PromotionPipeline<S> {
    pub fn new(
        store: Arc<S>,
        reporter: Arc<dyn PromotionReporter>,
        config: &TimerConfig,
    ) -> Self {
        Self {
            store,
            reporter,
            max_concurrent_resolves: config.max_concurrent_resolves,
            max_concurrent_moves: config.max_concurrent_moves,
        }
    }

    /// Run one pass with the current wall clock as the expiry cutoff.
    pub async fn run_pass(&self) -> PromotionResult<PassSummary> {
        self.run_pass_at(Utc::now().timestamp()).await
    }

    /// Run one pass promoting every job whose expiry is at or before `now`
    /// (unix seconds).
    ///
    /// A failed index fetch aborts the pass, since there is nothing to work
    /// on. All later stages degrade per item instead.
    #[instrument(skip(self))]
    pub async fn run_pass_at(&self, now: i64) -> PromotionResult<PassSummary> {
        let job_ids = match self.store.fetch_expired(now).await {
            Ok(job_ids) => job_ids,
            Err(e) => {
                let error = PromotionError::from(e);
                self.reporter.failure("fetch_expired", &error, None);
                return Err(error);
            }
        };

        let mut summary = PassSummary {
            fetched: job_ids.len(),
            ..PassSummary::default()
        };
        if job_ids.is_empty() {
            return Ok(summary);
        }
        debug!(count = job_ids.len(), "Fetched expired jobs");

        let resolutions = resolver::resolve_topics(
            Arc::clone(&self.store),
            Arc::clone(&self.reporter),
            self.max_concurrent_resolves,
            job_ids,
        )
        .await;

        for resolution in &resolutions {
            match resolution {
                TopicResolution::Orphaned { .. } => summary.orphaned += 1,
                TopicResolution::Failed { .. } => summary.failed_resolves += 1,
                TopicResolution::Resolved { .. } => {}
            }
        }

        let groups = group_by_topic(&resolutions);
        summary.topics = groups.len();
        if groups.is_empty() {
            return Ok(summary);
        }

        let moved = mover::move_groups(
            Arc::clone(&self.store),
            Arc::clone(&self.reporter),
            self.max_concurrent_moves,
            groups,
        )
        .await;
        summary.promoted_jobs = moved.promoted_jobs;
        summary.failed_groups = moved.failed_groups;

        debug!(
            fetched = summary.fetched,
            promoted = summary.promoted_jobs,
            orphaned = summary.orphaned,
            failed_resolves = summary.failed_resolves,
            failed_groups = summary.failed_groups,
            "Promotion pass complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(job_id: &str, topic: &str) -> TopicResolution {
        TopicResolution::Resolved {
            job_id: job_id.to_string(),
            topic: topic.to_string(),
        }
    }

    #[test]
    fn test_group_by_topic_partitions_resolved_jobs() {
        let resolutions = vec![
            resolved("job1", "emails"),
            resolved("job2", "webhooks"),
            resolved("job3", "emails"),
        ];

        let groups = group_by_topic(&resolutions);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups["emails"], vec!["job1", "job3"]);
        assert_eq!(groups["webhooks"], vec!["job2"]);
    }

    #[test]
    fn test_group_by_topic_drops_non_resolved_entries() {
        let resolutions = vec![
            resolved("job1", "emails"),
            TopicResolution::Orphaned {
                job_id: "job2".to_string(),
            },
            TopicResolution::Failed {
                job_id: "job3".to_string(),
            },
        ];

        let groups = group_by_topic(&resolutions);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups["emails"], vec!["job1"]);
    }

    #[test]
    fn test_group_by_topic_drops_empty_topics() {
        let resolutions = vec![resolved("job1", ""), resolved("job2", "emails")];

        let groups = group_by_topic(&resolutions);

        assert_eq!(groups.len(), 1);
        assert!(!groups.contains_key(""));
        assert_eq!(groups["emails"], vec!["job2"]);
    }

    #[test]
    fn test_group_by_topic_empty_input() {
        assert!(group_by_topic(&[]).is_empty());
    }

    #[test]
    fn test_resolution_job_id_accessor() {
        assert_eq!(resolved("job1", "emails").job_id(), "job1");
        let orphaned = TopicResolution::Orphaned {
            job_id: "job2".to_string(),
        };
        assert_eq!(orphaned.job_id(), "job2");
    }
}
