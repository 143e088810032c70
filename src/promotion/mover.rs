//! Concurrent queue moves for grouped, topic-resolved jobs.
//!
//! Each group is committed with a single atomic store transaction that
//! removes the jobs from the delay index and appends them to the topic's
//! ready queue. Groups move independently behind a semaphore; one failed
//! topic never blocks the others.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::error;

use crate::error::PromotionError;
use crate::reporter::PromotionReporter;
use crate::store::DelayStore;

/// Aggregate result of moving every group in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MoveOutcome {
    pub promoted_jobs: usize,
    pub failed_groups: usize,
}

/// Move each topic group onto its ready queue.
///
/// Failures are reported per group and counted; the jobs of a failed group
/// remain in the delay index and are picked up again on the next pass.
pub(crate) async fn move_groups<S: DelayStore>(
    store: Arc<S>,
    reporter: Arc<dyn PromotionReporter>,
    max_concurrent: usize,
    groups: HashMap<String, Vec<String>>,
) -> MoveOutcome {
    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let mut topics = Vec::with_capacity(groups.len());
    let mut handles = Vec::with_capacity(groups.len());
    let mut outcome = MoveOutcome::default();

    for (topic, job_ids) in groups {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // The semaphore is never closed; if it somehow is, the group
                // stays in the index and is refetched on the next pass.
                outcome.failed_groups += 1;
                continue;
            }
        };

        let store = Arc::clone(&store);
        let reporter = Arc::clone(&reporter);
        topics.push(topic.clone());
        let handle = tokio::spawn(async move {
            let result = move_one(store.as_ref(), reporter.as_ref(), &topic, &job_ids).await;
            drop(permit);
            result
        });
        handles.push(handle);
    }

    for (topic, joined) in topics.into_iter().zip(join_all(handles).await) {
        match joined {
            Ok(Ok(promoted)) => outcome.promoted_jobs += promoted,
            Ok(Err(_)) => outcome.failed_groups += 1,
            Err(e) => {
                error!(topic = %topic, error = %e, "Queue move task panicked");
                outcome.failed_groups += 1;
            }
        }
    }

    outcome
}

/// Commit one group. Returns the number of jobs promoted.
///
/// A transaction that commits but removes or queues nothing moved no jobs:
/// some other actor already consumed the index entries. That is surfaced as
/// [`PromotionError::PartialCommit`] so the discrepancy is visible, and the
/// group is abandoned for this pass.
async fn move_one<S: DelayStore>(
    store: &S,
    reporter: &dyn PromotionReporter,
    topic: &str,
    job_ids: &[String],
) -> Result<usize, PromotionError> {
    match store.promote(topic, job_ids).await {
        Ok((removed, queued)) => {
            if removed == 0 || queued == 0 {
                let error = PromotionError::PartialCommit {
                    topic: topic.to_string(),
                    removed,
                    queued,
                };
                reporter.failure("promote_group", &error, Some(topic));
                return Err(error);
            }
            reporter.promoted(topic, job_ids);
            Ok(job_ids.len())
        }
        Err(e) => {
            let error = PromotionError::from(e);
            reporter.failure("promote_group", &error, Some(topic));
            Err(error)
        }
    }
}
