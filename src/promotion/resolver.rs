//! Concurrent topic resolution for fetched job identifiers.
//!
//! Each expired job carries only its identifier out of the delay index; the
//! destination topic lives in the job's metadata record. Lookups run on
//! spawned tasks behind a semaphore so a large expiry batch cannot open an
//! unbounded number of store connections at once.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::error::{PromotionError, StoreError};
use crate::promotion::TopicResolution;
use crate::reporter::PromotionReporter;
use crate::store::DelayStore;

/// Resolve the destination topic for every fetched job identifier.
///
/// Returns exactly one [`TopicResolution`] per input identifier, in input
/// order. Lookup failures are reported and classified as
/// [`TopicResolution::Failed`]; they never abort sibling lookups.
pub(crate) async fn resolve_topics<S: DelayStore>(
    store: Arc<S>,
    reporter: Arc<dyn PromotionReporter>,
    max_concurrent: usize,
    job_ids: Vec<String>,
) -> Vec<TopicResolution> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let mut ids = Vec::with_capacity(job_ids.len());
    let mut handles = Vec::with_capacity(job_ids.len());
    let mut resolutions = Vec::with_capacity(job_ids.len());

    for job_id in job_ids {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // The semaphore is never closed; if it somehow is, the job
                // stays in the index and is refetched on the next pass.
                resolutions.push(TopicResolution::Failed { job_id });
                continue;
            }
        };

        let store = Arc::clone(&store);
        let reporter = Arc::clone(&reporter);
        ids.push(job_id.clone());
        let handle = tokio::spawn(async move {
            let resolution = resolve_one(store.as_ref(), reporter.as_ref(), &job_id).await;
            drop(permit);
            resolution
        });
        handles.push(handle);
    }

    for (job_id, joined) in ids.into_iter().zip(join_all(handles).await) {
        match joined {
            Ok(resolution) => resolutions.push(resolution),
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Topic resolution task panicked");
                let error = PromotionError::Store(StoreError::operation("resolve_topic", &e));
                reporter.failure("resolve_topic", &error, Some(&job_id));
                resolutions.push(TopicResolution::Failed { job_id });
            }
        }
    }

    resolutions
}

async fn resolve_one<S: DelayStore>(
    store: &S,
    reporter: &dyn PromotionReporter,
    job_id: &str,
) -> TopicResolution {
    match store.job_topic(job_id).await {
        Ok(Some(topic)) => TopicResolution::Resolved {
            job_id: job_id.to_string(),
            topic,
        },
        Ok(None) => {
            // Metadata is gone, so the index entry can never promote.
            // Discard it; if the discard fails the orphan is refetched and
            // retried on the next pass.
            match store.remove_job(job_id).await {
                Ok(_) => debug!(job_id, "Discarded orphaned job from delay index"),
                Err(e) => {
                    let error = PromotionError::from(e);
                    reporter.failure("discard_orphan", &error, Some(job_id));
                }
            }
            TopicResolution::Orphaned {
                job_id: job_id.to_string(),
            }
        }
        Err(e) => {
            let error = PromotionError::from(e);
            reporter.failure("resolve_topic", &error, Some(job_id));
            TopicResolution::Failed {
                job_id: job_id.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{MemoryReporter, ReportedEvent};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_resolves_in_input_order() {
        let store = Arc::new(MemoryStore::new());
        store.seed_job("job1", 10, "emails");
        store.seed_job("job2", 10, "webhooks");
        store.seed_job("job3", 10, "emails");
        let reporter = Arc::new(MemoryReporter::new());

        let resolutions = resolve_topics(
            Arc::clone(&store),
            reporter,
            4,
            vec!["job1".into(), "job2".into(), "job3".into()],
        )
        .await;

        assert_eq!(
            resolutions,
            vec![
                TopicResolution::Resolved {
                    job_id: "job1".into(),
                    topic: "emails".into()
                },
                TopicResolution::Resolved {
                    job_id: "job2".into(),
                    topic: "webhooks".into()
                },
                TopicResolution::Resolved {
                    job_id: "job3".into(),
                    topic: "emails".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_orphan_is_discarded_from_index() {
        let store = Arc::new(MemoryStore::new());
        store.schedule("job1", 10);
        let reporter = Arc::new(MemoryReporter::new());

        let resolutions =
            resolve_topics(Arc::clone(&store), reporter.clone(), 4, vec!["job1".into()]).await;

        assert_eq!(
            resolutions,
            vec![TopicResolution::Orphaned {
                job_id: "job1".into()
            }]
        );
        assert!(!store.pool_contains("job1"));
        assert!(reporter.events().is_empty());
    }

    #[tokio::test]
    async fn test_failed_orphan_discard_is_reported_not_escalated() {
        let store = Arc::new(MemoryStore::new());
        store.schedule("job1", 10);
        store.fail_remove("job1");
        let reporter = Arc::new(MemoryReporter::new());

        let resolutions =
            resolve_topics(Arc::clone(&store), reporter.clone(), 4, vec!["job1".into()]).await;

        // Still classified as orphaned, and the job is still in the index.
        assert_eq!(
            resolutions,
            vec![TopicResolution::Orphaned {
                job_id: "job1".into()
            }]
        );
        assert!(store.pool_contains("job1"));

        let events = reporter.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ReportedEvent::Failure {
                operation, context, ..
            } => {
                assert_eq!(*operation, "discard_orphan");
                assert_eq!(context.as_deref(), Some("job1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_reported_and_classified() {
        let store = Arc::new(MemoryStore::new());
        store.seed_job("job1", 10, "emails");
        store.seed_job("job2", 10, "emails");
        store.fail_topic_lookup("job1");
        let reporter = Arc::new(MemoryReporter::new());

        let resolutions = resolve_topics(
            Arc::clone(&store),
            reporter.clone(),
            4,
            vec!["job1".into(), "job2".into()],
        )
        .await;

        assert_eq!(
            resolutions[0],
            TopicResolution::Failed {
                job_id: "job1".into()
            }
        );
        assert_eq!(
            resolutions[1],
            TopicResolution::Resolved {
                job_id: "job2".into(),
                topic: "emails".into()
            }
        );
        // The failed job stays in the index for the next pass.
        assert!(store.pool_contains("job1"));

        let events = reporter.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ReportedEvent::Failure {
                operation, context, ..
            } => {
                assert_eq!(*operation, "resolve_topic");
                assert_eq!(context.as_deref(), Some("job1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lookup_concurrency_is_bounded() {
        let store = Arc::new(
            MemoryStore::new().with_lookup_delay(std::time::Duration::from_millis(20)),
        );
        for i in 0..12 {
            store.seed_job(&format!("job{i}"), 10, "emails");
        }
        let reporter = Arc::new(MemoryReporter::new());
        let job_ids: Vec<String> = (0..12).map(|i| format!("job{i}")).collect();

        let resolutions = resolve_topics(Arc::clone(&store), reporter, 3, job_ids).await;

        assert_eq!(resolutions.len(), 12);
        let peak = store.peak_concurrent_lookups();
        assert!(peak <= 3, "peak concurrent lookups was {peak}");
        assert!(peak >= 2, "lookups never overlapped (peak {peak})");
    }
}
