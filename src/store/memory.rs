//! In-process delay-store provider.
//!
//! Backs the pipeline test suite and embedded development without a Redis
//! server. Mutations are serialized behind one mutex; `promote` mirrors the
//! transaction's both-or-neither commitment and its append count mirrors
//! LPUSH (queue length after a head push of the batch).
//!
//! Failure injection and call counters let tests drive every error path the
//! pipeline has to survive.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::store::DelayStore;

#[derive(Debug, Default)]
struct MemoryState {
    /// Expiry index: job id -> ready-at unix seconds.
    pool: HashMap<String, i64>,
    /// Metadata topic field: job id -> topic.
    topics: HashMap<String, String>,
    /// Ready queues: topic -> jobs, head first.
    queues: HashMap<String, Vec<String>>,

    // Failure injection
    fail_fetch: bool,
    fail_topic_lookups: HashSet<String>,
    fail_removes: HashSet<String>,
    fail_promote_topics: HashSet<String>,
    zero_effect_topics: HashSet<String>,

    counters: StoreCounters,
}

/// Per-operation invocation counts, for idempotence assertions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounters {
    pub fetches: u64,
    pub topic_lookups: u64,
    pub removes: u64,
    pub promotes: u64,
}

/// In-memory [`DelayStore`] with failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    /// Artificial latency applied to topic lookups, outside the state lock.
    lookup_delay: Option<Duration>,
    /// Artificial latency applied to promote transactions, outside the state lock.
    promote_delay: Option<Duration>,
    in_flight_lookups: AtomicUsize,
    peak_lookups: AtomicUsize,
    in_flight_promotes: AtomicUsize,
    peak_promotes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay each topic lookup, keeping the state lock released so lookups
    /// genuinely overlap. Used with [`peak_concurrent_lookups`](Self::peak_concurrent_lookups)
    /// to observe fan-out width.
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    /// Delay each promote transaction the same way, so group moves can be
    /// observed overlapping via [`peak_concurrent_promotes`](Self::peak_concurrent_promotes).
    pub fn with_promote_delay(mut self, delay: Duration) -> Self {
        self.promote_delay = Some(delay);
        self
    }

    // Seeding

    /// Insert a job into the expiry index.
    pub fn schedule(&self, job_id: &str, ready_at: i64) {
        let mut state = self.state.lock().unwrap();
        state.pool.insert(job_id.to_string(), ready_at);
    }

    /// Set a job's metadata topic field.
    pub fn put_topic(&self, job_id: &str, topic: &str) {
        let mut state = self.state.lock().unwrap();
        state.topics.insert(job_id.to_string(), topic.to_string());
    }

    /// Insert a job with both an index entry and a topic field.
    pub fn seed_job(&self, job_id: &str, ready_at: i64, topic: &str) {
        self.schedule(job_id, ready_at);
        self.put_topic(job_id, topic);
    }

    // Failure injection

    /// Make every `fetch_expired` call fail until cleared.
    pub fn set_fetch_failure(&self, fail: bool) {
        self.state.lock().unwrap().fail_fetch = fail;
    }

    /// Make topic lookups for this job fail with a store error.
    pub fn fail_topic_lookup(&self, job_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.fail_topic_lookups.insert(job_id.to_string());
    }

    /// Make standalone removals of this job fail with a store error.
    pub fn fail_remove(&self, job_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.fail_removes.insert(job_id.to_string());
    }

    /// Make promote calls for this topic fail with a store error.
    pub fn fail_promote(&self, topic: &str) {
        let mut state = self.state.lock().unwrap();
        state.fail_promote_topics.insert(topic.to_string());
    }

    /// Make promote calls for this topic report zero effect without
    /// mutating anything, as when a racing pass emptied the index first.
    pub fn zero_effect_promote(&self, topic: &str) {
        let mut state = self.state.lock().unwrap();
        state.zero_effect_topics.insert(topic.to_string());
    }

    /// Drop every injected failure so the store behaves healthily again.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_fetch = false;
        state.fail_topic_lookups.clear();
        state.fail_removes.clear();
        state.fail_promote_topics.clear();
        state.zero_effect_topics.clear();
    }

    // Snapshots

    /// Jobs currently in the expiry index, sorted by id.
    pub fn pool_jobs(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut jobs: Vec<String> = state.pool.keys().cloned().collect();
        jobs.sort();
        jobs
    }

    pub fn pool_contains(&self, job_id: &str) -> bool {
        self.state.lock().unwrap().pool.contains_key(job_id)
    }

    /// Contents of a topic's ready queue, head first. Empty when the queue
    /// was never written.
    pub fn queue(&self, topic: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.queues.get(topic).cloned().unwrap_or_default()
    }

    /// Topics that have a ready queue, sorted.
    pub fn queue_topics(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut topics: Vec<String> = state.queues.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn counters(&self) -> StoreCounters {
        self.state.lock().unwrap().counters
    }

    /// Highest number of topic lookups observed in flight at once.
    pub fn peak_concurrent_lookups(&self) -> usize {
        self.peak_lookups.load(Ordering::SeqCst)
    }

    /// Highest number of promote transactions observed in flight at once.
    pub fn peak_concurrent_promotes(&self) -> usize {
        self.peak_promotes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DelayStore for MemoryStore {
    async fn fetch_expired(&self, now: i64) -> StoreResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.counters.fetches += 1;
        if state.fail_fetch {
            return Err(StoreError::operation(
                "zrangebyscore",
                "injected fetch failure",
            ));
        }

        let mut due: Vec<(i64, String)> = state
            .pool
            .iter()
            .filter(|(_, score)| **score >= 0 && **score <= now)
            .map(|(id, score)| (*score, id.clone()))
            .collect();
        due.sort();
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    async fn job_topic(&self, job_id: &str) -> StoreResult<Option<String>> {
        let current = self.in_flight_lookups.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_lookups.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let mut state = self.state.lock().unwrap();
            state.counters.topic_lookups += 1;
            if state.fail_topic_lookups.contains(job_id) {
                Err(StoreError::operation(
                    "hget",
                    "injected topic lookup failure",
                ))
            } else {
                Ok(state.topics.get(job_id).cloned())
            }
        };

        self.in_flight_lookups.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn remove_job(&self, job_id: &str) -> StoreResult<i64> {
        let mut state = self.state.lock().unwrap();
        state.counters.removes += 1;
        if state.fail_removes.contains(job_id) {
            return Err(StoreError::operation("zrem", "injected removal failure"));
        }
        Ok(if state.pool.remove(job_id).is_some() {
            1
        } else {
            0
        })
    }

    async fn promote(&self, topic: &str, job_ids: &[String]) -> StoreResult<(i64, i64)> {
        let current = self.in_flight_promotes.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_promotes.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.promote_delay {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let mut state = self.state.lock().unwrap();
            state.counters.promotes += 1;

            if state.fail_promote_topics.contains(topic) {
                Err(StoreError::operation(
                    "promote",
                    "injected transaction failure",
                ))
            } else if state.zero_effect_topics.contains(topic) {
                Ok((0, 0))
            } else {
                let mut removed = 0;
                for job_id in job_ids {
                    if state.pool.remove(job_id).is_some() {
                        removed += 1;
                    }
                }

                let queue = state.queues.entry(topic.to_string()).or_default();
                for job_id in job_ids {
                    queue.insert(0, job_id.clone());
                }
                Ok((removed, queue.len() as i64))
            }
        };

        self.in_flight_promotes.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_fetch_expired_orders_by_score_then_id() {
        let store = MemoryStore::new();
        store.schedule("late", 300);
        store.schedule("early-b", 100);
        store.schedule("early-a", 100);
        store.schedule("future", 10_000);

        let due = store.fetch_expired(500).await.unwrap();
        assert_eq!(due, vec!["early-a", "early-b", "late"]);

        let none_due = store.fetch_expired(50).await.unwrap();
        assert!(none_due.is_empty());
    }

    #[tokio::test]
    async fn test_job_topic_distinguishes_absent_from_failure() {
        let store = MemoryStore::new();
        store.put_topic("known", "emails");
        store.fail_topic_lookup("broken");

        assert_eq!(
            store.job_topic("known").await.unwrap(),
            Some("emails".to_string())
        );
        assert_eq!(store.job_topic("missing").await.unwrap(), None);
        assert_err!(store.job_topic("broken").await);
    }

    #[tokio::test]
    async fn test_promote_moves_batch_atomically() {
        let store = MemoryStore::new();
        store.seed_job("job1", 100, "emails");
        store.seed_job("job2", 100, "emails");

        let ids = vec!["job1".to_string(), "job2".to_string()];
        let (removed, queued) = store.promote("emails", &ids).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(queued, 2);
        assert!(store.pool_jobs().is_empty());
        // Head-first push order, like LPUSH.
        assert_eq!(store.queue("emails"), vec!["job2", "job1"]);
    }

    #[tokio::test]
    async fn test_promote_reports_partial_effect_counts() {
        let store = MemoryStore::new();
        store.seed_job("job1", 100, "emails");

        // job2 was never in the index, so only one removal lands while both
        // ids are appended.
        let ids = vec!["job1".to_string(), "job2".to_string()];
        let (removed, queued) = store.promote("emails", &ids).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(queued, 2);
    }

    #[tokio::test]
    async fn test_zero_effect_injection_leaves_state_untouched() {
        let store = MemoryStore::new();
        store.seed_job("job1", 100, "emails");
        store.zero_effect_promote("emails");

        let ids = vec!["job1".to_string()];
        let (removed, queued) = store.promote("emails", &ids).await.unwrap();
        assert_eq!((removed, queued), (0, 0));
        assert!(store.pool_contains("job1"));
        assert!(store.queue("emails").is_empty());
    }

    #[tokio::test]
    async fn test_counters_track_calls() {
        let store = MemoryStore::new();
        store.schedule("job1", 100);

        store.fetch_expired(200).await.unwrap();
        store.job_topic("job1").await.unwrap();
        store.remove_job("job1").await.unwrap();

        let counters = store.counters();
        assert_eq!(counters.fetches, 1);
        assert_eq!(counters.topic_lookups, 1);
        assert_eq!(counters.removes, 1);
        assert_eq!(counters.promotes, 0);
    }

    #[tokio::test]
    async fn test_remove_job_returns_membership() {
        let store = MemoryStore::new();
        store.schedule("job1", 100);

        assert_eq!(store.remove_job("job1").await.unwrap(), 1);
        assert_eq!(store.remove_job("job1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_failures_restores_health() {
        let store = MemoryStore::new();
        store.seed_job("job1", 100, "emails");
        store.set_fetch_failure(true);
        store.fail_topic_lookup("job1");

        assert_err!(store.fetch_expired(200).await);
        store.clear_failures();
        assert_ok!(store.fetch_expired(200).await);
        assert_ok!(store.job_topic("job1").await);
    }
}
