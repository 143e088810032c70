//! # Delay Store Providers
//!
//! [`DelayStore`] is the seam between the promotion pipeline and the backing
//! store.
//!
//! ```text
//! DelayStore (trait)
//!   ├── RedisStore   <- deadpool-pooled async Redis, production
//!   └── MemoryStore  <- in-process maps with fault injection, tests
//! ```
//!
//! Absent metadata is `Ok(None)` from `job_topic`, not an error: callers
//! treat orphans and transport failures differently.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;

use crate::error::StoreResult;

/// Store operations required by the promotion pipeline.
#[async_trait]
pub trait DelayStore: Send + Sync + 'static {
    /// Job identifiers whose ready-at score lies in `[0, now]`, in score
    /// order. Empty when nothing is due.
    async fn fetch_expired(&self, now: i64) -> StoreResult<Vec<String>>;

    /// Destination topic for a job, or `None` when the metadata record or
    /// its topic field is gone.
    async fn job_topic(&self, job_id: &str) -> StoreResult<Option<String>>;

    /// Remove a single identifier from the expiry index. Returns the number
    /// of members actually removed (0 when the job was already gone).
    async fn remove_job(&self, job_id: &str) -> StoreResult<i64>;

    /// Atomically remove `job_ids` from the expiry index and append the
    /// batch to `topic`'s ready queue; both take effect together or not at
    /// all. Returns `(removed, queued)`: the members removed from the index
    /// and the queue length after the append.
    async fn promote(&self, topic: &str, job_ids: &[String]) -> StoreResult<(i64, i64)>;
}
