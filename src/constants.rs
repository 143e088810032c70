//! # System Constants
//!
//! Fixed store key names and operational defaults for the delayed-job
//! promotion engine.
//!
//! Key names are shared with the producers and consumers of the queue and
//! must not change: existing deployments address the same Redis structures
//! by these exact strings.

/// Redis key names and builders for the three store structures.
pub mod keys {
    /// Sorted set of pending job identifiers, scored by ready-at unix seconds.
    pub const JOB_POOL: &str = "delayer:job_pool";

    /// Prefix for per-job metadata hashes; full key is prefix + job id.
    pub const JOB_BUCKET_PREFIX: &str = "delayer:job_bucket:";

    /// Prefix for per-topic ready-queue lists; full key is prefix + topic.
    pub const READY_QUEUE_PREFIX: &str = "delayer:ready_queue:";

    /// Hash field on the metadata record naming the destination topic.
    pub const TOPIC_FIELD: &str = "topic";

    /// Metadata hash key for a job identifier.
    pub fn job_bucket(job_id: &str) -> String {
        format!("{JOB_BUCKET_PREFIX}{job_id}")
    }

    /// Ready-queue list key for a topic.
    pub fn ready_queue(topic: &str) -> String {
        format!("{READY_QUEUE_PREFIX}{topic}")
    }
}

/// Default configuration values applied when the config file omits a field.
pub mod defaults {
    /// Scheduler tick interval in milliseconds.
    pub const TIMER_INTERVAL_MS: u64 = 1000;

    /// Ceiling on concurrent topic-metadata lookups within one pass.
    pub const MAX_CONCURRENT_RESOLVES: usize = 32;

    /// Ceiling on concurrent per-topic group moves within one pass.
    pub const MAX_CONCURRENT_MOVES: usize = 8;

    /// Redis connection pool size.
    pub const POOL_SIZE: usize = 10;

    /// Timeout for a single store operation in milliseconds.
    pub const OPERATION_TIMEOUT_MS: u64 = 3000;

    /// Timeout waiting for a pooled connection in milliseconds.
    pub const WAIT_TIMEOUT_MS: u64 = 5000;

    /// Timeout establishing a new connection in milliseconds.
    pub const CONNECT_TIMEOUT_MS: u64 = 5000;

    /// Timeout recycling an idle pooled connection in milliseconds.
    pub const RECYCLE_TIMEOUT_MS: u64 = 5000;

    /// Redis server host.
    pub const REDIS_HOST: &str = "127.0.0.1";

    /// Redis server port.
    pub const REDIS_PORT: u16 = 6379;

    /// Redis logical database index.
    pub const REDIS_DATABASE: i64 = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        assert_eq!(keys::job_bucket("job-42"), "delayer:job_bucket:job-42");
        assert_eq!(keys::ready_queue("emails"), "delayer:ready_queue:emails");
    }

    #[test]
    fn test_fixed_key_names() {
        // Shared with external producers/consumers; changing these breaks
        // existing deployments.
        assert_eq!(keys::JOB_POOL, "delayer:job_pool");
        assert_eq!(keys::TOPIC_FIELD, "topic");
    }
}
