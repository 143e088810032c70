//! Redis delay-store provider.
//!
//! Uses a `deadpool-redis` pool; each operation acquires a connection
//! scoped to that call and releases it on drop. Commands run under the
//! configured per-operation deadline. The promote transaction is a
//! MULTI/EXEC pipeline so index removal and queue append commit together.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::config::RedisConfig;
use crate::constants::keys;
use crate::error::{StoreError, StoreResult};
use crate::store::DelayStore;
use async_trait::async_trait;

/// Redis-backed [`DelayStore`] over a deadpool connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: deadpool_redis::Pool,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("pool", &"deadpool_redis::Pool")
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

impl RedisStore {
    /// Build the connection pool from configuration. Connections are
    /// established lazily; call [`ping`](Self::ping) to fail fast at
    /// startup.
    pub fn from_config(config: &RedisConfig) -> StoreResult<Self> {
        let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(config.wait_timeout());
        pool_config.timeouts.create = Some(config.connect_timeout());
        pool_config.timeouts.recycle = Some(config.recycle_timeout());

        let mut cfg = deadpool_redis::Config::from_url(config.connection_url());
        cfg.pool = Some(pool_config);

        let pool = cfg
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| StoreError::Connection(format!("Failed to create Redis pool: {e}")))?;

        debug!(
            url = %config.redacted_url(),
            pool_size = config.pool_size,
            "Redis store pool created"
        );

        Ok(Self {
            pool,
            op_timeout: config.operation_timeout(),
        })
    }

    /// Round-trip a PING to verify the server is reachable.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let pong: String = self
            .with_timeout("ping", async {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::operation(
                "ping",
                format!("unexpected reply: {pong}"),
            ))
        }
    }

    async fn conn(&self) -> StoreResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn with_timeout<T, F>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, redis::RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::operation(operation, e)),
            Err(_) => Err(StoreError::Timeout {
                operation,
                timeout_ms: self.op_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl DelayStore for RedisStore {
    async fn fetch_expired(&self, now: i64) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let job_ids: Vec<String> = self
            .with_timeout("zrangebyscore", async {
                redis::cmd("ZRANGEBYSCORE")
                    .arg(keys::JOB_POOL)
                    .arg(0)
                    .arg(now)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(job_ids)
    }

    async fn job_topic(&self, job_id: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        let topic: Option<String> = self
            .with_timeout("hget", async {
                redis::cmd("HGET")
                    .arg(keys::job_bucket(job_id))
                    .arg(keys::TOPIC_FIELD)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(topic)
    }

    async fn remove_job(&self, job_id: &str) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let removed: i64 = self
            .with_timeout("zrem", async {
                redis::cmd("ZREM")
                    .arg(keys::JOB_POOL)
                    .arg(job_id)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(removed)
    }

    async fn promote(&self, topic: &str, job_ids: &[String]) -> StoreResult<(i64, i64)> {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("ZREM").arg(keys::JOB_POOL).arg(job_ids);
        pipe.cmd("LPUSH").arg(keys::ready_queue(topic)).arg(job_ids);

        let (removed, queued): (i64, i64) = self
            .with_timeout("promote", async { pipe.query_async(&mut conn).await })
            .await?;
        Ok((removed, queued))
    }
}
