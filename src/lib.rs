#![allow(clippy::doc_markdown)] // Allow technical terms like ZRANGEBYSCORE in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Delayer Core
//!
//! Promotion engine for a Redis-backed delayed job queue.
//!
//! ## Overview
//!
//! Producers schedule jobs by writing a metadata record and adding the job
//! identifier to a sorted-set delay index scored by ready time. This crate
//! owns the other half of the contract: on a fixed interval it scans the
//! index for jobs whose delay has elapsed, resolves each job's destination
//! topic from its metadata, and atomically moves the jobs onto per-topic
//! ready queues where consumers pick them up.
//!
//! ## Architecture
//!
//! A pass runs in four stages: fetch expired identifiers, resolve topics
//! with bounded concurrency, group by topic, and move each group with a
//! single atomic store transaction. Failures degrade per item, never per
//! pass, so one bad job or topic cannot hold back the rest.
//!
//! ## Module Organization
//!
//! - [`config`] - YAML plus environment configuration
//! - [`constants`] - Store key layout and tuning defaults
//! - [`error`] - Structured error types for store and promotion failures
//! - [`logging`] - Structured logging bootstrap
//! - [`promotion`] - The pass pipeline and its interval timer
//! - [`reporter`] - Observer seam for promotions and failures
//! - [`store`] - The [`DelayStore`] trait with Redis and in-memory backends
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use delayer_core::config::DelayerConfig;
//! use delayer_core::promotion::{PromotionPipeline, PromotionTimer};
//! use delayer_core::reporter::TracingReporter;
//! use delayer_core::store::RedisStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = DelayerConfig::load()?;
//! let store = Arc::new(RedisStore::from_config(&config.redis)?);
//! let pipeline = Arc::new(PromotionPipeline::new(
//!     store,
//!     Arc::new(TracingReporter),
//!     &config.timer,
//! ));
//!
//! let timer = PromotionTimer::new(pipeline, config.timer.interval());
//! timer.start();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod promotion;
pub mod reporter;
pub mod store;

pub use config::DelayerConfig;
pub use error::{PromotionError, PromotionResult, StoreError, StoreResult};
pub use promotion::{PassSummary, PromotionPipeline, PromotionTimer, TopicResolution};
pub use reporter::{MemoryReporter, PromotionReporter, TracingReporter};
pub use store::{DelayStore, MemoryStore, RedisStore};
