//! A thread-safe, in-memory caching facade with pluggable storage engines.
//!
//! # Features
//! - **One contract, two engines**: the same `Cache` surface runs on a
//!   sharded concurrent engine (near-optimal LRU, single-flight loads,
//!   background expiry sweeps) or a strict engine (exact LRU, fully
//!   synchronous eviction).
//! - **Expiry policies**: time-to-live, time-to-idle, per-entry deadline
//!   overrides, and refresh-after-write through a configured loader.
//! - **Unified removal causes**: every engine reports removals through one
//!   five-value [`RemovalCause`] taxonomy, whatever its native reasons are.
//! - **Lifecycle listeners**: create, read, update, and remove hooks around
//!   each mutation.
//! - **Weak-value variant**: [`Cache::new_fast`] keeps entries alive exactly
//!   as long as callers hold them.
//! - **Observability**: per-cache counters via [`MetricsSnapshot`].

// Public modules that form the API
pub mod builder;
pub mod cache;
pub mod error;
pub mod listener;
pub mod metrics;

// Internal, crate-only modules
mod backend;
mod entry;
mod loader;
mod store;
mod task;
mod time;

// Re-export the primary user-facing types for convenience
pub use builder::{CacheBuilder, Engine};
pub use cache::Cache;
pub use error::{BuildError, CacheError, LoadError};
pub use listener::{
  CreateListener, ReadListener, RemovalCause, RemoveListener, UpdateListener,
};
pub use metrics::MetricsSnapshot;
