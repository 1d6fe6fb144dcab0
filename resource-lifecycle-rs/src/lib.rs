//! # Resource Lifecycle
//!
//! Two generic primitives the governance layer builds on for efficiency:
//!
//! - [`Cache`]: an in-memory map with per-entry TTL, size-bounded LRU
//!   eviction and a background expiry sweep.
//! - [`Pool`]: a bounded pool of expensive resources with idle reuse,
//!   idle-timeout eviction and bounded, cancellable waits.
//!
//! Both own their internal state completely; callers never lock anything
//! themselves. Both spawn a sweeper on the current tokio runtime that stops
//! on `shutdown()` or when the owner is dropped.

pub mod cache;
pub mod pool;

pub use cache::{Cache, CacheConfig};
pub use pool::{Pool, PoolConfig, PoolError, PoolStatus, Pooled, ResourceManager};
