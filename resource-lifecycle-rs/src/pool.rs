//! Bounded resource pool
//!
//! Reuses expensive resources (connections, clients) across calls while
//! bounding how many exist at once. Permits of a semaphore sized `max_size`
//! account for checked-out resources; idle resources wait in a LIFO stack
//! until reused, expired by the sweeper, or destroyed on shutdown.
//!
//! Live resources never exceed `max_size`: a resource is only created while
//! its caller holds a permit, and a returned resource goes back to the idle
//! set before the permit is released.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

use config_rs::ConfigError;
use error_handling_rs::{Classify, ErrorKind};

/// Creates and destroys the resources held by a [`Pool`]
#[async_trait]
pub trait ResourceManager: Send + Sync + 'static {
    type Resource: Send + 'static;
    type Error: fmt::Display + Send + 'static;

    /// Construct a new resource
    async fn create(&self) -> Result<Self::Resource, Self::Error>;

    /// Release a resource for good. Failures are logged by the pool.
    fn destroy(&self, resource: Self::Resource) -> Result<(), Self::Error>;
}

/// Pool errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoolError {
    #[error("Timed out after {0:?} waiting for a pooled resource")]
    Timeout(Duration),

    #[error("Acquire cancelled")]
    Cancelled,

    #[error("Pool is closed")]
    Closed,

    #[error("Failed to create resource: {0}")]
    Create(String),
}

impl Classify for PoolError {
    fn kind(&self) -> ErrorKind {
        match self {
            PoolError::Timeout(_) => ErrorKind::Timeout,
            PoolError::Cancelled => ErrorKind::Cancelled,
            PoolError::Closed | PoolError::Create(_) => ErrorKind::Resource,
        }
    }
}

/// Pool configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Maximum number of live resources (idle plus in use)
    pub max_size: usize,

    /// Maximum number of idle resources kept for reuse
    pub max_idle: usize,

    /// Idle resources older than this are destroyed instead of reused
    pub idle_timeout: Duration,

    /// Upper bound on waiting for a free slot
    pub acquire_timeout: Duration,

    /// How often the sweeper looks for expired idle resources
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            max_idle: 5,
            idle_timeout: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// Load `<PREFIX>_POOL_MAX_SIZE`, `<PREFIX>_POOL_MAX_IDLE`,
    /// `<PREFIX>_POOL_IDLE_TIMEOUT`, `<PREFIX>_POOL_ACQUIRE_TIMEOUT` and
    /// `<PREFIX>_POOL_SWEEP_INTERVAL`
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        let key = |name: &str| format!("{}_POOL_{}", prefix.to_uppercase(), name);

        Self {
            max_size: config_rs::get_env_u64(&key("MAX_SIZE"), defaults.max_size as u64) as usize,
            max_idle: config_rs::get_env_u64(&key("MAX_IDLE"), defaults.max_idle as u64) as usize,
            idle_timeout: config_rs::get_env_duration(&key("IDLE_TIMEOUT"), defaults.idle_timeout),
            acquire_timeout: config_rs::get_env_duration(
                &key("ACQUIRE_TIMEOUT"),
                defaults.acquire_timeout,
            ),
            sweep_interval: config_rs::get_env_duration(
                &key("SWEEP_INTERVAL"),
                defaults.sweep_interval,
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::Validation("pool max_size must be greater than zero".into()));
        }
        if self.max_idle > self.max_size {
            return Err(ConfigError::Validation(format!(
                "pool max_idle ({}) exceeds max_size ({})",
                self.max_idle, self.max_size
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Validation(
                "pool sweep_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_size: usize,
    pub idle: usize,
    pub in_use: usize,
}

struct PoolItem<R> {
    resource: R,
    last_used: Instant,
}

impl<R> PoolItem<R> {
    fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.last_used.elapsed() >= idle_timeout
    }
}

struct PoolShared<M: ResourceManager> {
    manager: M,
    config: PoolConfig,
    idle: Mutex<VecDeque<PoolItem<M::Resource>>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    span: Span,
}

impl<M: ResourceManager> PoolShared<M> {
    fn destroy(&self, resource: M::Resource) {
        if let Err(e) = self.manager.destroy(resource) {
            self.span.in_scope(|| warn!(error = %e, "Failed to destroy pooled resource"));
        }
    }

    fn return_idle(&self, resource: M::Resource) {
        let mut idle = self.idle.lock();
        // Checked under the idle lock so a concurrent shutdown cannot miss it
        if self.closed.load(Ordering::SeqCst) || idle.len() >= self.config.max_idle {
            drop(idle);
            self.destroy(resource);
            return;
        }

        idle.push_back(PoolItem {
            resource,
            last_used: Instant::now(),
        });
    }

    fn sweep_idle(&self) -> usize {
        let idle_timeout = self.config.idle_timeout;
        let stale = {
            let mut idle = self.idle.lock();
            let (fresh, stale): (VecDeque<_>, VecDeque<_>) =
                idle.drain(..).partition(|item| !item.is_expired(idle_timeout));
            *idle = fresh;
            stale
        };

        let removed = stale.len();
        for item in stale {
            self.destroy(item.resource);
        }
        removed
    }
}

/// Bounded pool of resources produced by a [`ResourceManager`]
pub struct Pool<M: ResourceManager> {
    shared: Arc<PoolShared<M>>,
    sweeper: CancellationToken,
}

impl<M: ResourceManager> Pool<M> {
    /// Create a pool and start its idle sweep on the current runtime.
    ///
    /// Fails when `config` does not pass [`PoolConfig::validate`].
    pub fn new(manager: M, config: PoolConfig) -> Result<Self, ConfigError> {
        Self::with_span(manager, config, tracing::debug_span!("pool"))
    }

    /// Create a pool that logs inside `span`
    pub fn with_span(manager: M, config: PoolConfig, span: Span) -> Result<Self, ConfigError> {
        config.validate()?;

        let shared = Arc::new(PoolShared {
            manager,
            permits: Arc::new(Semaphore::new(config.max_size)),
            idle: Mutex::new(VecDeque::with_capacity(config.max_idle)),
            closed: AtomicBool::new(false),
            config,
            span,
        });

        let sweeper = CancellationToken::new();
        spawn_sweeper(Arc::downgrade(&shared), sweeper.clone());

        Ok(Self { shared, sweeper })
    }

    /// Acquire a resource, waiting at most `acquire_timeout` for a free slot
    pub async fn acquire(&self) -> Result<Pooled<M>, PoolError> {
        self.acquire_with_cancellation(&CancellationToken::new()).await
    }

    /// Acquire a resource, giving up early when `cancel` fires
    pub async fn acquire_with_cancellation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Pooled<M>, PoolError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let wait = self.shared.config.acquire_timeout;
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PoolError::Cancelled),
            acquired = tokio::time::timeout(wait, self.shared.permits.clone().acquire_owned()) => {
                match acquired {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(PoolError::Closed),
                    Err(_) => {
                        self.shared.span.in_scope(|| debug!(timeout = ?wait, "Pool acquire timed out"));
                        return Err(PoolError::Timeout(wait));
                    }
                }
            }
        };

        let idle_timeout = self.shared.config.idle_timeout;
        loop {
            let item = self.shared.idle.lock().pop_back();
            match item {
                Some(item) if item.is_expired(idle_timeout) => {
                    self.shared.span.in_scope(|| debug!("Replacing expired idle resource"));
                    self.shared.destroy(item.resource);
                }
                Some(item) => return Ok(Pooled::new(item.resource, self.shared.clone(), permit)),
                None => break,
            }
        }

        let resource = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PoolError::Cancelled),
            created = self.shared.manager.create() => created.map_err(|e| {
                self.shared.span.in_scope(|| warn!(error = %e, "Failed to create pooled resource"));
                PoolError::Create(e.to_string())
            })?,
        };

        Ok(Pooled::new(resource, self.shared.clone(), permit))
    }

    /// Destroy idle resources older than `idle_timeout`; returns how many
    pub fn purge_idle(&self) -> usize {
        self.shared.sweep_idle()
    }

    pub fn status(&self) -> PoolStatus {
        let max_size = self.shared.config.max_size;
        PoolStatus {
            max_size,
            idle: self.shared.idle.lock().len(),
            in_use: max_size.saturating_sub(self.shared.permits.available_permits()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Stop the sweeper, destroy every idle resource and refuse further
    /// acquires. Resources still checked out are destroyed when returned.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.sweeper.cancel();
        self.shared.permits.close();

        let drained: Vec<_> = self.shared.idle.lock().drain(..).collect();
        let destroyed = drained.len();
        for item in drained {
            self.shared.destroy(item.resource);
        }

        self.shared.span.in_scope(|| info!(destroyed, "Pool shut down"));
    }
}

impl<M: ResourceManager> Drop for Pool<M> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A checked-out resource. Dropping it returns the resource to the pool.
pub struct Pooled<M: ResourceManager> {
    resource: Option<M::Resource>,
    discard: bool,
    shared: Arc<PoolShared<M>>,
    // Released after `Drop::drop` has put the resource back
    _permit: OwnedSemaphorePermit,
}

impl<M: ResourceManager> Pooled<M> {
    fn new(resource: M::Resource, shared: Arc<PoolShared<M>>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            resource: Some(resource),
            discard: false,
            shared,
            _permit: permit,
        }
    }

    /// Return the resource to the pool now
    pub fn release(self) {}

    /// Destroy the resource instead of returning it, e.g. after it broke
    pub fn discard(mut self) {
        self.discard = true;
    }
}

impl<M: ResourceManager> Deref for Pooled<M> {
    type Target = M::Resource;

    fn deref(&self) -> &Self::Target {
        self.resource.as_ref().expect("resource is present until drop")
    }
}

impl<M: ResourceManager> DerefMut for Pooled<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.resource.as_mut().expect("resource is present until drop")
    }
}

impl<M: ResourceManager> Drop for Pooled<M> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            if self.discard {
                self.shared.destroy(resource);
            } else {
                self.shared.return_idle(resource);
            }
        }
    }
}

impl<M: ResourceManager> fmt::Debug for Pooled<M>
where
    M::Resource: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled").field("resource", &self.resource).finish()
    }
}

fn spawn_sweeper<M: ResourceManager>(shared: Weak<PoolShared<M>>, stop: CancellationToken) {
    let Some(strong) = shared.upgrade() else { return };
    let every = strong.config.sweep_interval;
    let span = strong.span.clone();
    drop(strong);

    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            span.in_scope(|| warn!("No tokio runtime available, idle pool sweep disabled"));
            return;
        }
    };

    handle.spawn(
        async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(shared) = shared.upgrade() else { break };
                        let removed = shared.sweep_idle();
                        if removed > 0 {
                            debug!(removed, "Destroyed expired idle resources");
                        }
                    }
                }
            }

            debug!("Pool sweeper stopped");
        }
        .instrument(span),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct Conn {
        id: usize,
    }

    #[derive(Default)]
    struct Stats {
        created: AtomicUsize,
        destroyed: AtomicUsize,
        live: AtomicUsize,
        peak: AtomicUsize,
        fail_create: AtomicBool,
        fail_destroy: AtomicBool,
    }

    struct TestManager {
        stats: Arc<Stats>,
    }

    #[async_trait]
    impl ResourceManager for TestManager {
        type Resource = Conn;
        type Error = String;

        async fn create(&self) -> Result<Conn, String> {
            if self.stats.fail_create.load(Ordering::SeqCst) {
                return Err("backend unavailable".to_string());
            }
            let id = self.stats.created.fetch_add(1, Ordering::SeqCst);
            let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.stats.peak.fetch_max(live, Ordering::SeqCst);
            Ok(Conn { id })
        }

        fn destroy(&self, _conn: Conn) -> Result<(), String> {
            self.stats.live.fetch_sub(1, Ordering::SeqCst);
            self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
            if self.stats.fail_destroy.load(Ordering::SeqCst) {
                return Err("close failed".to_string());
            }
            Ok(())
        }
    }

    fn pool(config: PoolConfig) -> (Pool<TestManager>, Arc<Stats>) {
        let stats = Arc::new(Stats::default());
        let pool = Pool::new(TestManager { stats: stats.clone() }, config).unwrap();
        (pool, stats)
    }

    fn config(max_size: usize, max_idle: usize) -> PoolConfig {
        PoolConfig {
            max_size,
            max_idle,
            idle_timeout: Duration::from_secs(60),
            acquire_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn test_released_resource_is_reused() {
        let (pool, stats) = pool(config(2, 2));

        let first = pool.acquire().await.unwrap();
        let id = first.id;
        drop(first);

        let second = pool.acquire().await.unwrap();
        assert_eq!(second.id, id);
        assert_eq!(stats.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_live_resources_never_exceed_max_size() {
        let (pool, stats) = pool(config(3, 3));
        let pool = Arc::new(pool);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let conn = pool.acquire().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
                drop(conn);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(stats.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.status().in_use, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out_when_exhausted() {
        let (pool, _stats) = pool(config(1, 1));
        let _held = pool.acquire().await.unwrap();

        let result = pool.acquire().await;
        assert!(matches!(result, Err(PoolError::Timeout(_))));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_receives_released_resource() {
        let (pool, stats) = pool(config(1, 1));
        let held = pool.acquire().await.unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(held);
        });

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.id, 0);
        assert_eq!(stats.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_wait() {
        let (pool, _stats) = pool(config(1, 1));
        let _held = pool.acquire().await.unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = pool.acquire_with_cancellation(&token).await;
        assert!(matches!(result, Err(PoolError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_token_fails_fast() {
        let (pool, stats) = pool(config(1, 1));
        let token = CancellationToken::new();
        token.cancel();

        let result = pool.acquire_with_cancellation(&token).await;
        assert!(matches!(result, Err(PoolError::Cancelled)));
        assert_eq!(stats.created.load(Ordering::SeqCst), 0);
        assert_eq!(pool.status().in_use, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_idle_resource_is_replaced() {
        let (pool, stats) = pool(config(2, 2));

        drop(pool.acquire().await.unwrap());
        tokio::time::advance(Duration::from_secs(61)).await;

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.id, 1);
        assert_eq!(stats.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_destroys_expired_idle() {
        let mut cfg = config(2, 2);
        cfg.idle_timeout = Duration::from_secs(10);
        cfg.sweep_interval = Duration::from_secs(5);
        let (pool, stats) = pool(cfg);

        drop(pool.acquire().await.unwrap());
        assert_eq!(pool.status().idle, 1);

        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(pool.status().idle, 0);
        assert_eq!(stats.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_excess_idle_is_destroyed() {
        let (pool, stats) = pool(config(3, 1));

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let c = pool.acquire().await.unwrap();
        assert_eq!(pool.status().in_use, 3);

        drop(a);
        drop(b);
        c.release();

        let status = pool.status();
        assert_eq!(status.idle, 1);
        assert_eq!(status.in_use, 0);
        assert_eq!(stats.destroyed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_discard_destroys_resource() {
        let (pool, stats) = pool(config(2, 2));

        pool.acquire().await.unwrap().discard();

        assert_eq!(pool.status().idle, 0);
        assert_eq!(stats.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(stats.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_destroy_failure_is_swallowed() {
        let (pool, stats) = pool(config(1, 0));
        stats.fail_destroy.store(true, Ordering::SeqCst);

        drop(pool.acquire().await.unwrap());

        assert_eq!(stats.destroyed.load(Ordering::SeqCst), 1);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_create_failure_releases_slot() {
        let (pool, stats) = pool(config(1, 1));
        stats.fail_create.store(true, Ordering::SeqCst);

        let result = pool.acquire().await;
        assert!(matches!(result, Err(PoolError::Create(_))));
        assert_eq!(pool.status().in_use, 0);

        stats.fail_create.store(false, Ordering::SeqCst);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_destroys_idle_and_rejects_acquire() {
        let (pool, stats) = pool(config(2, 2));

        let held = pool.acquire().await.unwrap();
        drop(pool.acquire().await.unwrap());
        assert_eq!(pool.status().idle, 1);

        pool.shutdown();
        assert!(pool.is_closed());
        assert_eq!(stats.destroyed.load(Ordering::SeqCst), 1);
        assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));

        // Returned after shutdown: destroyed, not pooled
        drop(held);
        assert_eq!(stats.destroyed.load(Ordering::SeqCst), 2);
        assert_eq!(stats.live.load(Ordering::SeqCst), 0);
        assert_eq!(pool.status().idle, 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(config(0, 0).validate().is_err());
        assert!(config(2, 3).validate().is_err());
        assert!(config(2, 0).validate().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_at_construction() {
        let stats = Arc::new(Stats::default());
        let result = Pool::new(TestManager { stats: stats.clone() }, config(0, 0));
        assert!(matches!(result, Err(ConfigError::Validation(_))));

        let result = Pool::new(TestManager { stats: stats.clone() }, config(2, 3));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
        assert_eq!(stats.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_error_classification() {
        assert!(PoolError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(PoolError::Cancelled.is_retryable());
        assert_eq!(PoolError::Closed.kind(), ErrorKind::Resource);
        assert!(!PoolError::Create("x".into()).is_retryable());
    }
}
