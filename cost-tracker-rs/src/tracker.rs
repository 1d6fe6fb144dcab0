//! Cost tracker
//!
//! Appends one immutable entry per billable call and folds it into the
//! session's running aggregate. Aggregate updates are read-modify-write
//! against the store, serialized by a per-session async lock; different
//! sessions never contend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, Instrument, Span};

use crate::error::{CostError, Result};
use crate::pricing::PricingTable;
use crate::storage::KeyValueStore;
use crate::types::{CallDetails, CostEntry, CostLimits, LimitCheck, SessionCosts};

/// Store key of one ledger entry
pub fn entry_key(session_id: &str, timestamp_nanos: i64) -> String {
    format!("cost_entry:{}:{}", session_id, timestamp_nanos)
}

/// Store key of a session aggregate
pub fn aggregate_key(session_id: &str) -> String {
    format!("session_costs:{}", session_id)
}

/// Records spend per session and checks it against ceilings
pub struct CostTracker {
    store: Arc<dyn KeyValueStore>,
    pricing: PricingTable,
    session_locks: DashMap<String, Arc<Mutex<()>>>,
    last_entry_nanos: AtomicI64,
    span: Span,
}

impl CostTracker {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_pricing(store, PricingTable::default())
    }

    pub fn with_pricing(store: Arc<dyn KeyValueStore>, pricing: PricingTable) -> Self {
        Self {
            store,
            pricing,
            session_locks: DashMap::new(),
            last_entry_nanos: AtomicI64::new(0),
            span: tracing::info_span!("cost_tracker"),
        }
    }

    /// Log inside `span` instead of the default one
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Record one billable call and return the stored entry
    pub async fn track_call(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        ip: Option<&str>,
        details: CallDetails,
        metadata: BTreeMap<String, String>,
    ) -> Result<CostEntry> {
        if session_id.trim().is_empty() {
            return Err(CostError::Validation("session_id must not be empty".into()));
        }

        async {
            let nanos = self.next_entry_nanos();
            let entry = CostEntry::new(
                session_id,
                user_id,
                ip,
                Utc.timestamp_nanos(nanos),
                &details,
                self.pricing.estimate(&details),
                metadata,
            );

            let key = entry_key(session_id, nanos);
            let bytes = serde_json::to_vec(&entry)
                .map_err(|e| CostError::corrupt("append_entry", session_id, &key, e))?;
            self.store
                .set(&key, bytes)
                .await
                .map_err(|e| CostError::storage("append_entry", session_id, e))?;

            let costs = self.fold_into_aggregate(session_id, &entry).await?;

            debug!(
                operation = %entry.operation,
                model = entry.model.as_deref().unwrap_or_default(),
                cost = entry.estimated_cost,
                total_cost = costs.total_cost,
                "Tracked call"
            );
            Ok(entry)
        }
        .instrument(tracing::debug_span!(parent: &self.span, "track_call", session_id = %session_id))
        .await
    }

    /// Record a language-model call
    pub async fn track_llm_call(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        ip: Option<&str>,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<CostEntry> {
        let details = CallDetails::Llm {
            model: model.to_string(),
            input_tokens,
            output_tokens,
        };
        self.track_call(session_id, user_id, ip, details, BTreeMap::new()).await
    }

    /// Record an image-generation call producing `count` images
    pub async fn track_image_call(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        ip: Option<&str>,
        model: &str,
        count: u32,
    ) -> Result<CostEntry> {
        let details = CallDetails::Image {
            model: model.to_string(),
            count,
        };
        self.track_call(session_id, user_id, ip, details, BTreeMap::new()).await
    }

    /// Current aggregate; a session with no recorded spend yields zeros
    pub async fn get_session_costs(&self, session_id: &str) -> Result<SessionCosts> {
        self.load_aggregate("get_session_costs", session_id)
            .instrument(self.span.clone())
            .await
    }

    /// Compare the session's aggregate with `limits`.
    ///
    /// Advisory only: nothing is blocked here, callers decide whether to
    /// refuse further work.
    pub async fn check_limits(&self, session_id: &str, limits: &CostLimits) -> Result<LimitCheck> {
        let costs = self.get_session_costs(session_id).await?;
        let violations = limits.violations(&costs);
        let exceeded = !violations.is_empty();

        if exceeded {
            self.span.in_scope(|| {
                info!(
                    session_id,
                    violations = violations.len(),
                    total_cost = costs.total_cost,
                    "Session exceeded cost limits"
                )
            });
        }

        Ok(LimitCheck {
            costs,
            exceeded,
            violations,
        })
    }

    async fn fold_into_aggregate(&self, session_id: &str, entry: &CostEntry) -> Result<SessionCosts> {
        let lease = self.lease_session_lock(session_id);
        let _guard = lease.lock.lock().await;
        self.update_aggregate(session_id, entry).await
    }

    // Caller holds the session lock
    async fn update_aggregate(&self, session_id: &str, entry: &CostEntry) -> Result<SessionCosts> {
        let mut costs = self.load_aggregate("update_aggregate", session_id).await?;
        costs.apply(entry);

        let key = aggregate_key(session_id);
        let bytes = serde_json::to_vec(&costs)
            .map_err(|e| CostError::corrupt("update_aggregate", session_id, &key, e))?;
        self.store
            .set(&key, bytes)
            .await
            .map_err(|e| CostError::storage("update_aggregate", session_id, e))?;

        Ok(costs)
    }

    async fn load_aggregate(&self, operation: &str, session_id: &str) -> Result<SessionCosts> {
        let key = aggregate_key(session_id);
        let stored = self
            .store
            .get(&key)
            .await
            .map_err(|e| CostError::storage(operation, session_id, e))?;

        match stored {
            None => Ok(SessionCosts::empty(session_id)),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CostError::corrupt(operation, session_id, &key, e)),
        }
    }

    fn lease_session_lock<'a>(&'a self, session_id: &'a str) -> SessionLockLease<'a> {
        let lock = self
            .session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        SessionLockLease {
            locks: &self.session_locks,
            session_id,
            lock,
        }
    }

    // Strictly increasing across this tracker so ledger keys never collide
    fn next_entry_nanos(&self) -> i64 {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX - 1);
        match self
            .last_entry_nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        {
            Ok(last) | Err(last) => now.max(last + 1),
        }
    }
}

/// A claim on one session's lock entry.
///
/// Dropping the lease removes the entry once nobody else holds or waits on
/// it, including when the owning future is dropped mid-wait.
struct SessionLockLease<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    session_id: &'a str,
    lock: Arc<Mutex<()>>,
}

impl Drop for SessionLockLease<'_> {
    fn drop(&mut self) {
        // Clones are only handed out under the map's shard lock, so a count
        // of two (the map and this lease) is stable here.
        let lock = &self.lock;
        self.locks.remove_if(self.session_id, |_, held| {
            Arc::ptr_eq(held, lock) && Arc::strong_count(held) == 2
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CachedStore, InMemoryStore, StorageError};
    use crate::types::LimitKind;
    use async_trait::async_trait;
    use error_handling_rs::{Classify, ErrorKind};
    use resource_lifecycle::CacheConfig;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn tracker() -> (CostTracker, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (CostTracker::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_image_call_end_to_end() {
        let (tracker, _store) = tracker();

        tracker.track_image_call("s1", None, None, "imagen-3", 3).await.unwrap();
        let costs = tracker.get_session_costs("s1").await.unwrap();

        assert_eq!(costs.image_calls, 1);
        assert_eq!(costs.llm_calls, 0);
        assert!(approx(costs.total_image_cost, 0.06));
        assert!(approx(costs.total_cost, 0.06));
    }

    #[tokio::test]
    async fn test_absent_session_is_zero() {
        let (tracker, _store) = tracker();
        let costs = tracker.get_session_costs("never-seen").await.unwrap();
        assert_eq!(costs, SessionCosts::empty("never-seen"));
    }

    #[tokio::test]
    async fn test_ledger_and_aggregate_keys() {
        let (tracker, store) = tracker();

        let entry = tracker
            .track_llm_call("s1", Some("u1"), Some("10.0.0.1"), "gemini-1.5-flash", 100, 50)
            .await
            .unwrap();
        tracker.track_llm_call("s1", None, None, "gemini-1.5-flash", 100, 50).await.unwrap();

        let entries = store.keys_with_prefix("cost_entry:s1:").await;
        assert_eq!(entries.len(), 2);
        assert!(store.get("session_costs:s1").await.unwrap().is_some());

        let key = entry_key("s1", entry.timestamp.timestamp_nanos_opt().unwrap());
        let stored: CostEntry = serde_json::from_slice(&store.get(&key).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored, entry);
        assert_eq!(stored.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_are_not_lost() {
        let (tracker, store) = tracker();
        let tracker = Arc::new(tracker);
        let n = 50;

        let mut handles = Vec::new();
        for _ in 0..n {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker
                    .track_llm_call("s1", None, None, "gemini-1.5-flash", 100, 50)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let single = tracker.pricing().llm_cost("gemini-1.5-flash", 100, 50);
        let costs = tracker.get_session_costs("s1").await.unwrap();

        assert_eq!(costs.llm_calls, n as u64);
        assert!(approx(costs.total_llm_cost, single * n as f64));
        assert_eq!(store.keys_with_prefix("cost_entry:s1:").await.len(), n);
        assert!(tracker.session_locks.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_wait_releases_lock_entry() {
        let (tracker, _store) = tracker();
        let lease = tracker.lease_session_lock("s1");
        let held = lease.lock.lock().await;

        let mut waiter = Box::pin(tracker.track_llm_call("s1", None, None, "gemini-1.5-flash", 100, 50));
        tokio::select! {
            biased;
            _ = &mut waiter => panic!("call finished while the session lock was held"),
            _ = tokio::task::yield_now() => {}
        }

        drop(held);
        drop(lease);
        assert_eq!(tracker.session_locks.len(), 1);

        drop(waiter);
        assert!(tracker.session_locks.is_empty());
    }

    /// Backing store that can park one aggregate read after it has read
    #[derive(Default)]
    struct ParkingStore {
        inner: InMemoryStore,
        park_next_read: AtomicBool,
        parked: Notify,
        resume: Notify,
    }

    #[async_trait]
    impl KeyValueStore for ParkingStore {
        async fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, StorageError> {
            let value = self.inner.get(key).await;
            if key.starts_with("session_costs:") && self.park_next_read.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.resume.notified().await;
            }
            value
        }

        async fn set(&self, key: &str, value: Vec<u8>) -> std::result::Result<(), StorageError> {
            self.inner.set(key, value).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cached_read_does_not_lose_updates() {
        let backing = Arc::new(ParkingStore::default());
        let config = CacheConfig {
            ttl: Duration::from_secs(1),
            max_size: 16,
        };
        let store = CachedStore::new(backing.clone(), config).unwrap();
        let tracker = Arc::new(CostTracker::new(Arc::new(store)));

        tracker.track_llm_call("s1", None, None, "gemini-1.5-flash", 100, 50).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        // A reader misses the cache and stalls holding the one-call aggregate
        backing.park_next_read.store(true, Ordering::SeqCst);
        let reader = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.get_session_costs("s1").await })
        };
        backing.parked.notified().await;

        tracker.track_llm_call("s1", None, None, "gemini-1.5-flash", 100, 50).await.unwrap();
        backing.resume.notify_one();
        assert_eq!(reader.await.unwrap().unwrap().llm_calls, 1);

        tracker.track_llm_call("s1", None, None, "gemini-1.5-flash", 100, 50).await.unwrap();

        let raw = backing.inner.get("session_costs:s1").await.unwrap().unwrap();
        let stored: SessionCosts = serde_json::from_slice(&raw).unwrap();
        assert_eq!(stored.llm_calls, 3);
        assert_eq!(tracker.get_session_costs("s1").await.unwrap().llm_calls, 3);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let (tracker, _store) = tracker();
        tracker.track_llm_call("a", None, None, "gemini-1.5-pro", 1000, 1000).await.unwrap();
        tracker.track_image_call("b", None, None, "imagen-3", 1).await.unwrap();

        let a = tracker.get_session_costs("a").await.unwrap();
        let b = tracker.get_session_costs("b").await.unwrap();
        assert_eq!((a.llm_calls, a.image_calls), (1, 0));
        assert_eq!((b.llm_calls, b.image_calls), (0, 1));
    }

    #[tokio::test]
    async fn test_check_limits() {
        let (tracker, _store) = tracker();
        let limits = CostLimits {
            max_llm_calls: Some(1),
            ..CostLimits::default()
        };

        tracker.track_llm_call("s1", None, None, "gemini-1.5-flash", 100, 50).await.unwrap();
        let check = tracker.check_limits("s1", &limits).await.unwrap();
        assert!(!check.exceeded);

        tracker.track_llm_call("s1", None, None, "gemini-1.5-flash", 100, 50).await.unwrap();
        let check = tracker.check_limits("s1", &limits).await.unwrap();
        assert!(check.exceeded);
        assert_eq!(check.violations[0].kind, LimitKind::LlmCalls);
        assert_eq!(check.costs.llm_calls, 2);
    }

    #[tokio::test]
    async fn test_empty_session_id_rejected() {
        let (tracker, store) = tracker();
        let err = tracker.track_image_call(" ", None, None, "imagen-3", 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(store.is_empty().await);
    }

    struct FailingStore;

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _key: &str) -> std::result::Result<Option<Vec<u8>>, StorageError> {
            Err(StorageError::Unavailable("connection reset".into()))
        }

        async fn set(&self, _key: &str, _value: Vec<u8>) -> std::result::Result<(), StorageError> {
            Err(StorageError::Unavailable("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_storage_errors_carry_session() {
        let tracker = CostTracker::new(Arc::new(FailingStore));

        let err = tracker.get_session_costs("s9").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.session_id(), Some("s9"));

        let err = tracker.track_image_call("s9", None, None, "imagen-3", 1).await.unwrap_err();
        assert!(matches!(err, CostError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_aggregate() {
        let (tracker, store) = tracker();
        store.set("session_costs:s1", b"{not json".to_vec()).await.unwrap();

        let err = tracker.get_session_costs("s1").await.unwrap_err();
        assert!(matches!(err, CostError::Corrupt { .. }));
    }

    #[test]
    fn test_entry_nanos_strictly_increase() {
        let (tracker, _store) = tracker();
        let mut last = 0;
        for _ in 0..1000 {
            let next = tracker.next_entry_nanos();
            assert!(next > last);
            last = next;
        }
    }
}
