use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::time::Instant;
use tracing::debug;

use super::bucket::{Admission, QuotaBucket};
use super::headers::QuotaHeaders;
use crate::core::ExpiryIndex;
use crate::observer::ObserverHook;

type SharedBucket = Arc<Mutex<QuotaBucket>>;

/// Point-in-time copy of one bucket's counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketState {
    pub id: String,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Instant,
}

/// Route → bucket lookup with per-bucket locking.
///
/// The maps are only write-locked when a route or bucket is seen for the first
/// time; admission and updates lock the single bucket involved, so unrelated
/// routes never contend.
pub struct BucketRegistry {
    /// Route key → storage key. A server-assigned bucket id is stored as
    /// `{bucket_id}:{major parameters}`; routes without a reported id are keyed
    /// by their route key.
    aliases: RwLock<HashMap<String, String>>,
    buckets: RwLock<HashMap<String, SharedBucket>>,
    expiry: Mutex<ExpiryIndex<String>>,
    observer: Option<ObserverHook>,
}

impl Default for BucketRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BucketRegistry {
    pub fn new(observer: Option<ObserverHook>) -> Self {
        Self {
            aliases: RwLock::new(HashMap::new()),
            buckets: RwLock::new(HashMap::new()),
            expiry: Mutex::new(ExpiryIndex::new()),
            observer,
        }
    }

    pub fn len(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket_id_for(&self, route_key: &str) -> String {
        self.aliases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(route_key)
            .cloned()
            .unwrap_or_else(|| route_key.to_string())
    }

    fn bucket(&self, bucket_id: &str) -> Option<SharedBucket> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bucket_id)
            .cloned()
    }

    fn schedule_expiry(&self, bucket_id: &str, at: Instant) {
        lock(&self.expiry).schedule(bucket_id.to_string(), at);
    }

    /// Admission check for `route_key`. Never blocks on time.
    ///
    /// Routes that never reported quota headers have no bucket and are always allowed.
    pub fn admit(&self, route_key: &str, now: Instant) -> Admission {
        let bucket_id = self.bucket_id_for(route_key);
        let Some(bucket) = self.bucket(&bucket_id) else {
            return Admission::Allow;
        };

        let (admission, replenished_until) = {
            let mut bucket = lock(&bucket);
            let before = bucket.reset_at();
            let admission = bucket.admit(now);
            let after = bucket.reset_at();
            (admission, (after != before).then_some(after))
        };

        if let Some(at) = replenished_until {
            self.schedule_expiry(&bucket_id, at);
        }
        admission
    }

    /// Apply the quota metadata of one response for `route_key`.
    ///
    /// `major_key` holds the route's major parameter values. The server reports
    /// one bucket id for every channel (or guild) on a template but meters each
    /// of them separately, so the id alone never merges two major values.
    pub fn update(&self, route_key: &str, major_key: &str, headers: &QuotaHeaders, now: Instant) {
        let Some(snapshot) = headers.snapshot else {
            return;
        };
        let server_id = headers.bucket.as_deref().unwrap_or(route_key);
        let bucket_id = match headers.bucket.as_deref() {
            Some(id) => format!("{id}:{major_key}"),
            None => route_key.to_string(),
        };

        self.record_alias(route_key, &bucket_id);

        let reset_at = match self.bucket(&bucket_id) {
            Some(bucket) => {
                let mut bucket = lock(&bucket);
                bucket.update(snapshot, now);
                bucket.reset_at()
            }
            None => {
                let mut buckets = self
                    .buckets
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                match buckets.get(&bucket_id) {
                    // Another response created it between our read and write locks.
                    Some(existing) => {
                        let mut bucket = lock(existing);
                        bucket.update(snapshot, now);
                        bucket.reset_at()
                    }
                    None => {
                        let bucket = QuotaBucket::new(server_id.to_string(), snapshot, now);
                        let reset_at = bucket.reset_at();
                        buckets.insert(bucket_id.clone(), Arc::new(Mutex::new(bucket)));
                        drop(buckets);

                        debug!(
                            bucket = %bucket_id,
                            route = %route_key,
                            limit = snapshot.limit,
                            remaining = snapshot.remaining,
                            "quota bucket created"
                        );
                        if let Some(observer) = self.observer.as_ref() {
                            observer.bucket_created(&bucket_id, route_key, snapshot.limit);
                        }
                        reset_at
                    }
                }
            }
        };

        self.schedule_expiry(&bucket_id, reset_at);
    }

    fn record_alias(&self, route_key: &str, bucket_id: &str) {
        let known = self.bucket_id_for(route_key);
        if known == bucket_id {
            return;
        }

        self.aliases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(route_key.to_string(), bucket_id.to_string());

        // A route first keyed by itself has moved to a server id; its
        // provisional bucket is no longer reachable.
        if known == route_key {
            self.buckets
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(route_key);
            lock(&self.expiry).remove(&known);
        }
    }

    /// Replenish every bucket whose window has elapsed. Returns how many were refreshed.
    pub fn sweep(&self, now: Instant) -> usize {
        let due = lock(&self.expiry).drain_due(now);
        let mut refreshed = 0;
        for bucket_id in due {
            if let Some(bucket) = self.bucket(&bucket_id)
                && lock(&bucket).replenish_if_due(now)
            {
                refreshed += 1;
            }
        }
        if refreshed > 0 {
            debug!(refreshed, "quota sweep replenished buckets");
        }
        refreshed
    }

    /// Next instant the sweep has work to do.
    pub fn next_expiry(&self) -> Option<Instant> {
        lock(&self.expiry).next_expiry()
    }

    pub fn state(&self, route_key: &str) -> Option<BucketState> {
        let bucket = self.bucket(&self.bucket_id_for(route_key))?;
        let bucket = lock(&bucket);
        Some(BucketState {
            id: bucket.id().to_string(),
            limit: bucket.limit(),
            remaining: bucket.remaining(),
            reset_at: bucket.reset_at(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TransportObserver;
    use crate::rest::headers::QuotaSnapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn quota(bucket: Option<&str>, limit: u32, remaining: u32, reset_ms: u64) -> QuotaHeaders {
        QuotaHeaders {
            bucket: bucket.map(str::to_string),
            snapshot: Some(QuotaSnapshot {
                limit,
                remaining,
                reset_after: Duration::from_millis(reset_ms),
            }),
            ..QuotaHeaders::default()
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        created: AtomicUsize,
    }

    impl TransportObserver for CountingObserver {
        fn bucket_created(&self, _bucket: &str, _route: &str, _limit: u32) {
            self.created.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unmetered_routes_are_always_allowed() {
        let registry = BucketRegistry::default();
        let now = Instant::now();
        for _ in 0..100 {
            assert_eq!(registry.admit("GET /gateway", now), Admission::Allow);
        }
        registry.update("GET /gateway", "", &QuotaHeaders::default(), now);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refusal_clears_at_reported_instant() {
        let registry = BucketRegistry::default();
        let now = Instant::now();
        registry.update("POST /x", "", &quota(None, 5, 0, 2_000), now);

        let Admission::WaitUntil(at) = registry.admit("POST /x", now) else {
            panic!("exhausted bucket must refuse");
        };
        assert_eq!(at, now + Duration::from_secs(2));
        assert!(matches!(
            registry.admit("POST /x", at - Duration::from_millis(1)),
            Admission::WaitUntil(_)
        ));
        assert_eq!(registry.admit("POST /x", at), Admission::Allow);
    }

    #[tokio::test(start_paused = true)]
    async fn routes_reporting_one_bucket_id_share_quota() {
        let observer = Arc::new(CountingObserver::default());
        let registry = BucketRegistry::new(Some(observer.clone()));
        let now = Instant::now();

        registry.update("GET /a", "", &quota(Some("shared"), 2, 1, 1_000), now);
        registry.update("GET /b", "", &quota(Some("shared"), 2, 1, 1_000), now);
        assert_eq!(registry.len(), 1);
        assert_eq!(observer.created.load(Ordering::SeqCst), 1);

        assert_eq!(registry.admit("GET /a", now), Admission::Allow);
        assert!(matches!(
            registry.admit("GET /b", now),
            Admission::WaitUntil(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn one_bucket_id_is_metered_per_major_parameter() {
        let registry = BucketRegistry::default();
        let now = Instant::now();
        let first = "POST /channels/{channel_id}/messages channel_id=1";
        let second = "POST /channels/{channel_id}/messages channel_id=2";

        registry.update(first, "channel_id=1", &quota(Some("msg"), 5, 0, 5_000), now);
        registry.update(second, "channel_id=2", &quota(Some("msg"), 5, 4, 5_000), now);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.state(first).map(|s| s.remaining), Some(0));
        assert_eq!(registry.state(second).map(|s| s.remaining), Some(4));
        assert_eq!(registry.state(first).map(|s| s.id), Some("msg".to_string()));

        assert!(matches!(registry.admit(first, now), Admission::WaitUntil(_)));
        assert_eq!(registry.admit(second, now), Admission::Allow);
    }

    #[tokio::test(start_paused = true)]
    async fn provisional_bucket_moves_to_server_id() {
        let registry = BucketRegistry::default();
        let now = Instant::now();

        registry.update("GET /a", "", &quota(None, 5, 4, 1_000), now);
        assert_eq!(registry.state("GET /a").map(|s| s.id), Some("GET /a".to_string()));

        registry.update("GET /a", "", &quota(Some("hash"), 5, 3, 1_000), now);
        assert_eq!(registry.len(), 1);
        let state = registry.state("GET /a").expect("bucket");
        assert_eq!(state.id, "hash");
        assert_eq!(state.remaining, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_replenishes_elapsed_buckets_only() {
        let registry = BucketRegistry::default();
        let now = Instant::now();
        registry.update("GET /fast", "", &quota(None, 3, 0, 1_000), now);
        registry.update("GET /slow", "", &quota(None, 3, 0, 10_000), now);

        assert_eq!(registry.next_expiry(), Some(now + Duration::from_secs(1)));
        assert_eq!(registry.sweep(now + Duration::from_secs(2)), 1);
        assert_eq!(registry.state("GET /fast").map(|s| s.remaining), Some(3));
        assert_eq!(registry.state("GET /slow").map(|s| s.remaining), Some(0));
        assert_eq!(registry.next_expiry(), Some(now + Duration::from_secs(10)));
    }
}
