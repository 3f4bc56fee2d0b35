//! End-to-end read-through behaviour against a real SQLite user table, the built-in
//! classifier and in-process cache backends.

use async_trait::async_trait;
use readthrough_cache::cache::{
    CacheBackend, CacheConfig, CacheKey, CacheManager, KeyDeriver, MemoryCache,
};
use readthrough_cache::payload::{IrisFeatures, UserQuery};
use readthrough_cache::readthrough::{InMemoryObserver, LookupOutcome, ReadThroughConfig};
use readthrough_cache::record::{Prediction, UserRecord};
use readthrough_cache::source::{ModelSource, NearestCentroidClassifier, UserStore};
use readthrough_cache::{AuthoritativeSource, CacheOutcome, Error, ErrorContext, ReadThrough, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wraps a source and counts fetches.
struct Counting<S> {
    inner: S,
    calls: AtomicUsize,
}

impl<S> Counting<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: AuthoritativeSource> AuthoritativeSource for Counting<S> {
    type Payload = S::Payload;
    type Record = S::Record;

    async fn fetch(&self, payload: &S::Payload) -> Result<Option<S::Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(payload).await
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Cache that is down: every call fails.
struct BrokenCache {
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl BrokenCache {
    fn new() -> Self {
        Self {
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CacheBackend for BrokenCache {
    async fn get(&self, _: &CacheKey) -> Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Err(Error::cache_with_context(
            "connection refused",
            ErrorContext::new().with_source("broken"),
        ))
    }
    async fn set_with_expiry(&self, _: &CacheKey, _: &[u8], _: Duration) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(Error::cache_with_context(
            "connection refused",
            ErrorContext::new().with_source("broken"),
        ))
    }
    fn name(&self) -> &'static str {
        "broken"
    }
}

struct StuckSource;

#[async_trait]
impl AuthoritativeSource for StuckSource {
    type Payload = UserQuery;
    type Record = UserRecord;

    async fn fetch(&self, _: &UserQuery) -> Result<Option<UserRecord>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "stuck"
    }
}

async fn seeded_store(dir: &tempfile::TempDir) -> UserStore {
    let store = UserStore::new(dir.path().join("db.sqlite3"));
    store.init_schema().await.unwrap();
    store.seed_demo_users().await.unwrap();
    store
}

fn manager(backend: Arc<dyn CacheBackend>) -> Arc<CacheManager> {
    Arc::new(CacheManager::new(CacheConfig::default(), backend))
}

fn michael() -> UserRecord {
    UserRecord {
        id: 1,
        name: "Michael".into(),
        age: Some(45),
    }
}

#[tokio::test]
async fn test_user_lookup_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryCache::new();
    let source = Arc::new(Counting::new(seeded_store(&dir).await));
    let rt = ReadThrough::new(manager(Arc::new(backend.clone())), Arc::clone(&source));

    // cold cache: served from the source, then cached for an hour
    let first = rt.get(&UserQuery::new(1)).await.unwrap();
    assert_eq!(first.outcome, CacheOutcome::Miss);
    assert_eq!(first.value, Some(michael()));
    assert_eq!(source.calls(), 1);
    let ttl = backend.ttl_remaining(&first.key).expect("entry populated");
    assert!(ttl > Duration::from_secs(3590) && ttl <= Duration::from_secs(3600));
    let cached: UserRecord =
        serde_json::from_slice(&backend.get(&first.key).await.unwrap().unwrap()).unwrap();
    assert_eq!(cached, michael());

    // warm cache: identical response, no source call
    let second = rt.get(&UserQuery::new(1)).await.unwrap();
    assert_eq!(second.outcome, CacheOutcome::Hit);
    assert_eq!(second.value, first.value);
    assert_eq!(source.calls(), 1);

    // unknown id: not found, nothing cached
    let missing = rt.get(&UserQuery::new(99)).await.unwrap();
    assert_eq!(missing.value, None);
    assert!(backend.get(&missing.key).await.unwrap().is_none());
    assert_eq!(backend.len(), 1);
}

#[tokio::test]
async fn test_prepopulated_entry_never_touches_source() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryCache::new();
    let source = Arc::new(Counting::new(seeded_store(&dir).await));
    let cache = manager(Arc::new(backend.clone()));

    let planted = UserRecord {
        id: 1,
        name: "Cached Michael".into(),
        age: Some(46),
    };
    let key = KeyDeriver::new().derive_for(&UserQuery::new(1)).unwrap();
    cache.set(&key, &planted).await.unwrap();

    let rt = ReadThrough::new(cache, Arc::clone(&source));
    let served = rt.get(&UserQuery::new(1)).await.unwrap();
    assert!(served.is_hit());
    assert_eq!(served.value, Some(planted));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_miss_result_equals_direct_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir).await;
    let direct = store.fetch(&UserQuery::new(3)).await.unwrap();

    let source = Arc::new(Counting::new(store));
    let rt = ReadThrough::new(manager(Arc::new(MemoryCache::new())), Arc::clone(&source));
    let served = rt.get(&UserQuery::new(3)).await.unwrap();
    assert_eq!(served.value, direct);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_not_found_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(Counting::new(seeded_store(&dir).await));
    let rt = ReadThrough::new(manager(Arc::new(MemoryCache::new())), Arc::clone(&source));

    for _ in 0..2 {
        let served = rt.get(&UserQuery::new(42)).await.unwrap();
        assert!(!served.is_found());
        assert_eq!(served.outcome, CacheOutcome::Miss);
    }
    assert_eq!(source.calls(), 2);
    assert_eq!(rt.stats().not_found, 2);
}

#[tokio::test]
async fn test_broken_cache_degrades_to_source() {
    let dir = tempfile::tempdir().unwrap();
    let broken = Arc::new(BrokenCache::new());
    let source = Arc::new(Counting::new(seeded_store(&dir).await));
    let rt = ReadThrough::new(manager(broken.clone()), Arc::clone(&source));

    for _ in 0..2 {
        let served = rt.get(&UserQuery::new(1)).await.unwrap();
        assert_eq!(served.value, Some(michael()));
        assert_eq!(served.outcome, CacheOutcome::Miss);
    }
    assert_eq!(source.calls(), 2);
    assert_eq!(broken.reads.load(Ordering::SeqCst), 2);
    assert_eq!(broken.writes.load(Ordering::SeqCst), 2);

    let stats = rt.stats();
    assert_eq!(stats.cache_read_errors, 2);
    assert_eq!(stats.cache_write_errors, 2);
    assert_eq!(stats.misses, 2);
}

#[tokio::test]
async fn test_source_timeout_is_source_error() {
    let rt = ReadThrough::new(manager(Arc::new(MemoryCache::new())), Arc::new(StuckSource))
        .with_config(ReadThroughConfig::new().with_source_timeout(Duration::from_millis(50)));
    let err = rt.get(&UserQuery::new(1)).await.unwrap_err();
    assert!(matches!(err, Error::Source { .. }));
    assert_eq!(rt.stats().source_errors, 1);
}

#[tokio::test]
async fn test_source_failure_propagates() {
    let dir = tempfile::tempdir().unwrap();
    // no database file: the lookup itself fails
    let store = UserStore::new(dir.path().join("absent.sqlite3"));
    let rt = ReadThrough::new(manager(Arc::new(MemoryCache::new())), Arc::new(store));
    let err = rt.get(&UserQuery::new(1)).await.unwrap_err();
    assert!(matches!(err, Error::Source { .. }));
    assert!(!err.is_client_error());
}

#[tokio::test]
async fn test_prediction_pipeline() {
    let backend = MemoryCache::new();
    let model = ModelSource::new(Arc::new(NearestCentroidClassifier::builtin_iris()));
    let source = Arc::new(Counting::new(model));
    let observer = Arc::new(InMemoryObserver::new());
    let rt = ReadThrough::new(manager(Arc::new(backend.clone())), Arc::clone(&source))
        .with_observer(observer.clone());

    let payload = IrisFeatures::new(6.7, 3.0, 5.7, 2.3);
    let first = rt.get(&payload).await.unwrap();
    let second = rt.get(&payload).await.unwrap();
    assert_eq!(first.value, Some(Prediction { prediction: 2 }));
    assert_eq!(second.value, first.value);
    assert!(second.is_hit());
    assert_eq!(source.calls(), 1);
    assert!(first.key.as_str().starts_with("predict:"));
    assert_eq!(
        observer.outcomes(),
        vec![LookupOutcome::Populated, LookupOutcome::Hit]
    );
}

#[tokio::test]
async fn test_invalid_features_rejected_before_cache() {
    let broken = Arc::new(BrokenCache::new());
    let model = ModelSource::new(Arc::new(NearestCentroidClassifier::builtin_iris()));
    let rt = ReadThrough::new(manager(broken.clone()), Arc::new(model));
    let err = rt
        .get(&IrisFeatures::new(5.1, f64::NAN, 1.4, 0.2))
        .await
        .unwrap_err();
    assert!(err.is_client_error());
    assert_eq!(broken.reads.load(Ordering::SeqCst), 0);
    let stats = rt.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.hits + stats.misses + stats.source_calls, 0);
}

#[tokio::test]
async fn test_negative_user_id_is_served_like_any_other() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir).await;
    let neg = UserRecord {
        id: -5,
        name: "Neg".into(),
        age: Some(1),
    };
    store.insert(neg.clone()).await.unwrap();
    let rt = ReadThrough::new(manager(Arc::new(MemoryCache::new())), Arc::new(store));

    let direct = rt.source().fetch(&UserQuery::new(-5)).await.unwrap();
    assert_eq!(direct.as_ref(), Some(&neg));

    let served = rt.get(&UserQuery::new(-5)).await.unwrap();
    assert_eq!(served.outcome, CacheOutcome::Miss);
    assert_eq!(served.value, direct);
    assert!(rt.get(&UserQuery::new(-5)).await.unwrap().is_hit());

    let absent = rt.get(&UserQuery::new(-6)).await.unwrap();
    assert!(!absent.is_found());
}

#[tokio::test]
async fn test_concurrent_misses_are_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryCache::new();
    let source = Arc::new(Counting::new(seeded_store(&dir).await));
    let rt = Arc::new(ReadThrough::new(
        manager(Arc::new(backend.clone())),
        Arc::clone(&source),
    ));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let rt = Arc::clone(&rt);
            tokio::spawn(async move { rt.get(&UserQuery::new(2)).await })
        })
        .collect();
    let results = futures::future::join_all(tasks).await;

    for r in results {
        let served = r.unwrap().unwrap();
        assert_eq!(served.value.unwrap().name, "Jim");
    }
    // no single-flight: between 1 and 8 source calls, one cache entry either way
    assert!((1..=8).contains(&source.calls()));
    assert_eq!(backend.len(), 1);
    let stats = rt.stats();
    assert_eq!(stats.hits + stats.misses, 8);
    assert_eq!(stats.misses as usize, source.calls());
}

#[tokio::test]
async fn test_expired_entry_goes_back_to_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(Counting::new(seeded_store(&dir).await));
    let rt = ReadThrough::new(manager(Arc::new(MemoryCache::new())), Arc::clone(&source))
        .with_config(ReadThroughConfig::new().with_ttl(Duration::from_millis(30)));

    rt.get(&UserQuery::new(1)).await.unwrap();
    assert!(rt.get(&UserQuery::new(1)).await.unwrap().is_hit());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!rt.get(&UserQuery::new(1)).await.unwrap().is_hit());
    assert_eq!(source.calls(), 2);
}
