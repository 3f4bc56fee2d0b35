use crate::cache::CacheKey;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// How a single read-through request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupOutcome {
    Hit,
    /// Miss, source had the record, cache populated (or the write was absorbed).
    Populated,
    /// Miss, source had nothing; nothing cached.
    NotFound,
    SourceFailed,
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Hit => "hit",
            LookupOutcome::Populated => "populated",
            LookupOutcome::NotFound => "not_found",
            LookupOutcome::SourceFailed => "source_failed",
        }
    }
}

/// Emitted once per request that got past validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEvent {
    pub namespace: &'static str,
    pub key: CacheKey,
    pub outcome: LookupOutcome,
    pub elapsed: Duration,
}

/// Hook for external metrics collectors (counters, latency histograms).
pub trait LookupObserver: Send + Sync {
    fn on_lookup(&self, event: &LookupEvent);
}

/// Default observer; drops everything.
pub struct NoopObserver;

impl LookupObserver for NoopObserver {
    fn on_lookup(&self, _: &LookupEvent) {}
}

pub fn noop_observer() -> Arc<dyn LookupObserver> {
    Arc::new(NoopObserver)
}

/// Keeps events in memory; handy in tests.
#[derive(Default)]
pub struct InMemoryObserver {
    events: RwLock<Vec<LookupEvent>>,
}

impl InMemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn events(&self) -> Vec<LookupEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }
    pub fn outcomes(&self) -> Vec<LookupOutcome> {
        self.events().into_iter().map(|e| e.outcome).collect()
    }
}

impl LookupObserver for InMemoryObserver {
    fn on_lookup(&self, event: &LookupEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event.clone());
        }
    }
}

/// Point-in-time counters for one read-through pipeline (facts only).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadThroughStats {
    pub hits: u64,
    pub misses: u64,
    pub not_found: u64,
    pub rejected: u64,
    pub cache_read_errors: u64,
    pub cache_write_errors: u64,
    pub source_calls: u64,
    pub source_errors: u64,
    pub source_latency_us: u64,
}

impl ReadThroughStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn mean_source_latency(&self) -> Option<Duration> {
        if self.source_calls == 0 {
            return None;
        }
        Some(Duration::from_micros(self.source_latency_us / self.source_calls))
    }
}

#[derive(Default)]
pub(crate) struct AtomicStats {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) not_found: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) cache_read_errors: AtomicU64,
    pub(crate) cache_write_errors: AtomicU64,
    pub(crate) source_calls: AtomicU64,
    pub(crate) source_errors: AtomicU64,
    pub(crate) source_latency_us: AtomicU64,
}

impl AtomicStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_source_call(&self, elapsed: Duration) {
        self.source_calls.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.source_latency_us.fetch_add(micros, Ordering::Relaxed);
    }

    pub(crate) fn to_stats(&self) -> ReadThroughStats {
        ReadThroughStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            cache_read_errors: self.cache_read_errors.load(Ordering::Relaxed),
            cache_write_errors: self.cache_write_errors.load(Ordering::Relaxed),
            source_calls: self.source_calls.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            source_latency_us: self.source_latency_us.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_derived_values() {
        let stats = ReadThroughStats {
            hits: 3,
            misses: 1,
            source_calls: 2,
            source_latency_us: 3_000,
            ..Default::default()
        };
        assert_eq!(stats.hit_ratio(), 0.75);
        assert_eq!(stats.mean_source_latency(), Some(Duration::from_micros(1_500)));
        assert_eq!(ReadThroughStats::default().mean_source_latency(), None);
    }

    #[test]
    fn test_in_memory_observer_records() {
        let observer = InMemoryObserver::new();
        observer.on_lookup(&LookupEvent {
            namespace: "user",
            key: CacheKey::from("user:abc"),
            outcome: LookupOutcome::Hit,
            elapsed: Duration::from_millis(1),
        });
        assert_eq!(observer.outcomes(), vec![LookupOutcome::Hit]);
    }
}
