//! # Read-Through Orchestrator
//!
//! Cache-aside control flow shared by every pipeline:
//!
//! ```text
//! validate -> derive key -> cache get --hit--> return cached record
//!                                     \-miss-> source fetch --found--> cache setex -> return record
//!                                                           \-absent-> return not found (not cached)
//! ```
//!
//! Cache failures never fail a request: a failed read is a miss and a failed write
//! is logged and dropped. Only validation and source failures reach the caller.
//!
//! Concurrent misses for the same key are not coalesced. Each one queries the source
//! and writes the cache; the writes carry identical content, so last write wins.

mod signals;

pub use signals::{
    noop_observer, InMemoryObserver, LookupEvent, LookupObserver, LookupOutcome, NoopObserver,
    ReadThroughStats,
};

use crate::cache::{CacheKey, CacheManager, KeyDeriver, DEFAULT_TTL};
use crate::payload::Payload;
use crate::source::AuthoritativeSource;
use crate::{Error, ErrorContext, Result};
use signals::AtomicStats;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ReadThroughConfig {
    /// Expiry attached to every populated entry.
    pub ttl: Duration,
    /// Upper bound on one source fetch.
    pub source_timeout: Duration,
}

impl Default for ReadThroughConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }
}

impl ReadThroughConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

/// Response of one read-through request.
#[derive(Debug, Clone, PartialEq)]
pub struct Served<R> {
    pub key: CacheKey,
    pub outcome: CacheOutcome,
    /// `None` when the source has no record for the payload.
    pub value: Option<R>,
}

impl<R> Served<R> {
    pub fn is_hit(&self) -> bool {
        self.outcome == CacheOutcome::Hit
    }
    pub fn is_found(&self) -> bool {
        self.value.is_some()
    }
    pub fn into_value(self) -> Option<R> {
        self.value
    }
}

/// Cache-aside front for one authoritative source.
pub struct ReadThrough<S: AuthoritativeSource> {
    cache: Arc<CacheManager>,
    source: Arc<S>,
    deriver: KeyDeriver,
    config: ReadThroughConfig,
    observer: Arc<dyn LookupObserver>,
    stats: AtomicStats,
}

impl<S: AuthoritativeSource> ReadThrough<S> {
    pub fn new(cache: Arc<CacheManager>, source: Arc<S>) -> Self {
        Self {
            cache,
            source,
            deriver: KeyDeriver::new(),
            config: ReadThroughConfig::default(),
            observer: noop_observer(),
            stats: AtomicStats::default(),
        }
    }

    pub fn with_key_deriver(mut self, deriver: KeyDeriver) -> Self {
        self.deriver = deriver;
        self
    }

    pub fn with_config(mut self, config: ReadThroughConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn LookupObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ReadThroughConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn stats(&self) -> ReadThroughStats {
        self.stats.to_stats()
    }

    /// The key a payload is cached under.
    pub fn key_for(&self, payload: &S::Payload) -> Result<CacheKey> {
        self.deriver.derive_for(payload)
    }

    /// Serve a payload from the cache, falling back to the source on a miss.
    pub async fn get(&self, payload: &S::Payload) -> Result<Served<S::Record>> {
        let namespace = <S::Payload as Payload>::NAMESPACE;
        let span = tracing::info_span!(
            "read_through",
            request_id = %Uuid::new_v4(),
            namespace,
            source = self.source.name(),
        );
        self.serve(payload).instrument(span).await
    }

    async fn serve(&self, payload: &S::Payload) -> Result<Served<S::Record>> {
        let started = Instant::now();
        if let Err(e) = payload.validate() {
            AtomicStats::bump(&self.stats.rejected);
            debug!(error = %e, "payload rejected");
            return Err(e);
        }
        let key = self.key_for(payload)?;

        match self.cache.get::<S::Record>(&key).await {
            Ok(Some(record)) => {
                AtomicStats::bump(&self.stats.hits);
                self.emit(&key, LookupOutcome::Hit, started);
                return Ok(Served {
                    key,
                    outcome: CacheOutcome::Hit,
                    value: Some(record),
                });
            }
            Ok(None) => {}
            Err(e) => {
                AtomicStats::bump(&self.stats.cache_read_errors);
                warn!(key = %key, error = %e, "cache read failed, falling back to source");
            }
        }
        AtomicStats::bump(&self.stats.misses);

        let fetched = match self.fetch_from_source(payload).await {
            Ok(fetched) => fetched,
            Err(e) => {
                AtomicStats::bump(&self.stats.source_errors);
                warn!(key = %key, error = %e, "source fetch failed");
                self.emit(&key, LookupOutcome::SourceFailed, started);
                return Err(e);
            }
        };

        let Some(record) = fetched else {
            AtomicStats::bump(&self.stats.not_found);
            self.emit(&key, LookupOutcome::NotFound, started);
            return Ok(Served {
                key,
                outcome: CacheOutcome::Miss,
                value: None,
            });
        };

        match self.cache.set_with_ttl(&key, &record, self.config.ttl).await {
            Ok(()) => debug!(key = %key, ttl_secs = self.config.ttl.as_secs(), "cache populated"),
            Err(e) => {
                AtomicStats::bump(&self.stats.cache_write_errors);
                warn!(key = %key, error = %e, "cache populate failed, serving uncached result");
            }
        }
        self.emit(&key, LookupOutcome::Populated, started);
        Ok(Served {
            key,
            outcome: CacheOutcome::Miss,
            value: Some(record),
        })
    }

    async fn fetch_from_source(&self, payload: &S::Payload) -> Result<Option<S::Record>> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.config.source_timeout, self.source.fetch(payload)).await;
        self.stats.record_source_call(started.elapsed());
        result.map_err(|_| {
            Error::source_with_context(
                format!(
                    "source did not answer within {} ms",
                    self.config.source_timeout.as_millis()
                ),
                ErrorContext::new().with_source(self.source.name()),
            )
        })?
    }

    /// One log line and one observer event per request that got past validation.
    fn emit(&self, key: &CacheKey, outcome: LookupOutcome, started: Instant) {
        let elapsed = started.elapsed();
        info!(
            key = %key,
            outcome = %outcome.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "lookup served"
        );
        self.observer.on_lookup(&LookupEvent {
            namespace: <S::Payload as Payload>::NAMESPACE,
            key: key.clone(),
            outcome,
            elapsed,
        });
    }
}
