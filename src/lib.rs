//! # readthrough-cache
//!
//! Cache-aside read-through layer that puts a fast key-value cache (Redis) in front of
//! slow authoritative sources: a relational user table and a pre-loaded classifier.
//!
//! ## Overview
//!
//! Every request goes through the same pipeline:
//!
//! 1. the payload is validated,
//! 2. a cache key is derived from its canonical JSON form (SHA-256, namespaced),
//! 3. the cache is checked; a hit is returned as-is,
//! 4. on a miss the source is queried and a found record is written back with a TTL.
//!
//! Records the source does not have are never cached. Entries are never invalidated;
//! they expire after their TTL (one hour by default), so readers may see data up to
//! that old.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use readthrough_cache::config::ServiceConfig;
//! use readthrough_cache::context::ServiceContext;
//! use readthrough_cache::payload::UserQuery;
//!
//! #[tokio::main]
//! async fn main() -> readthrough_cache::Result<()> {
//!     let ctx = ServiceContext::init(ServiceConfig::load()?).await?;
//!     let served = ctx.users.get(&UserQuery::new(1)).await?;
//!     println!("hit={} value={:?}", served.is_hit(), served.value);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Key derivation, cache backends and the typed cache manager |
//! | [`source`] | Authoritative sources (SQLite user store, classifier) |
//! | [`readthrough`] | The read-through orchestrator and its signals |
//! | [`payload`] | Validated request payloads |
//! | [`record`] | Result records |
//! | [`config`] | Service configuration (defaults, YAML, environment) |
//! | [`context`] | Startup wiring of shared clients |
//! | [`http`] | axum routes |

pub mod cache;
pub mod config;
pub mod context;
pub mod http;
pub mod payload;
pub mod readthrough;
pub mod record;
pub mod source;

pub mod error;
pub use error::{Error, ErrorContext};

pub use cache::{CacheKey, CacheManager, KeyDeriver};
pub use readthrough::{CacheOutcome, ReadThrough, Served};
pub use source::AuthoritativeSource;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
