//! # Cache Store Module
//!
//! Key derivation and the key-value store that fronts the authoritative sources.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`KeyDeriver`] | Canonical-JSON + SHA-256 cache keys, namespaced per payload shape |
//! | [`CacheManager`] | Typed JSON access with TTL, per-call timeouts and statistics |
//! | [`CacheConfig`] | TTL, timeout, prefix and size limits |
//! | [`CacheBackend`] | Trait for `GET` / `SETEX` style stores |
//! | [`RedisCache`] | Shared Redis instance |
//! | [`MemoryCache`] | In-process store with per-entry expiry |
//! | [`NullCache`] | No-op store for disabling caching |
//!
//! ## Example
//!
//! ```rust
//! use readthrough_cache::cache::{CacheConfig, CacheManager, KeyDeriver, MemoryCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let cache = CacheManager::new(
//!     CacheConfig::new().with_ttl(Duration::from_secs(3600)),
//!     Arc::new(MemoryCache::new()),
//! );
//! let key = KeyDeriver::new()
//!     .derive("user", &serde_json::json!({"user_id": 1}))
//!     .unwrap();
//! assert!(key.as_str().starts_with("user:"));
//! # let _ = cache;
//! ```
//!
//! Entries expire only through their TTL. Nothing here deletes or rewrites a key
//! except a later miss-then-populate for the same key.

mod backend;
mod key;
mod manager;
mod redis_cache;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use key::{CacheKey, KeyDeriver, DIGEST_HEX_LEN};
pub use manager::{CacheConfig, CacheManager, CacheStats, DEFAULT_OP_TIMEOUT, DEFAULT_TTL};
pub use redis_cache::RedisCache;
