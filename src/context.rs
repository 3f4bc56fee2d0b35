//! Process-wide dependencies, built once at startup and shared by reference.

use crate::cache::{
    CacheBackend, CacheConfig, CacheManager, CacheStats, KeyDeriver, MemoryCache, NullCache,
    RedisCache,
};
use crate::config::{CacheBackendKind, ServiceConfig};
use crate::readthrough::{ReadThrough, ReadThroughConfig, ReadThroughStats};
use crate::source::{Classifier, ModelSource, NearestCentroidClassifier, UserStore};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared clients plus one read-through pipeline per endpoint.
pub struct ServiceContext {
    pub config: ServiceConfig,
    pub cache: Arc<CacheManager>,
    pub users: ReadThrough<UserStore>,
    pub predictions: ReadThrough<ModelSource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub cache_backend: &'static str,
    pub cache: CacheStats,
    pub users: ReadThroughStats,
    pub predictions: ReadThroughStats,
}

impl ServiceContext {
    /// Connect the cache, prepare the record store and load the model.
    pub async fn init(config: ServiceConfig) -> Result<Self> {
        config.validate()?;

        let backend: Arc<dyn CacheBackend> = match config.cache_backend {
            CacheBackendKind::Redis => {
                let redis = RedisCache::open(&config.redis_url)?;
                // an unreachable cache only degrades to source reads
                match redis.ping().await {
                    Ok(()) => info!(url = %config.redis_url, "redis cache reachable"),
                    Err(e) => warn!(url = %config.redis_url, error = %e, "redis cache unreachable, requests will go to the source"),
                }
                Arc::new(redis)
            }
            CacheBackendKind::Memory => Arc::new(MemoryCache::new()),
            CacheBackendKind::None => Arc::new(NullCache::new()),
        };

        let store = UserStore::new(config.db_path.clone());
        if config.seed_demo_users {
            store.init_schema().await?;
            store.seed_demo_users().await?;
            info!(path = %store.path().display(), "user store ready");
        }

        let model: Arc<dyn Classifier> = match config.model_path {
            Some(ref path) => Arc::new(NearestCentroidClassifier::load(path)?),
            None => {
                info!("no model_path configured, using built-in iris centroids");
                Arc::new(NearestCentroidClassifier::builtin_iris())
            }
        };

        Ok(Self::from_parts(config, backend, store, model))
    }

    /// Assemble a context from already-built pieces.
    pub fn from_parts(
        config: ServiceConfig,
        backend: Arc<dyn CacheBackend>,
        store: UserStore,
        model: Arc<dyn Classifier>,
    ) -> Self {
        let mut cache_config = CacheConfig::new()
            .with_ttl(config.cache_ttl())
            .with_op_timeout(config.cache_timeout());
        if let Some(ref prefix) = config.key_prefix {
            cache_config = cache_config.with_key_prefix(prefix.clone());
        }
        let cache = Arc::new(CacheManager::new(cache_config, backend));

        let deriver = match config.key_salt {
            Some(ref salt) => KeyDeriver::new().with_salt(salt.clone()),
            None => KeyDeriver::new(),
        };
        let rt_config = ReadThroughConfig::new()
            .with_ttl(config.cache_ttl())
            .with_source_timeout(config.source_timeout());

        let users = ReadThrough::new(Arc::clone(&cache), Arc::new(store))
            .with_key_deriver(deriver.clone())
            .with_config(rt_config.clone());
        let predictions = ReadThrough::new(Arc::clone(&cache), Arc::new(ModelSource::new(model)))
            .with_key_deriver(deriver)
            .with_config(rt_config);

        info!(
            cache_backend = cache.backend_name(),
            ttl_secs = config.cache_ttl_secs,
            "service context initialized"
        );

        Self {
            config,
            cache,
            users,
            predictions,
        }
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            cache_backend: self.cache.backend_name(),
            cache: self.cache.stats(),
            users: self.users.stats(),
            predictions: self.predictions.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{IrisFeatures, UserQuery};

    #[tokio::test]
    async fn test_init_with_memory_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::new()
            .with_cache_backend(CacheBackendKind::Memory)
            .with_db_path(dir.path().join("db.sqlite3"));
        let ctx = ServiceContext::init(config).await.unwrap();

        let user = ctx.users.get(&UserQuery::new(2)).await.unwrap();
        assert_eq!(user.value.unwrap().name, "Jim");
        let pred = ctx
            .predictions
            .get(&IrisFeatures::new(5.1, 3.5, 1.4, 0.2))
            .await
            .unwrap();
        assert_eq!(pred.value.unwrap().prediction, 0);

        let stats = ctx.stats();
        assert_eq!(stats.cache_backend, "memory");
        assert_eq!(stats.cache.sets, 2);
        assert_eq!(stats.users.misses, 1);
        assert_eq!(stats.predictions.misses, 1);
    }

    #[tokio::test]
    async fn test_salt_and_prefix_flow_into_pipelines() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryCache::new();
        let config = ServiceConfig {
            key_prefix: Some("svc".into()),
            key_salt: Some("v2".into()),
            ..ServiceConfig::default()
        };
        let ctx = ServiceContext::from_parts(
            config,
            Arc::new(backend.clone()),
            UserStore::new(dir.path().join("unused.sqlite3")),
            Arc::new(NearestCentroidClassifier::builtin_iris()),
        );
        let payload = IrisFeatures::new(6.7, 3.0, 5.7, 2.3);
        let served = ctx.predictions.get(&payload).await.unwrap();
        assert_eq!(
            served.key,
            KeyDeriver::new().with_salt("v2").derive_for(&payload).unwrap()
        );
        assert!(backend
            .get(&served.key.with_prefix("svc"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_init_rejects_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::new()
            .with_cache_backend(CacheBackendKind::None)
            .with_db_path(dir.path().join("db.sqlite3"))
            .with_model_path(dir.path().join("missing.json"));
        assert!(ServiceContext::init(config).await.is_err());
    }
}
