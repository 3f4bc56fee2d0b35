//! Service configuration.
//!
//! Resolution order: built-in defaults, then the YAML file named by `READTHRU_CONFIG`
//! (if set), then individual `READTHRU_*` environment overrides.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "READTHRU_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Redis,
    Memory,
    None,
}

impl std::str::FromStr for CacheBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            "none" | "off" => Ok(Self::None),
            other => Err(Error::configuration_with_context(
                format!("unknown cache backend '{}'", other),
                ErrorContext::new()
                    .with_field_path("cache_backend")
                    .with_details("expected redis, memory or none"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub bind: String,
    pub cache_backend: CacheBackendKind,
    pub redis_url: String,
    pub db_path: PathBuf,
    /// Create the users table and insert the demo rows at startup.
    pub seed_demo_users: bool,
    /// Model artifact; the built-in Iris centroids are used when unset.
    pub model_path: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    pub cache_timeout_ms: u64,
    pub source_timeout_ms: u64,
    pub key_prefix: Option<String>,
    pub key_salt: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            cache_backend: CacheBackendKind::Redis,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            db_path: PathBuf::from("db.sqlite3"),
            seed_demo_users: true,
            model_path: None,
            cache_ttl_secs: 3600,
            cache_timeout_ms: 250,
            source_timeout_ms: 5000,
            key_prefix: None,
            key_salt: None,
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, then `READTHRU_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`load`](Self::load), but an explicit file path wins over `READTHRU_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        Self::resolve(path, |k| std::env::var(k).ok())
    }

    /// Layering behind `load_from`, with the environment supplied by `lookup`.
    pub fn resolve<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => match lookup(CONFIG_PATH_ENV) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };
        let cfg = base.apply_env_from(&lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text).map_err(|e| match e {
            Error::Configuration { message, context } => Error::Configuration {
                message,
                context: context.with_source(path.display().to_string()),
            },
            other => other,
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid config: {}", e),
                ErrorContext::new().with_details("yaml"),
            )
        })
    }

    /// Apply `READTHRU_*` overrides read through `lookup`.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("READTHRU_BIND") {
            self.bind = v;
        }
        if let Some(v) = lookup("READTHRU_CACHE_BACKEND") {
            self.cache_backend = v.parse()?;
        }
        if let Some(v) = lookup("READTHRU_REDIS_URL") {
            self.redis_url = v;
        }
        if let Some(v) = lookup("READTHRU_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("READTHRU_SEED_DEMO_USERS") {
            self.seed_demo_users = matches!(v.trim(), "1" | "true" | "yes");
        }
        if let Some(v) = lookup("READTHRU_MODEL_PATH") {
            self.model_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("READTHRU_CACHE_TTL_SECS") {
            self.cache_ttl_secs = parse_u64("READTHRU_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("READTHRU_CACHE_TIMEOUT_MS") {
            self.cache_timeout_ms = parse_u64("READTHRU_CACHE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("READTHRU_SOURCE_TIMEOUT_MS") {
            self.source_timeout_ms = parse_u64("READTHRU_SOURCE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("READTHRU_KEY_PREFIX") {
            self.key_prefix = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("READTHRU_KEY_SALT") {
            self.key_salt = Some(v).filter(|s| !s.is_empty());
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        for (field, value) in [
            ("cache_ttl_secs", self.cache_ttl_secs),
            ("cache_timeout_ms", self.cache_timeout_ms),
            ("source_timeout_ms", self.source_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::configuration_with_context(
                    "must be greater than zero",
                    ErrorContext::new().with_field_path(field),
                ));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind.parse().map_err(|e| {
            Error::configuration_with_context(
                format!("invalid bind address: {}", e),
                ErrorContext::new()
                    .with_field_path("bind")
                    .with_details(self.bind.clone()),
            )
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    pub fn with_cache_backend(mut self, kind: CacheBackendKind) -> Self {
        self.cache_backend = kind;
        self
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_key_salt(mut self, salt: impl Into<String>) -> Self {
        self.key_salt = Some(salt.into());
        self
    }
}

fn parse_u64(var: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| {
        Error::configuration_with_context(
            "expected a non-negative integer",
            ErrorContext::new()
                .with_field_path(var)
                .with_details(value.to_string()),
        )
    })
}
