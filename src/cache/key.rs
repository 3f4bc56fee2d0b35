//! Cache key derivation.

use crate::payload::Payload;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Length of the hex-rendered SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// A fully rendered cache key, `"<namespace>:<digest>"` or a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    key: String,
}

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn namespaced(namespace: &str, digest: &str) -> Self {
        Self::new(format!("{}:{}", namespace, digest))
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Namespace tag, if the key carries one.
    pub fn namespace(&self) -> Option<&str> {
        self.key.rsplit_once(':').map(|(ns, _)| ns)
    }

    /// The hex digest part of the key.
    pub fn digest(&self) -> &str {
        self.key
            .rsplit_once(':')
            .map(|(_, d)| d)
            .unwrap_or(&self.key)
    }

    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self::new(format!("{}:{}", prefix, self.key))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Maps request payloads to stable cache keys.
///
/// The payload is rendered to canonical JSON (object keys sorted at every depth,
/// compact separators), hashed with SHA-256 and rendered as lowercase hex. Two
/// payloads with the same field/value set always produce the same key no matter
/// how they were built.
#[derive(Debug, Clone, Default)]
pub struct KeyDeriver {
    salt: Option<String>,
}

impl KeyDeriver {
    pub fn new() -> Self {
        Self { salt: None }
    }

    /// Mix a deployment-wide salt into every key (e.g. a model version).
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn salt(&self) -> Option<&str> {
        self.salt.as_deref()
    }

    /// Derive the key for a typed payload under its own namespace.
    pub fn derive_for<P: Payload>(&self, payload: &P) -> Result<CacheKey> {
        self.derive(P::NAMESPACE, payload)
    }

    pub fn derive<T: Serialize + ?Sized>(&self, namespace: &str, payload: &T) -> Result<CacheKey> {
        let value = serde_json::to_value(payload)?;
        let canonical = self.canonical_form(&value);
        Ok(CacheKey::namespaced(namespace, &sha256_hex(canonical.as_bytes())))
    }

    /// Canonical text that gets hashed.
    pub fn canonical_form(&self, value: &Value) -> String {
        let mut out = String::new();
        match self.salt {
            Some(ref salt) => {
                // {"payload":...,"salt":...} keeps the salted form canonical too
                out.push_str("{\"payload\":");
                write_canonical(value, &mut out);
                out.push_str(",\"salt\":");
                write_canonical(&Value::String(salt.clone()), &mut out);
                out.push('}');
            }
            None => write_canonical(value, &mut out),
        }
        out
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(&Value::String(k.clone()), out);
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        // -0.0 and 0.0 are the same measurement
        Value::Number(n) if n.as_f64() == Some(0.0) && n.is_f64() => out.push_str("0.0"),
        other => out.push_str(&other.to_string()),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(DIGEST_HEX_LEN);
    for b in digest.iter() {
        let _ = write!(hex, "{:02x}", b);
    }
    hex
}
