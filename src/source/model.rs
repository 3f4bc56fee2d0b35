//! Prediction source backed by a pre-loaded classifier.

use super::AuthoritativeSource;
use crate::payload::IrisFeatures;
use crate::record::Prediction;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A trained classifier, loaded once and shared read-only.
pub trait Classifier: Send + Sync {
    /// Must be pure: same features and model version, same label.
    fn predict(&self, features: &[f64; 4]) -> i64;

    fn version(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub label: i64,
    pub features: [f64; 4],
}

/// Nearest-centroid model, serialized as JSON:
/// `{"version": "...", "centroids": [{"label": 0, "features": [..4 floats..]}, ...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestCentroidClassifier {
    version: String,
    centroids: Vec<Centroid>,
}

impl NearestCentroidClassifier {
    pub fn new(version: impl Into<String>, centroids: Vec<Centroid>) -> Result<Self> {
        let model = Self {
            version: version.into(),
            centroids,
        };
        model.check()?;
        Ok(model)
    }

    /// Per-class means of the Iris training set.
    pub fn builtin_iris() -> Self {
        Self {
            version: "iris-centroids-1".to_string(),
            centroids: vec![
                Centroid { label: 0, features: [5.006, 3.428, 1.462, 0.246] },
                Centroid { label: 1, features: [5.936, 2.770, 4.260, 1.326] },
                Centroid { label: 2, features: [6.588, 2.974, 5.552, 2.026] },
            ],
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(text)?;
        model.check()?;
        Ok(model)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let model = Self::from_json(&text)?;
        tracing::info!(
            path = %path.display(),
            version = %model.version,
            classes = model.centroids.len(),
            "model loaded"
        );
        Ok(model)
    }

    pub fn centroids(&self) -> &[Centroid] {
        &self.centroids
    }

    fn check(&self) -> Result<()> {
        if self.centroids.is_empty() {
            return Err(Error::configuration_with_context(
                "model artifact has no centroids",
                ErrorContext::new().with_field_path("centroids"),
            ));
        }
        if self
            .centroids
            .iter()
            .any(|c| c.features.iter().any(|v| !v.is_finite()))
        {
            return Err(Error::configuration_with_context(
                "model artifact has non-finite centroid features",
                ErrorContext::new().with_field_path("centroids[].features"),
            ));
        }
        Ok(())
    }
}

fn squared_distance(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl Classifier for NearestCentroidClassifier {
    fn predict(&self, features: &[f64; 4]) -> i64 {
        let mut best: Option<(f64, i64)> = None;
        for c in &self.centroids {
            let d = squared_distance(features, &c.features);
            best = match best {
                // ties go to the lowest label
                Some((bd, bl)) if bd < d || (bd == d && bl <= c.label) => Some((bd, bl)),
                _ => Some((d, c.label)),
            };
        }
        best.map(|(_, label)| label).unwrap_or_default()
    }

    fn version(&self) -> &str {
        &self.version
    }
}

/// Model inference as an authoritative source; it always has an answer.
#[derive(Clone)]
pub struct ModelSource {
    model: Arc<dyn Classifier>,
}

impl ModelSource {
    pub fn new(model: Arc<dyn Classifier>) -> Self {
        Self { model }
    }

    pub fn model_version(&self) -> &str {
        self.model.version()
    }
}

#[async_trait]
impl AuthoritativeSource for ModelSource {
    type Payload = IrisFeatures;
    type Record = Prediction;

    async fn fetch(&self, payload: &IrisFeatures) -> Result<Option<Prediction>> {
        let model = Arc::clone(&self.model);
        let features = payload.to_vector();
        let label = tokio::task::spawn_blocking(move || model.predict(&features))
            .await
            .map_err(|e| {
                Error::source_with_context(
                    format!("model inference failed: {}", e),
                    ErrorContext::new().with_source("model"),
                )
            })?;
        Ok(Some(Prediction { prediction: label }))
    }

    fn name(&self) -> &'static str {
        "model"
    }
}
