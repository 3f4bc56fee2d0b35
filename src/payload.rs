//! Request payloads.
//!
//! Payloads are plain data. Deserialization rejects unknown fields and wrong types;
//! [`Payload::validate`] rejects values that parse but make no sense. Key derivation
//! lives in [`crate::cache::KeyDeriver`], not here.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};

/// A validated request shape with its own cache namespace.
pub trait Payload: Serialize + Send + Sync {
    /// Cache key namespace, keeps different payload shapes apart in a shared cache.
    const NAMESPACE: &'static str;

    fn validate(&self) -> Result<()>;
}

/// Point lookup of a user by primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserQuery {
    pub user_id: i64,
}

impl UserQuery {
    pub fn new(user_id: i64) -> Self {
        Self { user_id }
    }
}

impl Payload for UserQuery {
    const NAMESPACE: &'static str = "user";

    /// Any `i64` is a valid primary key; ids with no row are answered as not found.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Iris flower measurements, in centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IrisFeatures {
    #[serde(rename = "SepalLengthCm")]
    pub sepal_length_cm: f64,
    #[serde(rename = "SepalWidthCm")]
    pub sepal_width_cm: f64,
    #[serde(rename = "PetalLengthCm")]
    pub petal_length_cm: f64,
    #[serde(rename = "PetalWidthCm")]
    pub petal_width_cm: f64,
}

impl IrisFeatures {
    pub fn new(sepal_length_cm: f64, sepal_width_cm: f64, petal_length_cm: f64, petal_width_cm: f64) -> Self {
        Self {
            sepal_length_cm,
            sepal_width_cm,
            petal_length_cm,
            petal_width_cm,
        }
    }

    /// Feature vector in model input order.
    pub fn to_vector(&self) -> [f64; 4] {
        [
            self.sepal_length_cm,
            self.sepal_width_cm,
            self.petal_length_cm,
            self.petal_width_cm,
        ]
    }
}

const IRIS_FIELDS: [&str; 4] = ["SepalLengthCm", "SepalWidthCm", "PetalLengthCm", "PetalWidthCm"];

impl Payload for IrisFeatures {
    const NAMESPACE: &'static str = "predict";

    fn validate(&self) -> Result<()> {
        for (name, value) in IRIS_FIELDS.iter().zip(self.to_vector()) {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::validation_with_context(
                    "measurement must be a finite, non-negative number",
                    ErrorContext::new()
                        .with_field_path(*name)
                        .with_details(format!("got {}", value)),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_query_parse_and_validate() {
        let q: UserQuery = serde_json::from_str(r#"{"user_id": 1}"#).unwrap();
        assert_eq!(q, UserQuery::new(1));
        assert!(q.validate().is_ok());

        // sqlite INTEGER PRIMARY KEY takes the full i64 range
        for id in [0, -1, i64::MIN, i64::MAX] {
            assert!(UserQuery::new(id).validate().is_ok());
        }
    }

    #[test]
    fn test_user_query_rejects_malformed() {
        assert!(serde_json::from_str::<UserQuery>(r#"{"user_id": "1"}"#).is_err());
        assert!(serde_json::from_str::<UserQuery>(r#"{}"#).is_err());
        assert!(serde_json::from_str::<UserQuery>(r#"{"user_id": 1, "x": 2}"#).is_err());
    }

    #[test]
    fn test_iris_field_names() {
        let f: IrisFeatures = serde_json::from_str(
            r#"{"PetalWidthCm":0.2,"SepalLengthCm":5.1,"PetalLengthCm":1.4,"SepalWidthCm":3.5}"#,
        )
        .unwrap();
        assert_eq!(f.to_vector(), [5.1, 3.5, 1.4, 0.2]);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn test_iris_validation() {
        let err = IrisFeatures::new(5.1, -3.5, 1.4, 0.2).validate().unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("SepalWidthCm")
        );
        assert!(IrisFeatures::new(f64::NAN, 3.5, 1.4, 0.2).validate().is_err());
        assert!(IrisFeatures::new(5.1, 3.5, f64::INFINITY, 0.2).validate().is_err());
    }

    #[test]
    fn test_iris_rejects_missing_field() {
        assert!(serde_json::from_str::<IrisFeatures>(
            r#"{"SepalLengthCm":5.1,"SepalWidthCm":3.5,"PetalLengthCm":1.4}"#
        )
        .is_err());
    }
}
