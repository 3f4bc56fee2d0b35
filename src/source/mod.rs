//! # Authoritative Sources
//!
//! The slow systems of record that the cache fronts.
//!
//! | Source | Payload | Record | Not-found case |
//! |--------|---------|--------|----------------|
//! | [`UserStore`] | [`UserQuery`](crate::payload::UserQuery) | [`UserRecord`](crate::record::UserRecord) | no matching row |
//! | [`ModelSource`] | [`IrisFeatures`](crate::payload::IrisFeatures) | [`Prediction`](crate::record::Prediction) | never |

mod model;
mod user_store;

pub use model::{Centroid, Classifier, ModelSource, NearestCentroidClassifier};
pub use user_store::UserStore;

use crate::payload::Payload;
use crate::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// A system of record that can answer a payload.
///
/// `Ok(None)` means the source has nothing for this payload; `Err` means the lookup
/// itself failed.
#[async_trait]
pub trait AuthoritativeSource: Send + Sync {
    type Payload: Payload;
    type Record: Serialize + DeserializeOwned + Send + Sync;

    async fn fetch(&self, payload: &Self::Payload) -> Result<Option<Self::Record>>;

    fn name(&self) -> &'static str;
}
