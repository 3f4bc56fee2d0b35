//! HTTP surface: one `POST` endpoint per pipeline plus stats and health.
//!
//! | Route | Body | Response |
//! |-------|------|----------|
//! | `POST /get-user` | `{"user_id": 1}` | user record or `{"message": "User not found."}` |
//! | `POST /predict` | Iris measurements | `{"prediction": 0}` |
//! | `GET /stats` | - | cache and pipeline counters |
//! | `GET /health` | - | `{"status": "ok"}` |
//!
//! Every pipeline response carries an `x-cache: hit|miss` header.

use crate::context::ServiceContext;
use crate::payload::{IrisFeatures, UserQuery};
use crate::readthrough::Served;
use crate::record::Prediction;
use crate::{Error, ErrorContext};
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

pub const USER_NOT_FOUND: &str = "User not found.";
pub const CACHE_HEADER: &str = "x-cache";

pub fn router(ctx: Arc<ServiceContext>) -> Router {
    Router::new()
        .route("/get-user", post(get_user))
        .route("/predict", post(predict))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .with_state(ctx)
}

async fn get_user(
    State(ctx): State<Arc<ServiceContext>>,
    Json(query): Json<UserQuery>,
) -> Result<Response, ApiError> {
    let served = ctx.users.get(&query).await?;
    let hit = served.is_hit();
    let response = match served.value {
        Some(user) => Json(user).into_response(),
        None => Json(json!({ "message": USER_NOT_FOUND })).into_response(),
    };
    Ok(with_cache_header(response, hit))
}

async fn predict(
    State(ctx): State<Arc<ServiceContext>>,
    Json(features): Json<IrisFeatures>,
) -> Result<Response, ApiError> {
    let served = ctx.predictions.get(&features).await?;
    prediction_response(served)
}

async fn stats(State(ctx): State<Arc<ServiceContext>>) -> Response {
    Json(ctx.stats()).into_response()
}

async fn health() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

/// The model answers every valid payload, so an empty result is a server fault.
fn prediction_response(served: Served<Prediction>) -> Result<Response, ApiError> {
    let hit = served.is_hit();
    let prediction = served.value.ok_or_else(|| {
        Error::source_with_context(
            "model produced no prediction",
            ErrorContext::new().with_source("model"),
        )
    })?;
    Ok(with_cache_header(Json(prediction).into_response(), hit))
}

fn with_cache_header(mut response: Response, hit: bool) -> Response {
    let cache_status = if hit { "hit" } else { "miss" };
    response
        .headers_mut()
        .insert(CACHE_HEADER, HeaderValue::from_static(cache_status));
    response
}

/// Maps library errors onto HTTP statuses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_client_error() {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "message": self.0.to_string() })),
            )
                .into_response();
        }
        tracing::error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "internal error" })),
        )
            .into_response()
    }
}
