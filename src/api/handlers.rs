use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::cursor::CursorSigner;
use crate::discovery::{DiscoveryService, RankedProducts, RankingRequest};
use crate::ledger::Ledger;
use crate::lookup::{EntityLookup, EntityType};
use crate::models::ProductWithRanking;
use crate::reviews::{RatingAggregator, ReviewError};
use crate::storage::Storage;

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub ledger: Arc<Ledger>,
    pub ratings: Arc<RatingAggregator>,
    pub discovery: Arc<DiscoveryService>,
    pub lookup: Arc<EntityLookup>,
    pub cursor_signer: Arc<CursorSigner>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl ToString) -> Self {
        Self {
            error: error.into(),
            details: Some(details.to_string()),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReviewRequest {
    pub review_id: Option<String>,
    pub product_id: Option<String>,
    pub manufacturer_id: Option<String>,
    pub rating: Option<Value>,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Whole-number ratings only; `5` and `5.0` are accepted, `4.5` and `"5"` are not
fn integer_rating(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

/// Record a review's rating against its product
pub async fn submit_review(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitReviewRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let missing = || {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Missing required fields")),
        )
    };

    let Json(payload) = payload.map_err(|_| missing())?;

    let (Some(review_id), Some(product_id), Some(manufacturer_id), Some(rating)) = (
        present(&payload.review_id),
        present(&payload.product_id),
        present(&payload.manufacturer_id),
        payload.rating.as_ref().filter(|v| !v.is_null()),
    ) else {
        return Err(missing());
    };

    let Some(rating) = integer_rating(rating) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_details(
                "Invalid rating",
                "rating must be a whole number between 1 and 5",
            )),
        ));
    };

    match state.ratings.record_review(product_id, review_id, rating).await {
        Ok(outcome) => {
            if outcome.manufacturer_id != manufacturer_id {
                tracing::warn!(
                    product_id,
                    submitted = manufacturer_id,
                    owner = %outcome.manufacturer_id,
                    "review names a manufacturer other than the product owner"
                );
            }
            Ok(Json(SuccessResponse { success: true }))
        }
        Err(ReviewError::Validation(details)) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_details("Invalid rating", details)),
        )),
        Err(e @ ReviewError::NotFound(_)) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::with_details("Product not found", e)),
        )),
        Err(e) => {
            tracing::error!(product_id, review_id, error = %e, "failed to record review");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_details("Failed to update product rating", e)),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedQuery {
    pub user_id: Option<String>,
    pub q: Option<String>,
    pub category: Option<String>,
    pub limit: Option<usize>,
}

/// Ranked product listing. The body always carries a `products` array.
pub async fn ranked_products(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RankedQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(e) => {
            tracing::debug!(error = %e, "rejected ranked products query");
            return (StatusCode::BAD_REQUEST, Json(RankedProducts::default())).into_response();
        }
    };

    let request = RankingRequest {
        user_id: query.user_id,
        search_query: query.q,
        category: query.category,
        limit: query.limit,
    };

    match state.discovery.get_ranked_products(&request).await {
        Ok(ranked) => Json(ranked).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to rank products");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(RankedProducts::default()),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub q: Option<String>,
}

/// Resolve free text to a product or manufacturer; `null` when nothing matches
pub async fn lookup_entity(
    State(state): State<Arc<AppState>>,
    Path(entity_type): Path<String>,
    Query(query): Query<LookupQuery>,
) -> Json<Option<ProductWithRanking>> {
    let Some(entity_type) = EntityType::parse(&entity_type) else {
        tracing::debug!(entity_type = %entity_type, "lookup for unknown entity type");
        return Json(None);
    };

    let Some(q) = query.q.as_deref() else {
        return Json(None);
    };

    Json(state.lookup.lookup(entity_type, q).await)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_rating() {
        assert_eq!(integer_rating(&json!(5)), Some(5));
        assert_eq!(integer_rating(&json!(3.0)), Some(3));
        assert_eq!(integer_rating(&json!(4.5)), None);
        assert_eq!(integer_rating(&json!("5")), None);
    }
}
