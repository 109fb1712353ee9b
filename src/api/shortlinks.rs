use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::{CreateShortlinkRequest, LinkClickEvent, Shortlink};
use crate::redirect::links::{self, ShortlinkError};
use crate::storage::Storage;

use super::handlers::{ApiError, AppState, ErrorResponse};

/// Create a shortlink, with a caller-chosen or generated code
pub async fn create_shortlink(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateShortlinkRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Shortlink>), ApiError> {
    let Json(payload) = payload.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_details("Invalid shortlink request", e.body_text())),
        )
    })?;

    match links::create_shortlink(state.storage.as_ref(), payload).await {
        Ok(created) => Ok((StatusCode::CREATED, Json(created))),
        Err(e @ (ShortlinkError::InvalidDestination | ShortlinkError::InvalidCode)) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(e.to_string())),
        )),
        Err(ShortlinkError::CodeTaken(_)) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("Short code already exists")),
        )),
        Err(e @ ShortlinkError::Exhausted) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )),
        Err(ShortlinkError::Storage(e)) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::with_details("Failed to create shortlink", e)),
        )),
    }
}

/// Read a shortlink straight from the store, bypassing the redirect cache
pub async fn get_shortlink(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Shortlink>, ApiError> {
    match state.storage.get_shortlink_authoritative(&id).await {
        Ok(Some(link)) => Ok(Json(link)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Shortlink not found")),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::with_details("Failed to read shortlink", e)),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct ClicksQuery {
    #[serde(default = "default_clicks_limit")]
    pub limit: i64,
}

fn default_clicks_limit() -> i64 {
    100
}

/// Most recent click events for one shortlink
pub async fn list_shortlink_clicks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ClicksQuery>,
) -> Result<Json<Vec<LinkClickEvent>>, ApiError> {
    state
        .storage
        .list_click_events(Some(&id), query.limit.clamp(1, 1000))
        .await
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_details("Failed to read click events", e)),
            )
        })
}
