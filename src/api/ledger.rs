use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::cursor::CursorData;
use crate::jobs::{verify_ledger, LedgerAudit};
use crate::ledger::LedgerError;
use crate::models::StoredLedgerEvent;
use crate::storage::{LedgerPosition, Storage};

use super::handlers::{ApiError, AppState, ErrorResponse};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct LedgerPageQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LedgerPage {
    pub user_id: String,
    pub balance: i64,
    pub events: Vec<StoredLedgerEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

fn internal_error(error: &str, details: impl ToString) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::with_details(error, details)),
    )
}

/// A user's ledger, newest first, with their current balance
pub async fn list_user_ledger(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<LedgerPageQuery>,
) -> Result<Json<LedgerPage>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let after: Option<LedgerPosition> = match query.cursor.as_deref() {
        Some(cursor) => {
            let data = state.cursor_signer.verify(cursor).map_err(|e| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::with_details("Invalid cursor", e)),
                )
            })?;
            Some(data.into())
        }
        None => None,
    };

    // One extra row tells us whether another page exists
    let mut events = state
        .storage
        .list_ledger_events(Some(&user_id), after, limit + 1)
        .await
        .map_err(|e| internal_error("Failed to read ledger", e))?;

    let next_cursor = if events.len() as i64 > limit {
        events.truncate(limit as usize);
        match events.last() {
            Some(last) => Some(
                state
                    .cursor_signer
                    .create(&CursorData {
                        created_at: last.created_at,
                        seq: last.seq,
                    })
                    .map_err(|e| internal_error("Failed to create cursor", e))?,
            ),
            None => None,
        }
    } else {
        None
    };

    let balance = state
        .storage
        .points_balance(&user_id)
        .await
        .map_err(|e| internal_error("Failed to read balance", e))?;

    Ok(Json(LedgerPage {
        user_id,
        balance,
        events,
        next_cursor,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyQuery {
    pub user_id: Option<String>,
}

/// Recompute every stored event hash
pub async fn verify_ledger_hashes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<LedgerAudit>, ApiError> {
    verify_ledger(state.storage.as_ref(), query.user_id.as_deref())
        .await
        .map(Json)
        .map_err(|e| internal_error("Failed to verify ledger", e))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardRequest {
    pub user_id: String,
    pub points: i64,
    pub reason_code: String,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardResponse {
    pub event_id: String,
}

/// Queue a manual points award
pub async fn award_points(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AwardRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AwardResponse>), ApiError> {
    let Json(payload) = payload.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_details("Invalid award request", e.body_text())),
        )
    })?;

    match state.ledger.award_points(
        &payload.user_id,
        payload.points,
        &payload.reason_code,
        payload.metadata,
    ) {
        Ok(event_id) => Ok((StatusCode::ACCEPTED, Json(AwardResponse { event_id }))),
        Err(e @ LedgerError::Validation(_)) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_details("Invalid award request", e)),
        )),
    }
}
