//! Append-only points ledger
//!
//! Each award becomes one immutable event carrying a SHA-256 digest over its
//! canonical JSON payload. The digest is tamper evidence only: anyone who can
//! rewrite a row can rewrite its hash too. There is no signature and no
//! chaining. [`crate::jobs::verify_ledger`] recomputes digests to flag rows
//! edited behind the ledger's back.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::dispatch::{BackgroundDispatcher, BackgroundTask};
use crate::models::{generate_id, PointsLedgerEvent};

pub const ACTION_AWARD: &str = "award";
pub const ISSUED_BY_SYSTEM: &str = "system";

/// Reason codes emitted by this crate
pub mod reasons {
    pub const FIVE_STAR_REVIEW_RECEIVED: &str = "FIVE_STAR_REVIEW_RECEIVED";
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid points award: {0}")]
    Validation(String),
}

/// Field order here is the hashing order and must not change.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalPayload<'a> {
    event_id: &'a str,
    user_id: &'a str,
    points: i64,
    action: &'a str,
    reason_code: &'a str,
    metadata: &'a Map<String, Value>,
    timestamp: &'a str,
}

impl<'a> CanonicalPayload<'a> {
    fn of(event: &'a PointsLedgerEvent) -> Self {
        Self {
            event_id: &event.event_id,
            user_id: &event.user_id,
            points: event.points,
            action: &event.action,
            reason_code: &event.reason_code,
            metadata: &event.metadata,
            timestamp: &event.timestamp,
        }
    }
}

/// Canonical JSON text the hash is computed over
pub fn canonical_json(event: &PointsLedgerEvent) -> String {
    // Serializing borrowed strings, integers and a JSON map cannot fail
    serde_json::to_string(&CanonicalPayload::of(event)).unwrap_or_default()
}

/// Lowercase hex SHA-256 over the canonical payload
pub fn compute_event_hash(event: &PointsLedgerEvent) -> String {
    format!("{:x}", Sha256::digest(canonical_json(event).as_bytes()))
}

/// True when the stored hash matches the recomputed one
pub fn verify_event_hash(event: &PointsLedgerEvent) -> bool {
    let expected = compute_event_hash(event);
    expected.as_bytes().ct_eq(event.event_hash.as_bytes()).into()
}

/// Validate inputs and build a hashed award event
pub fn build_award(
    user_id: &str,
    points: i64,
    reason_code: &str,
    metadata: Option<Map<String, Value>>,
    issued_by: &str,
) -> Result<PointsLedgerEvent, LedgerError> {
    if user_id.trim().is_empty() {
        return Err(LedgerError::Validation("user id must not be empty".to_string()));
    }
    if reason_code.trim().is_empty() {
        return Err(LedgerError::Validation(
            "reason code must not be empty".to_string(),
        ));
    }

    let mut event = PointsLedgerEvent {
        event_id: generate_id(20),
        user_id: user_id.to_string(),
        points,
        action: ACTION_AWARD.to_string(),
        reason_code: reason_code.to_string(),
        metadata: metadata.unwrap_or_default(),
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        event_hash: String::new(),
        issued_by: issued_by.to_string(),
    };
    event.event_hash = compute_event_hash(&event);

    Ok(event)
}

/// Entry point for awarding points
pub struct Ledger {
    dispatcher: Arc<BackgroundDispatcher>,
}

impl Ledger {
    pub fn new(dispatcher: Arc<BackgroundDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Build an award and queue it for persistence.
    ///
    /// Returns the new event id as soon as the event is queued. Only invalid
    /// input is reported; a failed write is logged by the dispatcher and lost.
    pub fn award_points(
        &self,
        user_id: &str,
        points: i64,
        reason_code: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<String, LedgerError> {
        let event = build_award(user_id, points, reason_code, metadata, ISSUED_BY_SYSTEM)?;
        let event_id = event.event_id.clone();

        tracing::info!(
            event_id = %event_id,
            user_id = %event.user_id,
            points = event.points,
            reason_code = %event.reason_code,
            "awarding points"
        );
        self.dispatcher
            .dispatch(BackgroundTask::AppendLedgerEvent(event));

        Ok(event_id)
    }
}
