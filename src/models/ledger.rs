use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use sqlx::FromRow;

/// An award as built by the ledger, before the store assigns `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsLedgerEvent {
    pub event_id: String,
    pub user_id: String,
    pub points: i64,
    pub action: String,
    pub reason_code: String,
    pub metadata: Map<String, Value>,
    /// ISO-8601, captured when the payload was built. Part of the hash.
    pub timestamp: String,
    pub event_hash: String,
    pub issued_by: String,
}

/// A ledger row as persisted. `metadata` holds the JSON object text.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StoredLedgerEvent {
    #[serde(skip)]
    pub seq: i64,
    pub event_id: String,
    pub user_id: String,
    pub points: i64,
    pub action: String,
    pub reason_code: String,
    #[serde(serialize_with = "serialize_json_text")]
    pub metadata: String,
    pub timestamp: String,
    pub created_at: i64,
    pub event_hash: String,
    pub issued_by: String,
}

fn serialize_json_text<S: Serializer>(text: &str, serializer: S) -> Result<S::Ok, S::Error> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => value.serialize(serializer),
        Err(_) => serializer.serialize_str(text),
    }
}

impl StoredLedgerEvent {
    /// Rebuild the event exactly as it was hashed
    pub fn to_event(&self) -> serde_json::Result<PointsLedgerEvent> {
        let metadata: Map<String, Value> = serde_json::from_str(&self.metadata)?;
        Ok(PointsLedgerEvent {
            event_id: self.event_id.clone(),
            user_id: self.user_id.clone(),
            points: self.points,
            action: self.action.clone(),
            reason_code: self.reason_code.clone(),
            metadata,
            timestamp: self.timestamp.clone(),
            event_hash: self.event_hash.clone(),
            issued_by: self.issued_by.clone(),
        })
    }
}
