use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Shortlink {
    pub id: String,
    pub destination_url: Option<String>,
    pub partner_id: Option<String>,
    pub campaign: Option<String>,
    pub click_count: i64,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateShortlinkRequest {
    pub destination_url: String,
    pub partner_id: Option<String>,
    pub campaign: Option<String>,
    pub custom_code: Option<String>,
}

/// One redirect resolution. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LinkClickEvent {
    pub id: String,
    pub partner_id: Option<String>,
    pub target_url: String,
    /// Absent for legacy `/track` links
    pub shortlink_id: Option<String>,
    pub campaign: Option<String>,
    pub timestamp: i64,
    pub user_agent: Option<String>,
}
