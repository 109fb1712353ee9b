//! Shortlink creation shared by the admin API and the operator CLI

use thiserror::Error;
use tracing::info;

use crate::models::{generate_id, unix_now, CreateShortlinkRequest, Shortlink};
use crate::storage::{Storage, StorageError};

use super::handlers::resolve_destination;

const GENERATED_CODE_LEN: usize = 7;
const MAX_GENERATE_ATTEMPTS: usize = 10;
const MAX_CUSTOM_CODE_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ShortlinkError {
    #[error("Destination must be an http(s) URL or a site-relative path")]
    InvalidDestination,
    #[error("Custom code must be 1-32 characters of letters, digits, '-' or '_'")]
    InvalidCode,
    #[error("Short code '{0}' already exists")]
    CodeTaken(String),
    #[error("Failed to generate unique short code")]
    Exhausted,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Codes must be usable as a single `/l/{link_id}` path segment
pub fn is_valid_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_CUSTOM_CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Validate and store a shortlink under the caller's code or a generated one
pub async fn create_shortlink(
    storage: &dyn Storage,
    request: CreateShortlinkRequest,
) -> Result<Shortlink, ShortlinkError> {
    let destination = request.destination_url.trim().to_string();
    if resolve_destination(Some(&destination), None).is_none() {
        return Err(ShortlinkError::InvalidDestination);
    }

    let mut link = Shortlink {
        id: String::new(),
        destination_url: Some(destination),
        partner_id: non_empty(request.partner_id),
        campaign: non_empty(request.campaign),
        click_count: 0,
        created_at: unix_now(),
    };

    if let Some(custom) = request.custom_code {
        if !is_valid_code(&custom) {
            return Err(ShortlinkError::InvalidCode);
        }
        link.id = custom;
        return match storage.create_shortlink(&link).await {
            Ok(created) => {
                info!(id = %created.id, "shortlink created");
                Ok(created)
            }
            Err(StorageError::Conflict) => Err(ShortlinkError::CodeTaken(link.id)),
            Err(e) => Err(e.into()),
        };
    }

    for _ in 0..MAX_GENERATE_ATTEMPTS {
        link.id = generate_id(GENERATED_CODE_LEN);
        match storage.create_shortlink(&link).await {
            Ok(created) => {
                info!(id = %created.id, "shortlink created");
                return Ok(created);
            }
            Err(StorageError::Conflict) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(ShortlinkError::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    fn request(destination: &str, code: Option<&str>) -> CreateShortlinkRequest {
        CreateShortlinkRequest {
            destination_url: destination.to_string(),
            partner_id: Some("  partner-7 ".to_string()),
            campaign: Some(" ".to_string()),
            custom_code: code.map(str::to_string),
        }
    }

    #[test]
    fn test_is_valid_code() {
        assert!(is_valid_code("spring-sale_24"));
        assert!(!is_valid_code(""));
        assert!(!is_valid_code("has space"));
        assert!(!is_valid_code("slash/inside"));
        assert!(!is_valid_code(&"a".repeat(33)));
    }

    #[tokio::test]
    async fn test_create_shortlink_validates_before_store() {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();

        assert!(matches!(
            create_shortlink(&storage, request("javascript:alert(1)", None)).await,
            Err(ShortlinkError::InvalidDestination)
        ));
        assert!(matches!(
            create_shortlink(&storage, request("https://shop.example/", Some("a/b"))).await,
            Err(ShortlinkError::InvalidCode)
        ));
        assert!(storage.get_shortlink("a/b").await.unwrap().is_none());

        let created = create_shortlink(&storage, request("/products/1", Some("spring")))
            .await
            .unwrap();
        assert_eq!(created.id, "spring");
        assert_eq!(created.partner_id.as_deref(), Some("partner-7"));
        assert_eq!(created.campaign, None);

        assert!(matches!(
            create_shortlink(&storage, request("/products/2", Some("spring"))).await,
            Err(ShortlinkError::CodeTaken(code)) if code == "spring"
        ));

        let generated = create_shortlink(&storage, request("https://shop.example/", None))
            .await
            .unwrap();
        assert_eq!(generated.id.len(), GENERATED_CODE_LEN);
    }
}
