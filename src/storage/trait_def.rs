use crate::models::{
    LinkClickEvent, Manufacturer, ManufacturerRatingInput, PointsLedgerEvent, Product,
    Shortlink, StoredLedgerEvent,
};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists or was modified concurrently")]
    Conflict,
    #[error("store is not configured")]
    Unavailable,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Other(e.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Catalog filter pushed down to the store. Archived products are never returned.
#[derive(Debug, Clone, Default)]
pub struct CatalogQuery {
    /// Lower-cased substring to match against product names
    pub name_contains: Option<String>,
    /// Lower-cased category, matched exactly
    pub category: Option<String>,
}

/// Product aggregate as committed by [`Storage::apply_rating`]
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RatingUpdate {
    pub manufacturer_id: String,
    pub review_count: i64,
    pub rating: f64,
}

/// Position in a newest-first ledger listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerPosition {
    pub created_at: i64,
    pub seq: i64,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, indexes)
    async fn init(&self) -> StorageResult<()>;

    // Catalog

    /// Insert or update catalog fields. `rating` and `review_count` are only
    /// taken on insert; afterwards they change through `apply_rating` alone.
    async fn upsert_product(&self, product: &Product) -> StorageResult<()>;

    async fn get_product(&self, id: &str) -> StorageResult<Option<Product>>;

    async fn list_products(&self, query: &CatalogQuery) -> StorageResult<Vec<Product>>;

    /// Fold one rating into the product's running mean in a single atomic write.
    /// `None` when the product does not exist; [`StorageError::Conflict`] when the
    /// store was too busy to take the write.
    async fn apply_rating(
        &self,
        product_id: &str,
        rating: i64,
    ) -> StorageResult<Option<RatingUpdate>>;

    // Manufacturers

    /// Insert or update profile fields and replace the keyword set.
    /// `rating` and `review_count` are only taken on insert.
    async fn upsert_manufacturer(
        &self,
        manufacturer: &Manufacturer,
        keywords: &[String],
    ) -> StorageResult<()>;

    /// Match case-folded shop_id / slug against `lowered`, or id / tradinta_id against `exact`
    async fn find_manufacturer_by_identifier(
        &self,
        lowered: &str,
        exact: &str,
    ) -> StorageResult<Option<Manufacturer>>;

    async fn find_manufacturer_by_keyword(
        &self,
        keyword: &str,
    ) -> StorageResult<Option<Manufacturer>>;

    async fn manufacturer_rating_inputs(&self) -> StorageResult<Vec<ManufacturerRatingInput>>;

    async fn set_manufacturer_rating(
        &self,
        manufacturer_id: &str,
        rating: f64,
        review_count: i64,
    ) -> StorageResult<bool>;

    // Settings

    async fn get_setting(&self, key: &str) -> StorageResult<Option<String>>;

    async fn put_setting(&self, key: &str, value: &str) -> StorageResult<()>;

    // Points ledger (append-only: no update or delete is exposed)

    async fn append_ledger_event(&self, event: &PointsLedgerEvent) -> StorageResult<()>;

    /// Newest first, strictly after `after` when given
    async fn list_ledger_events(
        &self,
        user_id: Option<&str>,
        after: Option<LedgerPosition>,
        limit: i64,
    ) -> StorageResult<Vec<StoredLedgerEvent>>;

    async fn points_balance(&self, user_id: &str) -> StorageResult<i64>;

    // Shortlinks

    async fn create_shortlink(&self, shortlink: &Shortlink) -> StorageResult<Shortlink>;

    async fn get_shortlink(&self, id: &str) -> StorageResult<Option<Shortlink>>;

    /// Bypasses any read cache
    async fn get_shortlink_authoritative(&self, id: &str) -> StorageResult<Option<Shortlink>> {
        self.get_shortlink(id).await
    }

    async fn increment_clicks(&self, id: &str) -> StorageResult<()>;

    async fn record_click_event(&self, event: &LinkClickEvent) -> StorageResult<()>;

    async fn list_click_events(
        &self,
        shortlink_id: Option<&str>,
        limit: i64,
    ) -> StorageResult<Vec<LinkClickEvent>>;
}
