use crate::models::{
    LinkClickEvent, Manufacturer, ManufacturerRatingInput, PointsLedgerEvent, Product, Shortlink,
    StoredLedgerEvent,
};
use crate::storage::{
    CatalogQuery, LedgerPosition, RatingUpdate, Storage, StorageError, StorageResult,
};
use async_trait::async_trait;

/// Stand-in used when no service account credential is configured.
///
/// Every call fails with [`StorageError::Unavailable`] so each consumer falls
/// back the same way it would on a store outage.
pub struct UnavailableStorage;

#[async_trait]
impl Storage for UnavailableStorage {
    async fn init(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn upsert_product(&self, _product: &Product) -> StorageResult<()> {
        Err(StorageError::Unavailable)
    }

    async fn get_product(&self, _id: &str) -> StorageResult<Option<Product>> {
        Err(StorageError::Unavailable)
    }

    async fn list_products(&self, _query: &CatalogQuery) -> StorageResult<Vec<Product>> {
        Err(StorageError::Unavailable)
    }

    async fn apply_rating(
        &self,
        _product_id: &str,
        _rating: i64,
    ) -> StorageResult<Option<RatingUpdate>> {
        Err(StorageError::Unavailable)
    }

    async fn upsert_manufacturer(
        &self,
        _manufacturer: &Manufacturer,
        _keywords: &[String],
    ) -> StorageResult<()> {
        Err(StorageError::Unavailable)
    }

    async fn find_manufacturer_by_identifier(
        &self,
        _lowered: &str,
        _exact: &str,
    ) -> StorageResult<Option<Manufacturer>> {
        Err(StorageError::Unavailable)
    }

    async fn find_manufacturer_by_keyword(
        &self,
        _keyword: &str,
    ) -> StorageResult<Option<Manufacturer>> {
        Err(StorageError::Unavailable)
    }

    async fn manufacturer_rating_inputs(&self) -> StorageResult<Vec<ManufacturerRatingInput>> {
        Err(StorageError::Unavailable)
    }

    async fn set_manufacturer_rating(
        &self,
        _manufacturer_id: &str,
        _rating: f64,
        _review_count: i64,
    ) -> StorageResult<bool> {
        Err(StorageError::Unavailable)
    }

    async fn get_setting(&self, _key: &str) -> StorageResult<Option<String>> {
        Err(StorageError::Unavailable)
    }

    async fn put_setting(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable)
    }

    async fn append_ledger_event(&self, _event: &PointsLedgerEvent) -> StorageResult<()> {
        Err(StorageError::Unavailable)
    }

    async fn list_ledger_events(
        &self,
        _user_id: Option<&str>,
        _after: Option<LedgerPosition>,
        _limit: i64,
    ) -> StorageResult<Vec<StoredLedgerEvent>> {
        Err(StorageError::Unavailable)
    }

    async fn points_balance(&self, _user_id: &str) -> StorageResult<i64> {
        Err(StorageError::Unavailable)
    }

    async fn create_shortlink(&self, _shortlink: &Shortlink) -> StorageResult<Shortlink> {
        Err(StorageError::Unavailable)
    }

    async fn get_shortlink(&self, _id: &str) -> StorageResult<Option<Shortlink>> {
        Err(StorageError::Unavailable)
    }

    async fn increment_clicks(&self, _id: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable)
    }

    async fn record_click_event(&self, _event: &LinkClickEvent) -> StorageResult<()> {
        Err(StorageError::Unavailable)
    }

    async fn list_click_events(
        &self,
        _shortlink_id: Option<&str>,
        _limit: i64,
    ) -> StorageResult<Vec<LinkClickEvent>> {
        Err(StorageError::Unavailable)
    }
}
