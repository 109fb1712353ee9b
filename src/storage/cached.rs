use crate::models::{
    LinkClickEvent, Manufacturer, ManufacturerRatingInput, PointsLedgerEvent, Product, Shortlink,
    StoredLedgerEvent,
};
use crate::storage::{CatalogQuery, LedgerPosition, RatingUpdate, Storage, StorageResult};
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Read-through cache for the hot redirect path and for settings.
///
/// Shortlink destinations and settings change rarely, so they are served from
/// memory for `ttl`. Click counts in cached shortlinks go stale; callers that
/// need the live count use [`Storage::get_shortlink_authoritative`].
pub struct CachedStorage {
    /// Underlying storage implementation
    inner: Arc<dyn Storage>,
    /// Shortlink lookups, including negative results
    shortlink_cache: Cache<String, Option<Shortlink>>,
    settings_cache: Cache<String, Option<String>>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn Storage>, max_cache_entries: u64, ttl_secs: u64) -> Self {
        let shortlink_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        let settings_cache = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            inner,
            shortlink_cache,
            settings_cache,
        }
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> StorageResult<()> {
        self.inner.init().await
    }

    async fn upsert_product(&self, product: &Product) -> StorageResult<()> {
        self.inner.upsert_product(product).await
    }

    async fn get_product(&self, id: &str) -> StorageResult<Option<Product>> {
        self.inner.get_product(id).await
    }

    async fn list_products(&self, query: &CatalogQuery) -> StorageResult<Vec<Product>> {
        self.inner.list_products(query).await
    }

    async fn apply_rating(
        &self,
        product_id: &str,
        rating: i64,
    ) -> StorageResult<Option<RatingUpdate>> {
        self.inner.apply_rating(product_id, rating).await
    }

    async fn upsert_manufacturer(
        &self,
        manufacturer: &Manufacturer,
        keywords: &[String],
    ) -> StorageResult<()> {
        self.inner.upsert_manufacturer(manufacturer, keywords).await
    }

    async fn find_manufacturer_by_identifier(
        &self,
        lowered: &str,
        exact: &str,
    ) -> StorageResult<Option<Manufacturer>> {
        self.inner
            .find_manufacturer_by_identifier(lowered, exact)
            .await
    }

    async fn find_manufacturer_by_keyword(
        &self,
        keyword: &str,
    ) -> StorageResult<Option<Manufacturer>> {
        self.inner.find_manufacturer_by_keyword(keyword).await
    }

    async fn manufacturer_rating_inputs(&self) -> StorageResult<Vec<ManufacturerRatingInput>> {
        self.inner.manufacturer_rating_inputs().await
    }

    async fn set_manufacturer_rating(
        &self,
        manufacturer_id: &str,
        rating: f64,
        review_count: i64,
    ) -> StorageResult<bool> {
        self.inner
            .set_manufacturer_rating(manufacturer_id, rating, review_count)
            .await
    }

    async fn get_setting(&self, key: &str) -> StorageResult<Option<String>> {
        if let Some(cached) = self.settings_cache.get(key).await {
            return Ok(cached);
        }

        let value = self.inner.get_setting(key).await?;
        self.settings_cache
            .insert(key.to_string(), value.clone())
            .await;

        Ok(value)
    }

    async fn put_setting(&self, key: &str, value: &str) -> StorageResult<()> {
        self.inner.put_setting(key, value).await?;
        self.settings_cache.invalidate(key).await;
        Ok(())
    }

    async fn append_ledger_event(&self, event: &PointsLedgerEvent) -> StorageResult<()> {
        self.inner.append_ledger_event(event).await
    }

    async fn list_ledger_events(
        &self,
        user_id: Option<&str>,
        after: Option<LedgerPosition>,
        limit: i64,
    ) -> StorageResult<Vec<StoredLedgerEvent>> {
        self.inner.list_ledger_events(user_id, after, limit).await
    }

    async fn points_balance(&self, user_id: &str) -> StorageResult<i64> {
        self.inner.points_balance(user_id).await
    }

    async fn create_shortlink(&self, shortlink: &Shortlink) -> StorageResult<Shortlink> {
        let created = self.inner.create_shortlink(shortlink).await?;

        // Replace any cached negative lookup for this code
        self.shortlink_cache
            .insert(created.id.clone(), Some(created.clone()))
            .await;

        Ok(created)
    }

    async fn get_shortlink(&self, id: &str) -> StorageResult<Option<Shortlink>> {
        if let Some(cached) = self.shortlink_cache.get(id).await {
            return Ok(cached);
        }

        let result = self.inner.get_shortlink(id).await?;
        self.shortlink_cache
            .insert(id.to_string(), result.clone())
            .await;

        Ok(result)
    }

    async fn get_shortlink_authoritative(&self, id: &str) -> StorageResult<Option<Shortlink>> {
        let result = self.inner.get_shortlink_authoritative(id).await?;

        // Keep cache in sync with the latest database read
        self.shortlink_cache
            .insert(id.to_string(), result.clone())
            .await;

        Ok(result)
    }

    async fn increment_clicks(&self, id: &str) -> StorageResult<()> {
        self.inner.increment_clicks(id).await
    }

    async fn record_click_event(&self, event: &LinkClickEvent) -> StorageResult<()> {
        self.inner.record_click_event(event).await
    }

    async fn list_click_events(
        &self,
        shortlink_id: Option<&str>,
        limit: i64,
    ) -> StorageResult<Vec<LinkClickEvent>> {
        self.inner.list_click_events(shortlink_id, limit).await
    }
}
