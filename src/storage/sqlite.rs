use crate::models::{
    unix_now, LinkClickEvent, Manufacturer, ManufacturerRatingInput, PointsLedgerEvent, Product,
    Shortlink, StoredLedgerEvent,
};
use crate::storage::{
    CatalogQuery, LedgerPosition, RatingUpdate, Storage, StorageError, StorageResult,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const PRODUCT_COLUMNS: &str = "id, name, slug, description, price, stock, category, subcategory, \
     manufacturer_id, image_url, rating, review_count, status, is_sponsored, is_boosted, created_at";

const MANUFACTURER_COLUMNS: &str =
    "id, shop_id, slug, tradinta_id, shop_name, logo_url, rating, review_count, created_at";

const LEDGER_COLUMNS: &str = "seq, event_id, user_id, points, action, reason_code, metadata, \
     timestamp, created_at, event_hash, issued_by";

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// SQLITE_BUSY or SQLITE_LOCKED, including their extended codes
fn is_busy(e: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = e else {
        return false;
    };
    db.code()
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, 5 | 6))
}

/// Text the case-insensitive lookups compare against. SQLite's `lower()`
/// only folds ASCII, so folding happens here on write.
fn fold(value: &str) -> String {
    value.to_lowercase()
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                name_lower TEXT NOT NULL,
                slug TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                price REAL NOT NULL DEFAULT 0,
                stock INTEGER NOT NULL DEFAULT 0,
                category TEXT,
                category_lower TEXT,
                subcategory TEXT,
                manufacturer_id TEXT NOT NULL,
                image_url TEXT,
                rating REAL NOT NULL DEFAULT 0,
                review_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'draft',
                is_sponsored INTEGER NOT NULL DEFAULT 0,
                is_boosted INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_manufacturer ON products(manufacturer_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_lower)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS manufacturers (
                id TEXT PRIMARY KEY,
                shop_id TEXT,
                shop_id_lower TEXT,
                slug TEXT,
                slug_lower TEXT,
                tradinta_id TEXT,
                shop_name TEXT NOT NULL,
                logo_url TEXT,
                rating REAL NOT NULL DEFAULT 0,
                review_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_manufacturers_shop_id ON manufacturers(shop_id_lower)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_manufacturers_slug ON manufacturers(slug_lower)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_manufacturers_tradinta_id ON manufacturers(tradinta_id)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS manufacturer_keywords (
                manufacturer_id TEXT NOT NULL,
                keyword TEXT NOT NULL,
                PRIMARY KEY (manufacturer_id, keyword)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_manufacturer_keywords_keyword ON manufacturer_keywords(keyword)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        // Append-only: nothing in this crate issues UPDATE or DELETE against it
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS points_ledger (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                points INTEGER NOT NULL,
                action TEXT NOT NULL,
                reason_code TEXT NOT NULL,
                metadata TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                event_hash TEXT NOT NULL,
                issued_by TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_points_ledger_user ON points_ledger(user_id, created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shortlinks (
                id TEXT PRIMARY KEY,
                destination_url TEXT,
                partner_id TEXT,
                campaign TEXT,
                click_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS link_click_events (
                id TEXT PRIMARY KEY,
                partner_id TEXT,
                target_url TEXT NOT NULL,
                shortlink_id TEXT,
                campaign TEXT,
                timestamp INTEGER NOT NULL,
                user_agent TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_link_click_events_shortlink ON link_click_events(shortlink_id)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn upsert_product(&self, product: &Product) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, name_lower, slug, description, price, stock, category,
                category_lower, subcategory, manufacturer_id, image_url, rating, review_count, status,
                is_sponsored, is_boosted, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                name_lower = excluded.name_lower,
                slug = excluded.slug,
                description = excluded.description,
                price = excluded.price,
                stock = excluded.stock,
                category = excluded.category,
                category_lower = excluded.category_lower,
                subcategory = excluded.subcategory,
                manufacturer_id = excluded.manufacturer_id,
                image_url = excluded.image_url,
                status = excluded.status,
                is_sponsored = excluded.is_sponsored,
                is_boosted = excluded.is_boosted
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(fold(&product.name))
        .bind(&product.slug)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock)
        .bind(&product.category)
        .bind(product.category.as_deref().map(fold))
        .bind(&product.subcategory)
        .bind(&product.manufacturer_id)
        .bind(&product.image_url)
        .bind(product.rating)
        .bind(product.review_count)
        .bind(product.status)
        .bind(product.is_sponsored)
        .bind(product.is_boosted)
        .bind(product.created_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn get_product(&self, id: &str) -> StorageResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(product)
    }

    async fn list_products(&self, query: &CatalogQuery) -> StorageResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE status != 'archived'
              AND (? IS NULL OR instr(name_lower, ?) > 0)
              AND (? IS NULL OR category_lower = ?)
            "#
        ))
        .bind(&query.name_contains)
        .bind(&query.name_contains)
        .bind(&query.category)
        .bind(&query.category)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(products)
    }

    async fn apply_rating(
        &self,
        product_id: &str,
        rating: i64,
    ) -> StorageResult<Option<RatingUpdate>> {
        // Right-hand sides see the pre-update row, so read and write are one step
        sqlx::query_as::<_, RatingUpdate>(
            r#"
            UPDATE products
            SET rating = (rating * review_count + ?) / (review_count + 1),
                review_count = review_count + 1
            WHERE id = ?
            RETURNING manufacturer_id, review_count, rating
            "#,
        )
        .bind(rating as f64)
        .bind(product_id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| {
            if is_busy(&e) {
                StorageError::Conflict
            } else {
                e.into()
            }
        })
    }

    async fn upsert_manufacturer(
        &self,
        manufacturer: &Manufacturer,
        keywords: &[String],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO manufacturers (id, shop_id, shop_id_lower, slug, slug_lower, tradinta_id,
                shop_name, logo_url, rating, review_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                shop_id = excluded.shop_id,
                shop_id_lower = excluded.shop_id_lower,
                slug = excluded.slug,
                slug_lower = excluded.slug_lower,
                tradinta_id = excluded.tradinta_id,
                shop_name = excluded.shop_name,
                logo_url = excluded.logo_url
            "#,
        )
        .bind(&manufacturer.id)
        .bind(&manufacturer.shop_id)
        .bind(manufacturer.shop_id.as_deref().map(fold))
        .bind(&manufacturer.slug)
        .bind(manufacturer.slug.as_deref().map(fold))
        .bind(&manufacturer.tradinta_id)
        .bind(&manufacturer.shop_name)
        .bind(&manufacturer.logo_url)
        .bind(manufacturer.rating)
        .bind(manufacturer.review_count)
        .bind(manufacturer.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM manufacturer_keywords WHERE manufacturer_id = ?")
            .bind(&manufacturer.id)
            .execute(&mut *tx)
            .await?;

        for keyword in keywords {
            let keyword = fold(keyword.trim());
            if keyword.is_empty() {
                continue;
            }
            sqlx::query(
                r#"
                INSERT INTO manufacturer_keywords (manufacturer_id, keyword)
                VALUES (?, ?)
                ON CONFLICT (manufacturer_id, keyword) DO NOTHING
                "#,
            )
            .bind(&manufacturer.id)
            .bind(keyword)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_manufacturer_by_identifier(
        &self,
        lowered: &str,
        exact: &str,
    ) -> StorageResult<Option<Manufacturer>> {
        let manufacturer = sqlx::query_as::<_, Manufacturer>(&format!(
            r#"
            SELECT {MANUFACTURER_COLUMNS}
            FROM manufacturers
            WHERE shop_id_lower = ? OR slug_lower = ? OR id = ? OR tradinta_id = ?
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#
        ))
        .bind(lowered)
        .bind(lowered)
        .bind(exact)
        .bind(exact)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(manufacturer)
    }

    async fn find_manufacturer_by_keyword(
        &self,
        keyword: &str,
    ) -> StorageResult<Option<Manufacturer>> {
        let manufacturer = sqlx::query_as::<_, Manufacturer>(&format!(
            r#"
            SELECT {MANUFACTURER_COLUMNS}
            FROM manufacturers
            WHERE id IN (SELECT manufacturer_id FROM manufacturer_keywords WHERE keyword = ?)
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#
        ))
        .bind(keyword)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(manufacturer)
    }

    async fn manufacturer_rating_inputs(&self) -> StorageResult<Vec<ManufacturerRatingInput>> {
        let inputs = sqlx::query_as::<_, ManufacturerRatingInput>(
            r#"
            SELECT m.id AS manufacturer_id,
                   CAST(COALESCE(SUM(p.review_count), 0) AS INTEGER) AS review_count,
                   CAST(COALESCE(SUM(p.rating * p.review_count), 0) AS REAL) AS weighted_sum
            FROM manufacturers m
            LEFT JOIN products p ON p.manufacturer_id = m.id
            GROUP BY m.id
            ORDER BY m.id
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(inputs)
    }

    async fn set_manufacturer_rating(
        &self,
        manufacturer_id: &str,
        rating: f64,
        review_count: i64,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE manufacturers
            SET rating = ?, review_count = ?
            WHERE id = ?
            "#,
        )
        .bind(rating)
        .bind(review_count)
        .bind(manufacturer_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_setting(&self, key: &str) -> StorageResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(value)
    }

    async fn put_setting(&self, key: &str, value: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(unix_now())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn append_ledger_event(&self, event: &PointsLedgerEvent) -> StorageResult<()> {
        let metadata = serde_json::to_string(&event.metadata)
            .map_err(|e| StorageError::Other(e.into()))?;

        sqlx::query(
            r#"
            INSERT INTO points_ledger (event_id, user_id, points, action, reason_code, metadata,
                timestamp, created_at, event_hash, issued_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.user_id)
        .bind(event.points)
        .bind(&event.action)
        .bind(&event.reason_code)
        .bind(metadata)
        .bind(&event.timestamp)
        .bind(unix_now())
        .bind(&event.event_hash)
        .bind(&event.issued_by)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict
            } else {
                e.into()
            }
        })?;

        Ok(())
    }

    async fn list_ledger_events(
        &self,
        user_id: Option<&str>,
        after: Option<LedgerPosition>,
        limit: i64,
    ) -> StorageResult<Vec<StoredLedgerEvent>> {
        let after_created = after.map(|p| p.created_at);
        let after_seq = after.map(|p| p.seq);

        let events = sqlx::query_as::<_, StoredLedgerEvent>(&format!(
            r#"
            SELECT {LEDGER_COLUMNS}
            FROM points_ledger
            WHERE (? IS NULL OR user_id = ?)
              AND (? IS NULL OR created_at < ? OR (created_at = ? AND seq < ?))
            ORDER BY created_at DESC, seq DESC
            LIMIT ?
            "#
        ))
        .bind(user_id)
        .bind(user_id)
        .bind(after_created)
        .bind(after_created)
        .bind(after_created)
        .bind(after_seq)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(events)
    }

    async fn points_balance(&self, user_id: &str) -> StorageResult<i64> {
        let balance = sqlx::query_scalar::<_, i64>(
            "SELECT CAST(COALESCE(SUM(points), 0) AS INTEGER) FROM points_ledger WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(balance)
    }

    async fn create_shortlink(&self, shortlink: &Shortlink) -> StorageResult<Shortlink> {
        let result = sqlx::query(
            r#"
            INSERT INTO shortlinks (id, destination_url, partner_id, campaign, click_count, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&shortlink.id)
        .bind(&shortlink.destination_url)
        .bind(&shortlink.partner_id)
        .bind(&shortlink.campaign)
        .bind(shortlink.created_at)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        self.get_shortlink(&shortlink.id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    async fn get_shortlink(&self, id: &str) -> StorageResult<Option<Shortlink>> {
        let shortlink = sqlx::query_as::<_, Shortlink>(
            r#"
            SELECT id, destination_url, partner_id, campaign, click_count, created_at
            FROM shortlinks
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(shortlink)
    }

    async fn increment_clicks(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE shortlinks
            SET click_count = click_count + 1
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }

    async fn record_click_event(&self, event: &LinkClickEvent) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO link_click_events (id, partner_id, target_url, shortlink_id, campaign,
                timestamp, user_agent)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.partner_id)
        .bind(&event.target_url)
        .bind(&event.shortlink_id)
        .bind(&event.campaign)
        .bind(event.timestamp)
        .bind(&event.user_agent)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict
            } else {
                e.into()
            }
        })?;

        Ok(())
    }

    async fn list_click_events(
        &self,
        shortlink_id: Option<&str>,
        limit: i64,
    ) -> StorageResult<Vec<LinkClickEvent>> {
        let events = sqlx::query_as::<_, LinkClickEvent>(
            r#"
            SELECT id, partner_id, target_url, shortlink_id, campaign, timestamp, user_agent
            FROM link_click_events
            WHERE (? IS NULL OR shortlink_id = ?)
            ORDER BY timestamp DESC, id ASC
            LIMIT ?
            "#,
        )
        .bind(shortlink_id)
        .bind(shortlink_id)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(events)
    }
}
