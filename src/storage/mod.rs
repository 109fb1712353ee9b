pub mod cached;
pub mod sqlite;
pub mod trait_def;
pub mod unavailable;

pub use cached::CachedStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{
    CatalogQuery, LedgerPosition, RatingUpdate, Storage, StorageError, StorageResult,
};
pub use unavailable::UnavailableStorage;

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;

/// Open the configured store behind the read cache.
///
/// Without a usable credential, or when the store cannot be reached, this
/// returns [`UnavailableStorage`] so callers fall back instead of failing.
pub async fn open(config: &Config) -> Arc<dyn Storage> {
    let Some(ref account) = config.service_account else {
        warn!("No service account configured, store-backed features are disabled");
        return Arc::new(UnavailableStorage);
    };

    let sqlite = match SqliteStorage::new(&account.database_url, account.max_connections).await {
        Ok(storage) => storage,
        Err(e) => {
            error!(error = %e, "Failed to connect to store, store-backed features are disabled");
            return Arc::new(UnavailableStorage);
        }
    };

    if let Err(e) = sqlite.init().await {
        error!(error = %e, "Failed to initialize store schema, store-backed features are disabled");
        return Arc::new(UnavailableStorage);
    }
    info!("Store initialized");

    Arc::new(CachedStorage::new(
        Arc::new(sqlite),
        config.cache.max_entries,
        config.cache.ttl_secs,
    ))
}
