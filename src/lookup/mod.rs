//! Free-text resolution of a product or manufacturer.
//!
//! Lookups never fail outward: errors are logged and reported as "no match".

use std::sync::Arc;
use tracing::{debug, warn};

use crate::discovery::{DiscoveryService, RankingRequest};
use crate::models::ProductWithRanking;
use crate::storage::Storage;

pub const PRODUCT_CANDIDATE_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Product,
    Manufacturer,
}

impl EntityType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "product" => Some(Self::Product),
            "manufacturer" => Some(Self::Manufacturer),
            _ => None,
        }
    }
}

pub struct EntityLookup {
    storage: Arc<dyn Storage>,
    discovery: Arc<DiscoveryService>,
}

impl EntityLookup {
    pub fn new(storage: Arc<dyn Storage>, discovery: Arc<DiscoveryService>) -> Self {
        Self { storage, discovery }
    }

    pub async fn lookup(&self, entity_type: EntityType, query: &str) -> Option<ProductWithRanking> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        match entity_type {
            EntityType::Product => self.lookup_product(query).await,
            EntityType::Manufacturer => self.lookup_manufacturer(query).await,
        }
    }

    async fn lookup_product(&self, query: &str) -> Option<ProductWithRanking> {
        let lowered = query.to_lowercase();
        let request = RankingRequest::search(&lowered, PRODUCT_CANDIDATE_LIMIT);

        let ranked = match self.discovery.get_ranked_products(&request).await {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(query, error = %e, "product lookup failed");
                return None;
            }
        };

        ranked.products.into_iter().find(|p| {
            p.id.to_lowercase() == lowered || p.name.to_lowercase().contains(&lowered)
        })
    }

    async fn lookup_manufacturer(&self, query: &str) -> Option<ProductWithRanking> {
        let lowered = query.to_lowercase();

        match self
            .storage
            .find_manufacturer_by_identifier(&lowered, query)
            .await
        {
            Ok(Some(manufacturer)) => return Some(manufacturer.into_ranked()),
            Ok(None) => debug!(query, "no manufacturer identifier match, trying keywords"),
            Err(e) => {
                warn!(query, error = %e, "manufacturer lookup failed");
                return None;
            }
        }

        match self.storage.find_manufacturer_by_keyword(&lowered).await {
            Ok(found) => found.map(|m| m.into_ranked()),
            Err(e) => {
                warn!(query, error = %e, "manufacturer keyword lookup failed");
                None
            }
        }
    }
}
