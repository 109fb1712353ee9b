//! Product discovery and ranking
//!
//! [`DiscoveryService`] owns the request contract (normalization, limits, an
//! always-present `products` list) and delegates the ordering itself to a
//! [`DiscoveryEngine`].

pub mod engine;

pub use engine::{trad_rank, CatalogRanker, DiscoveryEngine};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::ProductWithRanking;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingRequest {
    /// `None` requests the anonymous ranking
    pub user_id: Option<String>,
    pub search_query: Option<String>,
    pub category: Option<String>,
    pub limit: Option<usize>,
}

impl RankingRequest {
    pub fn for_user(user_id: Option<&str>) -> Self {
        Self {
            user_id: user_id.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn search(query: &str, limit: usize) -> Self {
        Self {
            search_query: Some(query.to_string()),
            limit: Some(limit),
            ..Default::default()
        }
    }

    fn normalized(&self) -> Self {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            user_id: clean(&self.user_id),
            search_query: clean(&self.search_query).map(|q| q.to_lowercase()),
            category: clean(&self.category),
            limit: Some(self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankedProducts {
    /// Always present, possibly empty
    pub products: Vec<ProductWithRanking>,
    /// Matches before the limit was applied
    pub total: usize,
}

pub struct DiscoveryService {
    engine: Arc<dyn DiscoveryEngine>,
}

impl DiscoveryService {
    pub fn new(engine: Arc<dyn DiscoveryEngine>) -> Self {
        Self { engine }
    }

    pub async fn get_ranked_products(
        &self,
        request: &RankingRequest,
    ) -> anyhow::Result<RankedProducts> {
        let request = request.normalized();
        let mut ranked = self.engine.rank(&request).await?;

        let limit = request.limit.unwrap_or(DEFAULT_LIMIT);
        ranked.products.truncate(limit);

        tracing::debug!(
            user_id = request.user_id.as_deref().unwrap_or("anonymous"),
            query = request.search_query.as_deref().unwrap_or(""),
            returned = ranked.products.len(),
            total = ranked.total,
            "ranked products"
        );

        Ok(ranked)
    }
}
