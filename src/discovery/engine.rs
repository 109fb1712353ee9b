use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

use super::{RankedProducts, RankingRequest};
use crate::models::{Product, ProductStatus};
use crate::storage::{CatalogQuery, Storage};

const SPONSORED_BOOST: f64 = 2.0;
const BOOSTED_BOOST: f64 = 1.0;
const OUT_OF_STOCK_PENALTY: f64 = 1.0;
const DRAFT_PENALTY: f64 = 5.0;

/// Produces the ranked product list for a normalized request.
///
/// Requests reaching an engine are already normalized: `search_query` is
/// trimmed and lower-cased, `limit` is set and within bounds.
#[async_trait]
pub trait DiscoveryEngine: Send + Sync {
    async fn rank(&self, request: &RankingRequest) -> anyhow::Result<RankedProducts>;
}

/// Default engine: scores straight from catalog fields. Not personalized.
pub struct CatalogRanker {
    storage: Arc<dyn Storage>,
}

impl CatalogRanker {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

/// Rating weighted by review volume, plus placement boosts
pub fn trad_rank(product: &Product) -> f64 {
    let mut score = product.rating * (1.0 + product.review_count.max(0) as f64).ln();
    if product.is_sponsored {
        score += SPONSORED_BOOST;
    }
    if product.is_boosted {
        score += BOOSTED_BOOST;
    }
    if product.stock <= 0 {
        score -= OUT_OF_STOCK_PENALTY;
    }
    if product.status == ProductStatus::Draft {
        score -= DRAFT_PENALTY;
    }
    score
}

#[async_trait]
impl DiscoveryEngine for CatalogRanker {
    async fn rank(&self, request: &RankingRequest) -> anyhow::Result<RankedProducts> {
        let query = CatalogQuery {
            name_contains: request.search_query.as_deref().map(str::to_lowercase),
            category: request.category.as_deref().map(str::to_lowercase),
        };
        let products = self.storage.list_products(&query).await?;

        let mut scored: Vec<(f64, Product)> = products
            .into_iter()
            .filter(|p| p.status != ProductStatus::Archived)
            .map(|p| (trad_rank(&p), p))
            .collect();

        // Highest score first; id breaks ties so pages stay stable
        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = scored.len();
        let products = scored
            .into_iter()
            .take(request.limit.unwrap_or(super::DEFAULT_LIMIT))
            .map(|(score, p)| p.with_rank(score))
            .collect();

        Ok(RankedProducts { products, total })
    }
}
