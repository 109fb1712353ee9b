use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::product::{Moderation, ProductWithRanking};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Manufacturer {
    pub id: String,
    pub shop_id: Option<String>,
    pub slug: Option<String>,
    pub tradinta_id: Option<String>,
    pub shop_name: String,
    pub logo_url: Option<String>,
    pub rating: f64,
    pub review_count: i64,
    pub created_at: i64,
}

/// Review totals across one manufacturer's products
#[derive(Debug, Clone, FromRow)]
pub struct ManufacturerRatingInput {
    pub manufacturer_id: String,
    pub review_count: i64,
    pub weighted_sum: f64,
}

impl Manufacturer {
    /// Map into the shared ranked shape used by entity lookup
    pub fn into_ranked(self) -> ProductWithRanking {
        ProductWithRanking {
            id: self.id.clone(),
            name: self.shop_name,
            slug: self.slug.or(self.shop_id),
            description: None,
            price: None,
            category: None,
            subcategory: None,
            manufacturer_id: Some(self.id),
            image_url: self.logo_url,
            rating: self.rating,
            review_count: self.review_count,
            trad_rank: self.rating,
            moderation: Moderation {
                status: "active".to_string(),
                is_visible: true,
                flags: Vec::new(),
            },
        }
    }
}
