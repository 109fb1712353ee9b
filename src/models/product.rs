use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ProductStatus {
    Published,
    Draft,
    Archived,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Draft => "draft",
            Self::Archived => "archived",
        }
    }
}

/// Catalog entity. `rating` is the mean of exactly `review_count` ratings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: f64,
    pub stock: i64,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub manufacturer_id: String,
    pub image_url: Option<String>,
    pub rating: f64,
    pub review_count: i64,
    pub status: ProductStatus,
    pub is_sponsored: bool,
    pub is_boosted: bool,
    pub created_at: i64,
}

/// Visibility and compliance annotations attached to every ranked entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Moderation {
    pub status: String,
    pub is_visible: bool,
    pub flags: Vec<String>,
}

/// Public-facing view of a ranked entity. Recomputed per request, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductWithRanking {
    pub id: String,
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub manufacturer_id: Option<String>,
    pub image_url: Option<String>,
    pub rating: f64,
    pub review_count: i64,
    pub trad_rank: f64,
    pub moderation: Moderation,
}

impl Product {
    pub fn moderation(&self) -> Moderation {
        let mut flags = Vec::new();
        if self.status == ProductStatus::Draft {
            flags.push("draft".to_string());
        }
        if self.stock <= 0 {
            flags.push("out_of_stock".to_string());
        }
        if self.review_count == 0 {
            flags.push("unrated".to_string());
        }
        if self.is_sponsored {
            flags.push("sponsored".to_string());
        }

        Moderation {
            status: self.status.as_str().to_string(),
            is_visible: self.status == ProductStatus::Published,
            flags,
        }
    }

    pub fn with_rank(&self, trad_rank: f64) -> ProductWithRanking {
        ProductWithRanking {
            id: self.id.clone(),
            name: self.name.clone(),
            slug: Some(self.slug.clone()),
            description: Some(self.description.clone()),
            price: Some(self.price),
            category: self.category.clone(),
            subcategory: self.subcategory.clone(),
            manufacturer_id: Some(self.manufacturer_id.clone()),
            image_url: self.image_url.clone(),
            rating: self.rating,
            review_count: self.review_count,
            trad_rank,
            moderation: self.moderation(),
        }
    }
}
