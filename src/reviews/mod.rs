//! Running-average product ratings
//!
//! Every review folds one rating into the product's `(review_count, rating)`
//! pair through [`Storage::apply_rating`], which reads and writes the pair in
//! one atomic statement, so concurrent reviews never overwrite each other.
//! A write the store was too busy to take is retried a bounded number of times.
//!
//! Manufacturer-level ratings are not touched here; they are
//! rebuilt by [`crate::jobs::recompute_manufacturer_ratings`].

use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ledger::{reasons, Ledger};
use crate::storage::{RatingUpdate, Storage, StorageError};

pub const FIVE_STAR_POINTS_SETTING: &str = "five_star_review_points";
pub const DEFAULT_FIVE_STAR_POINTS: i64 = 10;
pub const MAX_ATTEMPTS: usize = 8;
const RETRY_BACKOFF_MS: u64 = 10;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("invalid review: {0}")]
    Validation(String),
    #[error("product '{0}' not found")]
    NotFound(String),
    #[error("rating update for '{product_id}' still busy after {attempts} attempts")]
    Conflict { product_id: String, attempts: usize },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub product_id: String,
    pub manufacturer_id: String,
    pub review_count: i64,
    pub rating: f64,
    /// Set when a five-star bonus was queued for the manufacturer
    pub bonus_event_id: Option<String>,
}

pub struct RatingAggregator {
    storage: Arc<dyn Storage>,
    ledger: Arc<Ledger>,
}

impl RatingAggregator {
    pub fn new(storage: Arc<dyn Storage>, ledger: Arc<Ledger>) -> Self {
        Self { storage, ledger }
    }

    /// Fold `rating` into the product's aggregate, then award the five-star bonus.
    ///
    /// The bonus is queued after the rating is committed and cannot undo it.
    pub async fn record_review(
        &self,
        product_id: &str,
        review_id: &str,
        rating: i64,
    ) -> Result<ReviewOutcome, ReviewError> {
        if !(1..=5).contains(&rating) {
            return Err(ReviewError::Validation(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }

        let mut committed = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.storage.apply_rating(product_id, rating).await {
                Ok(Some(update)) => {
                    committed = Some(update);
                    break;
                }
                Ok(None) => return Err(ReviewError::NotFound(product_id.to_string())),
                Err(StorageError::Conflict) => {
                    debug!(product_id, attempt, "store busy, retrying rating update");
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64))
                        .await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let Some(RatingUpdate {
            manufacturer_id,
            review_count,
            rating: new_rating,
        }) = committed
        else {
            warn!(product_id, attempts = MAX_ATTEMPTS, "giving up on rating update");
            return Err(ReviewError::Conflict {
                product_id: product_id.to_string(),
                attempts: MAX_ATTEMPTS,
            });
        };

        info!(product_id, review_count, rating = new_rating, "product rating updated");

        let bonus_event_id = if rating == 5 {
            self.award_five_star_bonus(&manufacturer_id, product_id, review_id)
                .await
        } else {
            None
        };

        Ok(ReviewOutcome {
            product_id: product_id.to_string(),
            manufacturer_id,
            review_count,
            rating: new_rating,
            bonus_event_id,
        })
    }

    /// Configured bonus, `None` when awards are switched off
    async fn five_star_points(&self) -> Option<i64> {
        let configured = match self.storage.get_setting(FIVE_STAR_POINTS_SETTING).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "could not read five-star bonus setting, using default");
                None
            }
        };

        let points = match configured {
            None => DEFAULT_FIVE_STAR_POINTS,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(points) => points,
                Err(_) => {
                    warn!(value = %raw, "five-star bonus setting is not an integer, using default");
                    DEFAULT_FIVE_STAR_POINTS
                }
            },
        };

        (points > 0).then_some(points)
    }

    async fn award_five_star_bonus(
        &self,
        manufacturer_id: &str,
        product_id: &str,
        review_id: &str,
    ) -> Option<String> {
        let Some(points) = self.five_star_points().await else {
            debug!(product_id, "five-star bonus disabled");
            return None;
        };

        let mut metadata = Map::new();
        metadata.insert("productId".to_string(), json!(product_id));
        metadata.insert("reviewId".to_string(), json!(review_id));

        match self.ledger.award_points(
            manufacturer_id,
            points,
            reasons::FIVE_STAR_REVIEW_RECEIVED,
            Some(metadata),
        ) {
            Ok(event_id) => Some(event_id),
            Err(e) => {
                warn!(product_id, manufacturer_id, error = %e, "five-star bonus not awarded");
                None
            }
        }
    }
}
