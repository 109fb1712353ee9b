//! Operator batch jobs
//!
//! Both jobs are safe to re-run at any time: the audit is read-only and the
//! rating recompute derives every value from the current product rows.

use serde::Serialize;
use tracing::{info, warn};

use crate::ledger::verify_event_hash;
use crate::storage::{LedgerPosition, Storage, StorageResult};

const AUDIT_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerAudit {
    pub checked: usize,
    /// Events whose stored hash no longer matches their fields
    pub tampered: Vec<String>,
    /// Events whose metadata could not be parsed back
    pub unreadable: Vec<String>,
}

impl LedgerAudit {
    pub fn is_clean(&self) -> bool {
        self.tampered.is_empty() && self.unreadable.is_empty()
    }
}

/// Recompute the hash of every ledger event, optionally for one user only
pub async fn verify_ledger(storage: &dyn Storage, user_id: Option<&str>) -> StorageResult<LedgerAudit> {
    let mut audit = LedgerAudit::default();
    let mut after: Option<LedgerPosition> = None;

    loop {
        let page = storage
            .list_ledger_events(user_id, after, AUDIT_PAGE_SIZE)
            .await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(LedgerPosition {
            created_at: last.created_at,
            seq: last.seq,
        });

        for stored in &page {
            audit.checked += 1;
            match stored.to_event() {
                Ok(event) if verify_event_hash(&event) => {}
                Ok(_) => {
                    warn!(event_id = %stored.event_id, user_id = %stored.user_id, "ledger event hash mismatch");
                    audit.tampered.push(stored.event_id.clone());
                }
                Err(e) => {
                    warn!(event_id = %stored.event_id, error = %e, "ledger event metadata unreadable");
                    audit.unreadable.push(stored.event_id.clone());
                }
            }
        }

        if (page.len() as i64) < AUDIT_PAGE_SIZE {
            break;
        }
    }

    info!(
        checked = audit.checked,
        tampered = audit.tampered.len(),
        unreadable = audit.unreadable.len(),
        "ledger audit finished"
    );
    Ok(audit)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecomputeReport {
    pub manufacturers: usize,
    pub updated: usize,
}

/// Set each manufacturer's rating to the review-weighted mean of its products
pub async fn recompute_manufacturer_ratings(storage: &dyn Storage) -> StorageResult<RecomputeReport> {
    let inputs = storage.manufacturer_rating_inputs().await?;
    let mut report = RecomputeReport {
        manufacturers: inputs.len(),
        updated: 0,
    };

    for input in inputs {
        let rating = if input.review_count > 0 {
            input.weighted_sum / input.review_count as f64
        } else {
            0.0
        };

        if storage
            .set_manufacturer_rating(&input.manufacturer_id, rating, input.review_count)
            .await?
        {
            report.updated += 1;
        }
    }

    info!(
        manufacturers = report.manufacturers,
        updated = report.updated,
        "manufacturer ratings recomputed"
    );
    Ok(report)
}
