//! User trading statistics and the cached grade

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;
use crate::grade::Grade;

/// Trading history consumed by the grade engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    /// Transactions released to this user as seller
    pub safe_transaction_count: u32,
    /// Finished trades as buyer or seller (released or refunded)
    pub total_trades: u32,
    /// Mean counterparty review score, 0.0–5.0
    pub average_rating: f64,
    /// Resolved (not dismissed) disputes against this user
    pub dispute_count: u32,
    /// Number of reviews behind `average_rating`
    #[serde(default)]
    pub review_count: u32,
}

impl UserStats {
    /// Rating used for grading: an untraded user counts as unrated.
    pub fn effective_rating(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.average_rating
        }
    }

    /// Fold one more review score into the running mean
    pub fn record_review(&mut self, score: u8) {
        let total = self.average_rating * f64::from(self.review_count) + f64::from(score);
        self.review_count += 1;
        self.average_rating = (total / f64::from(self.review_count)).clamp(0.0, 5.0);
    }

    /// Same counts, ratings equal up to float rounding
    pub fn same_as(&self, other: &UserStats) -> bool {
        self.safe_transaction_count == other.safe_transaction_count
            && self.total_trades == other.total_trades
            && self.dispute_count == other.dispute_count
            && self.review_count == other.review_count
            && (self.average_rating - other.average_rating).abs() < 1e-9
    }
}

/// Persisted per-user document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub stats: UserStats,
    /// Cached; always equals the engine's grade for `stats` after a write
    pub grade: Grade,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension_reason: Option<String>,
    /// Reputation event keys already folded into `stats`, with the time of
    /// the originating event. Pruned once older than the retention window.
    #[serde(default)]
    pub applied_events: BTreeMap<String, DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// A user with no trading history
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            stats: UserStats::default(),
            grade: Grade::LOWEST,
            suspended: false,
            suspension_reason: None,
            applied_events: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Whether the reputation event `key` was already applied
    pub fn has_applied(&self, key: &str) -> bool {
        self.applied_events.contains_key(key)
    }

    pub fn mark_applied(&mut self, key: impl Into<String>, at: DateTime<Utc>) {
        self.applied_events.insert(key.into(), at);
    }

    /// Forget keys of events older than `horizon`; returns how many went
    pub fn prune_applied(&mut self, horizon: DateTime<Utc>) -> usize {
        let before = self.applied_events.len();
        self.applied_events.retain(|_, at| *at >= horizon);
        before - self.applied_events.len()
    }
}
