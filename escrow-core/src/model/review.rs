//! Counterparty reviews

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TransactionId, UserId};

/// A review one party of a finished transaction leaves for the other
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub transaction_id: TransactionId,
    pub reviewer_id: UserId,
    pub reviewee_id: UserId,
    /// 1–5 stars
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// One review per reviewer per transaction
    pub fn key(transaction_id: &str, reviewer_id: &str) -> String {
        format!("{}:{}", transaction_id, reviewer_id)
    }
}
