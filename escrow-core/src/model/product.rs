//! Product listings as seen by the escrow core

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProductId, UserId};

/// Listing status of a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Open for purchase
    Active,
    /// Reserved by an open transaction
    Pending,
    /// Sold through a released transaction
    Sold,
    /// Taken down by an admin
    Hidden,
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Pending => write!(f, "pending"),
            Self::Sold => write!(f, "sold"),
            Self::Hidden => write!(f, "hidden"),
        }
    }
}

/// A product listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub title: String,
    /// Listed price in whole currency units
    pub price: u64,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// A new active listing
    pub fn new(
        id: impl Into<ProductId>,
        seller_id: impl Into<UserId>,
        title: impl Into<String>,
        price: u64,
    ) -> Self {
        Self {
            id: id.into(),
            seller_id: seller_id.into(),
            title: title.into(),
            price,
            status: ListingStatus::Active,
            created_at: Utc::now(),
        }
    }
}
