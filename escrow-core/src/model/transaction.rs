//! Escrow transaction entity

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DisputeId, ProductId, TransactionId, UserId};

/// The escrow lifecycle states.
///
/// Every transaction starts at `Pending` and terminates at `Released`,
/// `Refunded` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created, awaiting payment
    Pending,
    /// Payment captured and held in escrow
    PaidHold,
    /// Seller handed goods to the carrier
    Shipped,
    /// Goods arrived at the buyer
    Delivered,
    /// Funds released to the seller, terminal
    Released,
    /// Funds returned to the buyer, terminal
    Refunded,
    /// Abandoned before payment, terminal
    Cancelled,
}

impl TransactionStatus {
    /// Whether no further transitions are allowed
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Refunded | Self::Cancelled)
    }

    /// Whether a dispute may be filed in this state
    pub fn is_disputable(self) -> bool {
        match self {
            Self::PaidHold | Self::Shipped | Self::Delivered => true,
            Self::Pending | Self::Released | Self::Refunded | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::PaidHold => write!(f, "paid_hold"),
            Self::Shipped => write!(f, "shipped"),
            Self::Delivered => write!(f, "delivered"),
            Self::Released => write!(f, "released"),
            Self::Refunded => write!(f, "refunded"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How the buyer intends to pay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    VirtualAccount,
    Wallet,
}

/// An escrow transaction between a buyer and a seller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub product_id: ProductId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    /// Product price snapshotted at creation, whole currency units
    pub amount: u64,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    /// Active dispute blocking release and refund
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen_by: Option<DisputeId>,
    /// Dispute whose resolution forced the terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_by: Option<DisputeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Whether `user_id` is the buyer or the seller
    pub fn involves(&self, user_id: &str) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// The party on the other side from `user_id`
    pub fn counterparty(&self, user_id: &str) -> Option<&UserId> {
        if self.buyer_id == user_id {
            Some(&self.seller_id)
        } else if self.seller_id == user_id {
            Some(&self.buyer_id)
        } else {
            None
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen_by.is_some()
    }
}
