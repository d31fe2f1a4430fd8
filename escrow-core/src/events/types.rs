//! Domain events emitted by marketplace operations
//!
//! Operations never perform side effects beyond their own conditional
//! write; they return these events and the dispatcher turns them into audit
//! records, notifications and bus messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grade::Grade;
use crate::model::{
    DisputeId, Enforcement, Favor, ProductId, ReportId, ReportTarget, TransactionId, UserId,
};

/// All marketplace domain events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A buyer committed to a purchase
    TransactionCreated {
        transaction_id: TransactionId,
        product_id: ProductId,
        buyer_id: UserId,
        seller_id: UserId,
        amount: u64,
        timestamp: DateTime<Utc>,
    },

    /// Payment captured; funds now held in escrow
    PaymentCaptured {
        transaction_id: TransactionId,
        buyer_id: UserId,
        seller_id: UserId,
        payment_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Seller shipped the goods
    TransactionShipped {
        transaction_id: TransactionId,
        buyer_id: UserId,
        seller_id: UserId,
        tracking_number: String,
        timestamp: DateTime<Utc>,
    },

    /// Goods reached the buyer
    TransactionDelivered {
        transaction_id: TransactionId,
        buyer_id: UserId,
        seller_id: UserId,
        timestamp: DateTime<Utc>,
    },

    /// Funds released to the seller
    TransactionReleased {
        transaction_id: TransactionId,
        product_id: ProductId,
        buyer_id: UserId,
        seller_id: UserId,
        amount: u64,
        /// Admin who released, if not the buyer
        admin_id: Option<UserId>,
        /// Dispute whose resolution forced the release
        dispute_id: Option<DisputeId>,
        timestamp: DateTime<Utc>,
    },

    /// Funds returned to the buyer
    TransactionRefunded {
        transaction_id: TransactionId,
        product_id: ProductId,
        buyer_id: UserId,
        seller_id: UserId,
        amount: u64,
        reason: String,
        /// Admin who overrode buyer consent
        admin_id: Option<UserId>,
        /// Dispute whose resolution forced the refund
        dispute_id: Option<DisputeId>,
        timestamp: DateTime<Utc>,
    },

    /// Transaction abandoned before payment
    TransactionCancelled {
        transaction_id: TransactionId,
        product_id: ProductId,
        buyer_id: UserId,
        seller_id: UserId,
        cancelled_by: UserId,
        timestamp: DateTime<Utc>,
    },

    /// A dispute was filed against a transaction
    DisputeFiled {
        dispute_id: DisputeId,
        transaction_id: TransactionId,
        reporter_id: UserId,
        reported_user_id: UserId,
        timestamp: DateTime<Utc>,
    },

    /// An admin started investigating a dispute
    DisputeInvestigating {
        dispute_id: DisputeId,
        transaction_id: TransactionId,
        admin_id: UserId,
        timestamp: DateTime<Utc>,
    },

    /// An admin resolved a dispute
    DisputeResolved {
        dispute_id: DisputeId,
        transaction_id: TransactionId,
        reporter_id: UserId,
        reported_user_id: UserId,
        admin_id: UserId,
        favor: Favor,
        timestamp: DateTime<Utc>,
    },

    /// An admin dismissed a dispute
    DisputeDismissed {
        dispute_id: DisputeId,
        transaction_id: TransactionId,
        reporter_id: UserId,
        reported_user_id: UserId,
        admin_id: UserId,
        timestamp: DateTime<Utc>,
    },

    /// A report was filed
    ReportFiled {
        report_id: ReportId,
        reporter_id: UserId,
        target: ReportTarget,
        timestamp: DateTime<Utc>,
    },

    /// An admin started investigating a report
    ReportInvestigating {
        report_id: ReportId,
        target: ReportTarget,
        admin_id: UserId,
        timestamp: DateTime<Utc>,
    },

    /// An admin resolved a report
    ReportResolved {
        report_id: ReportId,
        reporter_id: UserId,
        target: ReportTarget,
        admin_id: UserId,
        enforcement: Enforcement,
        timestamp: DateTime<Utc>,
    },

    /// An admin dismissed a report
    ReportDismissed {
        report_id: ReportId,
        reporter_id: UserId,
        target: ReportTarget,
        admin_id: UserId,
        timestamp: DateTime<Utc>,
    },

    /// A listing was taken down
    ProductHidden {
        product_id: ProductId,
        seller_id: UserId,
        admin_id: UserId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A user was suspended
    UserSuspended {
        user_id: UserId,
        admin_id: UserId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A counterparty review was recorded
    ReviewSubmitted {
        transaction_id: TransactionId,
        reviewer_id: UserId,
        reviewee_id: UserId,
        score: u8,
        timestamp: DateTime<Utc>,
    },

    /// A user's cached grade changed
    GradeChanged {
        user_id: UserId,
        from: Grade,
        to: Grade,
        timestamp: DateTime<Utc>,
    },

    /// The bulk grade recomputation ran
    GradesRecomputed {
        admin_id: UserId,
        users_scanned: u32,
        users_changed: u32,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::TransactionCreated { timestamp, .. }
            | Self::PaymentCaptured { timestamp, .. }
            | Self::TransactionShipped { timestamp, .. }
            | Self::TransactionDelivered { timestamp, .. }
            | Self::TransactionReleased { timestamp, .. }
            | Self::TransactionRefunded { timestamp, .. }
            | Self::TransactionCancelled { timestamp, .. }
            | Self::DisputeFiled { timestamp, .. }
            | Self::DisputeInvestigating { timestamp, .. }
            | Self::DisputeResolved { timestamp, .. }
            | Self::DisputeDismissed { timestamp, .. }
            | Self::ReportFiled { timestamp, .. }
            | Self::ReportInvestigating { timestamp, .. }
            | Self::ReportResolved { timestamp, .. }
            | Self::ReportDismissed { timestamp, .. }
            | Self::ProductHidden { timestamp, .. }
            | Self::UserSuspended { timestamp, .. }
            | Self::ReviewSubmitted { timestamp, .. }
            | Self::GradeChanged { timestamp, .. }
            | Self::GradesRecomputed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TransactionCreated { .. } => "transaction_created",
            Self::PaymentCaptured { .. } => "payment_captured",
            Self::TransactionShipped { .. } => "transaction_shipped",
            Self::TransactionDelivered { .. } => "transaction_delivered",
            Self::TransactionReleased { .. } => "transaction_released",
            Self::TransactionRefunded { .. } => "transaction_refunded",
            Self::TransactionCancelled { .. } => "transaction_cancelled",
            Self::DisputeFiled { .. } => "dispute_filed",
            Self::DisputeInvestigating { .. } => "dispute_investigating",
            Self::DisputeResolved { .. } => "dispute_resolved",
            Self::DisputeDismissed { .. } => "dispute_dismissed",
            Self::ReportFiled { .. } => "report_filed",
            Self::ReportInvestigating { .. } => "report_investigating",
            Self::ReportResolved { .. } => "report_resolved",
            Self::ReportDismissed { .. } => "report_dismissed",
            Self::ProductHidden { .. } => "product_hidden",
            Self::UserSuspended { .. } => "user_suspended",
            Self::ReviewSubmitted { .. } => "review_submitted",
            Self::GradeChanged { .. } => "grade_changed",
            Self::GradesRecomputed { .. } => "grades_recomputed",
        }
    }

    /// Transaction this event concerns, if any
    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            Self::TransactionCreated { transaction_id, .. }
            | Self::PaymentCaptured { transaction_id, .. }
            | Self::TransactionShipped { transaction_id, .. }
            | Self::TransactionDelivered { transaction_id, .. }
            | Self::TransactionReleased { transaction_id, .. }
            | Self::TransactionRefunded { transaction_id, .. }
            | Self::TransactionCancelled { transaction_id, .. }
            | Self::DisputeFiled { transaction_id, .. }
            | Self::DisputeInvestigating { transaction_id, .. }
            | Self::DisputeResolved { transaction_id, .. }
            | Self::DisputeDismissed { transaction_id, .. }
            | Self::ReviewSubmitted { transaction_id, .. } => Some(transaction_id),
            _ => None,
        }
    }

    /// Users who should be notified of this event
    pub fn recipients(&self) -> Vec<&UserId> {
        match self {
            Self::TransactionCreated { seller_id, .. } => vec![seller_id],
            Self::PaymentCaptured { seller_id, .. } => vec![seller_id],
            Self::TransactionShipped { buyer_id, .. } => vec![buyer_id],
            Self::TransactionDelivered { seller_id, .. } => vec![seller_id],
            Self::TransactionReleased {
                buyer_id, seller_id, ..
            }
            | Self::TransactionRefunded {
                buyer_id, seller_id, ..
            }
            | Self::TransactionCancelled {
                buyer_id, seller_id, ..
            } => vec![buyer_id, seller_id],
            Self::DisputeFiled {
                reported_user_id, ..
            } => vec![reported_user_id],
            Self::DisputeInvestigating { .. } => Vec::new(),
            Self::DisputeResolved {
                reporter_id,
                reported_user_id,
                ..
            }
            | Self::DisputeDismissed {
                reporter_id,
                reported_user_id,
                ..
            } => vec![reporter_id, reported_user_id],
            Self::ReportFiled { .. } | Self::ReportInvestigating { .. } => Vec::new(),
            Self::ReportResolved { reporter_id, .. } | Self::ReportDismissed { reporter_id, .. } => {
                vec![reporter_id]
            }
            Self::ProductHidden { seller_id, .. } => vec![seller_id],
            Self::UserSuspended { user_id, .. } => vec![user_id],
            Self::ReviewSubmitted { reviewee_id, .. } => vec![reviewee_id],
            Self::GradeChanged { user_id, .. } => vec![user_id],
            Self::GradesRecomputed { .. } => Vec::new(),
        }
    }
}

/// The committed result of an operation plus the events it produced
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    /// New facts: applied to reputation and dispatched
    pub events: Vec<DomainEvent>,
    /// Facts already announced whose reputation effects must be applied
    /// again; never dispatched a second time
    pub redeliver: Vec<DomainEvent>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, events: Vec<DomainEvent>) -> Self {
        Self {
            value,
            events,
            redeliver: Vec::new(),
        }
    }

    /// Append events produced by a follow-up write
    pub fn with_events(mut self, events: impl IntoIterator<Item = DomainEvent>) -> Self {
        self.events.extend(events);
        self
    }

    pub fn with_redelivery(mut self, events: impl IntoIterator<Item = DomainEvent>) -> Self {
        self.redeliver.extend(events);
        self
    }
}
