//! Error types for marketplace core operations
//!
//! Every operation returns [`MarketResult`]. Errors are grouped into the
//! families callers react to differently (see [`ErrorKind`]): guard
//! violations are surfaced verbatim and never retried, concurrency errors
//! are transient, integrity errors indicate a bug.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for marketplace operations
pub type MarketResult<T> = Result<T, MarketError>;

/// Coarse classification of a [`MarketError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, rejected before any guard is evaluated.
    Validation,
    /// Business-rule rejection.
    Guard,
    /// Actor lacks the role or relationship required.
    Authorization,
    /// Optimistic-concurrency retries exhausted.
    Concurrency,
    /// Referenced document does not exist.
    NotFound,
    /// Invariant violated in stored data.
    Integrity,
    /// Underlying document store failed.
    Store,
}

/// Errors that can occur during marketplace operations
#[derive(Error, Debug)]
pub enum MarketError {
    /// Input failed shape validation
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Requested status change is not an edge of the lifecycle graph
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Product listing is not open for purchase
    #[error("Product {product_id} is not available (status: {status})")]
    ProductUnavailable { product_id: String, status: String },

    /// Buyer and seller are the same user
    #[error("User {user_id} cannot trade with themselves")]
    SelfTradeForbidden { user_id: String },

    /// Caller-supplied amount differs from the listed price
    #[error("Price mismatch: listed {listed}, offered {offered}")]
    PriceMismatch { listed: u64, offered: u64 },

    /// Payment was already captured for this transaction
    #[error("Transaction {transaction_id} is already paid")]
    AlreadyPaid { transaction_id: String },

    /// An active dispute blocks release and refund
    #[error("Transaction {transaction_id} is frozen by dispute {dispute_id}")]
    TransactionFrozen {
        transaction_id: String,
        dispute_id: String,
    },

    /// The transaction already has a pending or investigating dispute
    #[error("Transaction {transaction_id} already has active dispute {dispute_id}")]
    DuplicateActiveDispute {
        transaction_id: String,
        dispute_id: String,
    },

    /// The transaction is in a state where nothing can be disputed
    #[error("Transaction {transaction_id} cannot be disputed in status {status}")]
    TransactionNotDisputable {
        transaction_id: String,
        status: String,
    },

    /// The reporter already has an active report on this target
    #[error("Report {report_id} on {target} is still active")]
    DuplicateActiveReport { target: String, report_id: String },

    /// Actor is not allowed to perform the action
    #[error("Actor {actor_id} is not authorized to {action}")]
    NotAuthorized { actor_id: String, action: String },

    /// Referenced document does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Conditional write kept losing to concurrent writers
    #[error("Concurrent modification of {kind} {id} after {attempts} attempts")]
    ConcurrentModification {
        kind: &'static str,
        id: String,
        attempts: u32,
    },

    /// Stored data violates a cross-entity invariant
    #[error("Integrity error: {message}")]
    Integrity { message: String },

    /// Document store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl MarketError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a not-authorized error
    pub fn not_authorized(actor_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self::NotAuthorized {
            actor_id: actor_id.into(),
            action: action.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create an integrity error
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::InvalidTransition { .. }
            | Self::ProductUnavailable { .. }
            | Self::SelfTradeForbidden { .. }
            | Self::PriceMismatch { .. }
            | Self::AlreadyPaid { .. }
            | Self::TransactionFrozen { .. }
            | Self::DuplicateActiveDispute { .. }
            | Self::TransactionNotDisputable { .. }
            | Self::DuplicateActiveReport { .. } => ErrorKind::Guard,
            Self::NotAuthorized { .. } => ErrorKind::Authorization,
            Self::ConcurrentModification { .. } => ErrorKind::Concurrency,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::Store(StoreError::VersionConflict { .. }) => ErrorKind::Concurrency,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// Machine-readable error code (e.g., "INVALID_TRANSITION")
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::ProductUnavailable { .. } => "PRODUCT_UNAVAILABLE",
            Self::SelfTradeForbidden { .. } => "SELF_TRADE_FORBIDDEN",
            Self::PriceMismatch { .. } => "PRICE_MISMATCH",
            Self::AlreadyPaid { .. } => "ALREADY_PAID",
            Self::TransactionFrozen { .. } => "TRANSACTION_FROZEN",
            Self::DuplicateActiveDispute { .. } => "DUPLICATE_ACTIVE_DISPUTE",
            Self::TransactionNotDisputable { .. } => "TRANSACTION_NOT_DISPUTABLE",
            Self::DuplicateActiveReport { .. } => "DUPLICATE_ACTIVE_REPORT",
            Self::NotAuthorized { .. } => "NOT_AUTHORIZED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            Self::Integrity { .. } => "INTEGRITY",
            Self::Store(_) => "STORE",
        }
    }

    /// Whether the caller may retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Concurrency | ErrorKind::Store)
    }
}
