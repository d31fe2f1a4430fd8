//! Transition table and pure step application.
//!
//! Everything here is a function of the current [`Transaction`] value, so
//! the state machine can re-run it against a fresh read after a version
//! conflict.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::events::DomainEvent;
use crate::model::{Actor, DisputeId, Transaction, TransactionStatus};

/// A requested lifecycle step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Payment captured by the payment provider
    MarkPaid { payment_id: String },
    /// Seller handed the goods to a carrier
    MarkShipped { tracking_number: String },
    /// Carrier or buyer confirmed arrival
    MarkDelivered,
    /// Buyer confirms and funds go to the seller
    Release,
    /// Funds go back to the buyer
    Refund { reason: String },
    /// Abandon before payment
    Cancel,
}

impl Step {
    /// Status this step moves a transaction to
    pub fn target(&self) -> TransactionStatus {
        match self {
            Self::MarkPaid { .. } => TransactionStatus::PaidHold,
            Self::MarkShipped { .. } => TransactionStatus::Shipped,
            Self::MarkDelivered => TransactionStatus::Delivered,
            Self::Release => TransactionStatus::Released,
            Self::Refund { .. } => TransactionStatus::Refunded,
            Self::Cancel => TransactionStatus::Cancelled,
        }
    }

    /// Name used in authorization errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::MarkPaid { .. } => "mark_paid",
            Self::MarkShipped { .. } => "mark_shipped",
            Self::MarkDelivered => "mark_delivered",
            Self::Release => "release",
            Self::Refund { .. } => "refund",
            Self::Cancel => "cancel",
        }
    }

    fn validate(&self) -> MarketResult<()> {
        match self {
            Self::MarkPaid { payment_id } if payment_id.trim().is_empty() => {
                Err(MarketError::validation("payment_id must not be empty"))
            }
            Self::MarkShipped { tracking_number } if tracking_number.trim().is_empty() => {
                Err(MarketError::validation("tracking_number must not be empty"))
            }
            Self::Refund { reason } if reason.trim().is_empty() => {
                Err(MarketError::validation("refund reason must not be empty"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// On whose authority a step runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority<'a> {
    /// A party, admin or integration acting on the normal path
    Direct,
    /// Outcome of resolving the dispute that froze the transaction
    DisputeResolution { dispute_id: &'a str },
}

/// Legal edges of the escrow graph.
///
/// ```text
/// Pending   → PaidHold | Cancelled
/// PaidHold  → Shipped | Refunded
/// Shipped   → Delivered
/// Delivered → Released | Refunded
/// ```
///
/// Dispute resolution additionally allows `Shipped → Released | Refunded`.
pub fn is_legal_transition(
    from: TransactionStatus,
    to: TransactionStatus,
    authority: Authority<'_>,
) -> bool {
    use TransactionStatus::*;

    if from.is_terminal() {
        return false;
    }

    let direct = matches!(
        (from, to),
        (Pending, PaidHold)
            | (Pending, Cancelled)
            | (PaidHold, Shipped)
            | (PaidHold, Refunded)
            | (Shipped, Delivered)
            | (Delivered, Released)
            | (Delivered, Refunded)
    );

    match authority {
        Authority::Direct => direct,
        Authority::DisputeResolution { .. } => {
            matches!((from, to), (Shipped, Released) | (Shipped, Refunded))
                || (direct && matches!(to, Released | Refunded))
        }
    }
}

fn authorize(tx: &Transaction, step: &Step, actor: &Actor) -> MarketResult<()> {
    let is_buyer = actor.is_member(&tx.buyer_id);
    let allowed = match step {
        Step::MarkPaid { .. } | Step::MarkDelivered => is_buyer || actor.is_system(),
        Step::MarkShipped { .. } => actor.is_member(&tx.seller_id),
        Step::Release | Step::Refund { .. } => is_buyer || actor.is_admin(),
        Step::Cancel => is_buyer || actor.is_member(&tx.seller_id) || actor.is_admin(),
    };
    if allowed {
        Ok(())
    } else {
        Err(MarketError::not_authorized(&actor.id, step.name()))
    }
}

/// Apply `step` to `tx`, returning the replacement value and its events.
///
/// Check order: payload validation, authorization, duplicate payment,
/// transition legality, then the dispute freeze.
pub fn apply_step(
    tx: &Transaction,
    step: &Step,
    actor: &Actor,
    authority: Authority<'_>,
    now: DateTime<Utc>,
) -> MarketResult<(Transaction, Vec<DomainEvent>)> {
    step.validate()?;

    let forced_by = match authority {
        Authority::Direct => {
            authorize(tx, step, actor)?;
            None
        }
        Authority::DisputeResolution { dispute_id } => {
            if !actor.is_admin() {
                return Err(MarketError::not_authorized(&actor.id, step.name()));
            }
            if tx.frozen_by.as_deref() != Some(dispute_id) {
                return Err(MarketError::integrity(format!(
                    "transaction {} is not frozen by dispute {}",
                    tx.id, dispute_id
                )));
            }
            Some(dispute_id)
        }
    };

    if let (Step::MarkPaid { .. }, Some(_)) = (step, &tx.payment_id) {
        return Err(MarketError::AlreadyPaid {
            transaction_id: tx.id.clone(),
        });
    }

    let to = step.target();
    if !is_legal_transition(tx.status, to, authority) {
        return Err(MarketError::invalid_transition(tx.status, to));
    }

    if matches!(step, Step::Release | Step::Refund { .. }) && forced_by.is_none() {
        if let Some(dispute_id) = &tx.frozen_by {
            return Err(MarketError::TransactionFrozen {
                transaction_id: tx.id.clone(),
                dispute_id: dispute_id.clone(),
            });
        }
    }

    let mut next = tx.clone();
    next.status = to;
    next.updated_at = now;

    let admin_id = if actor.is_admin() {
        Some(actor.id.clone())
    } else {
        None
    };

    let event = match step {
        Step::MarkPaid { payment_id } => {
            next.payment_id = Some(payment_id.clone());
            DomainEvent::PaymentCaptured {
                transaction_id: tx.id.clone(),
                buyer_id: tx.buyer_id.clone(),
                seller_id: tx.seller_id.clone(),
                payment_id: payment_id.clone(),
                timestamp: now,
            }
        }
        Step::MarkShipped { tracking_number } => {
            next.tracking_number = Some(tracking_number.clone());
            DomainEvent::TransactionShipped {
                transaction_id: tx.id.clone(),
                buyer_id: tx.buyer_id.clone(),
                seller_id: tx.seller_id.clone(),
                tracking_number: tracking_number.clone(),
                timestamp: now,
            }
        }
        Step::MarkDelivered => DomainEvent::TransactionDelivered {
            transaction_id: tx.id.clone(),
            buyer_id: tx.buyer_id.clone(),
            seller_id: tx.seller_id.clone(),
            timestamp: now,
        },
        Step::Release => {
            next.completed_at = Some(now);
            next.frozen_by = None;
            next.settled_by = forced_by.map(String::from);
            DomainEvent::TransactionReleased {
                transaction_id: tx.id.clone(),
                product_id: tx.product_id.clone(),
                buyer_id: tx.buyer_id.clone(),
                seller_id: tx.seller_id.clone(),
                amount: tx.amount,
                admin_id,
                dispute_id: forced_by.map(String::from),
                timestamp: now,
            }
        }
        Step::Refund { reason } => {
            next.refunded_at = Some(now);
            next.refund_reason = Some(reason.clone());
            next.frozen_by = None;
            next.settled_by = forced_by.map(String::from);
            DomainEvent::TransactionRefunded {
                transaction_id: tx.id.clone(),
                product_id: tx.product_id.clone(),
                buyer_id: tx.buyer_id.clone(),
                seller_id: tx.seller_id.clone(),
                amount: tx.amount,
                reason: reason.clone(),
                admin_id,
                dispute_id: forced_by.map(String::from),
                timestamp: now,
            }
        }
        Step::Cancel => DomainEvent::TransactionCancelled {
            transaction_id: tx.id.clone(),
            product_id: tx.product_id.clone(),
            buyer_id: tx.buyer_id.clone(),
            seller_id: tx.seller_id.clone(),
            cancelled_by: actor.id.clone(),
            timestamp: now,
        },
    };

    Ok((next, vec![event]))
}

/// Mark `tx` as frozen by `dispute_id`.
///
/// At most one dispute may hold the freeze; a second one is rejected with
/// `DuplicateActiveDispute`.
pub fn freeze(
    tx: &Transaction,
    dispute_id: &DisputeId,
    now: DateTime<Utc>,
) -> MarketResult<Transaction> {
    if !tx.status.is_disputable() {
        return Err(MarketError::TransactionNotDisputable {
            transaction_id: tx.id.clone(),
            status: tx.status.to_string(),
        });
    }
    if let Some(active) = &tx.frozen_by {
        return Err(MarketError::DuplicateActiveDispute {
            transaction_id: tx.id.clone(),
            dispute_id: active.clone(),
        });
    }
    let mut next = tx.clone();
    next.frozen_by = Some(dispute_id.clone());
    next.updated_at = now;
    Ok(next)
}

/// Lift the freeze held by `dispute_id`. A no-op if another dispute (or
/// none) holds it.
pub fn unfreeze(tx: &Transaction, dispute_id: &str, now: DateTime<Utc>) -> Transaction {
    let mut next = tx.clone();
    if next.frozen_by.as_deref() == Some(dispute_id) {
        next.frozen_by = None;
        next.updated_at = now;
    }
    next
}

/// Rebuild the money-moving event of a released or refunded transaction,
/// for redelivering its reputation effects. The acting admin is not kept
/// on the document, so `admin_id` is always `None`.
pub fn settlement_event(tx: &Transaction) -> Option<DomainEvent> {
    match tx.status {
        TransactionStatus::Released => Some(DomainEvent::TransactionReleased {
            transaction_id: tx.id.clone(),
            product_id: tx.product_id.clone(),
            buyer_id: tx.buyer_id.clone(),
            seller_id: tx.seller_id.clone(),
            amount: tx.amount,
            admin_id: None,
            dispute_id: tx.settled_by.clone(),
            timestamp: tx.completed_at.unwrap_or(tx.updated_at),
        }),
        TransactionStatus::Refunded => Some(DomainEvent::TransactionRefunded {
            transaction_id: tx.id.clone(),
            product_id: tx.product_id.clone(),
            buyer_id: tx.buyer_id.clone(),
            seller_id: tx.seller_id.clone(),
            amount: tx.amount,
            reason: tx.refund_reason.clone().unwrap_or_default(),
            admin_id: None,
            dispute_id: tx.settled_by.clone(),
            timestamp: tx.refunded_at.unwrap_or(tx.updated_at),
        }),
        _ => None,
    }
}
