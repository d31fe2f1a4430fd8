//! Dispute lifecycle bound to escrow transactions

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::{MarketError, MarketResult};
use crate::escrow::{settlement_event, Step, TransactionStateMachine};
use crate::events::{DomainEvent, Outcome};
use crate::model::{
    new_id, Actor, CaseStatus, Dispute, Favor, Role, Transaction, TransactionId,
    TransactionStatus,
};
use crate::store::{Collection, Repository, SharedStore};

/// Input to [`DisputeLedger::file`]
#[derive(Debug, Clone)]
pub struct NewDispute {
    pub transaction_id: TransactionId,
    pub reason: String,
    pub description: String,
}

/// What resolving a dispute does to its transaction
#[derive(Debug, Clone, PartialEq, Eq)]
enum Settlement {
    Force(Step),
    Unfreeze,
}

fn settlement(tx: &Transaction, favor: Favor, resolution: &str) -> MarketResult<Settlement> {
    use TransactionStatus::*;
    match (favor, tx.status) {
        (Favor::Buyer, PaidHold | Shipped | Delivered) => Ok(Settlement::Force(Step::Refund {
            reason: resolution.to_string(),
        })),
        (Favor::Seller, Shipped | Delivered) => Ok(Settlement::Force(Step::Release)),
        // Nothing shipped yet: the seller keeps the sale and the freeze lifts
        (Favor::Seller, PaidHold) => Ok(Settlement::Unfreeze),
        (_, status) => Err(MarketError::integrity(format!(
            "disputed transaction {} is in state {}",
            tx.id, status
        ))),
    }
}

/// The event announcing how `dispute` was closed, rebuilt from the record
fn closing_event(dispute: &Dispute) -> MarketResult<DomainEvent> {
    let admin_id = dispute.resolved_by.clone().unwrap_or_default();
    let timestamp = dispute.resolved_at.unwrap_or(dispute.updated_at);
    match (dispute.status, dispute.favor) {
        (CaseStatus::Resolved, Some(favor)) => Ok(DomainEvent::DisputeResolved {
            dispute_id: dispute.id.clone(),
            transaction_id: dispute.transaction_id.clone(),
            reporter_id: dispute.reporter_id.clone(),
            reported_user_id: dispute.reported_user_id.clone(),
            admin_id,
            favor,
            timestamp,
        }),
        (CaseStatus::Dismissed, _) => Ok(DomainEvent::DisputeDismissed {
            dispute_id: dispute.id.clone(),
            transaction_id: dispute.transaction_id.clone(),
            reporter_id: dispute.reporter_id.clone(),
            reported_user_id: dispute.reported_user_id.clone(),
            admin_id,
            timestamp,
        }),
        (status, _) => Err(MarketError::integrity(format!(
            "dispute {} is {} and has no closing event",
            dispute.id, status
        ))),
    }
}

pub(super) fn require_admin(actor: &Actor, action: &str) -> MarketResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(MarketError::not_authorized(&actor.id, action))
    }
}

pub(super) fn require_text(value: &str, field: &str) -> MarketResult<()> {
    if value.trim().is_empty() {
        Err(MarketError::validation(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

/// Owner of dispute records and of the freeze they place on transactions
#[derive(Clone)]
pub struct DisputeLedger {
    disputes: Repository<Dispute>,
    machine: TransactionStateMachine,
    max_retries: u32,
}

impl DisputeLedger {
    pub fn new(store: SharedStore, machine: TransactionStateMachine, config: &EngineConfig) -> Self {
        Self {
            disputes: Repository::new(store, Collection::Disputes),
            machine,
            max_retries: config.max_cas_retries,
        }
    }

    pub async fn get(&self, dispute_id: &str) -> MarketResult<Dispute> {
        Ok(self.disputes.require(dispute_id).await?.value)
    }

    /// All disputes ever filed against a transaction
    pub async fn for_transaction(&self, transaction_id: &str) -> MarketResult<Vec<Dispute>> {
        let mut disputes: Vec<Dispute> = self
            .disputes
            .list()
            .await?
            .into_iter()
            .map(|v| v.value)
            .filter(|d| d.transaction_id == transaction_id)
            .collect();
        disputes.sort_by_key(|d| d.created_at);
        Ok(disputes)
    }

    /// Disputes awaiting an admin
    pub async fn active(&self) -> MarketResult<Vec<Dispute>> {
        Ok(self
            .disputes
            .list()
            .await?
            .into_iter()
            .map(|v| v.value)
            .filter(|d| d.status.is_active())
            .collect())
    }

    /// File a dispute and freeze the transaction.
    ///
    /// The reporter must be the buyer or the seller; the other party
    /// becomes the reported user.
    pub async fn file(&self, request: NewDispute, actor: &Actor) -> MarketResult<Outcome<Dispute>> {
        require_text(&request.reason, "reason")?;
        require_text(&request.description, "description")?;

        let tx = self.machine.get(&request.transaction_id).await?;
        let reported_user_id = match tx.counterparty(&actor.id) {
            Some(other) if actor.role == Role::Member => other.clone(),
            _ => return Err(MarketError::not_authorized(&actor.id, "file_dispute")),
        };

        let dispute_id = new_id("dsp");
        // The freeze is the uniqueness check: only one dispute can hold it
        self.machine.freeze(&tx.id, &dispute_id).await?;

        let now = Utc::now();
        let dispute = Dispute {
            id: dispute_id,
            transaction_id: tx.id.clone(),
            reporter_id: actor.id.clone(),
            reported_user_id,
            reason: request.reason,
            description: request.description,
            status: CaseStatus::Pending,
            investigation_notes: None,
            resolution: None,
            favor: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            resolved_by: None,
        };

        if let Err(e) = self.disputes.insert(&dispute.id, &dispute).await {
            error!(dispute_id = %dispute.id, error = %e, "Dispute insert failed, lifting freeze");
            if let Err(undo) = self.machine.unfreeze(&tx.id, &dispute.id).await {
                error!(transaction_id = %tx.id, error = %undo, "Failed to lift freeze");
            }
            return Err(e);
        }

        info!(
            dispute_id = %dispute.id,
            transaction_id = %tx.id,
            reporter = %dispute.reporter_id,
            "Dispute filed"
        );
        let event = DomainEvent::DisputeFiled {
            dispute_id: dispute.id.clone(),
            transaction_id: dispute.transaction_id.clone(),
            reporter_id: dispute.reporter_id.clone(),
            reported_user_id: dispute.reported_user_id.clone(),
            timestamp: now,
        };
        Ok(Outcome::new(dispute, vec![event]))
    }

    /// Move a pending dispute to `investigating`
    pub async fn investigate(
        &self,
        dispute_id: &str,
        admin: &Actor,
        notes: Option<String>,
    ) -> MarketResult<Outcome<Dispute>> {
        require_admin(admin, "investigate_dispute")?;
        let now = Utc::now();
        let (updated, _) = self
            .disputes
            .update(dispute_id, self.max_retries, |dispute| {
                if !dispute.status.can_transition(CaseStatus::Investigating) {
                    return Err(MarketError::invalid_transition(
                        dispute.status,
                        CaseStatus::Investigating,
                    ));
                }
                let mut next = dispute.clone();
                next.status = CaseStatus::Investigating;
                next.investigation_notes = notes.clone();
                next.updated_at = now;
                Ok((next, ()))
            })
            .await?;
        let dispute = updated.value;

        let event = DomainEvent::DisputeInvestigating {
            dispute_id: dispute.id.clone(),
            transaction_id: dispute.transaction_id.clone(),
            admin_id: admin.id.clone(),
            timestamp: now,
        };
        Ok(Outcome::new(dispute, vec![event]))
    }

    /// Resolve a dispute in favor of one party and settle its transaction.
    ///
    /// The dispute write commits first and its `DisputeResolved` event is
    /// returned even when settling the transaction then fails. The
    /// transaction stays frozen in that case (see
    /// [`DisputeLedger::settlement_pending`]) and calling `resolve` again
    /// with the same favor completes it. Calling it on a dispute that is
    /// already fully settled hands the resolution's reputation events back
    /// as redeliveries and re-checks the listing.
    pub async fn resolve(
        &self,
        dispute_id: &str,
        admin: &Actor,
        favor: Favor,
        resolution: &str,
    ) -> MarketResult<Outcome<Dispute>> {
        require_admin(admin, "resolve_dispute")?;
        require_text(resolution, "resolution")?;

        let current = self.disputes.require(dispute_id).await?.value;
        let outcome = if current.status == CaseStatus::Resolved && current.favor == Some(favor) {
            warn!(dispute_id, "Dispute already resolved, resuming settlement");
            let resolved = closing_event(&current)?;
            Outcome::new(current, Vec::new()).with_redelivery([resolved])
        } else {
            if !current.status.can_transition(CaseStatus::Resolved) {
                return Err(MarketError::invalid_transition(
                    current.status,
                    CaseStatus::Resolved,
                ));
            }
            // Fail before the dispute write if the transaction cannot be settled
            let tx = self.machine.get(&current.transaction_id).await?;
            settlement(&tx, favor, resolution)?;
            self.close(dispute_id, admin, CaseStatus::Resolved, Some(favor), resolution)
                .await?
        };

        match self.settle(&outcome.value, admin, favor, resolution).await {
            Ok((events, redeliver)) => {
                info!(
                    dispute_id,
                    transaction_id = %outcome.value.transaction_id,
                    %favor,
                    "Dispute resolved"
                );
                Ok(outcome.with_events(events).with_redelivery(redeliver))
            }
            Err(e) => {
                error!(
                    dispute_id,
                    transaction_id = %outcome.value.transaction_id,
                    error = %e,
                    "Dispute resolved but transaction settlement failed, resolve again to complete"
                );
                Ok(outcome)
            }
        }
    }

    /// Whether `dispute_id` is resolved but its transaction is still frozen
    /// by it
    pub async fn settlement_pending(&self, dispute_id: &str) -> MarketResult<bool> {
        let dispute = self.get(dispute_id).await?;
        if dispute.status != CaseStatus::Resolved {
            return Ok(false);
        }
        let tx = self.machine.get(&dispute.transaction_id).await?;
        Ok(tx.frozen_by.as_deref() == Some(dispute_id))
    }

    /// Apply a resolved dispute to its transaction. Returns new events and
    /// events to redeliver from an earlier, completed settlement.
    async fn settle(
        &self,
        dispute: &Dispute,
        admin: &Actor,
        favor: Favor,
        resolution: &str,
    ) -> MarketResult<(Vec<DomainEvent>, Vec<DomainEvent>)> {
        let tx = self.machine.get(&dispute.transaction_id).await?;

        if tx.frozen_by.as_deref() == Some(dispute.id.as_str()) {
            let events = match settlement(&tx, favor, resolution)? {
                Settlement::Force(step) => {
                    self.machine
                        .force(&tx.id, step, admin, &dispute.id)
                        .await?
                        .events
                }
                Settlement::Unfreeze => {
                    self.machine.unfreeze(&tx.id, &dispute.id).await?;
                    Vec::new()
                }
            };
            return Ok((events, Vec::new()));
        }

        if tx.settled_by.as_deref() == Some(dispute.id.as_str()) {
            if let Err(e) = self.machine.settle_listing(&tx).await {
                warn!(transaction_id = %tx.id, error = %e, "Listing still not settled");
            }
            return Ok((Vec::new(), settlement_event(&tx).into_iter().collect()));
        }

        // Seller kept an unshipped sale; the freeze already lifted
        Ok((Vec::new(), Vec::new()))
    }

    /// Dismiss a dispute and lift the freeze. The transaction resumes where
    /// it was.
    pub async fn dismiss(
        &self,
        dispute_id: &str,
        admin: &Actor,
        reason: &str,
    ) -> MarketResult<Outcome<Dispute>> {
        require_admin(admin, "dismiss_dispute")?;
        require_text(reason, "reason")?;

        let current = self.disputes.require(dispute_id).await?.value;
        let outcome = if current.status == CaseStatus::Dismissed {
            warn!(dispute_id, "Dispute already dismissed, re-checking freeze");
            Outcome::new(current, Vec::new())
        } else {
            self.close(dispute_id, admin, CaseStatus::Dismissed, None, reason)
                .await?
        };

        self.machine
            .unfreeze(&outcome.value.transaction_id, dispute_id)
            .await?;
        info!(dispute_id, "Dispute dismissed");
        Ok(outcome)
    }

    async fn close(
        &self,
        dispute_id: &str,
        admin: &Actor,
        to: CaseStatus,
        favor: Option<Favor>,
        resolution: &str,
    ) -> MarketResult<Outcome<Dispute>> {
        let now = Utc::now();
        let (updated, _) = self
            .disputes
            .update(dispute_id, self.max_retries, |dispute| {
                if !dispute.status.can_transition(to) {
                    return Err(MarketError::invalid_transition(dispute.status, to));
                }
                let mut next = dispute.clone();
                next.status = to;
                next.favor = favor;
                next.resolution = Some(resolution.to_string());
                next.resolved_at = Some(now);
                next.resolved_by = Some(admin.id.clone());
                next.updated_at = now;
                Ok((next, ()))
            })
            .await?;
        let dispute = updated.value;
        let event = closing_event(&dispute)?;
        Ok(Outcome::new(dispute, vec![event]))
    }
}
