//! Append-only audit log of privileged actions
//!
//! Admin-triggered transitions surface as [`DomainEvent`]s; the dispatcher
//! maps each one through [`AdminAction::from_event`] and appends the result
//! here. Records are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::MarketResult;
use crate::events::DomainEvent;
use crate::model::UserId;
use crate::store::{Collection, Repository, SharedStore};

/// Kind of privileged action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminActionKind {
    InvestigateDispute,
    ResolveDispute,
    DismissDispute,
    /// Release forced by a dispute resolution
    ForceRelease,
    /// Refund forced by a dispute resolution
    ForceRefund,
    /// Admin released funds on the normal path
    AdminRelease,
    /// Admin refunded without buyer consent
    RefundOverride,
    InvestigateReport,
    ResolveReport,
    DismissReport,
    HideProduct,
    SuspendUser,
    RecomputeGrades,
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAction {
    pub id: String,
    pub admin_id: UserId,
    pub action: AdminActionKind,
    pub target_type: String,
    pub target_id: String,
    /// Opaque action-specific payload
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AdminAction {
    /// Create a record stamped now
    pub fn new(
        admin_id: impl Into<UserId>,
        action: AdminActionKind,
        target_type: impl Into<String>,
        target_id: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            // Timestamp prefix keeps store order chronological
            id: format!(
                "{:020}_{}",
                created_at.timestamp_nanos_opt().unwrap_or(0),
                uuid::Uuid::new_v4()
            ),
            admin_id: admin_id.into(),
            action,
            target_type: target_type.into(),
            target_id: target_id.into(),
            details,
            created_at,
        }
    }

    /// The audit record an event implies, if it was admin-triggered
    pub fn from_event(event: &DomainEvent) -> Option<Self> {
        let action = match event {
            DomainEvent::DisputeInvestigating {
                dispute_id,
                transaction_id,
                admin_id,
                ..
            } => Self::new(
                admin_id,
                AdminActionKind::InvestigateDispute,
                "dispute",
                dispute_id,
                json!({ "transaction_id": transaction_id }),
            ),
            DomainEvent::DisputeResolved {
                dispute_id,
                transaction_id,
                reported_user_id,
                admin_id,
                favor,
                ..
            } => Self::new(
                admin_id,
                AdminActionKind::ResolveDispute,
                "dispute",
                dispute_id,
                json!({
                    "transaction_id": transaction_id,
                    "reported_user_id": reported_user_id,
                    "favor": favor,
                }),
            ),
            DomainEvent::DisputeDismissed {
                dispute_id,
                transaction_id,
                admin_id,
                ..
            } => Self::new(
                admin_id,
                AdminActionKind::DismissDispute,
                "dispute",
                dispute_id,
                json!({ "transaction_id": transaction_id }),
            ),
            DomainEvent::TransactionReleased {
                transaction_id,
                amount,
                admin_id: Some(admin_id),
                dispute_id,
                ..
            } => Self::new(
                admin_id,
                if dispute_id.is_some() {
                    AdminActionKind::ForceRelease
                } else {
                    AdminActionKind::AdminRelease
                },
                "transaction",
                transaction_id,
                json!({ "amount": amount, "dispute_id": dispute_id }),
            ),
            DomainEvent::TransactionRefunded {
                transaction_id,
                amount,
                reason,
                admin_id: Some(admin_id),
                dispute_id,
                ..
            } => Self::new(
                admin_id,
                if dispute_id.is_some() {
                    AdminActionKind::ForceRefund
                } else {
                    AdminActionKind::RefundOverride
                },
                "transaction",
                transaction_id,
                json!({ "amount": amount, "reason": reason, "dispute_id": dispute_id }),
            ),
            DomainEvent::ReportInvestigating {
                report_id,
                target,
                admin_id,
                ..
            } => Self::new(
                admin_id,
                AdminActionKind::InvestigateReport,
                "report",
                report_id,
                json!({ "target": target }),
            ),
            DomainEvent::ReportResolved {
                report_id,
                target,
                admin_id,
                enforcement,
                ..
            } => Self::new(
                admin_id,
                AdminActionKind::ResolveReport,
                "report",
                report_id,
                json!({ "target": target, "enforcement": enforcement }),
            ),
            DomainEvent::ReportDismissed {
                report_id,
                target,
                admin_id,
                ..
            } => Self::new(
                admin_id,
                AdminActionKind::DismissReport,
                "report",
                report_id,
                json!({ "target": target }),
            ),
            DomainEvent::ProductHidden {
                product_id,
                admin_id,
                reason,
                ..
            } => Self::new(
                admin_id,
                AdminActionKind::HideProduct,
                "product",
                product_id,
                json!({ "reason": reason }),
            ),
            DomainEvent::UserSuspended {
                user_id,
                admin_id,
                reason,
                ..
            } => Self::new(
                admin_id,
                AdminActionKind::SuspendUser,
                "user",
                user_id,
                json!({ "reason": reason }),
            ),
            DomainEvent::GradesRecomputed {
                admin_id,
                users_scanned,
                users_changed,
                ..
            } => Self::new(
                admin_id,
                AdminActionKind::RecomputeGrades,
                "users",
                "*",
                json!({ "users_scanned": users_scanned, "users_changed": users_changed }),
            ),
            _ => return None,
        };
        Some(action)
    }
}

/// Writes and queries the audit log
#[derive(Clone)]
pub struct AdminActionRecorder {
    actions: Repository<AdminAction>,
}

impl AdminActionRecorder {
    pub fn new(store: SharedStore) -> Self {
        Self {
            actions: Repository::new(store, Collection::AdminActions),
        }
    }

    /// Append a record
    pub async fn record(&self, action: AdminAction) -> MarketResult<AdminAction> {
        self.actions.insert(&action.id, &action).await?;
        info!(
            admin_id = %action.admin_id,
            action = ?action.action,
            target_type = %action.target_type,
            target_id = %action.target_id,
            "Admin action recorded"
        );
        Ok(action)
    }

    /// Every record, oldest first
    pub async fn list(&self) -> MarketResult<Vec<AdminAction>> {
        Ok(self
            .actions
            .list()
            .await?
            .into_iter()
            .map(|v| v.value)
            .collect())
    }

    /// Records about one target, oldest first
    pub async fn for_target(
        &self,
        target_type: &str,
        target_id: &str,
    ) -> MarketResult<Vec<AdminAction>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|a| a.target_type == target_type && a.target_id == target_id)
            .collect())
    }

    /// Records written by one admin, oldest first
    pub async fn by_admin(&self, admin_id: &str) -> MarketResult<Vec<AdminAction>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|a| a.admin_id == admin_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Favor;
    use crate::store::MemoryStore;

    fn resolved(admin: &str) -> DomainEvent {
        DomainEvent::DisputeResolved {
            dispute_id: "d-1".into(),
            transaction_id: "tx-1".into(),
            reporter_id: "buyer".into(),
            reported_user_id: "seller".into(),
            admin_id: admin.into(),
            favor: Favor::Buyer,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_member_events_produce_no_audit_record() {
        let event = DomainEvent::TransactionReleased {
            transaction_id: "tx-1".into(),
            product_id: "p-1".into(),
            buyer_id: "buyer".into(),
            seller_id: "seller".into(),
            amount: 10,
            admin_id: None,
            dispute_id: None,
            timestamp: Utc::now(),
        };
        assert!(AdminAction::from_event(&event).is_none());
    }

    #[test]
    fn test_forced_refund_maps_to_force_refund() {
        let event = DomainEvent::TransactionRefunded {
            transaction_id: "tx-1".into(),
            product_id: "p-1".into(),
            buyer_id: "buyer".into(),
            seller_id: "seller".into(),
            amount: 10,
            reason: "item not as described".into(),
            admin_id: Some("admin".into()),
            dispute_id: Some("d-1".into()),
            timestamp: Utc::now(),
        };
        let action = AdminAction::from_event(&event).unwrap();
        assert_eq!(action.action, AdminActionKind::ForceRefund);
        assert_eq!(action.target_type, "transaction");
        assert_eq!(action.details["dispute_id"], "d-1");
    }

    #[tokio::test]
    async fn test_record_and_query() {
        let recorder = AdminActionRecorder::new(MemoryStore::new().shared());

        let a = AdminAction::from_event(&resolved("admin-1")).unwrap();
        recorder.record(a).await.unwrap();
        let b = AdminAction::from_event(&resolved("admin-2")).unwrap();
        recorder.record(b).await.unwrap();

        assert_eq!(recorder.list().await.unwrap().len(), 2);
        assert_eq!(recorder.by_admin("admin-1").await.unwrap().len(), 1);

        let for_dispute = recorder.for_target("dispute", "d-1").await.unwrap();
        assert_eq!(for_dispute.len(), 2);
        assert!(for_dispute.iter().all(|a| a.details["favor"] == "buyer"));
    }
}
