//! Reports against users, products and messages

use chrono::Utc;
use tracing::info;

use super::ledger::{require_admin, require_text};
use crate::catalog::SharedCatalog;
use crate::config::EngineConfig;
use crate::error::{MarketError, MarketResult};
use crate::events::{DomainEvent, Outcome};
use crate::model::{
    new_id, Actor, CaseStatus, Enforcement, ListingStatus, Report, ReportTarget, Role, UserRecord,
};
use crate::store::{Collection, Repository, SharedStore};

/// Input to [`ReportLedger::file`]
#[derive(Debug, Clone)]
pub struct NewReport {
    pub target: ReportTarget,
    pub reason: String,
    pub description: String,
}

/// Owner of report records and of the moderation they trigger
#[derive(Clone)]
pub struct ReportLedger {
    reports: Repository<Report>,
    users: Repository<UserRecord>,
    catalog: SharedCatalog,
    max_retries: u32,
}

impl ReportLedger {
    pub fn new(store: SharedStore, catalog: SharedCatalog, config: &EngineConfig) -> Self {
        Self {
            reports: Repository::new(store.clone(), Collection::Reports),
            users: Repository::new(store, Collection::Users),
            catalog,
            max_retries: config.max_cas_retries,
        }
    }

    pub async fn get(&self, report_id: &str) -> MarketResult<Report> {
        Ok(self.reports.require(report_id).await?.value)
    }

    /// Reports about one target, oldest first
    pub async fn for_target(&self, target: &ReportTarget) -> MarketResult<Vec<Report>> {
        let mut reports: Vec<Report> = self
            .reports
            .list()
            .await?
            .into_iter()
            .map(|v| v.value)
            .filter(|r| &r.target == target)
            .collect();
        reports.sort_by_key(|r| r.created_at);
        Ok(reports)
    }

    /// File a report. A reporter may hold one active report per target.
    pub async fn file(&self, request: NewReport, actor: &Actor) -> MarketResult<Outcome<Report>> {
        if actor.role != Role::Member {
            return Err(MarketError::not_authorized(&actor.id, "file_report"));
        }
        require_text(&request.reason, "reason")?;
        require_text(request.target.target_id(), "target id")?;

        match &request.target {
            ReportTarget::User { user_id } if *user_id == actor.id => {
                return Err(MarketError::validation("users cannot report themselves"));
            }
            ReportTarget::Product { product_id } => {
                if self.catalog.get_product(product_id).await?.is_none() {
                    return Err(MarketError::not_found("product", product_id));
                }
            }
            _ => {}
        }

        if let Some(active) = self
            .for_target(&request.target)
            .await?
            .into_iter()
            .find(|r| r.reporter_id == actor.id && r.status.is_active())
        {
            return Err(MarketError::DuplicateActiveReport {
                target: request.target.to_string(),
                report_id: active.id,
            });
        }

        let now = Utc::now();
        let report = Report {
            id: new_id("rpt"),
            reporter_id: actor.id.clone(),
            target: request.target,
            reason: request.reason,
            description: request.description,
            status: CaseStatus::Pending,
            investigation_notes: None,
            resolution: None,
            enforcement: Enforcement::None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            resolved_by: None,
        };
        self.reports.insert(&report.id, &report).await?;

        info!(report_id = %report.id, target = %report.target, "Report filed");
        let event = DomainEvent::ReportFiled {
            report_id: report.id.clone(),
            reporter_id: report.reporter_id.clone(),
            target: report.target.clone(),
            timestamp: now,
        };
        Ok(Outcome::new(report, vec![event]))
    }

    pub async fn investigate(
        &self,
        report_id: &str,
        admin: &Actor,
        notes: Option<String>,
    ) -> MarketResult<Outcome<Report>> {
        require_admin(admin, "investigate_report")?;
        let now = Utc::now();
        let (updated, _) = self
            .reports
            .update(report_id, self.max_retries, |report| {
                if !report.status.can_transition(CaseStatus::Investigating) {
                    return Err(MarketError::invalid_transition(
                        report.status,
                        CaseStatus::Investigating,
                    ));
                }
                let mut next = report.clone();
                next.status = CaseStatus::Investigating;
                next.investigation_notes = notes.clone();
                next.updated_at = now;
                Ok((next, ()))
            })
            .await?;
        let report = updated.value;

        let event = DomainEvent::ReportInvestigating {
            report_id: report.id.clone(),
            target: report.target.clone(),
            admin_id: admin.id.clone(),
            timestamp: now,
        };
        Ok(Outcome::new(report, vec![event]))
    }

    /// Resolve a report and apply `enforcement` to its target.
    ///
    /// `HideProduct` requires a product target and `SuspendUser` a user
    /// target.
    pub async fn resolve(
        &self,
        report_id: &str,
        admin: &Actor,
        resolution: &str,
        enforcement: Enforcement,
    ) -> MarketResult<Outcome<Report>> {
        require_admin(admin, "resolve_report")?;
        require_text(resolution, "resolution")?;

        let target = self.get(report_id).await?.target;
        match (enforcement, &target) {
            (Enforcement::None, _)
            | (Enforcement::HideProduct, ReportTarget::Product { .. })
            | (Enforcement::SuspendUser, ReportTarget::User { .. }) => {}
            (enforcement, target) => {
                return Err(MarketError::validation(format!(
                    "{:?} cannot be applied to a {} report",
                    enforcement,
                    target.target_type()
                )))
            }
        }

        let outcome = self
            .close(report_id, admin, CaseStatus::Resolved, enforcement, resolution)
            .await?;
        let now = Utc::now();

        let enforced = match (&outcome.value.target, enforcement) {
            (ReportTarget::Product { product_id }, Enforcement::HideProduct) => {
                let product = self
                    .catalog
                    .set_product_status(product_id, ListingStatus::Hidden)
                    .await?;
                info!(product_id = %product.id, "Listing hidden");
                Some(DomainEvent::ProductHidden {
                    product_id: product.id,
                    seller_id: product.seller_id,
                    admin_id: admin.id.clone(),
                    reason: resolution.to_string(),
                    timestamp: now,
                })
            }
            (ReportTarget::User { user_id }, Enforcement::SuspendUser) => {
                self.suspend(user_id, resolution).await?;
                info!(user_id = %user_id, "User suspended");
                Some(DomainEvent::UserSuspended {
                    user_id: user_id.clone(),
                    admin_id: admin.id.clone(),
                    reason: resolution.to_string(),
                    timestamp: now,
                })
            }
            _ => None,
        };

        Ok(outcome.with_events(enforced))
    }

    pub async fn dismiss(
        &self,
        report_id: &str,
        admin: &Actor,
        reason: &str,
    ) -> MarketResult<Outcome<Report>> {
        require_admin(admin, "dismiss_report")?;
        require_text(reason, "reason")?;
        self.close(report_id, admin, CaseStatus::Dismissed, Enforcement::None, reason)
            .await
    }

    async fn suspend(&self, user_id: &str, reason: &str) -> MarketResult<()> {
        self.users
            .upsert(
                user_id,
                self.max_retries,
                || UserRecord::new(user_id),
                |user| {
                    let mut next = user.clone();
                    next.suspended = true;
                    next.suspension_reason = Some(reason.to_string());
                    next.updated_at = Utc::now();
                    Ok((next, ()))
                },
            )
            .await?;
        Ok(())
    }

    async fn close(
        &self,
        report_id: &str,
        admin: &Actor,
        to: CaseStatus,
        enforcement: Enforcement,
        resolution: &str,
    ) -> MarketResult<Outcome<Report>> {
        let now = Utc::now();
        let (updated, _) = self
            .reports
            .update(report_id, self.max_retries, |report| {
                if !report.status.can_transition(to) {
                    return Err(MarketError::invalid_transition(report.status, to));
                }
                let mut next = report.clone();
                next.status = to;
                next.enforcement = enforcement;
                next.resolution = Some(resolution.to_string());
                next.resolved_at = Some(now);
                next.resolved_by = Some(admin.id.clone());
                next.updated_at = now;
                Ok((next, ()))
            })
            .await?;
        let report = updated.value;

        let event = if to == CaseStatus::Resolved {
            DomainEvent::ReportResolved {
                report_id: report.id.clone(),
                reporter_id: report.reporter_id.clone(),
                target: report.target.clone(),
                admin_id: admin.id.clone(),
                enforcement,
                timestamp: now,
            }
        } else {
            DomainEvent::ReportDismissed {
                report_id: report.id.clone(),
                reporter_id: report.reporter_id.clone(),
                target: report.target.clone(),
                admin_id: admin.id.clone(),
                timestamp: now,
            }
        };
        Ok(Outcome::new(report, vec![event]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ProductCatalog, StoreCatalog};
    use crate::model::Product;
    use crate::store::MemoryStore;

    async fn setup() -> (ReportLedger, StoreCatalog, Repository<UserRecord>) {
        let store = MemoryStore::new().shared();
        let catalog = StoreCatalog::new(store.clone(), 3);
        catalog
            .list_product(&Product::new("p-1", "seller", "Replica watch", 30_000))
            .await
            .unwrap();
        let ledger = ReportLedger::new(
            store.clone(),
            catalog.clone().shared(),
            &EngineConfig::default(),
        );
        (ledger, catalog, Repository::new(store, Collection::Users))
    }

    fn product_report() -> NewReport {
        NewReport {
            target: ReportTarget::Product {
                product_id: "p-1".into(),
            },
            reason: "counterfeit".into(),
            description: "Logo is wrong".into(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_active_report() {
        let (ledger, _, _) = setup().await;
        let reporter = Actor::member("alice");
        ledger.file(product_report(), &reporter).await.unwrap();

        let err = ledger.file(product_report(), &reporter).await.unwrap_err();
        assert!(matches!(err, MarketError::DuplicateActiveReport { .. }));

        // A different reporter may report the same target
        ledger
            .file(product_report(), &Actor::member("bob"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_hides_product() {
        let (ledger, catalog, _) = setup().await;
        let report = ledger
            .file(product_report(), &Actor::member("alice"))
            .await
            .unwrap()
            .value;

        let resolved = ledger
            .resolve(&report.id, &Actor::admin("ops"), "Confirmed fake", Enforcement::HideProduct)
            .await
            .unwrap();
        let types: Vec<_> = resolved.events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["report_resolved", "product_hidden"]);

        let product = catalog.get_product("p-1").await.unwrap().unwrap();
        assert_eq!(product.status, ListingStatus::Hidden);

        // Resolved reports free the slot for a new one
        ledger
            .file(product_report(), &Actor::member("alice"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_suspends_user() {
        let (ledger, _, users) = setup().await;
        let report = ledger
            .file(
                NewReport {
                    target: ReportTarget::User {
                        user_id: "mallory".into(),
                    },
                    reason: "scam".into(),
                    description: String::new(),
                },
                &Actor::member("alice"),
            )
            .await
            .unwrap()
            .value;

        ledger
            .resolve(&report.id, &Actor::admin("ops"), "Repeated scams", Enforcement::SuspendUser)
            .await
            .unwrap();
        let user = users.require("mallory").await.unwrap().value;
        assert!(user.suspended);
        assert_eq!(user.suspension_reason.as_deref(), Some("Repeated scams"));
    }

    #[tokio::test]
    async fn test_enforcement_must_fit_target() {
        let (ledger, _, _) = setup().await;
        let report = ledger
            .file(product_report(), &Actor::member("alice"))
            .await
            .unwrap()
            .value;
        let err = ledger
            .resolve(&report.id, &Actor::admin("ops"), "x", Enforcement::SuspendUser)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation { .. }));
        assert_eq!(ledger.get(&report.id).await.unwrap().status, CaseStatus::Pending);
    }

    #[tokio::test]
    async fn test_self_report_and_dismiss() {
        let (ledger, _, _) = setup().await;
        let err = ledger
            .file(
                NewReport {
                    target: ReportTarget::User {
                        user_id: "alice".into(),
                    },
                    reason: "test".into(),
                    description: String::new(),
                },
                &Actor::member("alice"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation { .. }));

        let report = ledger
            .file(product_report(), &Actor::member("alice"))
            .await
            .unwrap()
            .value;
        let dismissed = ledger
            .dismiss(&report.id, &Actor::admin("ops"), "Genuine item")
            .await
            .unwrap();
        assert_eq!(dismissed.value.status, CaseStatus::Dismissed);

        let err = ledger
            .investigate(&report.id, &Actor::admin("ops"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }
}
