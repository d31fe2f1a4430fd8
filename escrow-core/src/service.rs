//! Marketplace facade
//!
//! Wires the state machine, ledgers, reputation updater and dispatcher
//! over one document store. Every public operation commits its own write
//! first, then applies reputation effects, then dispatches events.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::audit::AdminActionRecorder;
use crate::catalog::{SharedCatalog, StoreCatalog};
use crate::config::EngineConfig;
use crate::dispute::{DisputeLedger, NewDispute, NewReport, ReportLedger};
use crate::error::{MarketError, MarketResult};
use crate::escrow::{NewTransaction, Step, TransactionStateMachine};
use crate::events::{
    DomainEvent, EventBus, EventDispatcher, EventFilter, FilteredReceiver, Outcome,
};
use crate::grade::{GradeEngine, ProgressReport};
use crate::model::{
    Actor, Dispute, Enforcement, Favor, Report, Review, Role, Transaction, TransactionId,
    TransactionStatus, UserRecord,
};
use crate::notify::{Notifier, TracingNotifier};
use crate::reputation::{RecomputeSummary, ReputationUpdater};
use crate::store::{Collection, Repository, SharedStore, StoreError};

/// Input to [`Marketplace::submit_review`]
#[derive(Debug, Clone)]
pub struct NewReview {
    pub transaction_id: TransactionId,
    /// 1–5
    pub score: u8,
    pub comment: Option<String>,
}

/// Builder for [`Marketplace`]
pub struct MarketplaceBuilder {
    store: SharedStore,
    config: EngineConfig,
    notifier: Arc<dyn Notifier>,
    catalog: Option<SharedCatalog>,
    engine: GradeEngine,
}

impl MarketplaceBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Use an external catalog instead of the store-backed one
    pub fn catalog(mut self, catalog: SharedCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn grade_engine(mut self, engine: GradeEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn build(self) -> Marketplace {
        let config = self.config;
        let store = self.store;
        let catalog = self
            .catalog
            .unwrap_or_else(|| StoreCatalog::new(store.clone(), config.max_cas_retries).shared());

        let machine = TransactionStateMachine::new(store.clone(), catalog.clone(), &config);
        let disputes = DisputeLedger::new(store.clone(), machine.clone(), &config);
        let reports = ReportLedger::new(store.clone(), catalog.clone(), &config);
        let reputation = ReputationUpdater::new(store.clone(), self.engine, &config);
        let bus = EventBus::with_capacity(config.event_channel_capacity).shared();
        let dispatcher =
            EventDispatcher::new(AdminActionRecorder::new(store.clone()), self.notifier, bus);

        let pipeline = CommitPipeline {
            reputation,
            dispatcher,
            retry_attempts: config.reputation_retry_attempts,
            retry_backoff: Duration::from_millis(config.reputation_retry_backoff_ms),
        };

        Marketplace {
            catalog,
            machine,
            disputes,
            reports,
            pipeline,
            reviews: Repository::new(store, Collection::Reviews),
            config,
        }
    }
}

/// Entry point for every marketplace operation
pub struct Marketplace {
    config: EngineConfig,
    catalog: SharedCatalog,
    machine: TransactionStateMachine,
    disputes: DisputeLedger,
    reports: ReportLedger,
    pipeline: CommitPipeline,
    reviews: Repository<Review>,
}

impl Marketplace {
    pub fn builder(store: SharedStore) -> MarketplaceBuilder {
        MarketplaceBuilder {
            store,
            config: EngineConfig::default(),
            notifier: Arc::new(TracingNotifier),
            catalog: None,
            engine: GradeEngine::new(),
        }
    }

    /// Marketplace with the store-backed catalog and the standard grade table
    pub fn new(store: SharedStore, config: EngineConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self::builder(store).config(config).notifier(notifier).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SharedCatalog {
        &self.catalog
    }

    pub fn transactions(&self) -> &TransactionStateMachine {
        &self.machine
    }

    pub fn disputes(&self) -> &DisputeLedger {
        &self.disputes
    }

    pub fn reports(&self) -> &ReportLedger {
        &self.reports
    }

    pub fn reputation(&self) -> &ReputationUpdater {
        &self.pipeline.reputation
    }

    pub fn audit_log(&self) -> &AdminActionRecorder {
        self.pipeline.dispatcher.recorder()
    }

    /// Every event dispatched from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.pipeline.dispatcher.bus().subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        self.pipeline.dispatcher.bus().subscribe_filtered(filter)
    }

    // -- transactions --

    pub async fn create_transaction(
        &self,
        request: NewTransaction,
        actor: &Actor,
    ) -> MarketResult<Transaction> {
        let outcome = self.machine.create(request, actor).await?;
        Ok(self.pipeline.commit(outcome).await)
    }

    pub async fn advance_transaction(
        &self,
        transaction_id: &str,
        step: Step,
        actor: &Actor,
    ) -> MarketResult<Transaction> {
        let outcome = self.machine.advance(transaction_id, step, actor).await?;
        Ok(self.pipeline.commit(outcome).await)
    }

    pub async fn transaction(&self, transaction_id: &str) -> MarketResult<Transaction> {
        self.machine.get(transaction_id).await
    }

    // -- disputes --

    pub async fn file_dispute(&self, request: NewDispute, actor: &Actor) -> MarketResult<Dispute> {
        let outcome = self.disputes.file(request, actor).await?;
        Ok(self.pipeline.commit(outcome).await)
    }

    pub async fn investigate_dispute(
        &self,
        dispute_id: &str,
        admin: &Actor,
        notes: Option<String>,
    ) -> MarketResult<Dispute> {
        let outcome = self.disputes.investigate(dispute_id, admin, notes).await?;
        Ok(self.pipeline.commit(outcome).await)
    }

    pub async fn resolve_dispute(
        &self,
        dispute_id: &str,
        admin: &Actor,
        favor: Favor,
        resolution: &str,
    ) -> MarketResult<Dispute> {
        let outcome = self
            .disputes
            .resolve(dispute_id, admin, favor, resolution)
            .await?;
        let dispute = self.pipeline.commit(outcome).await;

        match self.disputes.settlement_pending(dispute_id).await {
            Ok(false) => {}
            Ok(true) => self.retry_settlement(dispute_id, admin, favor, resolution),
            Err(e) => warn!(dispute_id, error = %e, "Could not check dispute settlement"),
        }
        Ok(dispute)
    }

    pub async fn dismiss_dispute(
        &self,
        dispute_id: &str,
        admin: &Actor,
        reason: &str,
    ) -> MarketResult<Dispute> {
        let outcome = self.disputes.dismiss(dispute_id, admin, reason).await?;
        Ok(self.pipeline.commit(outcome).await)
    }

    // -- reports --

    pub async fn file_report(&self, request: NewReport, actor: &Actor) -> MarketResult<Report> {
        let outcome = self.reports.file(request, actor).await?;
        Ok(self.pipeline.commit(outcome).await)
    }

    pub async fn investigate_report(
        &self,
        report_id: &str,
        admin: &Actor,
        notes: Option<String>,
    ) -> MarketResult<Report> {
        let outcome = self.reports.investigate(report_id, admin, notes).await?;
        Ok(self.pipeline.commit(outcome).await)
    }

    pub async fn resolve_report(
        &self,
        report_id: &str,
        admin: &Actor,
        resolution: &str,
        enforcement: Enforcement,
    ) -> MarketResult<Report> {
        let outcome = self
            .reports
            .resolve(report_id, admin, resolution, enforcement)
            .await?;
        Ok(self.pipeline.commit(outcome).await)
    }

    pub async fn dismiss_report(
        &self,
        report_id: &str,
        admin: &Actor,
        reason: &str,
    ) -> MarketResult<Report> {
        let outcome = self.reports.dismiss(report_id, admin, reason).await?;
        Ok(self.pipeline.commit(outcome).await)
    }

    // -- reputation --

    /// Review the counterparty of a released or refunded transaction
    pub async fn submit_review(&self, request: NewReview, actor: &Actor) -> MarketResult<Review> {
        if !(1..=5).contains(&request.score) {
            return Err(MarketError::validation("score must be between 1 and 5"));
        }
        let tx = self.machine.get(&request.transaction_id).await?;
        let reviewee_id = match tx.counterparty(&actor.id) {
            Some(other) if actor.role == Role::Member => other.clone(),
            _ => return Err(MarketError::not_authorized(&actor.id, "submit_review")),
        };
        if !matches!(
            tx.status,
            TransactionStatus::Released | TransactionStatus::Refunded
        ) {
            return Err(MarketError::validation(format!(
                "transaction {} is {}, reviews open once it is released or refunded",
                tx.id, tx.status
            )));
        }

        let now = Utc::now();
        let review = Review {
            id: Review::key(&tx.id, &actor.id),
            transaction_id: tx.id.clone(),
            reviewer_id: actor.id.clone(),
            reviewee_id,
            score: request.score,
            comment: request.comment,
            created_at: now,
        };
        match self.reviews.insert(&review.id, &review).await {
            Ok(_) => {}
            Err(MarketError::Store(StoreError::AlreadyExists { .. })) => {
                return Err(MarketError::validation(format!(
                    "{} already reviewed transaction {}",
                    actor.id, tx.id
                )))
            }
            Err(e) => return Err(e),
        }

        let event = DomainEvent::ReviewSubmitted {
            transaction_id: review.transaction_id.clone(),
            reviewer_id: review.reviewer_id.clone(),
            reviewee_id: review.reviewee_id.clone(),
            score: review.score,
            timestamp: now,
        };
        Ok(self.pipeline.commit(Outcome::new(review, vec![event])).await)
    }

    pub async fn user(&self, user_id: &str) -> MarketResult<UserRecord> {
        self.pipeline.reputation.user(user_id).await
    }

    pub async fn get_user_progress(&self, user_id: &str) -> MarketResult<ProgressReport> {
        self.pipeline.reputation.progress(user_id).await
    }

    /// Re-derive every cached grade (admin only)
    pub async fn recompute_all_grades(&self, admin: &Actor) -> MarketResult<RecomputeSummary> {
        if !admin.is_admin() {
            return Err(MarketError::not_authorized(&admin.id, "recompute_grades"));
        }
        let summary = self.pipeline.reputation.recompute_all().await?;

        let mut events = summary.events.clone();
        events.push(DomainEvent::GradesRecomputed {
            admin_id: admin.id.clone(),
            users_scanned: summary.users_scanned,
            users_changed: summary.users_changed,
            timestamp: Utc::now(),
        });
        self.pipeline.dispatcher.dispatch(&events).await;
        Ok(summary)
    }

    /// Keep resolving `dispute_id` in the background until its
    /// transaction is settled
    fn retry_settlement(&self, dispute_id: &str, admin: &Actor, favor: Favor, resolution: &str) {
        let disputes = self.disputes.clone();
        let pipeline = self.pipeline.clone();
        let dispute_id = dispute_id.to_string();
        let admin = admin.clone();
        let resolution = resolution.to_string();

        tokio::spawn(async move {
            let mut delay = pipeline.retry_backoff;
            for attempt in 1..=pipeline.retry_attempts.max(1) {
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);

                match disputes.resolve(&dispute_id, &admin, favor, &resolution).await {
                    Ok(outcome) => {
                        pipeline.commit(outcome).await;
                    }
                    Err(e) => {
                        warn!(
                            dispute_id = %dispute_id,
                            attempt,
                            error = %e,
                            "Settlement retry failed"
                        );
                        continue;
                    }
                }
                match disputes.settlement_pending(&dispute_id).await {
                    Ok(false) => {
                        info!(
                            dispute_id = %dispute_id,
                            attempt,
                            "Deferred dispute settlement completed"
                        );
                        return;
                    }
                    Ok(true) => {
                        warn!(dispute_id = %dispute_id, attempt, "Dispute settlement still pending")
                    }
                    Err(e) => warn!(
                        dispute_id = %dispute_id,
                        attempt,
                        error = %e,
                        "Settlement retry failed"
                    ),
                }
            }
            error!(
                dispute_id = %dispute_id,
                "Dispute settlement abandoned; resolve the dispute again to complete it"
            );
        });
    }
}

/// Post-commit work shared by request handlers and background retries:
/// reputation first, then dispatch
#[derive(Clone)]
struct CommitPipeline {
    reputation: ReputationUpdater,
    dispatcher: EventDispatcher,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl CommitPipeline {
    /// Redelivered events reach reputation only; they were dispatched when
    /// first committed
    async fn commit<T>(&self, outcome: Outcome<T>) -> T {
        let Outcome {
            value,
            mut events,
            redeliver,
        } = outcome;

        let mut grade_changes = Vec::new();
        for event in events.iter().chain(&redeliver) {
            match self.reputation.handle(event).await {
                Ok(changes) => grade_changes.extend(changes),
                Err(e) => {
                    warn!(
                        event_type = event.event_type(),
                        error = %e,
                        "Reputation update failed, retrying in background"
                    );
                    self.retry_reputation(event.clone());
                }
            }
        }
        events.extend(grade_changes);

        let report = self.dispatcher.dispatch(&events).await;
        if report.audit_failures > 0 {
            warn!(failures = report.audit_failures, "Some admin actions were not audited");
        }
        value
    }

    fn retry_reputation(&self, event: DomainEvent) {
        let reputation = self.reputation.clone();
        let dispatcher = self.dispatcher.clone();
        let attempts = self.retry_attempts;
        let backoff = self.retry_backoff;

        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            match reputation.handle_with_retry(&event, attempts, backoff).await {
                Ok(changes) => {
                    info!(event_type = event.event_type(), "Deferred reputation update applied");
                    dispatcher.dispatch(&changes).await;
                }
                Err(e) => error!(
                    event_type = event.event_type(),
                    error = %e,
                    "Reputation update abandoned; recompute_all_grades rebuilds it"
                ),
            }
        });
    }
}
