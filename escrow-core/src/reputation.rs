//! Reputation updates driven by committed domain events
//!
//! The updater is the only writer of [`UserStats`]. Each contribution is
//! keyed by the event that caused it (`released:<tx>`, `refunded:<tx>`,
//! `dispute:<id>`, `review:<tx>:<reviewer>`) and the key is stored on the
//! user record in the same conditional write as the increment, so a
//! redelivered event is a no-op.
//!
//! Keys are kept for the configured retention window only. Events older
//! than the window are not applied inline; [`ReputationUpdater::recompute_all`]
//! rebuilds statistics from the transaction, dispute and review records and
//! so also repairs increments whose background retry gave up.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::MarketResult;
use crate::events::DomainEvent;
use crate::grade::{Grade, GradeEngine, ProgressReport};
use crate::model::{
    CaseStatus, Dispute, Review, Transaction, TransactionStatus, UserId, UserRecord, UserStats,
};
use crate::store::{Collection, Repository, SharedStore};

/// Result of [`ReputationUpdater::recompute_all`]
#[derive(Debug, Clone, Default)]
pub struct RecomputeSummary {
    pub users_scanned: u32,
    pub users_changed: u32,
    /// Users whose stored statistics disagreed with their history
    pub stats_repaired: u32,
    /// One `GradeChanged` per changed user
    pub events: Vec<DomainEvent>,
}

/// Statistics and event keys one user should have, per the records
#[derive(Debug, Clone, Default)]
struct Derived {
    stats: UserStats,
    keys: BTreeMap<String, DateTime<Utc>>,
}

struct History {
    horizon: DateTime<Utc>,
    users: BTreeMap<UserId, Derived>,
}

impl History {
    fn credit(
        &mut self,
        user_id: &str,
        key: &str,
        at: DateTime<Utc>,
        mutate: impl FnOnce(&mut UserStats),
    ) {
        let entry = self.users.entry(user_id.to_string()).or_default();
        mutate(&mut entry.stats);
        if at >= self.horizon {
            entry.keys.insert(key.to_string(), at);
        }
    }
}

/// Folds trading outcomes into user statistics and keeps the cached grade
/// in step with them
#[derive(Clone)]
pub struct ReputationUpdater {
    users: Repository<UserRecord>,
    transactions: Repository<Transaction>,
    disputes: Repository<Dispute>,
    reviews: Repository<Review>,
    engine: GradeEngine,
    max_retries: u32,
    retention: chrono::Duration,
}

impl ReputationUpdater {
    pub fn new(store: SharedStore, engine: GradeEngine, config: &EngineConfig) -> Self {
        Self {
            users: Repository::new(store.clone(), Collection::Users),
            transactions: Repository::new(store.clone(), Collection::Transactions),
            disputes: Repository::new(store.clone(), Collection::Disputes),
            reviews: Repository::new(store, Collection::Reviews),
            engine,
            max_retries: config.max_cas_retries,
            retention: config.retention(),
        }
    }

    pub fn engine(&self) -> &GradeEngine {
        &self.engine
    }

    /// A user's record; users without history get a fresh default
    pub async fn user(&self, user_id: &str) -> MarketResult<UserRecord> {
        Ok(self
            .users
            .get(user_id)
            .await?
            .map(|v| v.value)
            .unwrap_or_else(|| UserRecord::new(user_id)))
    }

    /// Grade progress computed from stored statistics
    pub async fn progress(&self, user_id: &str) -> MarketResult<ProgressReport> {
        let user = self.user(user_id).await?;
        Ok(self.engine.progress(&user.stats))
    }

    /// Apply the reputation effect of one event, returning any
    /// `GradeChanged` events it caused
    pub async fn handle(&self, event: &DomainEvent) -> MarketResult<Vec<DomainEvent>> {
        let at = event.timestamp();
        match event {
            DomainEvent::TransactionReleased {
                transaction_id,
                buyer_id,
                seller_id,
                ..
            } => self.released(transaction_id, buyer_id, seller_id, at).await,
            DomainEvent::TransactionRefunded {
                transaction_id,
                buyer_id,
                seller_id,
                ..
            } => self.refunded(transaction_id, buyer_id, seller_id, at).await,
            DomainEvent::TransactionCancelled { transaction_id, .. } => {
                debug!(transaction_id, "No reputation effect");
                Ok(Vec::new())
            }
            DomainEvent::DisputeResolved {
                dispute_id,
                reported_user_id,
                ..
            } => self.dispute_resolved(dispute_id, reported_user_id, at).await,
            DomainEvent::ReviewSubmitted {
                transaction_id,
                reviewer_id,
                reviewee_id,
                score,
                ..
            } => {
                self.review_submitted(transaction_id, reviewer_id, reviewee_id, *score, at)
                    .await
            }
            _ => Ok(Vec::new()),
        }
    }

    /// [`ReputationUpdater::handle`] with doubling backoff between attempts
    pub async fn handle_with_retry(
        &self,
        event: &DomainEvent,
        attempts: u32,
        initial_backoff: Duration,
    ) -> MarketResult<Vec<DomainEvent>> {
        let mut delay = initial_backoff;
        let mut attempt = 1;
        loop {
            match self.handle(event).await {
                Ok(changes) => return Ok(changes),
                Err(e) if attempt < attempts.max(1) => {
                    warn!(
                        event_type = event.event_type(),
                        attempt,
                        error = %e,
                        "Reputation update failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Seller gains a safe transaction; both parties gain a trade
    pub async fn on_transaction_released(
        &self,
        transaction_id: &str,
        buyer_id: &str,
        seller_id: &str,
    ) -> MarketResult<Vec<DomainEvent>> {
        self.released(transaction_id, buyer_id, seller_id, Utc::now())
            .await
    }

    /// A refund counts as a finished trade for both parties; a cancellation
    /// happened before any money moved and counts for nothing
    pub async fn on_transaction_refunded_or_cancelled(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
        buyer_id: &str,
        seller_id: &str,
    ) -> MarketResult<Vec<DomainEvent>> {
        if status != TransactionStatus::Refunded {
            debug!(transaction_id, %status, "No reputation effect");
            return Ok(Vec::new());
        }
        self.refunded(transaction_id, buyer_id, seller_id, Utc::now())
            .await
    }

    /// The party a dispute was resolved against loses dispute-free status
    pub async fn on_dispute_resolved(
        &self,
        dispute_id: &str,
        reported_user_id: &str,
    ) -> MarketResult<Vec<DomainEvent>> {
        self.dispute_resolved(dispute_id, reported_user_id, Utc::now())
            .await
    }

    /// Fold a review score into the reviewee's average rating
    pub async fn on_review_submitted(
        &self,
        transaction_id: &str,
        reviewer_id: &str,
        reviewee_id: &str,
        score: u8,
    ) -> MarketResult<Vec<DomainEvent>> {
        self.review_submitted(transaction_id, reviewer_id, reviewee_id, score, Utc::now())
            .await
    }

    async fn released(
        &self,
        transaction_id: &str,
        buyer_id: &str,
        seller_id: &str,
        at: DateTime<Utc>,
    ) -> MarketResult<Vec<DomainEvent>> {
        let key = released_key(transaction_id);
        let mut changes = Vec::new();
        changes.extend(
            self.apply(seller_id, &key, at, |stats| {
                stats.safe_transaction_count += 1;
                stats.total_trades += 1;
            })
            .await?,
        );
        changes.extend(
            self.apply(buyer_id, &key, at, |stats| stats.total_trades += 1)
                .await?,
        );
        Ok(changes)
    }

    async fn refunded(
        &self,
        transaction_id: &str,
        buyer_id: &str,
        seller_id: &str,
        at: DateTime<Utc>,
    ) -> MarketResult<Vec<DomainEvent>> {
        let key = refunded_key(transaction_id);
        let mut changes = Vec::new();
        for user_id in [seller_id, buyer_id] {
            changes.extend(
                self.apply(user_id, &key, at, |stats| stats.total_trades += 1)
                    .await?,
            );
        }
        Ok(changes)
    }

    async fn dispute_resolved(
        &self,
        dispute_id: &str,
        reported_user_id: &str,
        at: DateTime<Utc>,
    ) -> MarketResult<Vec<DomainEvent>> {
        Ok(self
            .apply(reported_user_id, &dispute_key(dispute_id), at, |stats| {
                stats.dispute_count += 1
            })
            .await?
            .into_iter()
            .collect())
    }

    async fn review_submitted(
        &self,
        transaction_id: &str,
        reviewer_id: &str,
        reviewee_id: &str,
        score: u8,
        at: DateTime<Utc>,
    ) -> MarketResult<Vec<DomainEvent>> {
        let key = review_key(transaction_id, reviewer_id);
        Ok(self
            .apply(reviewee_id, &key, at, |stats| stats.record_review(score))
            .await?
            .into_iter()
            .collect())
    }

    /// Rebuild every user's statistics from the transaction, dispute and
    /// review records, then re-derive the cached grade.
    ///
    /// Repairs drift after a grade table change, an abandoned update or an
    /// event that aged out of the retention window. A user whose record
    /// carries a key the scan did not see was updated after the scan read
    /// the records; that user keeps its statistics until the next run.
    /// Running it twice in a row changes nothing the second time.
    pub async fn recompute_all(&self) -> MarketResult<RecomputeSummary> {
        let horizon = Utc::now() - self.retention;
        let history = self.history(horizon).await?;

        let mut ids: BTreeSet<UserId> = self
            .users
            .list()
            .await?
            .into_iter()
            .map(|v| v.id)
            .collect();
        ids.extend(history.keys().cloned());

        let empty = Derived::default();
        let mut summary = RecomputeSummary::default();
        for user_id in ids {
            summary.users_scanned += 1;
            let derived = history.get(&user_id).unwrap_or(&empty);

            let current = self.user(&user_id).await?;
            if reconcile(&current, derived, horizon, &self.engine).is_none() {
                continue;
            }

            let engine = &self.engine;
            let (_, outcome) = self
                .users
                .upsert(
                    &user_id,
                    self.max_retries,
                    || UserRecord::new(user_id.as_str()),
                    |current| {
                        Ok(match reconcile(current, derived, horizon, engine) {
                            Some((next, outcome)) => (next, outcome),
                            None => (current.clone(), (false, None)),
                        })
                    },
                )
                .await?;

            let (repaired, change) = outcome;
            if repaired {
                warn!(user_id = %user_id, "User statistics rebuilt from history");
                summary.stats_repaired += 1;
            }
            if let Some((from, to)) = change {
                summary.users_changed += 1;
                summary.events.push(grade_changed(&user_id, from, to));
            }
        }
        info!(
            users_scanned = summary.users_scanned,
            users_changed = summary.users_changed,
            stats_repaired = summary.stats_repaired,
            "Grades recomputed"
        );
        Ok(summary)
    }

    /// What every user's statistics should be, derived from the records
    async fn history(&self, horizon: DateTime<Utc>) -> MarketResult<BTreeMap<UserId, Derived>> {
        let mut history = History {
            horizon,
            users: BTreeMap::new(),
        };

        for tx in self.transactions.list().await? {
            let tx = tx.value;
            match tx.status {
                TransactionStatus::Released => {
                    let key = released_key(&tx.id);
                    let at = tx.completed_at.unwrap_or(tx.updated_at);
                    history.credit(&tx.seller_id, &key, at, |stats| {
                        stats.safe_transaction_count += 1;
                        stats.total_trades += 1;
                    });
                    history.credit(&tx.buyer_id, &key, at, |stats| stats.total_trades += 1);
                }
                TransactionStatus::Refunded => {
                    let key = refunded_key(&tx.id);
                    let at = tx.refunded_at.unwrap_or(tx.updated_at);
                    for user_id in [&tx.seller_id, &tx.buyer_id] {
                        history.credit(user_id, &key, at, |stats| stats.total_trades += 1);
                    }
                }
                _ => {}
            }
        }

        for dispute in self.disputes.list().await? {
            let dispute = dispute.value;
            if dispute.status == CaseStatus::Resolved {
                let at = dispute.resolved_at.unwrap_or(dispute.updated_at);
                history.credit(
                    &dispute.reported_user_id,
                    &dispute_key(&dispute.id),
                    at,
                    |stats| stats.dispute_count += 1,
                );
            }
        }

        // The running mean is order sensitive
        let mut reviews: Vec<Review> = self
            .reviews
            .list()
            .await?
            .into_iter()
            .map(|v| v.value)
            .collect();
        reviews.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        for review in reviews {
            let key = review_key(&review.transaction_id, &review.reviewer_id);
            history.credit(&review.reviewee_id, &key, review.created_at, |stats| {
                stats.record_review(review.score)
            });
        }

        Ok(history.users)
    }

    /// Conditionally apply `mutate` under idempotency `key` and refresh the
    /// cached grade in the same write
    async fn apply<F>(
        &self,
        user_id: &str,
        key: &str,
        at: DateTime<Utc>,
        mutate: F,
    ) -> MarketResult<Option<DomainEvent>>
    where
        F: Fn(&mut UserStats),
    {
        let horizon = Utc::now() - self.retention;
        if at < horizon {
            warn!(user_id, key, "Reputation event older than retention window, left to recompute");
            return Ok(None);
        }

        if let Some(existing) = self.users.get(user_id).await? {
            if existing.value.has_applied(key) {
                debug!(user_id, key, "Reputation event already applied");
                return Ok(None);
            }
        }

        let engine = &self.engine;
        let (_, change) = self
            .users
            .upsert(
                user_id,
                self.max_retries,
                || UserRecord::new(user_id),
                |user| {
                    if user.has_applied(key) {
                        return Ok((user.clone(), None));
                    }
                    let mut next = user.clone();
                    mutate(&mut next.stats);
                    next.mark_applied(key, at);
                    next.prune_applied(horizon);
                    let grade = engine.compute(&next.stats);
                    let change = (grade != user.grade).then_some((user.grade, grade));
                    next.grade = grade;
                    next.updated_at = Utc::now();
                    Ok((next, change))
                },
            )
            .await?;

        Ok(change.map(|(from, to)| {
            info!(user_id, %from, %to, "Grade changed");
            grade_changed(user_id, from, to)
        }))
    }
}

/// The record `current` should become to agree with `derived`, plus
/// whether its statistics were rebuilt and any grade change; `None` when it
/// already agrees. Keys newer than the scan mean the record moved after the
/// history was read, so its statistics are left alone.
fn reconcile(
    current: &UserRecord,
    derived: &Derived,
    horizon: DateTime<Utc>,
    engine: &GradeEngine,
) -> Option<(UserRecord, (bool, Option<(Grade, Grade)>))> {
    let mut next = current.clone();
    let moved = current
        .applied_events
        .iter()
        .any(|(key, at)| *at >= horizon && !derived.keys.contains_key(key));
    let repaired = !moved && !current.stats.same_as(&derived.stats);
    if repaired {
        next.stats = derived.stats.clone();
        next.applied_events = derived.keys.clone();
    } else if moved {
        debug!(user_id = %current.id, "User record moved since the scan, stats kept");
    }
    let pruned = next.prune_applied(horizon);

    let grade = engine.compute(&next.stats);
    let change = (grade != current.grade).then_some((current.grade, grade));
    if !repaired && change.is_none() && pruned == 0 {
        return None;
    }
    next.grade = grade;
    next.updated_at = Utc::now();
    Some((next, (repaired, change)))
}

fn released_key(transaction_id: &str) -> String {
    format!("released:{}", transaction_id)
}

fn refunded_key(transaction_id: &str) -> String {
    format!("refunded:{}", transaction_id)
}

fn dispute_key(dispute_id: &str) -> String {
    format!("dispute:{}", dispute_id)
}

fn review_key(transaction_id: &str, reviewer_id: &str) -> String {
    format!("review:{}:{}", transaction_id, reviewer_id)
}

fn grade_changed(user_id: &str, from: Grade, to: Grade) -> DomainEvent {
    DomainEvent::GradeChanged {
        user_id: user_id.to_string(),
        from,
        to,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn updater() -> ReputationUpdater {
        ReputationUpdater::new(
            MemoryStore::new().shared(),
            GradeEngine::new(),
            &EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_release_counts_once() {
        let updater = updater();
        updater
            .on_transaction_released("tx-1", "buyer", "seller")
            .await
            .unwrap();
        updater
            .on_transaction_released("tx-1", "buyer", "seller")
            .await
            .unwrap();

        let seller = updater.user("seller").await.unwrap();
        assert_eq!(seller.stats.safe_transaction_count, 1);
        assert_eq!(seller.stats.total_trades, 1);
        let buyer = updater.user("buyer").await.unwrap();
        assert_eq!(buyer.stats.safe_transaction_count, 0);
        assert_eq!(buyer.stats.total_trades, 1);
    }

    #[tokio::test]
    async fn test_cancel_has_no_effect_refund_counts_trade() {
        let updater = updater();
        updater
            .on_transaction_refunded_or_cancelled(
                "tx-1",
                TransactionStatus::Cancelled,
                "buyer",
                "seller",
            )
            .await
            .unwrap();
        assert_eq!(updater.user("seller").await.unwrap().stats.total_trades, 0);

        updater
            .on_transaction_refunded_or_cancelled(
                "tx-2",
                TransactionStatus::Refunded,
                "buyer",
                "seller",
            )
            .await
            .unwrap();
        let seller = updater.user("seller").await.unwrap();
        assert_eq!(seller.stats.total_trades, 1);
        assert_eq!(seller.stats.safe_transaction_count, 0);
    }

    #[tokio::test]
    async fn test_grade_change_event() {
        let updater = updater();
        // Five safe sales with a good rating reach D
        for i in 0..5 {
            let tx = format!("tx-{}", i);
            updater
                .on_review_submitted(&tx, "buyer", "seller", if i % 2 == 0 { 5 } else { 4 })
                .await
                .unwrap();
            let changes = updater
                .on_transaction_released(&tx, "buyer", "seller")
                .await
                .unwrap();
            if i < 4 {
                assert!(changes.is_empty());
            } else {
                assert!(matches!(
                    &changes[..],
                    [DomainEvent::GradeChanged { from: Grade::C, to: Grade::D, .. }]
                ));
            }
        }
        assert_eq!(updater.user("seller").await.unwrap().grade, Grade::D);
    }

    #[tokio::test]
    async fn test_dispute_drops_grade() {
        let updater = updater();
        for i in 0..5 {
            let tx = format!("tx-{}", i);
            updater
                .on_review_submitted(&tx, "buyer", "seller", 5)
                .await
                .unwrap();
            updater
                .on_transaction_released(&tx, "buyer", "seller")
                .await
                .unwrap();
        }
        let changes = updater.on_dispute_resolved("d-1", "seller").await.unwrap();
        assert!(matches!(
            &changes[..],
            [DomainEvent::GradeChanged { from: Grade::D, to: Grade::C, .. }]
        ));
        // Redelivery is a no-op
        assert!(updater
            .on_dispute_resolved("d-1", "seller")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(updater.user("seller").await.unwrap().stats.dispute_count, 1);
    }

    #[tokio::test]
    async fn test_handle_routes_events() {
        let updater = updater();
        let event = DomainEvent::TransactionRefunded {
            transaction_id: "tx-9".into(),
            product_id: "p".into(),
            buyer_id: "buyer".into(),
            seller_id: "seller".into(),
            amount: 10,
            reason: "broken".into(),
            admin_id: None,
            dispute_id: None,
            timestamp: Utc::now(),
        };
        updater
            .handle_with_retry(&event, 3, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(updater.user("buyer").await.unwrap().stats.total_trades, 1);
        assert!(updater
            .user("buyer")
            .await
            .unwrap()
            .has_applied("refunded:tx-9"));
    }

    fn released_tx(id: &str, buyer: &str, seller: &str) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: id.into(),
            product_id: format!("p-{}", id),
            buyer_id: buyer.into(),
            seller_id: seller.into(),
            amount: 10_000,
            payment_method: crate::model::PaymentMethod::Card,
            status: TransactionStatus::Released,
            payment_id: None,
            tracking_number: None,
            frozen_by: None,
            settled_by: None,
            refund_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
            refunded_at: None,
        }
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let store = MemoryStore::new().shared();
        let users: Repository<UserRecord> = Repository::new(store.clone(), Collection::Users);

        // Cached grade drifted from stats that match the (empty) history
        let mut drifted = UserRecord::new("u-1");
        drifted.grade = Grade::E;
        users.insert("u-1", &drifted).await.unwrap();
        users.insert("u-2", &UserRecord::new("u-2")).await.unwrap();

        let updater = ReputationUpdater::new(store, GradeEngine::new(), &EngineConfig::default());
        let first = updater.recompute_all().await.unwrap();
        assert_eq!(first.users_scanned, 2);
        assert_eq!(first.users_changed, 1);
        assert_eq!(first.stats_repaired, 0);
        assert_eq!(updater.user("u-1").await.unwrap().grade, Grade::C);

        let second = updater.recompute_all().await.unwrap();
        assert_eq!(second.users_changed, 0);
        assert!(second.events.is_empty());
    }

    #[tokio::test]
    async fn test_recompute_rebuilds_lost_increments() {
        let store = MemoryStore::new().shared();
        let transactions: Repository<Transaction> =
            Repository::new(store.clone(), Collection::Transactions);
        for i in 0..5 {
            let tx = released_tx(&format!("tx-{}", i), "buyer", "seller");
            transactions.insert(&tx.id, &tx).await.unwrap();
        }
        let reviews: Repository<Review> = Repository::new(store.clone(), Collection::Reviews);
        for i in 0..5 {
            let review = Review {
                id: Review::key(&format!("tx-{}", i), "buyer"),
                transaction_id: format!("tx-{}", i),
                reviewer_id: "buyer".into(),
                reviewee_id: "seller".into(),
                score: 5,
                comment: None,
                created_at: Utc::now(),
            };
            reviews.insert(&review.id, &review).await.unwrap();
        }

        let updater = ReputationUpdater::new(store, GradeEngine::new(), &EngineConfig::default());
        // Only the first sale made it into the stats inline
        updater
            .on_transaction_released("tx-0", "buyer", "seller")
            .await
            .unwrap();

        let summary = updater.recompute_all().await.unwrap();
        assert_eq!(summary.stats_repaired, 2);
        assert!(matches!(
            &summary.events[..],
            [DomainEvent::GradeChanged { user_id, from: Grade::C, to: Grade::D, .. }] if user_id == "seller"
        ));

        let seller = updater.user("seller").await.unwrap();
        assert_eq!(seller.stats.safe_transaction_count, 5);
        assert_eq!(seller.stats.review_count, 5);
        assert!(seller.has_applied("released:tx-4"));
        assert!(seller.has_applied("review:tx-4:buyer"));
        assert_eq!(updater.user("buyer").await.unwrap().stats.total_trades, 5);

        // The rebuilt keys make a late redelivery a no-op
        updater
            .on_transaction_released("tx-3", "buyer", "seller")
            .await
            .unwrap();
        assert_eq!(updater.user("seller").await.unwrap().stats.total_trades, 5);
        assert_eq!(updater.recompute_all().await.unwrap().stats_repaired, 0);
    }

    #[tokio::test]
    async fn test_recompute_keeps_records_newer_than_history() {
        let updater = updater();
        // Applied inline, but no transaction record backs it
        updater
            .on_transaction_released("tx-1", "buyer", "seller")
            .await
            .unwrap();

        let summary = updater.recompute_all().await.unwrap();
        assert_eq!(summary.stats_repaired, 0);
        assert_eq!(
            updater.user("seller").await.unwrap().stats.safe_transaction_count,
            1
        );
    }

    #[tokio::test]
    async fn test_events_outside_retention_are_skipped() {
        let config = EngineConfig {
            applied_event_retention_hours: 24,
            ..EngineConfig::default()
        };
        let updater = ReputationUpdater::new(MemoryStore::new().shared(), GradeEngine::new(), &config);

        let stale = DomainEvent::DisputeResolved {
            dispute_id: "d-old".into(),
            transaction_id: "tx-1".into(),
            reporter_id: "buyer".into(),
            reported_user_id: "seller".into(),
            admin_id: "admin".into(),
            favor: crate::model::Favor::Buyer,
            timestamp: Utc::now() - chrono::Duration::hours(48),
        };
        assert!(updater.handle(&stale).await.unwrap().is_empty());
        assert_eq!(updater.user("seller").await.unwrap().stats.dispute_count, 0);
    }

    #[tokio::test]
    async fn test_old_keys_pruned_on_next_write() {
        let store = MemoryStore::new().shared();
        let users: Repository<UserRecord> = Repository::new(store.clone(), Collection::Users);
        let mut seller = UserRecord::new("seller");
        seller.mark_applied("released:ancient", Utc::now() - chrono::Duration::days(60));
        users.insert("seller", &seller).await.unwrap();

        let updater = ReputationUpdater::new(store, GradeEngine::new(), &EngineConfig::default());
        updater
            .on_transaction_released("tx-1", "buyer", "seller")
            .await
            .unwrap();

        let seller = updater.user("seller").await.unwrap();
        assert!(!seller.has_applied("released:ancient"));
        assert!(seller.has_applied("released:tx-1"));
        assert_eq!(seller.applied_events.len(), 1);
    }

    #[tokio::test]
    async fn test_progress_for_unknown_user() {
        let report = updater().progress("nobody").await.unwrap();
        assert_eq!(report.current_grade, Grade::C);
        assert_eq!(report.next_grade, Some(Grade::D));
        // Only the dispute-free dimension is satisfied
        assert_eq!(report.progress_percentage, 25);
    }
}
