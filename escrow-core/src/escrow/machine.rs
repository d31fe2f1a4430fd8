//! Persistent escrow state machine
//!
//! Every transition is a conditional write on the transaction document:
//! read, run [`apply_step`] against the fresh value, compare-and-swap. A
//! lost race re-reads and re-validates, so a step that became illegal in
//! the meantime fails with its guard error instead of overwriting.

use chrono::Utc;
use tracing::{debug, error, info};

use super::transitions::{self, apply_step, Authority, Step};
use crate::catalog::SharedCatalog;
use crate::config::EngineConfig;
use crate::error::{MarketError, MarketResult};
use crate::events::{DomainEvent, Outcome};
use crate::model::{
    new_id, Actor, DisputeId, ListingStatus, PaymentMethod, ProductId, Transaction,
    TransactionStatus, UserId, UserRecord,
};
use crate::store::{Collection, Repository, SharedStore};

/// Input to [`TransactionStateMachine::create`]
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub product_id: ProductId,
    pub buyer_id: UserId,
    /// Must equal the listed price
    pub amount: u64,
    pub payment_method: PaymentMethod,
}

/// Owner of all transaction writes
#[derive(Clone)]
pub struct TransactionStateMachine {
    transactions: Repository<Transaction>,
    users: Repository<UserRecord>,
    catalog: SharedCatalog,
    max_retries: u32,
}

impl TransactionStateMachine {
    pub fn new(store: SharedStore, catalog: SharedCatalog, config: &EngineConfig) -> Self {
        Self {
            transactions: Repository::new(store.clone(), Collection::Transactions),
            users: Repository::new(store, Collection::Users),
            catalog,
            max_retries: config.max_cas_retries,
        }
    }

    pub fn catalog(&self) -> &SharedCatalog {
        &self.catalog
    }

    /// Read a transaction
    pub async fn get(&self, transaction_id: &str) -> MarketResult<Transaction> {
        Ok(self.transactions.require(transaction_id).await?.value)
    }

    /// All transactions where `user_id` is buyer or seller
    pub async fn for_user(&self, user_id: &str) -> MarketResult<Vec<Transaction>> {
        Ok(self
            .transactions
            .list()
            .await?
            .into_iter()
            .map(|v| v.value)
            .filter(|tx| tx.involves(user_id))
            .collect())
    }

    /// Open an escrow for a listed product and reserve the listing.
    pub async fn create(
        &self,
        request: NewTransaction,
        actor: &Actor,
    ) -> MarketResult<Outcome<Transaction>> {
        if request.product_id.trim().is_empty() || request.buyer_id.trim().is_empty() {
            return Err(MarketError::validation("product_id and buyer_id are required"));
        }
        if request.amount == 0 {
            return Err(MarketError::validation("amount must be positive"));
        }
        if !actor.is_member(&request.buyer_id) {
            return Err(MarketError::not_authorized(&actor.id, "create_transaction"));
        }

        if let Some(buyer) = self.users.get(&request.buyer_id).await? {
            if buyer.value.suspended {
                return Err(MarketError::not_authorized(
                    &request.buyer_id,
                    "create_transaction (suspended)",
                ));
            }
        }

        let product = self
            .catalog
            .get_product(&request.product_id)
            .await?
            .ok_or_else(|| MarketError::not_found("product", &request.product_id))?;

        if product.status != ListingStatus::Active {
            return Err(MarketError::ProductUnavailable {
                product_id: product.id,
                status: product.status.to_string(),
            });
        }
        if product.seller_id == request.buyer_id {
            return Err(MarketError::SelfTradeForbidden {
                user_id: request.buyer_id,
            });
        }
        if product.price != request.amount {
            return Err(MarketError::PriceMismatch {
                listed: product.price,
                offered: request.amount,
            });
        }

        // Conditional Active -> Pending; the loser of a race gets ProductUnavailable
        self.catalog.reserve(&product.id).await?;

        let now = Utc::now();
        let tx = Transaction {
            id: new_id("tx"),
            product_id: product.id.clone(),
            buyer_id: request.buyer_id,
            seller_id: product.seller_id,
            amount: product.price,
            payment_method: request.payment_method,
            status: TransactionStatus::Pending,
            payment_id: None,
            tracking_number: None,
            frozen_by: None,
            settled_by: None,
            refund_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            refunded_at: None,
        };

        if let Err(e) = self.transactions.insert(&tx.id, &tx).await {
            error!(transaction_id = %tx.id, error = %e, "Insert failed, releasing reservation");
            if let Err(undo) = self
                .catalog
                .set_product_status(&product.id, ListingStatus::Active)
                .await
            {
                error!(product_id = %product.id, error = %undo, "Failed to release reservation");
            }
            return Err(e);
        }

        info!(transaction_id = %tx.id, amount = tx.amount, "Transaction created");
        let event = DomainEvent::TransactionCreated {
            transaction_id: tx.id.clone(),
            product_id: tx.product_id.clone(),
            buyer_id: tx.buyer_id.clone(),
            seller_id: tx.seller_id.clone(),
            amount: tx.amount,
            timestamp: now,
        };
        Ok(Outcome::new(tx, vec![event]))
    }

    /// Run one lifecycle step on the normal path
    pub async fn advance(
        &self,
        transaction_id: &str,
        step: Step,
        actor: &Actor,
    ) -> MarketResult<Outcome<Transaction>> {
        self.transition(transaction_id, &step, actor, Authority::Direct)
            .await
    }

    pub async fn mark_paid(
        &self,
        transaction_id: &str,
        payment_id: impl Into<String>,
        actor: &Actor,
    ) -> MarketResult<Outcome<Transaction>> {
        let step = Step::MarkPaid {
            payment_id: payment_id.into(),
        };
        self.advance(transaction_id, step, actor).await
    }

    pub async fn mark_shipped(
        &self,
        transaction_id: &str,
        tracking_number: impl Into<String>,
        actor: &Actor,
    ) -> MarketResult<Outcome<Transaction>> {
        let step = Step::MarkShipped {
            tracking_number: tracking_number.into(),
        };
        self.advance(transaction_id, step, actor).await
    }

    pub async fn mark_delivered(
        &self,
        transaction_id: &str,
        actor: &Actor,
    ) -> MarketResult<Outcome<Transaction>> {
        self.advance(transaction_id, Step::MarkDelivered, actor)
            .await
    }

    pub async fn release(
        &self,
        transaction_id: &str,
        actor: &Actor,
    ) -> MarketResult<Outcome<Transaction>> {
        self.advance(transaction_id, Step::Release, actor).await
    }

    pub async fn refund(
        &self,
        transaction_id: &str,
        reason: impl Into<String>,
        actor: &Actor,
    ) -> MarketResult<Outcome<Transaction>> {
        let step = Step::Refund {
            reason: reason.into(),
        };
        self.advance(transaction_id, step, actor).await
    }

    pub async fn cancel(
        &self,
        transaction_id: &str,
        actor: &Actor,
    ) -> MarketResult<Outcome<Transaction>> {
        self.advance(transaction_id, Step::Cancel, actor).await
    }

    /// Force release or refund as the outcome of `dispute_id`
    pub(crate) async fn force(
        &self,
        transaction_id: &str,
        step: Step,
        admin: &Actor,
        dispute_id: &str,
    ) -> MarketResult<Outcome<Transaction>> {
        if !matches!(step, Step::Release | Step::Refund { .. }) {
            return Err(MarketError::validation(format!(
                "{} cannot be forced by a dispute",
                step
            )));
        }
        self.transition(
            transaction_id,
            &step,
            admin,
            Authority::DisputeResolution { dispute_id },
        )
        .await
    }

    /// Freeze the transaction for a newly filed dispute
    pub(crate) async fn freeze(
        &self,
        transaction_id: &str,
        dispute_id: &DisputeId,
    ) -> MarketResult<Transaction> {
        let (updated, _) = self
            .transactions
            .update(transaction_id, self.max_retries, |tx| {
                Ok((transitions::freeze(tx, dispute_id, Utc::now())?, ()))
            })
            .await?;
        debug!(transaction_id, dispute_id = %dispute_id, "Transaction frozen");
        Ok(updated.value)
    }

    /// Lift the freeze held by `dispute_id`
    pub(crate) async fn unfreeze(
        &self,
        transaction_id: &str,
        dispute_id: &str,
    ) -> MarketResult<Transaction> {
        let (updated, _) = self
            .transactions
            .update(transaction_id, self.max_retries, |tx| {
                Ok((transitions::unfreeze(tx, dispute_id, Utc::now()), ()))
            })
            .await?;
        debug!(transaction_id, dispute_id, "Transaction unfrozen");
        Ok(updated.value)
    }

    async fn transition(
        &self,
        transaction_id: &str,
        step: &Step,
        actor: &Actor,
        authority: Authority<'_>,
    ) -> MarketResult<Outcome<Transaction>> {
        let (updated, (from, events)) = self
            .transactions
            .update(transaction_id, self.max_retries, |tx| {
                let (next, events) = apply_step(tx, step, actor, authority, Utc::now())?;
                Ok((next, (tx.status, events)))
            })
            .await?;
        let tx = updated.value;

        debug!(
            transaction_id,
            from = %from,
            to = %tx.status,
            actor = %actor,
            "Transaction transition"
        );

        // The transition has committed; its events must reach the caller
        // even if the catalog is unavailable
        if let Err(e) = self.settle_listing(&tx).await {
            error!(
                transaction_id,
                product_id = %tx.product_id,
                error = %e,
                "Listing not settled after committed transition"
            );
        }
        Ok(Outcome::new(tx, events))
    }

    /// Listing side effect of a terminal transition. Idempotent; a no-op
    /// for non-terminal transactions.
    pub(crate) async fn settle_listing(&self, tx: &Transaction) -> MarketResult<()> {
        let status = match tx.status {
            TransactionStatus::Released => ListingStatus::Sold,
            TransactionStatus::Refunded | TransactionStatus::Cancelled => ListingStatus::Active,
            _ => return Ok(()),
        };
        let Some(product) = self.catalog.get_product(&tx.product_id).await? else {
            return Err(MarketError::integrity(format!(
                "product {} of transaction {} does not exist",
                tx.product_id, tx.id
            )));
        };
        // A listing taken down by moderation stays hidden
        if product.status == status
            || (product.status == ListingStatus::Hidden && status == ListingStatus::Active)
        {
            return Ok(());
        }
        self.catalog
            .set_product_status(&tx.product_id, status)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MockProductCatalog, ProductCatalog, StoreCatalog};
    use crate::model::Product;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    async fn setup() -> (TransactionStateMachine, StoreCatalog) {
        let store = MemoryStore::new().shared();
        let catalog = StoreCatalog::new(store.clone(), 3);
        catalog
            .list_product(&Product::new("p-1", "seller", "Bike", 100_000))
            .await
            .unwrap();
        let machine = TransactionStateMachine::new(
            store,
            catalog.clone().shared(),
            &EngineConfig::default(),
        );
        (machine, catalog)
    }

    fn request(amount: u64) -> NewTransaction {
        NewTransaction {
            product_id: "p-1".into(),
            buyer_id: "buyer".into(),
            amount,
            payment_method: PaymentMethod::Card,
        }
    }

    #[tokio::test]
    async fn test_create_reserves_listing() {
        let (machine, catalog) = setup().await;
        let outcome = machine
            .create(request(100_000), &Actor::member("buyer"))
            .await
            .unwrap();
        assert_eq!(outcome.value.status, TransactionStatus::Pending);
        assert_eq!(outcome.value.seller_id, "seller");
        assert_eq!(outcome.events[0].event_type(), "transaction_created");

        let product = catalog.get_product("p-1").await.unwrap().unwrap();
        assert_eq!(product.status, ListingStatus::Pending);

        let err = machine
            .create(request(100_000), &Actor::member("buyer"))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::ProductUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_create_guards() {
        let (machine, _) = setup().await;

        let err = machine
            .create(request(90_000), &Actor::member("buyer"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MarketError::PriceMismatch {
                listed: 100_000,
                offered: 90_000
            }
        ));

        let mut own = request(100_000);
        own.buyer_id = "seller".into();
        let err = machine
            .create(own, &Actor::member("seller"))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::SelfTradeForbidden { .. }));

        let err = machine
            .create(request(0), &Actor::member("buyer"))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation { .. }));

        let err = machine
            .create(request(100_000), &Actor::member("someone-else"))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotAuthorized { .. }));
    }

    #[tokio::test]
    async fn test_release_marks_listing_sold() {
        let (machine, catalog) = setup().await;
        let buyer = Actor::member("buyer");
        let tx = machine.create(request(100_000), &buyer).await.unwrap().value;

        machine.mark_paid(&tx.id, "pay-1", &buyer).await.unwrap();
        machine
            .mark_shipped(&tx.id, "TRK-1", &Actor::member("seller"))
            .await
            .unwrap();
        machine.mark_delivered(&tx.id, &buyer).await.unwrap();
        let released = machine.release(&tx.id, &buyer).await.unwrap();
        assert_eq!(released.value.status, TransactionStatus::Released);

        let product = catalog.get_product("p-1").await.unwrap().unwrap();
        assert_eq!(product.status, ListingStatus::Sold);
    }

    #[tokio::test]
    async fn test_cancel_returns_listing() {
        let (machine, catalog) = setup().await;
        let buyer = Actor::member("buyer");
        let tx = machine.create(request(100_000), &buyer).await.unwrap().value;

        let cancelled = machine
            .cancel(&tx.id, &Actor::member("seller"))
            .await
            .unwrap();
        assert_eq!(cancelled.value.status, TransactionStatus::Cancelled);
        let product = catalog.get_product("p-1").await.unwrap().unwrap();
        assert_eq!(product.status, ListingStatus::Active);

        let err = machine.mark_paid(&tx.id, "pay-1", &buyer).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_missing_transaction() {
        let (machine, _) = setup().await;
        let err = machine
            .release("nope", &Actor::member("buyer"))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound { kind: "transaction", .. }));
    }

    #[tokio::test]
    async fn test_force_only_for_release_or_refund() {
        let (machine, _) = setup().await;
        let err = machine
            .force("tx", Step::MarkDelivered, &Actor::admin("ops"), "d-1")
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_catalog_outage_keeps_committed_release() {
        let mut catalog = MockProductCatalog::new();
        catalog
            .expect_get_product()
            .returning(|id| Ok(Some(Product::new(id, "seller", "Bike", 100_000))));
        catalog.expect_reserve().times(1).returning(|id| {
            let mut product = Product::new(id, "seller", "Bike", 100_000);
            product.status = ListingStatus::Pending;
            Ok(product)
        });
        catalog
            .expect_set_product_status()
            .times(1)
            .returning(|_, _| Err(MarketError::integrity("catalog down")));

        let machine = TransactionStateMachine::new(
            MemoryStore::new().shared(),
            Arc::new(catalog),
            &EngineConfig::default(),
        );
        let buyer = Actor::member("buyer");
        let tx = machine.create(request(100_000), &buyer).await.unwrap().value;
        machine.mark_paid(&tx.id, "pay-1", &buyer).await.unwrap();
        machine
            .mark_shipped(&tx.id, "TRK-1", &Actor::member("seller"))
            .await
            .unwrap();
        machine.mark_delivered(&tx.id, &buyer).await.unwrap();

        // The listing write fails after the release committed: the caller
        // still gets the release and its event
        let released = machine.release(&tx.id, &buyer).await.unwrap();
        assert_eq!(released.value.status, TransactionStatus::Released);
        assert_eq!(released.events[0].event_type(), "transaction_released");
        assert_eq!(
            machine.get(&tx.id).await.unwrap().status,
            TransactionStatus::Released
        );
    }
}
