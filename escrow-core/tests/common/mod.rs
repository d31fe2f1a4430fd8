//! Shared fixtures for the marketplace integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use escrow_core::store::{Collection, Document, StoreResult, Version};
use escrow_core::{
    Actor, ChannelNotifier, DocumentStore, EngineConfig, ListingStatus, MarketError, MarketResult,
    Marketplace, MemoryStore, NewTransaction, Notification, PaymentMethod, Product,
    ProductCatalog, SharedStore, Step, StoreCatalog, StoreError, Transaction,
};
use tokio::sync::mpsc;

pub struct Harness {
    pub store: SharedStore,
    pub market: Marketplace,
    pub catalog: StoreCatalog,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

pub fn harness_with(config: EngineConfig) -> Harness {
    let store = MemoryStore::new().shared();
    let (notifier, notifications) = ChannelNotifier::new();
    let catalog = StoreCatalog::new(store.clone(), config.max_cas_retries);
    let market = Marketplace::new(store.clone(), config, Arc::new(notifier));
    Harness {
        store,
        market,
        catalog,
        notifications,
    }
}

/// Harness whose store and catalog can be told to fail
pub struct FaultyHarness {
    pub h: Harness,
    pub store: Arc<FlakyStore>,
    pub catalog: Arc<FlakyCatalog>,
}

pub fn faulty_harness(config: EngineConfig) -> FaultyHarness {
    let flaky = Arc::new(FlakyStore::new());
    let store: SharedStore = flaky.clone();
    let inner = StoreCatalog::new(store.clone(), config.max_cas_retries);
    let catalog = Arc::new(FlakyCatalog::new(inner.clone()));

    let (notifier, notifications) = ChannelNotifier::new();
    let market = Marketplace::builder(store.clone())
        .config(config)
        .notifier(Arc::new(notifier))
        .catalog(catalog.clone())
        .build();
    FaultyHarness {
        h: Harness {
            store,
            market,
            catalog: inner,
            notifications,
        },
        store: flaky,
        catalog,
    }
}

/// Memory store whose writes to chosen collections fail with an I/O error
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failures: Mutex<HashMap<Collection, u32>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` writes to `collection`
    pub fn fail_writes(&self, collection: Collection, times: u32) {
        self.failures.lock().unwrap().insert(collection, times);
    }

    pub fn heal(&self) {
        self.failures.lock().unwrap().clear();
    }

    fn trip(&self, collection: Collection) -> StoreResult<()> {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&collection) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(StoreError::Io(std::io::Error::other("store down")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        body: serde_json::Value,
    ) -> StoreResult<Version> {
        self.trip(collection)?;
        self.inner.insert(collection, id, body).await
    }

    async fn compare_and_swap(
        &self,
        collection: Collection,
        id: &str,
        expected: Version,
        body: serde_json::Value,
    ) -> StoreResult<Version> {
        self.trip(collection)?;
        self.inner
            .compare_and_swap(collection, id, expected, body)
            .await
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<Document>> {
        self.inner.list(collection).await
    }
}

/// Store-backed catalog whose status updates can be made to fail
pub struct FlakyCatalog {
    inner: StoreCatalog,
    status_failures: AtomicU32,
}

impl FlakyCatalog {
    pub fn new(inner: StoreCatalog) -> Self {
        Self {
            inner,
            status_failures: AtomicU32::new(0),
        }
    }

    /// Fail the next `times` calls to `set_product_status`
    pub fn fail_status_updates(&self, times: u32) {
        self.status_failures.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProductCatalog for FlakyCatalog {
    async fn get_product(&self, product_id: &str) -> MarketResult<Option<Product>> {
        self.inner.get_product(product_id).await
    }

    async fn set_product_status(
        &self,
        product_id: &str,
        status: ListingStatus,
    ) -> MarketResult<Product> {
        let tripped = self
            .status_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(MarketError::integrity("catalog down"));
        }
        self.inner.set_product_status(product_id, status).await
    }

    async fn reserve(&self, product_id: &str) -> MarketResult<Product> {
        self.inner.reserve(product_id).await
    }
}

pub fn buyer() -> Actor {
    Actor::member("buyer")
}

pub fn seller() -> Actor {
    Actor::member("seller")
}

pub fn admin() -> Actor {
    Actor::admin("ops")
}

impl Harness {
    pub async fn list(&self, product_id: &str, price: u64) {
        self.catalog
            .list_product(&Product::new(product_id, "seller", "Listing", price))
            .await
            .unwrap();
    }

    pub async fn create(&self, product_id: &str, amount: u64) -> Transaction {
        self.market
            .create_transaction(
                NewTransaction {
                    product_id: product_id.into(),
                    buyer_id: "buyer".into(),
                    amount,
                    payment_method: PaymentMethod::Card,
                },
                &buyer(),
            )
            .await
            .unwrap()
    }

    pub async fn pay(&self, tx: &Transaction) -> Transaction {
        self.market
            .advance_transaction(
                &tx.id,
                Step::MarkPaid {
                    payment_id: format!("pay-{}", tx.id),
                },
                &Actor::system("psp"),
            )
            .await
            .unwrap()
    }

    pub async fn ship(&self, tx: &Transaction) -> Transaction {
        self.market
            .advance_transaction(
                &tx.id,
                Step::MarkShipped {
                    tracking_number: "TRK-1".into(),
                },
                &seller(),
            )
            .await
            .unwrap()
    }

    pub async fn deliver(&self, tx: &Transaction) -> Transaction {
        self.market
            .advance_transaction(&tx.id, Step::MarkDelivered, &buyer())
            .await
            .unwrap()
    }

    /// List a product and walk a transaction for it to `shipped`
    pub async fn shipped(&self, product_id: &str, price: u64) -> Transaction {
        self.list(product_id, price).await;
        let tx = self.create(product_id, price).await;
        self.pay(&tx).await;
        self.ship(&tx).await
    }

    /// List a product and walk a transaction for it to `delivered`
    pub async fn delivered(&self, product_id: &str, price: u64) -> Transaction {
        let tx = self.shipped(product_id, price).await;
        self.deliver(&tx).await
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            out.push(n);
        }
        out
    }
}
