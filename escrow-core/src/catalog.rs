//! Product catalog collaborator
//!
//! The escrow core reads listing price and status and moves listings
//! between `active`, `pending`, `sold` and `hidden`. Listing creation and
//! editing belong to the catalog owner, not to this crate.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{MarketError, MarketResult};
use crate::model::{ListingStatus, Product};
use crate::store::{Collection, Repository, SharedStore};

/// Read/write access to product listings
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Look up a listing
    async fn get_product(&self, product_id: &str) -> MarketResult<Option<Product>>;

    /// Unconditionally set a listing's status
    async fn set_product_status(
        &self,
        product_id: &str,
        status: ListingStatus,
    ) -> MarketResult<Product>;

    /// Atomically move an `active` listing to `pending`.
    ///
    /// Fails with `ProductUnavailable` if the listing is in any other state
    /// at the moment of the write.
    async fn reserve(&self, product_id: &str) -> MarketResult<Product>;
}

/// Shared reference to a catalog
pub type SharedCatalog = Arc<dyn ProductCatalog>;

/// Catalog backed by the `products` collection of the document store
#[derive(Clone)]
pub struct StoreCatalog {
    products: Repository<Product>,
    max_retries: u32,
}

impl StoreCatalog {
    pub fn new(store: SharedStore, max_retries: u32) -> Self {
        Self {
            products: Repository::new(store, Collection::Products),
            max_retries,
        }
    }

    /// Add a listing (used by seeding and tests)
    pub async fn list_product(&self, product: &Product) -> MarketResult<()> {
        self.products.insert(&product.id, product).await?;
        Ok(())
    }

    pub fn shared(self) -> SharedCatalog {
        Arc::new(self)
    }
}

#[async_trait]
impl ProductCatalog for StoreCatalog {
    async fn get_product(&self, product_id: &str) -> MarketResult<Option<Product>> {
        Ok(self.products.get(product_id).await?.map(|v| v.value))
    }

    async fn set_product_status(
        &self,
        product_id: &str,
        status: ListingStatus,
    ) -> MarketResult<Product> {
        let (updated, _) = self
            .products
            .update(product_id, self.max_retries, |product| {
                let mut next = product.clone();
                next.status = status;
                Ok((next, ()))
            })
            .await?;
        debug!(product_id, %status, "Listing status changed");
        Ok(updated.value)
    }

    async fn reserve(&self, product_id: &str) -> MarketResult<Product> {
        let (updated, _) = self
            .products
            .update(product_id, self.max_retries, |product| {
                if product.status != ListingStatus::Active {
                    return Err(MarketError::ProductUnavailable {
                        product_id: product.id.clone(),
                        status: product.status.to_string(),
                    });
                }
                let mut next = product.clone();
                next.status = ListingStatus::Pending;
                Ok((next, ()))
            })
            .await?;
        Ok(updated.value)
    }
}
