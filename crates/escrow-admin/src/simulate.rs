//! Scripted in-memory marketplace session
//!
//! Lists products, runs clean sales with reviews, then one disputed sale
//! resolved for the buyer, and reports where the seller ended up.

use std::sync::Arc;

use anyhow::{Context, Result};
use escrow_core::{
    Actor, Favor, Grade, Marketplace, MemoryStore, NewDispute, NewReview, NewTransaction,
    PaymentMethod, Product, ProgressReport, Step, StoreCatalog, TracingNotifier, UserStats,
};
use serde::Serialize;
use tracing::info;

use crate::config::AdminConfig;

const SELLER: &str = "sim-seller";
const BUYER: &str = "sim-buyer";
const PRICE: u64 = 25_000;

#[derive(Debug, Serialize)]
pub struct SimulationSummary {
    pub clean_sales: u32,
    pub grade_before_dispute: Grade,
    pub seller: UserStats,
    pub progress: ProgressReport,
    pub audit_records: usize,
}

pub async fn run(config: &AdminConfig, sales: u32, score: u8) -> Result<SimulationSummary> {
    let store = MemoryStore::new().shared();
    let catalog = StoreCatalog::new(store.clone(), config.engine.max_cas_retries);
    let market = Marketplace::new(store, config.engine.clone(), Arc::new(TracingNotifier));

    let buyer = Actor::member(BUYER);
    let seller = Actor::member(SELLER);
    let psp = Actor::system("sim-psp");
    let admin = Actor::admin(config.operator_id.clone());

    for i in 0..=sales {
        let product_id = format!("sim-product-{}", i);
        catalog
            .list_product(&Product::new(&product_id, SELLER, format!("Item {}", i), PRICE))
            .await?;
    }

    for i in 0..sales {
        let tx_id = sell(&market, &format!("sim-product-{}", i), &buyer, &seller, &psp).await?;
        market
            .advance_transaction(&tx_id, Step::MarkDelivered, &buyer)
            .await?;
        market
            .advance_transaction(&tx_id, Step::Release, &buyer)
            .await?;
        market
            .submit_review(
                NewReview {
                    transaction_id: tx_id,
                    score,
                    comment: None,
                },
                &buyer,
            )
            .await
            .context("Review rejected")?;
    }
    let grade_before_dispute = market.user(SELLER).await?.grade;
    info!(%grade_before_dispute, sales, "Clean sales done");

    // The last listing ships, gets disputed and is refunded
    let tx_id = sell(&market, &format!("sim-product-{}", sales), &buyer, &seller, &psp).await?;
    let dispute = market
        .file_dispute(
            NewDispute {
                transaction_id: tx_id,
                reason: "not_received".into(),
                description: "Parcel never arrived".into(),
            },
            &buyer,
        )
        .await?;
    market
        .resolve_dispute(&dispute.id, &admin, Favor::Buyer, "Carrier lost the parcel")
        .await?;

    Ok(SimulationSummary {
        clean_sales: sales,
        grade_before_dispute,
        seller: market.user(SELLER).await?.stats,
        progress: market.get_user_progress(SELLER).await?,
        audit_records: market.audit_log().list().await?.len(),
    })
}

/// Create, pay and ship; returns the transaction id
async fn sell(
    market: &Marketplace,
    product_id: &str,
    buyer: &Actor,
    seller: &Actor,
    psp: &Actor,
) -> Result<String> {
    let tx = market
        .create_transaction(
            NewTransaction {
                product_id: product_id.into(),
                buyer_id: buyer.id.clone(),
                amount: PRICE,
                payment_method: PaymentMethod::Card,
            },
            buyer,
        )
        .await
        .with_context(|| format!("Failed to buy {}", product_id))?;
    market
        .advance_transaction(
            &tx.id,
            Step::MarkPaid {
                payment_id: format!("pay-{}", tx.id),
            },
            psp,
        )
        .await?;
    market
        .advance_transaction(
            &tx.id,
            Step::MarkShipped {
                tracking_number: format!("TRK-{}", product_id),
            },
            seller,
        )
        .await?;
    Ok(tx.id)
}
