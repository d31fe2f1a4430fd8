//! End-to-end escrow scenarios through the marketplace facade.
//!
//! Tests verify:
//! - A clean sale credits the seller with one safe transaction
//! - A dispute resolved for the buyer refunds and counts against the seller
//! - A dismissed dispute leaves the transaction releasable
//! - Admin actions are audited and parties are notified

mod common;

use common::{admin, buyer, harness, seller};
use escrow_core::{
    Actor, AdminActionKind, CaseStatus, DomainEvent, Favor, Grade, ListingStatus, MarketError,
    NewDispute, NewReview, ProductCatalog, Step, TransactionStatus,
};

fn claim(transaction_id: &str) -> NewDispute {
    NewDispute {
        transaction_id: transaction_id.to_string(),
        reason: "damaged".into(),
        description: "Screen cracked on arrival".into(),
    }
}

#[tokio::test]
async fn test_clean_sale_credits_both_parties() {
    let h = harness();
    let tx = h.delivered("p-1", 100_000).await;

    let released = h
        .market
        .advance_transaction(&tx.id, Step::Release, &buyer())
        .await
        .unwrap();
    assert_eq!(released.status, TransactionStatus::Released);
    assert_eq!(released.amount, 100_000);
    assert!(released.completed_at.is_some());

    let seller_stats = h.market.user("seller").await.unwrap().stats;
    assert_eq!(seller_stats.safe_transaction_count, 1);
    assert_eq!(seller_stats.total_trades, 1);

    let buyer_stats = h.market.user("buyer").await.unwrap().stats;
    assert_eq!(buyer_stats.safe_transaction_count, 0);
    assert_eq!(buyer_stats.total_trades, 1);

    let product = h.catalog.get_product("p-1").await.unwrap().unwrap();
    assert_eq!(product.status, ListingStatus::Sold);

    // Released is terminal
    let err = h
        .market
        .advance_transaction(
            &tx.id,
            Step::Refund {
                reason: "late".into(),
            },
            &admin(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_dispute_for_buyer_refunds_and_counts_against_seller() {
    let h = harness();
    let tx = h.shipped("p-1", 80_000).await;

    let dispute = h.market.file_dispute(claim(&tx.id), &buyer()).await.unwrap();
    assert_eq!(dispute.reported_user_id, "seller");

    h.market
        .investigate_dispute(&dispute.id, &admin(), None)
        .await
        .unwrap();
    let resolved = h
        .market
        .resolve_dispute(&dispute.id, &admin(), Favor::Buyer, "Seller shipped a broken unit")
        .await
        .unwrap();
    assert_eq!(resolved.status, CaseStatus::Resolved);
    assert_eq!(resolved.favor, Some(Favor::Buyer));

    let tx = h.market.transaction(&tx.id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Refunded);
    assert!(tx.frozen_by.is_none());

    let seller_stats = h.market.user("seller").await.unwrap().stats;
    assert_eq!(seller_stats.dispute_count, 1);
    assert_eq!(seller_stats.safe_transaction_count, 0);
    assert_eq!(seller_stats.total_trades, 1);
    assert_eq!(h.market.user("buyer").await.unwrap().stats.dispute_count, 0);

    let product = h.catalog.get_product("p-1").await.unwrap().unwrap();
    assert_eq!(product.status, ListingStatus::Active);

    let audit = h.market.audit_log().for_target("dispute", &dispute.id).await.unwrap();
    let kinds: Vec<_> = audit.iter().map(|a| a.action).collect();
    assert!(kinds.contains(&AdminActionKind::InvestigateDispute));
    assert!(kinds.contains(&AdminActionKind::ResolveDispute));

    let forced = h.market.audit_log().for_target("transaction", &tx.id).await.unwrap();
    assert_eq!(forced.len(), 1);
    assert_eq!(forced[0].action, AdminActionKind::ForceRefund);
}

#[tokio::test]
async fn test_dismissed_dispute_leaves_transaction_releasable() {
    let h = harness();
    let tx = h.delivered("p-1", 50_000).await;

    let dispute = h.market.file_dispute(claim(&tx.id), &buyer()).await.unwrap();
    let err = h
        .market
        .advance_transaction(&tx.id, Step::Release, &buyer())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::TransactionFrozen { .. }));

    h.market
        .dismiss_dispute(&dispute.id, &admin(), "Photos show the item intact")
        .await
        .unwrap();

    let released = h
        .market
        .advance_transaction(&tx.id, Step::Release, &buyer())
        .await
        .unwrap();
    assert_eq!(released.status, TransactionStatus::Released);

    let seller_stats = h.market.user("seller").await.unwrap().stats;
    assert_eq!(seller_stats.dispute_count, 0);
    assert_eq!(seller_stats.safe_transaction_count, 1);

    // A fresh dispute is impossible once the transaction is final
    let err = h.market.file_dispute(claim(&tx.id), &buyer()).await.unwrap_err();
    assert!(matches!(err, MarketError::TransactionNotDisputable { .. }));
}

#[tokio::test]
async fn test_dispute_for_seller_releases_shipped_transaction() {
    let h = harness();
    let tx = h.shipped("p-1", 20_000).await;

    let dispute = h.market.file_dispute(claim(&tx.id), &buyer()).await.unwrap();
    h.market
        .resolve_dispute(&dispute.id, &admin(), Favor::Seller, "Tracking shows delivery")
        .await
        .unwrap();

    let tx = h.market.transaction(&tx.id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Released);

    // The reporter lost; the reported seller still gets the sale and the mark
    let seller_stats = h.market.user("seller").await.unwrap().stats;
    assert_eq!(seller_stats.safe_transaction_count, 1);
    assert_eq!(seller_stats.dispute_count, 1);
}

#[tokio::test]
async fn test_dispute_filing_states() {
    let h = harness();
    h.list("p-pending", 1_000).await;
    let pending = h.create("p-pending", 1_000).await;
    let err = h
        .market
        .file_dispute(claim(&pending.id), &buyer())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::TransactionNotDisputable { .. }));

    h.market
        .advance_transaction(&pending.id, Step::Cancel, &buyer())
        .await
        .unwrap();
    let err = h
        .market
        .file_dispute(claim(&pending.id), &buyer())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::TransactionNotDisputable { .. }));

    let paid = {
        h.list("p-paid", 1_000).await;
        let tx = h.create("p-paid", 1_000).await;
        h.pay(&tx).await
    };
    let shipped = h.shipped("p-shipped", 1_000).await;
    let delivered = h.delivered("p-delivered", 1_000).await;

    for tx in [&paid, &shipped, &delivered] {
        h.market.file_dispute(claim(&tx.id), &buyer()).await.unwrap();
        let err = h
            .market
            .file_dispute(claim(&tx.id), &seller())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::DuplicateActiveDispute { .. }));
    }
}

#[tokio::test]
async fn test_cancel_counts_no_trade() {
    let h = harness();
    h.list("p-1", 10_000).await;
    let tx = h.create("p-1", 10_000).await;
    h.market
        .advance_transaction(&tx.id, Step::Cancel, &seller())
        .await
        .unwrap();

    assert_eq!(h.market.user("seller").await.unwrap().stats.total_trades, 0);
    assert_eq!(h.market.user("buyer").await.unwrap().stats.total_trades, 0);

    // The listing is back on sale
    let again = h.create("p-1", 10_000).await;
    assert_eq!(again.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn test_duplicate_payment_rejected() {
    let h = harness();
    h.list("p-1", 10_000).await;
    let tx = h.create("p-1", 10_000).await;
    h.pay(&tx).await;

    let err = h
        .market
        .advance_transaction(
            &tx.id,
            Step::MarkPaid {
                payment_id: "pay-again".into(),
            },
            &Actor::system("psp"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::AlreadyPaid { .. }));
}

#[tokio::test]
async fn test_reviews_drive_grade() {
    let h = harness();
    let mut last = None;
    for i in 0..5 {
        let product = format!("p-{}", i);
        let tx = h.delivered(&product, 10_000).await;
        h.market
            .advance_transaction(&tx.id, Step::Release, &buyer())
            .await
            .unwrap();
        h.market
            .submit_review(
                NewReview {
                    transaction_id: tx.id.clone(),
                    score: 5,
                    comment: Some("Fast shipping".into()),
                },
                &buyer(),
            )
            .await
            .unwrap();
        last = Some(tx);
    }

    let seller = h.market.user("seller").await.unwrap();
    assert_eq!(seller.stats.review_count, 5);
    assert_eq!(seller.grade, Grade::D);

    let progress = h.market.get_user_progress("seller").await.unwrap();
    assert_eq!(progress.current_grade, Grade::D);
    assert_eq!(progress.next_grade, Some(Grade::E));
    assert!(progress.progress_percentage < 100);

    // One review per reviewer per transaction
    let tx = last.unwrap();
    let err = h
        .market
        .submit_review(
            NewReview {
                transaction_id: tx.id.clone(),
                score: 1,
                comment: None,
            },
            &buyer(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Validation { .. }));
}

#[tokio::test]
async fn test_review_requires_finished_transaction() {
    let h = harness();
    let tx = h.shipped("p-1", 10_000).await;
    let err = h
        .market
        .submit_review(
            NewReview {
                transaction_id: tx.id.clone(),
                score: 4,
                comment: None,
            },
            &buyer(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Validation { .. }));

    let err = h
        .market
        .submit_review(
            NewReview {
                transaction_id: tx.id.clone(),
                score: 0,
                comment: None,
            },
            &buyer(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Validation { .. }));
}

#[tokio::test]
async fn test_events_reach_subscribers_and_notifier() {
    let mut h = harness();
    let mut events = h.market.subscribe();
    let tx = h.delivered("p-1", 30_000).await;
    h.market
        .advance_transaction(&tx.id, Step::Release, &buyer())
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type());
    }
    assert_eq!(
        seen,
        vec![
            "transaction_created",
            "payment_captured",
            "transaction_shipped",
            "transaction_delivered",
            "transaction_released",
        ]
    );

    let notified = h.drain_notifications();
    assert!(notified
        .iter()
        .any(|n| n.user_id == "buyer" && n.event_type == "transaction_shipped"));
    assert_eq!(
        notified
            .iter()
            .filter(|n| n.event_type == "transaction_released")
            .count(),
        2
    );
}

#[tokio::test]
async fn test_admin_refund_override_is_audited() {
    let h = harness();
    h.list("p-1", 10_000).await;
    let tx = h.create("p-1", 10_000).await;
    h.pay(&tx).await;

    let refunded = h
        .market
        .advance_transaction(
            &tx.id,
            Step::Refund {
                reason: "Payment flagged as fraud".into(),
            },
            &admin(),
        )
        .await
        .unwrap();
    assert_eq!(refunded.status, TransactionStatus::Refunded);

    let audit = h.market.audit_log().by_admin("ops").await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AdminActionKind::RefundOverride);
    assert_eq!(audit[0].target_id, tx.id);
}

#[tokio::test]
async fn test_recompute_requires_admin_and_emits_summary() {
    let h = harness();
    let mut events = h.market.subscribe();

    let err = h.market.recompute_all_grades(&buyer()).await.unwrap_err();
    assert!(matches!(err, MarketError::NotAuthorized { .. }));

    let summary = h.market.recompute_all_grades(&admin()).await.unwrap();
    assert_eq!(summary.users_changed, 0);

    let event = events.recv().await.unwrap();
    assert!(matches!(event, DomainEvent::GradesRecomputed { .. }));
}
