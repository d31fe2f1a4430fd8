//! Escrow marketplace core
//!
//! This library provides:
//! - An escrow transaction state machine with optimistic-concurrency writes
//! - Dispute and report ledgers handled by admins
//! - A trust grade engine and the reputation updater that feeds it
//! - An append-only audit log of privileged actions
//!
//! # Components
//!
//! ## Transactions
//! - [`escrow::TransactionStateMachine`]: create, pay, ship, deliver,
//!   release, refund and cancel, with listing reservation
//!
//! ## Cases
//! - [`dispute::DisputeLedger`]: file, investigate, resolve, dismiss;
//!   freezes the disputed transaction
//! - [`dispute::ReportLedger`]: reports with product takedown and user
//!   suspension
//!
//! ## Reputation
//! - [`grade::GradeEngine`]: grade and progress from user statistics
//! - [`reputation::ReputationUpdater`]: idempotent statistics updates
//!
//! # Usage
//!
//! ```no_run
//! use escrow_core::{Actor, EngineConfig, Marketplace, MemoryStore, TracingNotifier};
//! use std::sync::Arc;
//!
//! # async fn run() -> escrow_core::MarketResult<()> {
//! let market = Marketplace::new(
//!     MemoryStore::new().shared(),
//!     EngineConfig::default(),
//!     Arc::new(TracingNotifier),
//! );
//! let progress = market.get_user_progress("seller-1").await?;
//! println!("{} -> {:?}", progress.current_grade, progress.next_grade);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod audit;
pub mod catalog;
pub mod config;
pub mod dispute;
pub mod error;
pub mod escrow;
pub mod events;
pub mod grade;
pub mod model;
pub mod notify;
pub mod reputation;
pub mod service;
pub mod store;

pub use audit::{AdminAction, AdminActionKind, AdminActionRecorder};
pub use catalog::{ProductCatalog, SharedCatalog, StoreCatalog};
pub use config::EngineConfig;
pub use dispute::{DisputeLedger, NewDispute, NewReport, ReportLedger};
pub use error::{ErrorKind, MarketError, MarketResult};
pub use escrow::{NewTransaction, Step, TransactionStateMachine};
pub use events::{DomainEvent, EventBus, EventFilter, Outcome};
pub use grade::{Grade, GradeEngine, GradeTable, ProgressReport};
pub use model::{
    Actor, CaseStatus, Dispute, Enforcement, Favor, ListingStatus, PaymentMethod, Product, Report,
    ReportTarget, Review, Role, Transaction, TransactionStatus, UserRecord, UserStats,
};
pub use notify::{ChannelNotifier, Notification, Notifier, TracingNotifier};
pub use reputation::{RecomputeSummary, ReputationUpdater};
pub use service::{Marketplace, MarketplaceBuilder, NewReview};
pub use store::{DocumentStore, MemoryStore, SharedStore, StoreError};
