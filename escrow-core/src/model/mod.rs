//! Marketplace entities
//!
//! Status fields are closed enums so that every state machine match is
//! exhaustive. Entities are plain serde structs; they are mutated only by
//! the component that owns them (transactions by the escrow state machine,
//! disputes and reports by their ledgers, user stats by the reputation
//! updater).

pub mod actor;
pub mod case;
pub mod dispute;
pub mod product;
pub mod report;
pub mod review;
pub mod transaction;
pub mod user;

pub use actor::{Actor, Role};
pub use case::CaseStatus;
pub use dispute::{Dispute, DisputeStatus, Favor};
pub use product::{ListingStatus, Product};
pub use report::{Enforcement, Report, ReportStatus, ReportTarget};
pub use review::Review;
pub use transaction::{PaymentMethod, Transaction, TransactionStatus};
pub use user::{UserRecord, UserStats};

/// Identifier of a user (buyer, seller or admin)
pub type UserId = String;

/// Identifier of a product listing
pub type ProductId = String;

/// Identifier of an escrow transaction
pub type TransactionId = String;

/// Identifier of a dispute
pub type DisputeId = String;

/// Identifier of a report
pub type ReportId = String;

/// Generate a fresh prefixed identifier, e.g. `tx_5f0c…`
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4())
}
