//! Dispute and report ledgers
//!
//! Both share the case lifecycle (`pending → investigating → resolved |
//! dismissed`) and are handled by admins. A dispute is bound to one escrow
//! transaction and freezes it until closed; a report targets a user,
//! product or message and may end in moderation.

pub mod ledger;
pub mod report;

pub use ledger::{DisputeLedger, NewDispute};
pub use report::{NewReport, ReportLedger};
