//! Escrow transaction lifecycle
//!
//! ```text
//! pending ──pay──▶ paid_hold ──ship──▶ shipped ──deliver──▶ delivered ──release──▶ released
//!    │                 │                                         │
//!    └─cancel─▶ cancelled └────────────refund──────────▶ refunded ◀┘
//! ```
//!
//! Release and refund are blocked while a dispute holds the transaction.

pub mod machine;
pub mod transitions;

pub use machine::{NewTransaction, TransactionStateMachine};
pub use transitions::{apply_step, is_legal_transition, settlement_event, Authority, Step};
