//! Trust grades
//!
//! A user's trading history is scored into one of seven tiers,
//! C < D < E < F < G < A < B. Each tier carries a conjunctive requirement
//! (safe transactions, average rating, dispute-free, total trades); the
//! user's grade is the highest tier whose requirement is fully met.

pub mod engine;
pub mod table;

pub use engine::{GradeEngine, ProgressBreakdown, ProgressReport};
pub use table::{Grade, GradeTable, Requirement, Tier};
