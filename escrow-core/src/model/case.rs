//! Shared status shape of disputes and reports

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of an admin-handled case
///
/// ```text
/// Pending → Investigating | Resolved | Dismissed
/// Investigating → Resolved | Dismissed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Investigating,
    Resolved,
    Dismissed,
}

impl CaseStatus {
    /// Pending or investigating
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }

    /// Whether `self → to` is an edge of the case graph
    pub fn can_transition(self, to: CaseStatus) -> bool {
        use CaseStatus::*;
        matches!(
            (self, to),
            (Pending, Investigating)
                | (Pending, Resolved)
                | (Pending, Dismissed)
                | (Investigating, Resolved)
                | (Investigating, Dismissed)
        )
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Investigating => write!(f, "investigating"),
            Self::Resolved => write!(f, "resolved"),
            Self::Dismissed => write!(f, "dismissed"),
        }
    }
}
