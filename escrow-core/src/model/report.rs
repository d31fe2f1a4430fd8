//! Reports against users, products or messages

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::case::CaseStatus;
use super::{ProductId, ReportId, UserId};

/// Report status
pub type ReportStatus = CaseStatus;

/// What a report is about
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportTarget {
    User { user_id: UserId },
    Product { product_id: ProductId },
    Message { message_id: String },
}

impl ReportTarget {
    /// Audit target type
    pub fn target_type(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Product { .. } => "product",
            Self::Message { .. } => "message",
        }
    }

    pub fn target_id(&self) -> &str {
        match self {
            Self::User { user_id } => user_id,
            Self::Product { product_id } => product_id,
            Self::Message { message_id } => message_id,
        }
    }
}

impl fmt::Display for ReportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type(), self.target_id())
    }
}

/// Enforcement an admin applies when resolving a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    /// Record the finding only
    #[default]
    None,
    /// Take the reported product listing down
    HideProduct,
    /// Suspend the reported user
    SuspendUser,
}

/// A report record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub reporter_id: UserId,
    pub target: ReportTarget,
    pub reason: String,
    pub description: String,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default)]
    pub enforcement: Enforcement,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<UserId>,
}
