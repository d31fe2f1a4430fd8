//! Grade computation and progress reporting
//!
//! Pure functions over [`UserStats`]; no I/O, no error cases.

use serde::{Deserialize, Serialize};

use super::table::{Grade, GradeTable, Requirement};
use crate::model::UserStats;

/// Highest percentage a user below the top tier can be shown.
const BELOW_TOP_CAP: u8 = 99;

/// Per-dimension progress toward the next grade, each 0.0–100.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressBreakdown {
    pub safe_transactions: f64,
    pub average_rating: f64,
    pub dispute_free: f64,
    pub total_trades: f64,
}

impl ProgressBreakdown {
    /// Unweighted mean of the four dimensions
    pub fn mean(&self) -> f64 {
        (self.safe_transactions + self.average_rating + self.dispute_free + self.total_trades)
            / 4.0
    }
}

/// How far a user is from their next grade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub current_grade: Grade,
    /// `None` at the top tier
    pub next_grade: Option<Grade>,
    /// 0–100; exactly 100 only at the top tier
    pub progress_percentage: u8,
    /// Per-dimension detail; `None` at the top tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ProgressBreakdown>,
}

/// Scores user statistics against a [`GradeTable`]
#[derive(Debug, Clone, Default)]
pub struct GradeEngine {
    table: GradeTable,
}

impl GradeEngine {
    /// Engine over the standard table
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine over a custom table
    pub fn with_table(table: GradeTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &GradeTable {
        &self.table
    }

    /// Highest grade whose requirement `stats` fully satisfies.
    pub fn compute(&self, stats: &UserStats) -> Grade {
        self.table
            .tiers()
            .iter()
            .rev()
            .find(|tier| tier.requirement.is_met_by(stats))
            .map(|tier| tier.grade)
            .unwrap_or(Grade::LOWEST)
    }

    /// Progress toward the grade above the current one.
    ///
    /// Each requirement dimension contributes `min(actual / required, 1) * 100`
    /// and the report shows the rounded mean of the four. A user can show
    /// progress while one dimension lags far behind.
    pub fn progress(&self, stats: &UserStats) -> ProgressReport {
        let current_grade = self.compute(stats);

        let Some(next_grade) = current_grade.next() else {
            return ProgressReport {
                current_grade,
                next_grade: None,
                progress_percentage: 100,
                breakdown: None,
            };
        };

        let breakdown = breakdown(stats, self.table.requirement(next_grade));
        let rounded = breakdown.mean().round().clamp(0.0, 100.0) as u8;

        ProgressReport {
            current_grade,
            next_grade: Some(next_grade),
            progress_percentage: rounded.min(BELOW_TOP_CAP),
            breakdown: Some(breakdown),
        }
    }
}

fn breakdown(stats: &UserStats, required: &Requirement) -> ProgressBreakdown {
    let dispute_free = if !required.dispute_free || stats.dispute_count == 0 {
        100.0
    } else {
        0.0
    };

    ProgressBreakdown {
        safe_transactions: capped_ratio(
            f64::from(stats.safe_transaction_count),
            f64::from(required.safe_transactions),
        ),
        average_rating: capped_ratio(stats.effective_rating(), required.average_rating),
        dispute_free,
        total_trades: capped_ratio(
            f64::from(stats.total_trades),
            f64::from(required.total_trades),
        ),
    }
}

fn capped_ratio(actual: f64, required: f64) -> f64 {
    if required <= 0.0 {
        return 100.0;
    }
    (actual / required).min(1.0) * 100.0
}
