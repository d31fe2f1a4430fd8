//! Grade tiers and their thresholds

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::model::UserStats;

/// Discrete trust level. Declaration order is ascending trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Grade {
    /// Every grade, lowest first
    pub const ALL: [Grade; 7] = [
        Grade::C,
        Grade::D,
        Grade::E,
        Grade::F,
        Grade::G,
        Grade::A,
        Grade::B,
    ];

    /// Grade every user starts at
    pub const LOWEST: Grade = Grade::C;

    /// Highest attainable grade
    pub const TOP: Grade = Grade::B;

    /// Position in the ascending ordering (C = 0)
    pub fn rank(self) -> usize {
        self as usize
    }

    /// The grade immediately above this one
    pub fn next(self) -> Option<Grade> {
        Self::ALL.get(self.rank() + 1).copied()
    }

    pub fn is_top(self) -> bool {
        self == Self::TOP
    }
}

impl Default for Grade {
    fn default() -> Self {
        Self::LOWEST
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
            Self::G => "G",
            Self::A => "A",
            Self::B => "B",
        };
        f.write_str(s)
    }
}

/// Conditions a user must meet, all at once, to hold a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    /// Minimum released-without-dispute transactions
    pub safe_transactions: u32,
    /// Minimum average counterparty rating (0.0–5.0)
    pub average_rating: f64,
    /// Whether the user must have no founded disputes
    pub dispute_free: bool,
    /// Minimum finished trades as buyer or seller
    pub total_trades: u32,
}

impl Requirement {
    /// Whether `stats` satisfies every dimension of this requirement.
    ///
    /// Rating only counts once the user has traded; an unrated user's
    /// 0.0 never meets a non-zero rating threshold.
    pub fn is_met_by(&self, stats: &UserStats) -> bool {
        stats.safe_transaction_count >= self.safe_transactions
            && stats.effective_rating() >= self.average_rating
            && (!self.dispute_free || stats.dispute_count == 0)
            && stats.total_trades >= self.total_trades
    }

    /// Whether every dimension of `self` is at least as strict as `other`
    pub fn dominates(&self, other: &Requirement) -> bool {
        self.safe_transactions >= other.safe_transactions
            && self.average_rating >= other.average_rating
            && (self.dispute_free || !other.dispute_free)
            && self.total_trades >= other.total_trades
    }
}

/// A grade together with its requirement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub grade: Grade,
    pub requirement: Requirement,
}

fn tier(
    grade: Grade,
    safe_transactions: u32,
    average_rating: f64,
    dispute_free: bool,
    total_trades: u32,
) -> Tier {
    Tier {
        grade,
        requirement: Requirement {
            safe_transactions,
            average_rating,
            dispute_free,
            total_trades,
        },
    }
}

/// Standard thresholds, lowest tier first.
fn standard_tiers() -> Vec<Tier> {
    vec![
        tier(Grade::C, 0, 0.0, false, 0),
        tier(Grade::D, 3, 4.0, true, 5),
        tier(Grade::E, 10, 4.2, true, 15),
        tier(Grade::F, 25, 4.4, true, 35),
        tier(Grade::G, 50, 4.6, true, 70),
        tier(Grade::A, 100, 4.7, true, 130),
        tier(Grade::B, 200, 4.8, true, 250),
    ]
}

/// Ordered table of tiers, one per [`Grade`], lowest first.
///
/// Serialized as the bare tier list; deserializing runs the same checks as
/// [`GradeTable::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Tier>", into = "Vec<Tier>")]
pub struct GradeTable {
    tiers: Vec<Tier>,
}

impl GradeTable {
    /// The marketplace's standard thresholds
    pub fn standard() -> Self {
        Self {
            tiers: standard_tiers(),
        }
    }

    /// Build a custom table.
    ///
    /// Tiers must list every grade exactly once in ascending order, the
    /// lowest tier must be unconditional, and each tier must be at least as
    /// strict as the one below it in every dimension.
    pub fn new(tiers: Vec<Tier>) -> MarketResult<Self> {
        let grades: Vec<Grade> = tiers.iter().map(|t| t.grade).collect();
        if grades != Grade::ALL {
            return Err(MarketError::validation(
                "grade table must list every grade once, lowest first",
            ));
        }

        let lowest = &tiers[0].requirement;
        if lowest.safe_transactions != 0
            || lowest.average_rating > 0.0
            || lowest.dispute_free
            || lowest.total_trades != 0
        {
            return Err(MarketError::validation(
                "lowest grade must not have any requirement",
            ));
        }

        for pair in tiers.windows(2) {
            if !pair[1].requirement.dominates(&pair[0].requirement) {
                return Err(MarketError::validation(format!(
                    "grade {} is less strict than grade {}",
                    pair[1].grade, pair[0].grade
                )));
            }
            if !(0.0..=5.0).contains(&pair[1].requirement.average_rating) {
                return Err(MarketError::validation(format!(
                    "grade {} rating threshold outside 0-5",
                    pair[1].grade
                )));
            }
        }

        Ok(Self { tiers })
    }

    /// All tiers, lowest first
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Requirement for a specific grade
    pub fn requirement(&self, grade: Grade) -> &Requirement {
        // `new` guarantees tiers[i].grade == Grade::ALL[i]
        &self.tiers[grade.rank()].requirement
    }
}

impl Default for GradeTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl TryFrom<Vec<Tier>> for GradeTable {
    type Error = MarketError;

    fn try_from(tiers: Vec<Tier>) -> MarketResult<Self> {
        Self::new(tiers)
    }
}

impl From<GradeTable> for Vec<Tier> {
    fn from(table: GradeTable) -> Self {
        table.tiers
    }
}
