//! Shared types for the Verdiction ledger.
//!
//! These types form the data model used across all modules.
//! They mirror the persistent schema (users, cases, votes, market_pools)
//! so that the store, ledger, and API layers can depend on them without
//! circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pricing;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// One of the two sides of a verdict market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Guilty,
    NotGuilty,
}

impl Outcome {
    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Guilty => Outcome::NotGuilty,
            Outcome::NotGuilty => Outcome::Guilty,
        }
    }

    /// Map the wire-level boolean prediction flag (`true` = guilty).
    pub fn from_prediction(prediction: bool) -> Self {
        if prediction {
            Outcome::Guilty
        } else {
            Outcome::NotGuilty
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Guilty => write!(f, "GUILTY"),
            Outcome::NotGuilty => write!(f, "NOT_GUILTY"),
        }
    }
}

// ---------------------------------------------------------------------------
// Case
// ---------------------------------------------------------------------------

/// Lifecycle status of a case. Cases are created and closed by an external
/// curation process; the ledger only ever reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Active,
    Closed,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseStatus::Active => write!(f, "active"),
            CaseStatus::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for CaseStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CaseStatus::Active),
            "closed" => Ok(CaseStatus::Closed),
            _ => Err(anyhow::anyhow!("Unknown case status: {s}")),
        }
    }
}

/// A curated case that can be wagered on until its deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: i64,
    pub title: String,
    pub deadline: DateTime<Utc>,
    pub status: CaseStatus,
}

impl Case {
    /// Whether wagers are currently accepted for this case.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == CaseStatus::Active && self.deadline > now
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Case #{} '{}' ({}, closes {})",
            self.id, self.title, self.status, self.deadline
        )
    }
}

// ---------------------------------------------------------------------------
// Vote
// ---------------------------------------------------------------------------

/// A committed wager. At most one per `(user_id, case_id)` pair — that
/// uniqueness is a primary-key constraint in the store, not just a pre-check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub user_id: String,
    pub case_id: i64,
    /// `true` = GUILTY, `false` = NOT_GUILTY.
    pub prediction: bool,
    /// Wagered credits, always positive.
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_prediction(self.prediction)
    }
}

// ---------------------------------------------------------------------------
// Pool snapshot
// ---------------------------------------------------------------------------

/// Point-in-time state of a case's pari-mutuel pool.
///
/// `updated_at` is `None` until the first wager creates the pool row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub case_id: i64,
    pub pool_guilty: i64,
    pub pool_not_guilty: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PoolSnapshot {
    /// The uninformative empty pool for a case with no wagers yet.
    pub fn empty(case_id: i64) -> Self {
        Self {
            case_id,
            pool_guilty: 0,
            pool_not_guilty: 0,
            updated_at: None,
        }
    }

    pub fn total(&self) -> i64 {
        pricing::total_pool(self.pool_guilty, self.pool_not_guilty)
    }

    /// Implied probability of `outcome` as a percentage in [0, 100].
    pub fn implied_percent(&self, outcome: Outcome) -> f64 {
        pricing::implied_percent(self.pool_guilty, self.pool_not_guilty, outcome)
    }

    /// Display price of `outcome` on the base-100 convention.
    pub fn price(&self, outcome: Outcome) -> f64 {
        pricing::price_base100(self.pool_guilty, self.pool_not_guilty, outcome)
    }
}

impl fmt::Display for PoolSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pool #{}: GUILTY {} ({:.2}%) | NOT_GUILTY {} ({:.2}%)",
            self.case_id,
            self.pool_guilty,
            self.implied_percent(Outcome::Guilty),
            self.pool_not_guilty,
            self.implied_percent(Outcome::NotGuilty),
        )
    }
}

// ---------------------------------------------------------------------------
// Wager receipt
// ---------------------------------------------------------------------------

/// Returned by a successful `place_wager`: the post-commit pool snapshot and
/// the price of the side the user took.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerReceipt {
    pub pool: PoolSnapshot,
    pub outcome: Outcome,
    pub price: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
