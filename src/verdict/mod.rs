//! AI verdict generation.
//!
//! Produces a *simulated* verdict for a case from an LLM. This is an
//! auxiliary surface: the wager ledger neither calls nor depends on it,
//! and its probabilities never feed the pool-derived prices.

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Case, Outcome};

/// A case plus the caller's free-text framing, sent to the generator.
#[derive(Debug, Clone, Serialize)]
pub struct CaseBundle {
    pub case: Case,
    pub preprompt: String,
}

/// The generator's opinion. Probabilities are clamped to [0, 1] and
/// renormalized to sum to 1 before this struct is handed out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictOpinion {
    pub verdict: Outcome,
    pub p_guilty: f64,
    pub p_not_guilty: f64,
    pub why: String,
}

/// Abstraction over verdict generators.
#[async_trait]
pub trait VerdictGenerator: Send + Sync {
    /// Generate a simulated verdict for the bundled case.
    async fn generate(&self, bundle: &CaseBundle) -> Result<VerdictOpinion>;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}

/// Clamp both probabilities into [0, 1] and renormalize them to sum to 1.
/// A degenerate (0, 0) pair becomes the uninformative (0.5, 0.5).
pub fn renormalize(p_guilty: f64, p_not_guilty: f64) -> (f64, f64) {
    let pg = p_guilty.clamp(0.0, 1.0);
    let pn = p_not_guilty.clamp(0.0, 1.0);
    let sum = pg + pn;
    if sum > 0.0 {
        (pg / sum, pn / sum)
    } else {
        (0.5, 0.5)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
