//! Pari-mutuel pricing math.
//!
//! Pure functions over a pool snapshot `(guilty, not_guilty)`. Implied
//! probability is a side's share of the total pool, expressed as a
//! percentage; an empty pool is an uninformative 50/50 prior.

use crate::types::Outcome;

/// Base the display price is quoted on. Contractually equal to the percent
/// under this convention, but downstream displays treat "price" and
/// "percent" as distinct concepts, so both operations exist.
pub const PRICE_BASE: f64 = 100.0;

/// Total credits committed across both sides.
pub fn total_pool(guilty: i64, not_guilty: i64) -> i64 {
    guilty + not_guilty
}

/// Implied probability of `outcome` as a percentage in [0, 100].
///
/// Returns 50 for either side when the pool is empty (avoids division by
/// zero and represents the uninformative prior).
pub fn implied_percent(guilty: i64, not_guilty: i64, outcome: Outcome) -> f64 {
    let total = total_pool(guilty, not_guilty);
    if total <= 0 {
        return 50.0;
    }
    let share = match outcome {
        Outcome::Guilty => guilty,
        Outcome::NotGuilty => not_guilty,
    };
    share as f64 / total as f64 * 100.0
}

/// Display price of `outcome` rescaled onto [`PRICE_BASE`].
pub fn price_base100(guilty: i64, not_guilty: i64, outcome: Outcome) -> f64 {
    implied_percent(guilty, not_guilty, outcome) / 100.0 * PRICE_BASE
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_empty_pool_returns_even_prior() {
        assert_eq!(implied_percent(0, 0, Outcome::Guilty), 50.0);
        assert_eq!(implied_percent(0, 0, Outcome::NotGuilty), 50.0);
    }

    #[test]
    fn test_known_split() {
        assert!((implied_percent(70, 30, Outcome::Guilty) - 70.0).abs() < EPS);
        assert!((implied_percent(70, 30, Outcome::NotGuilty) - 30.0).abs() < EPS);
    }

    #[test]
    fn test_percents_sum_to_hundred() {
        let pools = [(1, 1), (70, 30), (999, 1), (3, 7), (123_456, 654_321)];
        for (g, n) in pools {
            let sum = implied_percent(g, n, Outcome::Guilty)
                + implied_percent(g, n, Outcome::NotGuilty);
            assert!((sum - 100.0).abs() < EPS, "pool ({g}, {n}) summed to {sum}");
        }
    }

    #[test]
    fn test_percents_bounded() {
        let pools = [(0, 0), (0, 100), (100, 0), (50, 50), (1, 1_000_000)];
        for (g, n) in pools {
            for outcome in [Outcome::Guilty, Outcome::NotGuilty] {
                let p = implied_percent(g, n, outcome);
                assert!((0.0..=100.0).contains(&p), "pool ({g}, {n}) gave {p}");
            }
        }
    }

    #[test]
    fn test_monotonic_in_own_share() {
        let mut prev = implied_percent(0, 100, Outcome::Guilty);
        for g in [10, 50, 100, 500, 1000] {
            let p = implied_percent(g, 100, Outcome::Guilty);
            assert!(p > prev, "implied percent not increasing at guilty={g}");
            prev = p;
        }
    }

    #[test]
    fn test_one_sided_pool() {
        assert_eq!(implied_percent(100, 0, Outcome::Guilty), 100.0);
        assert_eq!(implied_percent(100, 0, Outcome::NotGuilty), 0.0);
    }

    #[test]
    fn test_price_equals_percent_on_base_100() {
        for (g, n) in [(70, 30), (0, 0), (13, 87)] {
            for outcome in [Outcome::Guilty, Outcome::NotGuilty] {
                let pct = implied_percent(g, n, outcome);
                let price = price_base100(g, n, outcome);
                assert!((pct - price).abs() < EPS);
            }
        }
    }

    #[test]
    fn test_total_pool() {
        assert_eq!(total_pool(70, 30), 100);
        assert_eq!(total_pool(0, 0), 0);
    }
}
