//! Wager error taxonomy.
//!
//! Every failure mode of `place_wager` is a typed variant with one short
//! user-visible message. None are swallowed and none trigger automatic
//! retries inside the ledger; `TransientConnection` is the only kind a
//! client may reasonably resubmit (resubmission is safe because the vote
//! primary key makes a retried wager idempotent).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WagerError {
    /// Malformed input: non-positive amount, amount above the single-wager
    /// cap, unknown case id format, etc.
    #[error("invalid wager: {0}")]
    Validation(String),

    /// No resolvable user identity. Raised before any transaction begins.
    #[error("sign in to place a wager")]
    AuthRequired,

    #[error("insufficient balance: have {balance}, need {amount}")]
    InsufficientBalance { balance: i64, amount: i64 },

    /// A committed vote already exists for this `(user, case)` pair.
    #[error("you have already voted on this case")]
    DuplicateVote,

    /// Case missing, closed, or past its deadline.
    #[error("wagering on this case has closed")]
    MarketClosed,

    /// Datastore unreachable or timed out. The only resubmittable kind.
    #[error("datastore unavailable: {0}")]
    TransientConnection(String),
}

impl WagerError {
    /// Stable machine-readable kind tag for the wire format.
    pub fn kind(&self) -> &'static str {
        match self {
            WagerError::Validation(_) => "validation_error",
            WagerError::AuthRequired => "auth_required",
            WagerError::InsufficientBalance { .. } => "insufficient_balance",
            WagerError::DuplicateVote => "duplicate_vote",
            WagerError::MarketClosed => "market_closed",
            WagerError::TransientConnection(_) => "transient_connection",
        }
    }

    /// Whether a client may safely resubmit the same wager.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WagerError::TransientConnection(_))
    }
}

impl From<sqlx::Error> for WagerError {
    /// A unique-violation on the vote insert is the race-safe duplicate
    /// guard; everything else from the datastore is surfaced verbatim as a
    /// transient failure for the caller to decide on.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            if db.is_unique_violation() {
                return WagerError::DuplicateVote;
            }
        }
        WagerError::TransientConnection(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(WagerError::AuthRequired.kind(), "auth_required");
        assert_eq!(WagerError::DuplicateVote.kind(), "duplicate_vote");
        assert_eq!(WagerError::MarketClosed.kind(), "market_closed");
        assert_eq!(
            WagerError::InsufficientBalance { balance: 50, amount: 100 }.kind(),
            "insufficient_balance"
        );
        assert_eq!(
            WagerError::Validation("amount must be positive".into()).kind(),
            "validation_error"
        );
        assert_eq!(
            WagerError::TransientConnection("timeout".into()).kind(),
            "transient_connection"
        );
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(WagerError::TransientConnection("io".into()).is_retryable());
        assert!(!WagerError::DuplicateVote.is_retryable());
        assert!(!WagerError::MarketClosed.is_retryable());
        assert!(!WagerError::AuthRequired.is_retryable());
    }

    #[test]
    fn test_insufficient_balance_message() {
        let err = WagerError::InsufficientBalance { balance: 50, amount: 100 };
        assert_eq!(err.to_string(), "insufficient balance: have 50, need 100");
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_transient() {
        let err: WagerError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, WagerError::TransientConnection(_)));
    }
}
