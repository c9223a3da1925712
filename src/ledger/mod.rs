//! Wager ledger — the transactional core.
//!
//! `place_wager` validates a wager, then commits the debit, the pool
//! increment, and the vote row in one datastore transaction. The vote
//! table's `(user_id, case_id)` primary key is the authoritative guard
//! against double-voting; the guarded debit prevents double-spend. All
//! pre-checks before the insert are advisory fast paths — the constraint
//! is the correctness boundary.

pub mod notifier;
pub mod store;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::WagerError;
use crate::types::{Outcome, PoolSnapshot, Vote, WagerReceipt};
use notifier::PoolNotifier;
use store::Store;

/// Sole writer of votes, pools, and balances.
#[derive(Clone)]
pub struct WagerLedger {
    store: Store,
    notifier: PoolNotifier,
    /// Upper bound on a single wager, in credits.
    max_wager: i64,
}

impl WagerLedger {
    pub fn new(store: Store, notifier: PoolNotifier, max_wager: i64) -> Self {
        Self { store, notifier, max_wager }
    }

    /// Place a wager of `amount` credits on `prediction` (`true` = GUILTY)
    /// for `case_id`.
    ///
    /// On success the new pool snapshot and the price of the chosen side
    /// are returned, and the snapshot is published to subscribers exactly
    /// once, after commit. On any failure the transaction rolls back with
    /// zero observable state change. Never retried internally; a
    /// `TransientConnection` error is surfaced verbatim so the caller
    /// decides whether to resubmit.
    pub async fn place_wager(
        &self,
        user_id: &str,
        case_id: i64,
        prediction: bool,
        amount: i64,
    ) -> Result<WagerReceipt, WagerError> {
        if amount <= 0 {
            return Err(WagerError::Validation("wager amount must be positive".into()));
        }
        if amount > self.max_wager {
            return Err(WagerError::Validation(format!(
                "wager amount exceeds the {} credit cap",
                self.max_wager
            )));
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let snapshot =
            match Self::commit_wager(&mut tx, user_id, case_id, prediction, amount, now).await {
                Ok(snapshot) => {
                    tx.commit().await?;
                    snapshot
                }
                Err(err) => {
                    // Explicit rollback; dropping the transaction would do
                    // the same, but the error path should not look like an
                    // accident.
                    let _ = tx.rollback().await;
                    debug!(user_id, case_id, error = %err, "Wager rejected");
                    return Err(err);
                }
            };

        let outcome = Outcome::from_prediction(prediction);
        let price = snapshot.price(outcome);

        info!(
            user_id,
            case_id,
            %outcome,
            amount,
            pool_total = snapshot.total(),
            price = %format!("{price:.2}"),
            "Wager committed"
        );

        // Post-commit publish; a missed notification never unwinds a
        // committed wager, subscribers reconcile by re-reading the pool.
        let reached = self.notifier.publish(snapshot.clone()).await;
        debug!(case_id, subscribers = reached, "Pool update fanned out");

        Ok(WagerReceipt { pool: snapshot, outcome, price })
    }

    /// Current pool state for a case (zeros if nobody has wagered yet).
    pub async fn pool_state(&self, case_id: i64) -> Result<PoolSnapshot, WagerError> {
        self.store.pool_state(case_id).await
    }

    /// All checks and writes between BEGIN and COMMIT.
    async fn commit_wager(
        conn: &mut SqliteConnection,
        user_id: &str,
        case_id: i64,
        prediction: bool,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<PoolSnapshot, WagerError> {
        let case = Store::case_in(conn, case_id)
            .await?
            .ok_or(WagerError::MarketClosed)?;
        if !case.is_open(now) {
            return Err(WagerError::MarketClosed);
        }

        // Advisory; the vote PK catches the race below.
        if Store::vote_exists_in(conn, user_id, case_id).await? {
            return Err(WagerError::DuplicateVote);
        }

        let balance = Store::balance_in(conn, user_id)
            .await?
            .ok_or(WagerError::AuthRequired)?;
        if balance < amount {
            return Err(WagerError::InsufficientBalance { balance, amount });
        }

        // Guarded debit: refuses if the balance moved underneath us.
        if !Store::debit_in(conn, user_id, amount).await? {
            return Err(WagerError::InsufficientBalance { balance, amount });
        }

        Store::accumulate_pool_in(conn, case_id, prediction, amount, now).await?;

        let vote = Vote {
            user_id: user_id.to_string(),
            case_id,
            prediction,
            amount,
            created_at: now,
        };
        // Unique-violation here maps to DuplicateVote in From<sqlx::Error>.
        Store::insert_vote_in(conn, &vote).await?;

        Store::pool_state_in(conn, case_id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::store::testutil::{open_case, temp_store};
    use super::*;
    use crate::types::{Case, CaseStatus};
    use chrono::Duration;

    async fn test_ledger() -> (WagerLedger, Store, PoolNotifier) {
        let store = temp_store().await;
        let notifier = PoolNotifier::new();
        let ledger = WagerLedger::new(store.clone(), notifier.clone(), 1_000);
        (ledger, store, notifier)
    }

    async fn seed(store: &Store, user: &str, balance: i64, case_id: i64) {
        store.ensure_user(user, balance).await.unwrap();
        store.upsert_case(&open_case(case_id)).await.unwrap();
    }

    #[tokio::test]
    async fn test_successful_wager_moves_exactly_the_amount() {
        let (ledger, store, _) = test_ledger().await;
        seed(&store, "alice", 1_000, 1).await;

        let receipt = ledger.place_wager("alice", 1, true, 100).await.unwrap();

        assert_eq!(receipt.outcome, Outcome::Guilty);
        assert_eq!(receipt.pool.pool_guilty, 100);
        assert_eq!(receipt.pool.pool_not_guilty, 0);
        assert_eq!(receipt.price, 100.0);

        assert_eq!(store.balance("alice").await.unwrap(), Some(900));
        let vote = store.vote("alice", 1).await.unwrap().unwrap();
        assert!(vote.prediction);
        assert_eq!(vote.amount, 100);
    }

    #[tokio::test]
    async fn test_pool_equals_sum_of_votes() {
        let (ledger, store, _) = test_ledger().await;
        seed(&store, "alice", 1_000, 1).await;
        seed(&store, "bob", 1_000, 1).await;
        seed(&store, "carol", 1_000, 1).await;

        ledger.place_wager("alice", 1, true, 70).await.unwrap();
        ledger.place_wager("bob", 1, false, 30).await.unwrap();
        let receipt = ledger.place_wager("carol", 1, true, 100).await.unwrap();

        let pool = store.pool_state(1).await.unwrap();
        assert_eq!(pool.pool_guilty, 170);
        assert_eq!(pool.pool_not_guilty, 30);
        assert_eq!(pool.total(), 200);
        assert_eq!(receipt.pool, pool);
    }

    #[tokio::test]
    async fn test_price_reflects_pool_share() {
        let (ledger, store, _) = test_ledger().await;
        seed(&store, "alice", 1_000, 1).await;
        seed(&store, "bob", 1_000, 1).await;

        ledger.place_wager("alice", 1, true, 70).await.unwrap();
        let receipt = ledger.place_wager("bob", 1, false, 30).await.unwrap();

        assert!((receipt.pool.implied_percent(Outcome::Guilty) - 70.0).abs() < 1e-9);
        assert!((receipt.price - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_no_trace() {
        let (ledger, store, _) = test_ledger().await;
        seed(&store, "alice", 50, 1).await;

        let err = ledger.place_wager("alice", 1, true, 100).await.unwrap_err();
        assert!(matches!(
            err,
            WagerError::InsufficientBalance { balance: 50, amount: 100 }
        ));

        assert_eq!(store.balance("alice").await.unwrap(), Some(50));
        assert_eq!(store.pool_state(1).await.unwrap(), PoolSnapshot::empty(1));
        assert!(store.vote("alice", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_deadline_rejected_regardless_of_balance() {
        let (ledger, store, _) = test_ledger().await;
        store.ensure_user("rich", 1_000).await.unwrap();
        store
            .upsert_case(&Case {
                id: 2,
                title: "Expired".into(),
                deadline: Utc::now() - Duration::hours(1),
                status: CaseStatus::Active,
            })
            .await
            .unwrap();

        let err = ledger.place_wager("rich", 2, true, 100).await.unwrap_err();
        assert!(matches!(err, WagerError::MarketClosed));
        assert_eq!(store.balance("rich").await.unwrap(), Some(1_000));
        assert_eq!(store.pool_state(2).await.unwrap(), PoolSnapshot::empty(2));
    }

    #[tokio::test]
    async fn test_closed_status_rejected() {
        let (ledger, store, _) = test_ledger().await;
        store.ensure_user("alice", 1_000).await.unwrap();
        let mut case = open_case(3);
        case.status = CaseStatus::Closed;
        store.upsert_case(&case).await.unwrap();

        let err = ledger.place_wager("alice", 3, false, 10).await.unwrap_err();
        assert!(matches!(err, WagerError::MarketClosed));
    }

    #[tokio::test]
    async fn test_unknown_case_rejected() {
        let (ledger, store, _) = test_ledger().await;
        store.ensure_user("alice", 1_000).await.unwrap();

        let err = ledger.place_wager("alice", 999, true, 10).await.unwrap_err();
        assert!(matches!(err, WagerError::MarketClosed));
    }

    #[tokio::test]
    async fn test_unknown_user_is_auth_required() {
        let (ledger, store, _) = test_ledger().await;
        store.upsert_case(&open_case(1)).await.unwrap();

        let err = ledger.place_wager("nobody", 1, true, 10).await.unwrap_err();
        assert!(matches!(err, WagerError::AuthRequired));
    }

    #[tokio::test]
    async fn test_sequential_duplicate_rejected() {
        let (ledger, store, _) = test_ledger().await;
        seed(&store, "alice", 1_000, 1).await;

        ledger.place_wager("alice", 1, true, 100).await.unwrap();
        let err = ledger.place_wager("alice", 1, true, 100).await.unwrap_err();
        assert!(matches!(err, WagerError::DuplicateVote));

        // The duplicate left balance and pool exactly as after the first.
        assert_eq!(store.balance("alice").await.unwrap(), Some(900));
        assert_eq!(store.pool_state(1).await.unwrap().total(), 100);
    }

    #[tokio::test]
    async fn test_duplicate_on_opposite_side_also_rejected() {
        let (ledger, store, _) = test_ledger().await;
        seed(&store, "alice", 1_000, 1).await;

        ledger.place_wager("alice", 1, true, 100).await.unwrap();
        let err = ledger.place_wager("alice", 1, false, 50).await.unwrap_err();
        assert!(matches!(err, WagerError::DuplicateVote));
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let (ledger, store, _) = test_ledger().await;
        seed(&store, "alice", 1_000, 1).await;

        for amount in [0, -1, -100] {
            let err = ledger.place_wager("alice", 1, true, amount).await.unwrap_err();
            assert!(matches!(err, WagerError::Validation(_)), "amount {amount}");
        }
        assert_eq!(store.balance("alice").await.unwrap(), Some(1_000));
    }

    #[tokio::test]
    async fn test_amount_above_cap_rejected() {
        let (ledger, store, _) = test_ledger().await;
        seed(&store, "whale", 100_000, 1).await;

        let err = ledger.place_wager("whale", 1, true, 1_001).await.unwrap_err();
        assert!(matches!(err, WagerError::Validation(_)));
        assert_eq!(store.balance("whale").await.unwrap(), Some(100_000));
    }

    #[tokio::test]
    async fn test_wager_of_entire_balance_succeeds() {
        let (ledger, store, _) = test_ledger().await;
        seed(&store, "alice", 100, 1).await;

        ledger.place_wager("alice", 1, false, 100).await.unwrap();
        assert_eq!(store.balance("alice").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_commit_publishes_exactly_once() {
        let (ledger, store, notifier) = test_ledger().await;
        seed(&store, "alice", 1_000, 1).await;
        let mut rx = notifier.subscribe(1).await;

        ledger.place_wager("alice", 1, true, 100).await.unwrap();

        let snap = rx.recv().await.unwrap();
        assert_eq!(snap.pool_guilty, 100);
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_rejection_publishes_nothing() {
        let (ledger, store, notifier) = test_ledger().await;
        seed(&store, "alice", 10, 1).await;
        let mut rx = notifier.subscribe(1).await;

        let _ = ledger.place_wager("alice", 1, true, 100).await.unwrap_err();
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_wagers_one_winner() {
        let (ledger, store, _) = test_ledger().await;
        seed(&store, "alice", 1_000, 1).await;

        const N: usize = 8;
        let mut handles = Vec::with_capacity(N);
        for _ in 0..N {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.place_wager("alice", 1, true, 100).await
            }));
        }

        let mut successes = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(WagerError::DuplicateVote) => duplicates += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(duplicates, N - 1);
        // Exactly one debit and one pool contribution.
        assert_eq!(store.balance("alice").await.unwrap(), Some(900));
        assert_eq!(store.pool_state(1).await.unwrap().total(), 100);
    }

    #[tokio::test]
    async fn test_concurrent_different_users_all_succeed() {
        let (ledger, store, _) = test_ledger().await;
        store.upsert_case(&open_case(1)).await.unwrap();
        for i in 0..5 {
            store.ensure_user(&format!("user{i}"), 500).await.unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..5 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.place_wager(&format!("user{i}"), 1, i % 2 == 0, 100).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let pool = store.pool_state(1).await.unwrap();
        assert_eq!(pool.total(), 500);
        assert_eq!(pool.pool_guilty, 300);
        assert_eq!(pool.pool_not_guilty, 200);
    }
}
