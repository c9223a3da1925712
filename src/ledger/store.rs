//! Pool state store — SQLite persistence via sqlx.
//!
//! Holds the four ledger tables (users, cases, votes, market_pools). The
//! write path for votes, balances, and pools exists only as transaction
//! helpers consumed by the ledger, which preserves the invariant that a
//! case's pool equals the sum of its committed votes. Everything else here
//! is read-only or seed/bootstrap.
//!
//! The pool is limited to a single connection: SQLite has one writer anyway,
//! and a single-writer pool totally orders commits per case without
//! busy-wait churn between concurrent transactions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::WagerError;
use crate::types::{Case, CaseStatus, PoolSnapshot, Vote};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id      TEXT PRIMARY KEY,
    balance INTEGER NOT NULL CHECK (balance >= 0)
);

CREATE TABLE IF NOT EXISTS cases (
    id       INTEGER PRIMARY KEY,
    title    TEXT NOT NULL DEFAULT '',
    deadline TEXT NOT NULL,
    status   TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'closed'))
);

CREATE TABLE IF NOT EXISTS votes (
    user_id    TEXT NOT NULL REFERENCES users(id),
    case_id    INTEGER NOT NULL REFERENCES cases(id),
    prediction INTEGER NOT NULL,
    amount     INTEGER NOT NULL CHECK (amount > 0),
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, case_id)
);

CREATE TABLE IF NOT EXISTS market_pools (
    case_id         INTEGER PRIMARY KEY REFERENCES cases(id),
    pool_guilty     INTEGER NOT NULL DEFAULT 0 CHECK (pool_guilty >= 0),
    pool_not_guilty INTEGER NOT NULL DEFAULT 0 CHECK (pool_not_guilty >= 0),
    updated_at      TEXT NOT NULL
);
"#;

/// Cheap-to-clone handle over the SQLite pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `url`, e.g.
    /// `sqlite://verdiction.db`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url: {url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {url}"))?;

        info!(url, "Datastore connected");
        Ok(Self { pool })
    }

    /// Create the schema if it does not exist yet. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to apply ledger schema")?;
        debug!("Schema applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin the ledger's write transaction.
    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Sqlite>, WagerError> {
        Ok(self.pool.begin().await?)
    }

    // -- Reads ------------------------------------------------------------

    /// Current pool state for a case; zeros with no timestamp when no wager
    /// has been committed yet.
    pub async fn pool_state(&self, case_id: i64) -> Result<PoolSnapshot, WagerError> {
        let row: Option<(i64, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT pool_guilty, pool_not_guilty, updated_at
             FROM market_pools WHERE case_id = ?",
        )
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((guilty, not_guilty, updated_at)) => PoolSnapshot {
                case_id,
                pool_guilty: guilty,
                pool_not_guilty: not_guilty,
                updated_at: Some(updated_at),
            },
            None => PoolSnapshot::empty(case_id),
        })
    }

    /// Read-only case lookup (cases are owned by the external curation
    /// process).
    pub async fn case(&self, case_id: i64) -> Result<Option<Case>, WagerError> {
        let mut conn = self.pool.acquire().await?;
        Self::case_in(&mut conn, case_id).await
    }

    pub async fn balance(&self, user_id: &str) -> Result<Option<i64>, WagerError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(b,)| b))
    }

    pub async fn vote(&self, user_id: &str, case_id: i64) -> Result<Option<Vote>, WagerError> {
        let row: Option<(bool, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT prediction, amount, created_at
             FROM votes WHERE user_id = ? AND case_id = ?",
        )
        .bind(user_id)
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(prediction, amount, created_at)| Vote {
            user_id: user_id.to_string(),
            case_id,
            prediction,
            amount,
            created_at,
        }))
    }

    // -- Seed / bootstrap (never called by the ledger) ---------------------

    /// Create the user row with the starting balance if absent; returns the
    /// current balance either way. Called on first authenticated contact,
    /// mirroring the signup credit grant.
    pub async fn ensure_user(&self, user_id: &str, starting_balance: i64) -> Result<i64, WagerError> {
        sqlx::query("INSERT INTO users (id, balance) VALUES (?, ?) ON CONFLICT(id) DO NOTHING")
            .bind(user_id)
            .bind(starting_balance)
            .execute(&self.pool)
            .await?;

        let (balance,): (i64,) = sqlx::query_as("SELECT balance FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(balance)
    }

    /// Insert or replace a case. Seed path for demos and tests; the external
    /// curation process owns cases in production.
    pub async fn upsert_case(&self, case: &Case) -> Result<(), WagerError> {
        sqlx::query(
            "INSERT INTO cases (id, title, deadline, status) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 deadline = excluded.deadline,
                 status = excluded.status",
        )
        .bind(case.id)
        .bind(&case.title)
        .bind(case.deadline)
        .bind(case.status.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -- Transaction helpers (the ledger's commit protocol) ----------------

    pub(crate) async fn case_in(
        conn: &mut SqliteConnection,
        case_id: i64,
    ) -> Result<Option<Case>, WagerError> {
        let row: Option<(i64, String, DateTime<Utc>, String)> =
            sqlx::query_as("SELECT id, title, deadline, status FROM cases WHERE id = ?")
                .bind(case_id)
                .fetch_optional(conn)
                .await?;

        match row {
            Some((id, title, deadline, status)) => {
                let status = CaseStatus::from_str(&status)
                    .map_err(|e| WagerError::TransientConnection(e.to_string()))?;
                Ok(Some(Case { id, title, deadline, status }))
            }
            None => Ok(None),
        }
    }

    pub(crate) async fn vote_exists_in(
        conn: &mut SqliteConnection,
        user_id: &str,
        case_id: i64,
    ) -> Result<bool, WagerError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM votes WHERE user_id = ? AND case_id = ?")
                .bind(user_id)
                .bind(case_id)
                .fetch_optional(conn)
                .await?;
        Ok(row.is_some())
    }

    pub(crate) async fn balance_in(
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> Result<Option<i64>, WagerError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(conn)
            .await?;
        Ok(row.map(|(b,)| b))
    }

    /// Debit guarded by a balance re-check; affects zero rows (and the
    /// caller must abort) if balance moved underneath us.
    pub(crate) async fn debit_in(
        conn: &mut SqliteConnection,
        user_id: &str,
        amount: i64,
    ) -> Result<bool, WagerError> {
        let result = sqlx::query(
            "UPDATE users SET balance = balance - ? WHERE id = ? AND balance >= ?",
        )
        .bind(amount)
        .bind(user_id)
        .bind(amount)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Lazily create the pool row and accumulate the chosen side.
    pub(crate) async fn accumulate_pool_in(
        conn: &mut SqliteConnection,
        case_id: i64,
        prediction: bool,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<(), WagerError> {
        let (guilty, not_guilty) = if prediction { (amount, 0) } else { (0, amount) };
        sqlx::query(
            "INSERT INTO market_pools (case_id, pool_guilty, pool_not_guilty, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(case_id) DO UPDATE SET
                 pool_guilty = pool_guilty + excluded.pool_guilty,
                 pool_not_guilty = pool_not_guilty + excluded.pool_not_guilty,
                 updated_at = excluded.updated_at",
        )
        .bind(case_id)
        .bind(guilty)
        .bind(not_guilty)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Insert the vote row. The `(user_id, case_id)` primary key is the
    /// authoritative duplicate guard: a unique-violation here converts to
    /// `DuplicateVote` via `From<sqlx::Error>`.
    pub(crate) async fn insert_vote_in(
        conn: &mut SqliteConnection,
        vote: &Vote,
    ) -> Result<(), WagerError> {
        sqlx::query(
            "INSERT INTO votes (user_id, case_id, prediction, amount, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&vote.user_id)
        .bind(vote.case_id)
        .bind(vote.prediction)
        .bind(vote.amount)
        .bind(vote.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub(crate) async fn pool_state_in(
        conn: &mut SqliteConnection,
        case_id: i64,
    ) -> Result<PoolSnapshot, WagerError> {
        let row: Option<(i64, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT pool_guilty, pool_not_guilty, updated_at
             FROM market_pools WHERE case_id = ?",
        )
        .bind(case_id)
        .fetch_optional(conn)
        .await?;

        Ok(match row {
            Some((guilty, not_guilty, updated_at)) => PoolSnapshot {
                case_id,
                pool_guilty: guilty,
                pool_not_guilty: not_guilty,
                updated_at: Some(updated_at),
            },
            None => PoolSnapshot::empty(case_id),
        })
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
