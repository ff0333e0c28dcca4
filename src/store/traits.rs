//! `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::auth::model::Identity;
use crate::error::DatabaseError;
use crate::logs::model::{DailyLog, LogData, LogSummary};

/// A registered account, including its password hash.
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl StoredUser {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            email: self.email.clone(),
        }
    }
}

/// Outcome of a conditional payload write.
#[derive(Debug, Clone)]
pub enum LogWrite {
    Updated(DailyLog),
    /// No row with that id.
    Missing,
    /// The row exists but its revision did not match the expected one.
    RevisionMismatch { actual: i64 },
}

/// Backend-agnostic database trait covering accounts, sessions, and daily logs.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Insert a new account. A duplicate email is a `Constraint` error.
    async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<StoredUser, DatabaseError>;

    /// Look up an account by (normalized) email.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<StoredUser>, DatabaseError>;

    // ── Sessions ────────────────────────────────────────────────────

    /// Persist a session keyed by the hash of its bearer token.
    async fn insert_session(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Resolve a session to its user, ignoring sessions expired at `now`.
    async fn get_session_identity(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, DatabaseError>;

    /// Delete a session. Returns the owning user id if a row was removed.
    async fn delete_session(&self, token_hash: &str) -> Result<Option<Uuid>, DatabaseError>;

    /// Delete sessions that expired before `now`. Returns the number removed.
    async fn prune_sessions(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError>;

    // ── Daily logs ──────────────────────────────────────────────────

    /// Get the log for (user, date), if one exists.
    async fn get_log_by_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DailyLog>, DatabaseError>;

    /// Insert a log for (user, date) unless one already exists, then return
    /// whichever row is stored.
    async fn insert_log_if_absent(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        log_data: &LogData,
    ) -> Result<DailyLog, DatabaseError>;

    /// Get a log by id.
    async fn get_log(&self, id: Uuid) -> Result<Option<DailyLog>, DatabaseError>;

    /// Replace a log's payload. When `expected_revision` is set the write
    /// only happens if the stored revision matches.
    async fn update_log_data(
        &self,
        id: Uuid,
        log_data: &LogData,
        expected_revision: Option<i64>,
    ) -> Result<LogWrite, DatabaseError>;

    /// Summaries of all logs for a user, newest date first.
    async fn list_log_summaries(&self, user_id: Uuid) -> Result<Vec<LogSummary>, DatabaseError>;
}
