//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::model::Identity;
use crate::error::DatabaseError;
use crate::logs::model::{DailyLog, LogData, LogSummary};
use crate::store::migrations;
use crate::store::traits::{Database, LogWrite, StoredUser};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn current_revision(&self, id: Uuid) -> Result<Option<i64>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT revision FROM daily_logs WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("current_revision: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<i64>(0)
                    .map_err(|e| DatabaseError::Query(format!("daily_log.revision: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("current_revision: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // SQLite datetime() output
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Canonical write format: fixed-width RFC 3339 in UTC, so stored values
/// compare correctly as text.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_uuid(field: &str, s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Query(format!("{field} parse: {e}")))
}

fn parse_date(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| DatabaseError::Query(format!("daily_log.date parse {s:?}: {e}")))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Decode a JSON string-array column; NULL or malformed values read as empty.
fn json_string_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// Map a libsql Row to a StoredUser.
///
/// Column order matches USER_COLUMNS.
fn row_to_user(row: &libsql::Row) -> Result<StoredUser, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("user.id: {e}")))?;
    let created_str: String = row.get(3).unwrap_or_default();

    Ok(StoredUser {
        id: parse_uuid("user.id", &id_str)?,
        email: row
            .get(1)
            .map_err(|e| DatabaseError::Query(format!("user.email: {e}")))?,
        password_hash: row
            .get(2)
            .map_err(|e| DatabaseError::Query(format!("user.password_hash: {e}")))?,
        created_at: parse_datetime(&created_str),
    })
}

/// Map a libsql Row to a DailyLog.
///
/// Column order matches LOG_COLUMNS:
/// 0:id, 1:user_id, 2:date, 3:log_data, 4:revision, 5:created_at, 6:updated_at
fn row_to_log(row: &libsql::Row) -> Result<DailyLog, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("daily_log.id: {e}")))?;
    let user_id_str: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("daily_log.user_id: {e}")))?;
    let date_str: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("daily_log.date: {e}")))?;
    let data_str: String = row
        .get(3)
        .map_err(|e| DatabaseError::Query(format!("daily_log.log_data: {e}")))?;
    let created_str: String = row.get(5).unwrap_or_default();
    let updated_str: String = row.get(6).unwrap_or_default();

    let log_data: LogData = serde_json::from_str(&data_str)
        .map_err(|e| DatabaseError::Serialization(format!("daily_log.log_data: {e}")))?;

    Ok(DailyLog {
        id: parse_uuid("daily_log.id", &id_str)?,
        user_id: parse_uuid("daily_log.user_id", &user_id_str)?,
        date: parse_date(&date_str)?,
        log_data,
        revision: row
            .get::<i64>(4)
            .map_err(|e| DatabaseError::Query(format!("daily_log.revision: {e}")))?,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn serialize_log_data(log_data: &LogData) -> Result<String, DatabaseError> {
    serde_json::to_string(log_data).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

// ── Trait implementation ────────────────────────────────────────────

const DATE_FORMAT: &str = "%Y-%m-%d";

const USER_COLUMNS: &str = "id, email, password_hash, created_at";

const LOG_COLUMNS: &str = "id, user_id, date, log_data, revision, created_at, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<StoredUser, DatabaseError> {
        let user = StoredUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };

        self.conn()
            .execute(
                "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.id.to_string(),
                    user.email.as_str(),
                    user.password_hash.as_str(),
                    timestamp(user.created_at),
                ],
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DatabaseError::Constraint(format!("users.email {email:?} already exists"))
                } else {
                    DatabaseError::Query(format!("insert_user: {e}"))
                }
            })?;

        debug!(user_id = %user.id, "User inserted");
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<StoredUser>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_email: {e}"))),
        }
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn insert_session(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    token_hash,
                    user_id.to_string(),
                    timestamp(Utc::now()),
                    timestamp(expires_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_session: {e}")))?;
        Ok(())
    }

    async fn get_session_identity(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT u.id, u.email, s.expires_at FROM sessions s \
                 JOIN users u ON u.id = s.user_id \
                 WHERE s.token_hash = ?1",
                params![token_hash],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session_identity: {e}")))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("get_session_identity: {e}"))),
        };

        let expires_str: String = row.get(2).unwrap_or_default();
        if parse_datetime(&expires_str) <= now {
            return Ok(None);
        }

        let id_str: String = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("session.user_id: {e}")))?;
        Ok(Some(Identity {
            id: parse_uuid("session.user_id", &id_str)?,
            email: row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("session.email: {e}")))?,
        }))
    }

    async fn delete_session(&self, token_hash: &str) -> Result<Option<Uuid>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "DELETE FROM sessions WHERE token_hash = ?1 RETURNING user_id",
                params![token_hash],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let id_str: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("delete_session row: {e}")))?;
                Ok(Some(parse_uuid("session.user_id", &id_str)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("delete_session: {e}"))),
        }
    }

    async fn prune_sessions(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![timestamp(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_sessions: {e}")))?;
        Ok(count as usize)
    }

    // ── Daily logs ──────────────────────────────────────────────────

    async fn get_log_by_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DailyLog>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LOG_COLUMNS} FROM daily_logs WHERE user_id = ?1 AND date = ?2"),
                params![user_id.to_string(), format_date(date)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_log_by_date: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_log(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_log_by_date: {e}"))),
        }
    }

    async fn insert_log_if_absent(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        log_data: &LogData,
    ) -> Result<DailyLog, DatabaseError> {
        let id = Uuid::new_v4();
        let now = timestamp(Utc::now());
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO daily_logs (id, user_id, date, log_data, revision, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
                 ON CONFLICT (user_id, date) DO NOTHING",
                params![
                    id.to_string(),
                    user_id.to_string(),
                    format_date(date),
                    serialize_log_data(log_data)?,
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_log_if_absent: {e}")))?;

        if inserted > 0 {
            debug!(id = %id, user_id = %user_id, date = %date, "Daily log created");
        }

        self.get_log_by_date(user_id, date)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "daily_log".to_string(),
                id: format!("{user_id}/{date}"),
            })
    }

    async fn get_log(&self, id: Uuid) -> Result<Option<DailyLog>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LOG_COLUMNS} FROM daily_logs WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_log: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_log(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_log row: {e}"))),
        }
    }

    async fn update_log_data(
        &self,
        id: Uuid,
        log_data: &LogData,
        expected_revision: Option<i64>,
    ) -> Result<LogWrite, DatabaseError> {
        let expected = match expected_revision {
            Some(r) => libsql::Value::Integer(r),
            None => libsql::Value::Null,
        };

        let updated = self
            .conn()
            .execute(
                "UPDATE daily_logs SET log_data = ?1, revision = revision + 1, updated_at = ?2
                 WHERE id = ?3 AND (?4 IS NULL OR revision = ?4)",
                params![
                    serialize_log_data(log_data)?,
                    timestamp(Utc::now()),
                    id.to_string(),
                    expected,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_log_data: {e}")))?;

        if updated == 0 {
            return Ok(match self.current_revision(id).await? {
                Some(actual) => LogWrite::RevisionMismatch { actual },
                None => LogWrite::Missing,
            });
        }

        debug!(id = %id, "Daily log updated");
        match self.get_log(id).await? {
            Some(log) => Ok(LogWrite::Updated(log)),
            None => Ok(LogWrite::Missing),
        }
    }

    async fn list_log_summaries(&self, user_id: Uuid) -> Result<Vec<LogSummary>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, date, json_extract(log_data, '$.accomplished'), json_extract(log_data, '$.in_progress') \
                 FROM daily_logs WHERE user_id = ?1 ORDER BY date DESC",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_log_summaries: {e}")))?;

        let mut summaries = Vec::new();
        loop {
            let row = match rows.next().await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("list_log_summaries row: {e}"))),
            };
            let id_str: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("summary.id: {e}")))?;
            let date_str: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("summary.date: {e}")))?;
            summaries.push(LogSummary {
                id: parse_uuid("summary.id", &id_str)?,
                date: parse_date(&date_str)?,
                accomplished: json_string_list(row.get(2).ok()),
                in_progress: json_string_list(row.get(3).ok()),
            });
        }
        Ok(summaries)
    }
}
