//! SQLite storage layer for received messages.
//!
//! A single connection behind a mutex serves all operations. Idempotency is
//! enforced by the PRIMARY KEY on `message_id`: a concurrent or repeated
//! insert of the same id surfaces as a constraint violation inside SQLite
//! and is reported as [`InsertOutcome::Duplicate`], so there is no
//! check-then-insert race anywhere in this module.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{Connection, ErrorCode};
use serde::Serialize;
use thiserror::Error;

const CREATE_MESSAGES_SQL: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        message_id TEXT PRIMARY KEY,
        from_msisdn TEXT NOT NULL,
        to_msisdn TEXT NOT NULL,
        ts TEXT NOT NULL,
        text TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages (ts);
    CREATE INDEX IF NOT EXISTS idx_messages_from ON messages (from_msisdn);
";

/// Storage layer failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage lock poisoned")]
    LockPoisoned,
}

/// Insert result distinguishing a first write from an idempotent replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    Duplicate,
}

/// A validated message accepted for persistence.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: String,
    pub from_msisdn: String,
    pub to_msisdn: String,
    pub ts: String,
    pub text: Option<String>,
}

/// One stored message as returned by queries.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub message_id: String,
    #[serde(rename = "from")]
    pub from_msisdn: String,
    #[serde(rename = "to")]
    pub to_msisdn: String,
    pub ts: String,
    pub text: Option<String>,
}

/// Filters and pagination for [`MessageStore::query`].
///
/// Filters combine with logical AND. Limit and offset are expected to be
/// clamped by the caller before they reach the store.
#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub limit: i64,
    pub offset: i64,
    /// Exact match on the sender MSISDN
    pub from_msisdn: Option<String>,
    /// Inclusive lower bound on `ts` (lexicographic, valid for ISO-8601 UTC)
    pub since: Option<String>,
    /// Case-insensitive substring match on the message text
    pub text_contains: Option<String>,
}

/// A page of query results plus the total match count before pagination.
#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub data: Vec<MessageRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Per-sender message count for the stats report.
#[derive(Debug, Serialize)]
pub struct SenderCount {
    #[serde(rename = "from")]
    pub from_msisdn: String,
    pub count: i64,
}

/// Aggregate summary over all stored messages.
#[derive(Debug, Serialize)]
pub struct StatsSummary {
    pub total_messages: i64,
    pub senders_count: i64,
    pub messages_per_sender: Vec<SenderCount>,
    pub first_message_ts: Option<String>,
    pub last_message_ts: Option<String>,
}

/// SQLite-backed message store, cheap to clone into request handlers.
#[derive(Clone)]
pub struct MessageStore {
    conn: Arc<Mutex<Connection>>,
}

impl MessageStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(CREATE_MESSAGES_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Insert a message, treating an existing `message_id` as a no-op.
    ///
    /// `created_at` is stamped here, once, at UTC second precision; a
    /// duplicate leaves the stored row (including its stamp) untouched.
    pub fn insert(&self, message: &NewMessage) -> Result<InsertOutcome, StoreError> {
        let created_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let conn = self.conn()?;

        let result = conn.execute(
            "INSERT INTO messages (message_id, from_msisdn, to_msisdn, ts, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                message.message_id,
                message.from_msisdn,
                message.to_msisdn,
                message.ts,
                message.text,
                created_at,
            ],
        );

        match result {
            Ok(_) => Ok(InsertOutcome::Created),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    /// Filtered, paginated retrieval ordered by `ts ASC, message_id ASC`.
    ///
    /// The tie-break on `message_id` gives a total order, so pagination is
    /// stable even when timestamps collide.
    pub fn query(&self, q: &MessageQuery) -> Result<MessagePage, StoreError> {
        let like_pattern = q
            .text_contains
            .as_ref()
            .map(|t| format!("%{}%", t.to_lowercase()));

        let mut where_clauses: Vec<&str> = Vec::new();
        let mut filter_params: Vec<&dyn ToSql> = Vec::new();

        if let Some(from) = &q.from_msisdn {
            where_clauses.push("from_msisdn = ?");
            filter_params.push(from);
        }
        if let Some(since) = &q.since {
            where_clauses.push("ts >= ?");
            filter_params.push(since);
        }
        if let Some(pattern) = &like_pattern {
            where_clauses.push("LOWER(text) LIKE ?");
            filter_params.push(pattern);
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let conn = self.conn()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM messages {where_sql}"),
            filter_params.as_slice(),
            |row| row.get(0),
        )?;

        let mut page_params = filter_params.clone();
        page_params.push(&q.limit);
        page_params.push(&q.offset);

        let mut stmt = conn.prepare(&format!(
            "SELECT message_id, from_msisdn, to_msisdn, ts, text FROM messages {where_sql}
             ORDER BY ts ASC, message_id ASC LIMIT ? OFFSET ?"
        ))?;
        let data = stmt
            .query_map(page_params.as_slice(), |row| {
                Ok(MessageRecord {
                    message_id: row.get(0)?,
                    from_msisdn: row.get(1)?,
                    to_msisdn: row.get(2)?,
                    ts: row.get(3)?,
                    text: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MessagePage {
            data,
            total,
            limit: q.limit,
            offset: q.offset,
        })
    }

    /// Aggregate summary: totals, distinct senders, top senders, ts range.
    ///
    /// `messages_per_sender` holds the top 10 senders by count descending;
    /// equal counts are ordered by sender ascending so the list is stable.
    pub fn stats(&self) -> Result<StatsSummary, StoreError> {
        let conn = self.conn()?;

        let total_messages: i64 =
            conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;

        let senders_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT from_msisdn) FROM messages",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT from_msisdn, COUNT(*) AS cnt FROM messages
             GROUP BY from_msisdn ORDER BY cnt DESC, from_msisdn ASC LIMIT 10",
        )?;
        let messages_per_sender = stmt
            .query_map([], |row| {
                Ok(SenderCount {
                    from_msisdn: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let (first_message_ts, last_message_ts) =
            conn.query_row("SELECT MIN(ts), MAX(ts) FROM messages", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;

        Ok(StatsSummary {
            total_messages,
            senders_count,
            messages_per_sender,
            first_message_ts,
            last_message_ts,
        })
    }

    /// Storage reachability check used by the readiness probe.
    pub fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err.sqlite_error_code(), Some(ErrorCode::ConstraintViolation))
}
