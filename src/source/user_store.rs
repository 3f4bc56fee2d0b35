//! SQLite user table.
//!
//! Read path for `/get-user` plus the schema and demo seed used at startup.

use super::AuthoritativeSource;
use crate::payload::UserQuery;
use crate::record::UserRecord;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    age INTEGER
)";

const DEMO_USERS: [(i64, &str, i64); 3] = [(1, "Michael", 45), (2, "Jim", 35), (3, "Pam", 27)];

/// SQLite-backed user table.
///
/// Every lookup opens its own read-only connection on a blocking thread and drops it
/// when done; no connection is shared between requests.
#[derive(Debug, Clone)]
pub struct UserStore {
    path: PathBuf,
}

impl UserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the `users` table if missing.
    pub async fn init_schema(&self) -> Result<()> {
        self.with_writer(|conn| conn.execute_batch(SCHEMA)).await
    }

    /// Insert the demo rows; rows that already exist are left alone.
    pub async fn seed_demo_users(&self) -> Result<()> {
        self.with_writer(|conn| {
            let tx = conn.transaction()?;
            for (id, name, age) in DEMO_USERS {
                tx.execute(
                    "INSERT OR IGNORE INTO users (id, name, age) VALUES (?1, ?2, ?3)",
                    params![id, name, age],
                )?;
            }
            tx.commit()
        })
        .await
    }

    /// Insert or replace a single row.
    pub async fn insert(&self, user: UserRecord) -> Result<()> {
        self.with_writer(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO users (id, name, age) VALUES (?1, ?2, ?3)",
                params![user.id, user.name, user.age],
            )
            .map(|_| ())
        })
        .await
    }

    async fn with_writer<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<()> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(&mut conn)
        })
        .await
        .map_err(join_error)?
        .map_err(|e| sqlite_error("write failed", e))
    }

    fn lookup(path: &Path, id: i64) -> rusqlite::Result<Option<UserRecord>> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.query_row(
            "SELECT id, name, age FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    age: row.get(2)?,
                })
            },
        )
        .optional()
    }
}

fn sqlite_error(what: &str, e: rusqlite::Error) -> Error {
    Error::source_with_context(
        format!("user store {}: {}", what, e),
        ErrorContext::new().with_source("user_store"),
    )
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::source_with_context(
        format!("user store task failed: {}", e),
        ErrorContext::new().with_source("user_store"),
    )
}

#[async_trait]
impl AuthoritativeSource for UserStore {
    type Payload = UserQuery;
    type Record = UserRecord;

    async fn fetch(&self, payload: &UserQuery) -> Result<Option<UserRecord>> {
        let path = self.path.clone();
        let id = payload.user_id;
        let row = tokio::task::spawn_blocking(move || Self::lookup(&path, id))
            .await
            .map_err(join_error)?
            .map_err(|e| sqlite_error("lookup failed", e))?;
        tracing::debug!(user_id = id, found = row.is_some(), "user store lookup");
        Ok(row)
    }

    fn name(&self) -> &'static str {
        "user_store"
    }
}
