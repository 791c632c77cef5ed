//! SQLite persistence for users, boards, memberships, tasks and sessions.
//!
//! A single connection sits behind a mutex. Every public method locks it for
//! the duration of one call and releases it before returning, so no handle is
//! held across calls or awaits.

mod boards;
pub mod models;
mod sessions;
mod tasks;
mod users;

pub use models::{
    Board, BoardAccess, MemberRecord, Role, Session, Task, TaskPriority, TaskQuery, TaskSort,
    TaskStatus, User,
};
pub use sessions::SessionStore;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored value is corrupt: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// True for UNIQUE / PRIMARY KEY / CHECK / FOREIGN KEY violations.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id            TEXT PRIMARY KEY,
        username      TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        created_at    INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS boards (
        id         TEXT PRIMARY KEY,
        name       TEXT NOT NULL,
        owner_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS board_members (
        board_id   TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
        user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        role       TEXT NOT NULL CHECK (role IN ('OWNER','MEMBER')),
        created_at INTEGER NOT NULL,
        PRIMARY KEY (board_id, user_id)
    );
    CREATE TABLE IF NOT EXISTS tasks (
        id          TEXT PRIMARY KEY,
        board_id    TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
        title       TEXT NOT NULL,
        description TEXT,
        status      TEXT NOT NULL CHECK (status IN ('TODO','IN_PROGRESS','DONE')),
        priority    TEXT NOT NULL CHECK (priority IN ('LOW','MEDIUM','HIGH')),
        due_date    INTEGER,
        created_at  INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tasks_board_created ON tasks(board_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_tasks_board_due ON tasks(board_id, due_date);
    CREATE INDEX IF NOT EXISTS idx_tasks_board_priority ON tasks(board_id, priority);
    CREATE TABLE IF NOT EXISTS sessions (
        jti        TEXT PRIMARY KEY,
        user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        expires_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
";

/// SQLite-backed repository for every persisted record.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the database file and ensures the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Corrupt(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "Opened task store");
        Ok(store)
    }

    /// Private in-memory database, mostly for tests.
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}
