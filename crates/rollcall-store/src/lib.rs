//! rollcall-store: SQLite persistence for identities and attendance.
//!
//! Two relations: `identities` (unique roll number, encoding blob) and
//! `attendance` (identity reference, local timestamp). The store is a cheap
//! clone over one shared connection so the recognition worker and the
//! control surface can both use it.

pub mod reports;
pub mod schema;

use chrono::NaiveDateTime;
use rollcall_core::{format_timestamp, AttendanceLog, Encoding, Identity};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

pub use reports::{AttendanceEntry, AttendanceScope, DailyStats, DayCount};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create data directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("roll number {0} already exists")]
    DuplicateRoll(String),
    #[error("identity {0} does not exist")]
    UnknownIdentity(i64),
    #[error("identity {0} has a corrupt encoding blob")]
    CorruptEncoding(i64),
}

/// Identity without its encoding, as listed to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentitySummary {
    pub id: i64,
    pub name: String,
    pub roll: String,
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened attendance database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        schema::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite itself consistent.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new identity. Fails with `DuplicateRoll` if the roll exists.
    pub fn add_identity(
        &self,
        name: &str,
        roll: &str,
        encoding: &Encoding,
        created_at: NaiveDateTime,
    ) -> Result<i64, StoreError> {
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO identities (name, roll_number, encoding, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, roll, encoding.to_le_bytes(), format_timestamp(created_at)],
        );
        match result {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                tracing::info!(id, roll, "identity registered");
                Ok(id)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::DuplicateRoll(roll.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn roll_exists(&self, roll: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT id FROM identities WHERE roll_number = ?1",
                [roll],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Every identity with its encoding, ordered by roll number.
    pub fn load_identities(&self) -> Result<Vec<Identity>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, roll_number, encoding FROM identities ORDER BY roll_number",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut identities = Vec::new();
        for row in rows {
            let (id, display_name, roll, blob) = row?;
            let encoding = Encoding::from_le_bytes(&blob).ok_or(StoreError::CorruptEncoding(id))?;
            identities.push(Identity {
                id,
                display_name,
                roll,
                encoding,
            });
        }
        Ok(identities)
    }

    pub fn list_identities(&self) -> Result<Vec<IdentitySummary>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, name, roll_number FROM identities ORDER BY roll_number")?;
        let rows = stmt.query_map([], |row| {
            Ok(IdentitySummary {
                id: row.get(0)?,
                name: row.get(1)?,
                roll: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_identity(&self, id: i64) -> Result<Option<IdentitySummary>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, name, roll_number FROM identities WHERE id = ?1",
                [id],
                |row| {
                    Ok(IdentitySummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        roll: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn identity_count(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?)
    }

    /// Delete an identity and all of its attendance records.
    /// Returns `false` if no identity has this roll.
    pub fn delete_identity(&self, roll: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id: Option<i64> = tx
            .query_row(
                "SELECT id FROM identities WHERE roll_number = ?1",
                [roll],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = id else {
            return Ok(false);
        };

        let records = tx.execute("DELETE FROM attendance WHERE identity_id = ?1", [id])?;
        tx.execute("DELETE FROM identities WHERE id = ?1", [id])?;
        tx.commit()?;

        tracing::info!(id, roll, records, "identity deleted");
        Ok(true)
    }

    /// Raw text of the latest attendance timestamp for an identity.
    pub fn last_mark_raw(&self, identity_id: i64) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT timestamp FROM attendance WHERE identity_id = ?1
                 ORDER BY timestamp DESC LIMIT 1",
                [identity_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Append an attendance record. The identity must exist at write time.
    pub fn insert_mark(&self, identity_id: i64, at: NaiveDateTime) -> Result<i64, StoreError> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO attendance (identity_id, timestamp)
             SELECT id, ?2 FROM identities WHERE id = ?1",
            params![identity_id, format_timestamp(at)],
        )?;
        if inserted == 0 {
            return Err(StoreError::UnknownIdentity(identity_id));
        }
        Ok(conn.last_insert_rowid())
    }
}

impl AttendanceLog for Store {
    type Error = StoreError;

    fn last_mark(&self, identity_id: i64) -> Result<Option<String>, StoreError> {
        self.last_mark_raw(identity_id)
    }

    fn record_mark(&self, identity_id: i64, at: NaiveDateTime) -> Result<(), StoreError> {
        self.insert_mark(identity_id, at).map(|_| ())
    }
}
