//! SQLite-backed identity store.

use crate::{IdentityStore, StoreError};
use chrono::{DateTime, Utc};
use facematch_core::{normalize_name, Embedding, IdentityRecord};
use rusqlite::{ffi, params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    name_key    TEXT NOT NULL UNIQUE,
    embedding   BLOB NOT NULL,
    created_at  TEXT NOT NULL
);
";

/// Thread-safe via an internal `Mutex<Connection>`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened identity store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }
}

impl IdentityStore for SqliteStore {
    fn load_all(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, embedding, created_at FROM identities ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, name, blob, created_at) = row?;
            let embedding = decode_embedding(&blob).map_err(|reason| StoreError::Corrupt {
                id: id.clone(),
                reason,
            })?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| StoreError::Corrupt {
                    id: id.clone(),
                    reason: format!("created_at: {e}"),
                })?
                .with_timezone(&Utc);
            records.push(IdentityRecord {
                id,
                name,
                embedding,
                created_at,
            });
        }

        tracing::debug!(count = records.len(), "loaded identities");
        Ok(records)
    }

    fn insert(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO identities (id, name, name_key, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.name,
                normalize_name(&record.name),
                encode_embedding(&record.embedding),
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            // A primary-key clash is also a constraint violation; only the
            // UNIQUE index on name_key means the name is taken.
            if let rusqlite::Error::SqliteFailure(err, _) = &e {
                if err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE {
                    return StoreError::DuplicateName(record.name.clone());
                }
            }
            StoreError::Sqlite(e)
        })?;

        tracing::info!(id = %record.id, name = %record.name, "stored identity");
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM identities WHERE name_key = ?1",
            params![normalize_name(name)],
        )?;
        if removed > 0 {
            tracing::info!(name, "deleted identity");
        }
        Ok(removed > 0)
    }
}

fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    embedding
        .values()
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

fn decode_embedding(blob: &[u8]) -> Result<Embedding, String> {
    if blob.len() % 4 != 0 {
        return Err(format!("embedding blob length {} is not a multiple of 4", blob.len()));
    }
    let values: Vec<f32> = blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(format!("embedding value {pos} is not finite"));
    }
    Ok(Embedding::new(values))
}
