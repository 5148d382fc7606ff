//! facematch-store — Persistence boundary for registered identities.
//!
//! The session only sees [`IdentityStore`]. [`SqliteStore`] is the real
//! backend; [`MemoryStore`] keeps everything in process for tests and
//! dry runs. Both enforce case-insensitive name uniqueness and report a
//! collision as [`StoreError::DuplicateName`].

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::Utc;
use facematch_core::{Embedding, IdentityRecord};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("an identity named {0:?} is already registered")]
    DuplicateName(String),
    #[error("stored record {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("store lock poisoned")]
    Lock,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Where registered identities live between sessions.
pub trait IdentityStore: Send {
    /// Every stored identity, oldest first.
    fn load_all(&self) -> Result<Vec<IdentityRecord>, StoreError>;

    /// Persist a new identity. Fails with [`StoreError::DuplicateName`] if
    /// the name is taken under case-insensitive comparison.
    fn insert(&self, record: &IdentityRecord) -> Result<(), StoreError>;

    /// Delete by name (case-insensitive). Returns whether a record was removed.
    fn delete(&self, name: &str) -> Result<bool, StoreError>;
}

/// Build a fresh record with a random id, stamped now.
pub fn new_record(name: &str, embedding: Embedding) -> IdentityRecord {
    IdentityRecord {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        embedding,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_ids_are_unique() {
        let a = new_record("alice", Embedding::new(vec![0.0]));
        let b = new_record("alice", Embedding::new(vec![0.0]));
        assert_ne!(a.id, b.id);
        assert_eq!(a.name, "alice");
    }
}
