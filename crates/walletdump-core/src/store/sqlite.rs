//! SQLite wallet backend.
//!
//! Descriptor-era wallets keep every record in a single `main` table with
//! `key` and `value` blob columns.

use super::{Backend, KvSource, RawRecord};
use crate::error::{Error, Result};
use bytes::Bytes;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, warn};

const SELECT_ALL: &str = "SELECT key, value FROM main";

/// Key/value source over the `main` table of an SQLite wallet
#[derive(Debug)]
pub struct SqliteSource {
    rows: VecDeque<RawRecord>,
}

impl SqliteSource {
    /// Open the database read-only and load every row of `main`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| Error::file_read(path, e))?;
        if !metadata.is_file() {
            return Err(Error::file_read(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::from_connection(&conn)
    }

    /// Load every row of `main` from an open connection
    pub fn from_connection(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare(SELECT_ALL)?;
        let mut query = stmt.query([])?;

        let mut rows = VecDeque::new();
        let mut skipped = 0usize;
        while let Some(row) = query.next()? {
            match (blob(row.get_ref(0)?), blob(row.get_ref(1)?)) {
                (Some(key), Some(value)) => rows.push_back(RawRecord { key, value }),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!("Skipped {} SQLite rows with non-blob key or value", skipped);
        }
        debug!("Loaded {} rows from SQLite table 'main'", rows.len());

        Ok(Self { rows })
    }
}

fn blob(value: ValueRef<'_>) -> Option<Bytes> {
    match value {
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Some(Bytes::copy_from_slice(bytes)),
        _ => None,
    }
}

impl KvSource for SqliteSource {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn next_pair(&mut self) -> Result<Option<RawRecord>> {
        Ok(self.rows.pop_front())
    }
}
