//! Key/value sources over wallet files.
//!
//! A wallet file is one of two on-disk stores:
//!
//! - a Berkeley DB B-tree file with a `main` subdatabase ([`BerkeleySource`])
//! - an SQLite database with a two-column `main` table ([`SqliteSource`])
//!
//! Both are exposed through the [`KvSource`] trait, which yields raw
//! `(key, value)` pairs in physical store order. The record parser only ever
//! sees [`RawRecord`]s and the [`Backend`] tag, never the storage libraries.
//!
//! Pairs obtained some other way, such as a `db_dump` export or a salvage
//! tool's output, can be scanned through [`MemorySource`].
//!
//! ## Detection
//!
//! [`open_wallet`] tries the B-tree reader first and falls back to SQLite on
//! any failure. The first backend that opens is trusted for the whole scan.
//! There is no cross-check against a format signature beyond what each
//! backend validates on open, so a file that happens to satisfy the B-tree
//! reader is never offered to SQLite.

mod berkeley;
mod sqlite;

use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use tracing::debug;

pub use berkeley::BerkeleySource;
pub use sqlite::SqliteSource;

/// Storage backend a record was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Berkeley DB B-tree file
    BerkeleyDb,
    /// SQLite database
    Sqlite,
    /// Pairs supplied by the caller through [`MemorySource`]
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::BerkeleyDb => "berkeley-db",
            Backend::Sqlite => "sqlite",
            Backend::Memory => "memory",
        })
    }
}

/// One raw key/value pair as stored on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Serialized record key (type tag followed by key fields)
    pub key: Bytes,
    /// Serialized record value
    pub value: Bytes,
}

impl RawRecord {
    /// Creates a new raw record
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns true if either side is empty
    pub fn is_empty(&self) -> bool {
        self.key.is_empty() || self.value.is_empty()
    }
}

/// Ordered enumerator over the raw pairs of one wallet file
pub trait KvSource {
    /// Backend this source reads from
    fn backend(&self) -> Backend;

    /// Yield the next pair, or `None` once the store is exhausted.
    ///
    /// An error ends the enumeration; records already yielded stay valid.
    fn next_pair(&mut self) -> Result<Option<RawRecord>>;
}

impl<S: KvSource + ?Sized> KvSource for Box<S> {
    fn backend(&self) -> Backend {
        (**self).backend()
    }

    fn next_pair(&mut self) -> Result<Option<RawRecord>> {
        (**self).next_pair()
    }
}

/// Source over pairs the caller has already extracted.
///
/// Reports [`Backend::Memory`] unless built with [`MemorySource::with_backend`],
/// which matters for SQLite exports: the master key sentinel key is only
/// recognized on [`Backend::Sqlite`].
#[derive(Debug, Clone)]
pub struct MemorySource {
    backend: Backend,
    records: VecDeque<RawRecord>,
}

impl MemorySource {
    /// Creates a source that reports [`Backend::Memory`]
    pub fn new(records: impl IntoIterator<Item = RawRecord>) -> Self {
        Self::with_backend(Backend::Memory, records)
    }

    /// Creates a source that reports the given backend
    pub fn with_backend(backend: Backend, records: impl IntoIterator<Item = RawRecord>) -> Self {
        Self {
            backend,
            records: records.into_iter().collect(),
        }
    }
}

impl KvSource for MemorySource {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn next_pair(&mut self) -> Result<Option<RawRecord>> {
        Ok(self.records.pop_front())
    }
}

/// Open a wallet file with whichever backend accepts it first
pub fn open_wallet(path: impl AsRef<Path>) -> Result<Box<dyn KvSource>> {
    let path = path.as_ref();

    let bdb_err = match BerkeleySource::open(path) {
        Ok(source) => {
            debug!("Opened {} as Berkeley DB", path.display());
            return Ok(Box::new(source));
        }
        Err(e) => e,
    };
    debug!(
        "Berkeley DB open failed for {}: {}; trying SQLite",
        path.display(),
        bdb_err
    );

    match SqliteSource::open(path) {
        Ok(source) => {
            debug!("Opened {} as SQLite", path.display());
            Ok(Box::new(source))
        }
        Err(sqlite_err) => Err(Error::open(
            path,
            format!("berkeley db: {bdb_err}; sqlite: {sqlite_err}"),
        )),
    }
}
