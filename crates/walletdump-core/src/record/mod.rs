//! Wallet record classification and decoding.
//!
//! Every wallet record key starts with a length-prefixed type tag followed
//! by type-specific key fields; the value layout depends on the tag. Only a
//! closed set of types is decoded:
//!
//! | Tag       | Key fields            | Value                                          |
//! |-----------|-----------------------|------------------------------------------------|
//! | `mkey`    | id (unused)           | encrypted key, salt, [method, iterations]      |
//! | `key`     | public key            | private key, [timestamp]                       |
//! | `ckey`    | public key            | encrypted private key, [timestamp]             |
//! | `name`    | address               | label                                          |
//! | `keymeta` | public key            | version, timestamp (exactly 8 bytes)           |
//!
//! Any other tag classifies as [`Classification::Unknown`] and is ignored by
//! the scanner.

mod entity;

use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::store::Backend;
use std::fmt;

pub use entity::{AddressLabel, KeyEntry, KeyMetadata, MasterKey};

/// Key under which SQLite wallets store the master key record.
///
/// Matched as an opaque constant; only the SQLite backend uses it.
pub const SQLITE_MASTER_KEY_ID: [u8; 9] = [0x04, b'm', b'k', b'e', b'y', 0x01, 0x00, 0x00, 0x00];

/// Size of a `keymeta` value: version plus timestamp
const KEY_METADATA_LEN: usize = 8;

/// Record types the parser decodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// `mkey`
    MasterKey,
    /// `key`
    Key,
    /// `ckey`
    EncryptedKey,
    /// `name`
    Name,
    /// `keymeta`
    KeyMetadata,
}

impl RecordType {
    /// Looks up a type tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "mkey" => Some(Self::MasterKey),
            "key" => Some(Self::Key),
            "ckey" => Some(Self::EncryptedKey),
            "name" => Some(Self::Name),
            "keymeta" => Some(Self::KeyMetadata),
            _ => None,
        }
    }

    /// Returns the on-disk tag
    pub fn tag(&self) -> &'static str {
        match self {
            Self::MasterKey => "mkey",
            Self::Key => "key",
            Self::EncryptedKey => "ckey",
            Self::Name => "name",
            Self::KeyMetadata => "keymeta",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Result of reading a record key's type tag
#[derive(Debug, Clone)]
pub enum Classification<'a> {
    /// A decodable type; `key` is positioned just past the tag
    Known {
        /// Record type
        kind: RecordType,
        /// Cursor over the remaining key fields
        key: ByteCursor<'a>,
    },
    /// A tag outside the decoded set
    Unknown(String),
}

/// A decoded record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// `mkey`
    MasterKey(MasterKey),
    /// `key` or `ckey`
    Key(KeyEntry),
    /// `name`
    Name(AddressLabel),
    /// `keymeta`
    KeyMetadata(KeyMetadata),
}

/// Classifies raw records and decodes their fields
#[derive(Debug, Clone)]
pub struct RecordParser {
    backend: Backend,
    max_field_len: usize,
}

impl RecordParser {
    /// Creates a parser for records read from `backend`.
    ///
    /// `max_field_len` caps every length-prefixed field.
    pub fn new(backend: Backend, max_field_len: usize) -> Self {
        Self {
            backend,
            max_field_len,
        }
    }

    /// Determine the record type from its key.
    ///
    /// Fails only when the tag itself cannot be read.
    pub fn classify<'a>(&self, key: &'a [u8]) -> Result<Classification<'a>> {
        if self.backend == Backend::Sqlite && key == SQLITE_MASTER_KEY_ID {
            return Ok(Classification::Known {
                kind: RecordType::MasterKey,
                key: ByteCursor::at(key, key.len())?,
            });
        }

        let mut cursor = ByteCursor::new(key);
        let tag = cursor.read_length_prefixed_string(self.max_field_len)?;
        Ok(match RecordType::from_tag(&tag) {
            Some(kind) => Classification::Known { kind, key: cursor },
            None => Classification::Unknown(tag),
        })
    }

    /// Decode the fields of a classified record
    pub fn decode(
        &self,
        kind: RecordType,
        mut key: ByteCursor<'_>,
        value: &[u8],
    ) -> Result<Record> {
        let mut value = ByteCursor::new(value);
        match kind {
            RecordType::MasterKey => self.decode_master_key(&mut value).map(Record::MasterKey),
            RecordType::Key | RecordType::EncryptedKey => self
                .decode_key(&mut key, &mut value, kind == RecordType::EncryptedKey)
                .map(Record::Key),
            RecordType::Name => Ok(Record::Name(AddressLabel {
                address: key.read_length_prefixed_string(self.max_field_len)?,
                label: value.read_length_prefixed_string(self.max_field_len)?,
            })),
            RecordType::KeyMetadata => self
                .decode_key_metadata(&mut key, &mut value)
                .map(Record::KeyMetadata),
        }
    }

    fn decode_master_key(&self, value: &mut ByteCursor<'_>) -> Result<MasterKey> {
        let encrypted_key = value.read_length_prefixed(self.max_field_len)?;
        let salt = value.read_length_prefixed(self.max_field_len)?;

        // Older wallets stop after the salt
        let (derivation_method, iterations) = if value.remaining() >= 8 {
            (value.read_u32_le()?, value.read_u32_le()?)
        } else {
            (0, 0)
        };

        if encrypted_key.is_empty() {
            return Err(Error::invalid_record("master key has empty encrypted key"));
        }
        if salt.is_empty() {
            return Err(Error::invalid_record("master key has empty salt"));
        }

        Ok(MasterKey {
            encrypted_key,
            salt,
            derivation_method,
            iterations,
        })
    }

    fn read_public_key(&self, key: &mut ByteCursor<'_>) -> Result<Vec<u8>> {
        let public_key = key.read_length_prefixed(self.max_field_len)?;
        if public_key.is_empty() {
            return Err(Error::invalid_record("empty public key"));
        }
        Ok(public_key)
    }

    fn decode_key(
        &self,
        key: &mut ByteCursor<'_>,
        value: &mut ByteCursor<'_>,
        encrypted: bool,
    ) -> Result<KeyEntry> {
        let public_key = self.read_public_key(key)?;
        let private_key = value.read_length_prefixed(self.max_field_len)?;
        let created_at = if value.remaining() >= 4 {
            value.read_u32_le()?
        } else {
            0
        };

        Ok(KeyEntry {
            public_key,
            private_key,
            created_at,
            encrypted,
        })
    }

    fn decode_key_metadata(
        &self,
        key: &mut ByteCursor<'_>,
        value: &mut ByteCursor<'_>,
    ) -> Result<KeyMetadata> {
        let public_key = self.read_public_key(key)?;
        if value.remaining() != KEY_METADATA_LEN {
            return Err(Error::invalid_record(format!(
                "key metadata value is {} bytes, expected {}",
                value.remaining(),
                KEY_METADATA_LEN
            )));
        }
        let _version = value.read_u32_le()?;
        let created_at = value.read_u32_le()?;

        Ok(KeyMetadata {
            public_key,
            created_at,
        })
    }
}
