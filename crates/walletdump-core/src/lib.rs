//! # walletdump-core
//!
//! A library for extracting key material and password hashes from Bitcoin Core
//! `wallet.dat` files.
//!
//! This crate provides the core functionality for:
//! - Reading raw key/value pairs from Berkeley DB and SQLite wallet stores
//! - Classifying and decoding the `mkey`, `key`, `ckey`, `name` and `keymeta` records
//! - Rendering the encrypted master key as a `$bitcoin$` hash line
//!
//! ## Architecture
//!
//! - [`cursor`]: Bounds-checked reads and CompactSize decoding
//! - [`store`]: Key/value sources over the supported storage backends
//! - [`record`]: Record classification and typed decoding
//! - [`wallet`]: Single-pass scanning into a [`WalletModel`]
//! - [`hash`]: `$bitcoin$` hash line formatting
//! - [`report`]: Human-readable detail report
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use walletdump_core::{ScanConfig, WalletScanner};
//!
//! let scanner = WalletScanner::with_config(ScanConfig::new().master_key_only(true));
//! let scan = scanner.scan_file("wallet.dat")?;
//!
//! match scan.model.hash_line() {
//!     Ok(line) => println!("{}", line),
//!     Err(e) => eprintln!("no hash: {}", e),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! Any ordered key/value enumerator can be scanned by implementing
//! [`KvSource`]. Pairs already extracted by another tool can be fed through
//! [`MemorySource`].

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod cursor;
pub mod error;
pub mod hash;
pub mod record;
pub mod report;
pub mod store;
pub mod wallet;

// Re-export primary types for convenience
pub use cursor::ByteCursor;
pub use error::{Error, Result};
pub use hash::format_hash;
pub use record::{
    AddressLabel, KeyEntry, KeyMetadata, MasterKey, Record, RecordParser, RecordType,
};
pub use report::DetailReport;
pub use store::{
    open_wallet, Backend, BerkeleySource, KvSource, MemorySource, RawRecord, SqliteSource,
};
pub use wallet::{
    ScanConfig, ScanStats, WalletModel, WalletScan, WalletScanner, DEFAULT_MAX_FIELD_LEN,
};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
