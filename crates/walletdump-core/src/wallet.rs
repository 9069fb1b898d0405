//! Single-pass wallet scanning.
//!
//! [`WalletScanner`] drains a [`KvSource`], classifies and decodes every
//! record, and accumulates the results in a [`WalletModel`]. Failures are
//! isolated per record: a record that cannot be decoded is logged and
//! dropped, and the scan moves on to the next pair.

use crate::error::{Error, Result};
use crate::hash;
use crate::record::{
    AddressLabel, Classification, KeyEntry, KeyMetadata, MasterKey, Record, RecordParser,
    RecordType,
};
use crate::store::{open_wallet, Backend, KvSource, RawRecord};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, trace, warn};

/// Default cap on a single length-prefixed field
pub const DEFAULT_MAX_FIELD_LEN: usize = 16 * 1024 * 1024;

/// Configuration for the scanner
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Largest length-prefixed field accepted before the record is rejected
    pub max_field_len: usize,
    /// Decode only master key records
    pub master_key_only: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_field_len: DEFAULT_MAX_FIELD_LEN,
            master_key_only: false,
        }
    }
}

impl ScanConfig {
    /// Creates a new scan config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum length of a single field
    pub fn max_field_len(mut self, max: usize) -> Self {
        self.max_field_len = max;
        self
    }

    /// Sets whether records other than `mkey` are decoded
    pub fn master_key_only(mut self, only: bool) -> Self {
        self.master_key_only = only;
        self
    }
}

/// Counters collected during one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Raw pairs read from the source
    pub records: usize,
    /// Pairs with an empty key or value
    pub empty: usize,
    /// Pairs with a tag outside the decoded set
    pub unknown: usize,
    /// Known records not decoded because of the scan configuration
    pub filtered: usize,
    /// Master key records accepted
    pub master_keys: usize,
    /// Master key records discarded because one was already accepted
    pub duplicate_master_keys: usize,
    /// `key` and `ckey` records decoded
    pub keys: usize,
    /// `name` records decoded
    pub names: usize,
    /// `keymeta` records decoded
    pub key_metadata: usize,
    /// Records whose tag or fields failed to decode
    pub failed: usize,
}

/// Entities recovered from one wallet file
#[derive(Debug, Clone, Default)]
pub struct WalletModel {
    master_key: Option<MasterKey>,
    keys: Vec<KeyEntry>,
    addresses: Vec<AddressLabel>,
    /// Public key -> position of its most recent entry in `keys`
    key_index: HashMap<Vec<u8>, usize>,
    /// Public key -> creation time from `keymeta` records
    key_times: HashMap<Vec<u8>, u32>,
}

impl WalletModel {
    /// Creates an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// The authoritative master key, if one was found
    pub fn master_key(&self) -> Option<&MasterKey> {
        self.master_key.as_ref()
    }

    /// Keys in store order
    pub fn keys(&self) -> &[KeyEntry] {
        &self.keys
    }

    /// Address labels in store order
    pub fn addresses(&self) -> &[AddressLabel] {
        &self.addresses
    }

    /// True when the wallet has a master key
    pub fn is_encrypted(&self) -> bool {
        self.master_key.is_some()
    }

    /// True when nothing was recovered
    pub fn is_empty(&self) -> bool {
        self.master_key.is_none() && self.keys.is_empty() && self.addresses.is_empty()
    }

    /// Record the master key unless one is already held.
    ///
    /// Returns false when the key was discarded.
    pub fn set_master_key(&mut self, master_key: MasterKey) -> bool {
        if self.master_key.is_some() {
            return false;
        }
        self.master_key = Some(master_key);
        true
    }

    /// Append a key entry
    pub fn add_key(&mut self, key: KeyEntry) {
        self.key_index.insert(key.public_key.clone(), self.keys.len());
        self.keys.push(key);
    }

    /// Append an address label
    pub fn add_address(&mut self, address: AddressLabel) {
        self.addresses.push(address);
    }

    /// Record key metadata, applying it at once if the key is already known
    pub fn add_key_metadata(&mut self, metadata: KeyMetadata) {
        if let Some(&index) = self.key_index.get(&metadata.public_key) {
            self.keys[index].created_at = metadata.created_at;
        }
        self.key_times.insert(metadata.public_key, metadata.created_at);
    }

    /// Join pending key metadata into the key entries.
    ///
    /// Returns the number of entries that received a creation time.
    pub fn finish(&mut self) -> usize {
        let mut joined = 0;
        for key in &mut self.keys {
            if let Some(&created_at) = self.key_times.get(&key.public_key) {
                key.created_at = created_at;
                joined += 1;
            }
        }
        joined
    }

    /// Render the `$bitcoin$` hash line for the master key
    pub fn hash_line(&self) -> Result<String> {
        let master_key = self.master_key.as_ref().ok_or(Error::MasterKeyMissing)?;
        hash::format_hash(master_key)
    }
}

/// Everything one scan produced
#[derive(Debug)]
pub struct WalletScan {
    /// Backend the records came from
    pub backend: Backend,
    /// Recovered entities
    pub model: WalletModel,
    /// Scan counters
    pub stats: ScanStats,
    /// Error that ended enumeration early, if any
    pub source_error: Option<Error>,
}

impl WalletScan {
    /// True if every record of a known type decoded and the source was
    /// read to the end
    pub fn is_clean(&self) -> bool {
        self.stats.failed == 0 && self.source_error.is_none()
    }
}

/// Drives one pass over a key/value source
#[derive(Debug, Clone, Default)]
pub struct WalletScanner {
    config: ScanConfig,
}

impl WalletScanner {
    /// Creates a new scanner with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new scanner with custom configuration
    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Open a wallet file and scan it
    pub fn scan_file(&self, path: impl AsRef<Path>) -> Result<WalletScan> {
        let path = path.as_ref();
        let mut source = open_wallet(path)?;
        debug!("Scanning {} ({})", path.display(), source.backend());
        Ok(self.scan(&mut source))
    }

    /// Scan every pair of `source`
    pub fn scan(&self, source: &mut dyn KvSource) -> WalletScan {
        let backend = source.backend();
        let parser = RecordParser::new(backend, self.config.max_field_len);
        let mut model = WalletModel::new();
        let mut stats = ScanStats::default();
        let mut source_error = None;

        loop {
            let raw = match source.next_pair() {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopped reading {} store: {}", backend, e);
                    source_error = Some(e);
                    break;
                }
            };
            stats.records += 1;
            self.process(&parser, &raw, &mut model, &mut stats);
        }

        let joined = model.finish();
        info!(
            "Parsed {} records: {} mkey, {} keys, {} names, {} keymeta ({} joined), {} failed",
            stats.records,
            stats.master_keys,
            stats.keys,
            stats.names,
            stats.key_metadata,
            joined,
            stats.failed
        );

        WalletScan {
            backend,
            model,
            stats,
            source_error,
        }
    }

    fn process(
        &self,
        parser: &RecordParser,
        raw: &RawRecord,
        model: &mut WalletModel,
        stats: &mut ScanStats,
    ) {
        if raw.is_empty() {
            trace!("Skipping record with empty key or value");
            stats.empty += 1;
            return;
        }

        let (kind, key) = match parser.classify(&raw.key) {
            Ok(Classification::Known { kind, key }) => (kind, key),
            Ok(Classification::Unknown(tag)) => {
                trace!("Ignoring record type '{}'", tag);
                stats.unknown += 1;
                return;
            }
            Err(e) => {
                warn!(
                    "Failed to read record type for key [{}]: {}",
                    hex::encode(&raw.key),
                    e
                );
                stats.failed += 1;
                return;
            }
        };

        if self.config.master_key_only && kind != RecordType::MasterKey {
            stats.filtered += 1;
            return;
        }
        if kind == RecordType::MasterKey && model.is_encrypted() {
            warn!(
                "Found another 'mkey' record with key [{}]; keeping the first one",
                hex::encode(&raw.key)
            );
            stats.duplicate_master_keys += 1;
            return;
        }

        let record = match parser.decode(kind, key, &raw.value) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "Failed to parse record type '{}' with key [{}]: {}",
                    kind,
                    hex::encode(&raw.key),
                    e
                );
                stats.failed += 1;
                return;
            }
        };

        match record {
            Record::MasterKey(master_key) => {
                debug!(
                    "Master key: {} byte key, method {}, {} iterations",
                    master_key.encrypted_key.len(),
                    master_key.derivation_method,
                    master_key.iterations
                );
                model.set_master_key(master_key);
                stats.master_keys += 1;
            }
            Record::Key(key) => {
                model.add_key(key);
                stats.keys += 1;
            }
            Record::Name(address) => {
                model.add_address(address);
                stats.names += 1;
            }
            Record::KeyMetadata(metadata) => {
                model.add_key_metadata(metadata);
                stats.key_metadata += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::testing::*;
    use crate::store::MemorySource;
    use pretty_assertions::assert_eq;

    fn scan(records: Vec<RawRecord>) -> WalletScan {
        WalletScanner::new().scan(&mut MemorySource::new(records))
    }

    #[test]
    fn test_config_builder() {
        let config = ScanConfig::new().max_field_len(64).master_key_only(true);
        assert_eq!(config.max_field_len, 64);
        assert!(config.master_key_only);
        assert_eq!(ScanConfig::default().max_field_len, DEFAULT_MAX_FIELD_LEN);
    }

    #[test]
    fn test_full_wallet() {
        let result = scan(vec![
            RawRecord::new(key("version", &[]), 169_900u32.to_le_bytes().to_vec()),
            mkey(&[0x11; 48], &[0x22; 8], 0, 50_000),
            ckey(&[0x02; 33], &[0x33; 48]),
            name("bc1qexample", "savings"),
        ]);

        assert!(result.is_clean());
        assert_eq!(result.stats.unknown, 1);
        assert_eq!(result.stats.master_keys, 1);
        assert!(result.model.is_encrypted());
        assert_eq!(result.model.keys().len(), 1);
        assert_eq!(result.model.addresses()[0].label, "savings");
        assert!(result.model.hash_line().unwrap().ends_with("$50000$2$00$2$00"));
    }

    #[test]
    fn test_first_master_key_wins() {
        let result = scan(vec![
            mkey(&[0x11; 48], &[0xAA; 8], 0, 1_000),
            mkey(&[0x99; 48], &[0xBB; 8], 0, 2_000),
        ]);

        let master_key = result.model.master_key().unwrap();
        assert_eq!(master_key.salt, vec![0xAA; 8]);
        assert_eq!(master_key.iterations, 1_000);
        assert_eq!(result.stats.duplicate_master_keys, 1);
        assert!(result.is_clean());
    }

    #[test]
    fn test_invalid_master_key_does_not_block_later_one() {
        let result = scan(vec![
            mkey(&[0x11; 48], &[], 0, 1_000),
            mkey(&[0x99; 48], &[0xBB; 8], 0, 2_000),
        ]);

        assert_eq!(result.model.master_key().unwrap().iterations, 2_000);
        assert_eq!(result.stats.failed, 1);
        assert!(!result.is_clean());
    }

    #[test]
    fn test_corrupt_key_is_isolated() {
        let mut bad_key = key("key", &[]);
        bad_key.push(100);
        bad_key.extend_from_slice(&[0x02; 5]);
        let mut bad_value = Vec::new();
        push_field(&mut bad_value, &[0x44; 32]);

        let result = scan(vec![
            RawRecord::new(bad_key, bad_value),
            ckey(&[0x03; 33], &[0x55; 48]),
            name("1address", ""),
        ]);

        assert_eq!(result.stats.failed, 1);
        assert_eq!(result.model.keys().len(), 1);
        assert_eq!(result.model.keys()[0].public_key, vec![0x03; 33]);
        assert_eq!(result.model.addresses().len(), 1);
        assert!(!result.is_clean());
    }

    #[test]
    fn test_unreadable_tag_is_isolated() {
        let result = scan(vec![
            RawRecord::new(vec![0xFDu8, 0x00], vec![0x01u8]),
            name("1address", "label"),
        ]);
        assert_eq!(result.stats.failed, 1);
        assert_eq!(result.model.addresses().len(), 1);
    }

    #[test]
    fn test_empty_records_skipped() {
        let result = scan(vec![
            RawRecord::new(Vec::<u8>::new(), vec![1u8]),
            RawRecord::new(key("name", &[&b"x"[..]]), Vec::<u8>::new()),
        ]);
        assert_eq!(result.stats.empty, 2);
        assert!(result.is_clean());
        assert!(result.model.is_empty());
    }

    #[test]
    fn test_no_recognized_records() {
        let result = scan(vec![RawRecord::new(key("bestblock", &[]), vec![0u8; 4])]);
        assert!(result.model.is_empty());
        assert!(result.is_clean());
        assert!(matches!(
            result.model.hash_line(),
            Err(Error::MasterKeyMissing)
        ));
    }

    #[test]
    fn test_keymeta_before_and_after_key() {
        let result = scan(vec![
            keymeta(&[0x02; 33], 1_111),
            ckey(&[0x02; 33], &[0x01; 48]),
            ckey(&[0x03; 33], &[0x01; 48]),
            keymeta(&[0x03; 33], 2_222),
            ckey(&[0x04; 33], &[0x01; 48]),
        ]);

        let times: Vec<u32> = result.model.keys().iter().map(|k| k.created_at).collect();
        assert_eq!(times, vec![1_111, 2_222, 0]);
        assert_eq!(result.stats.key_metadata, 2);
    }

    #[test]
    fn test_keymeta_overrides_key_timestamp() {
        let result = scan(vec![
            plain_key(&[0x02; 33], &[0x01; 32], 5),
            keymeta(&[0x02; 33], 9),
        ]);
        assert_eq!(result.model.keys()[0].created_at, 9);
    }

    #[test]
    fn test_master_key_only() {
        let scanner = WalletScanner::with_config(ScanConfig::new().master_key_only(true));
        let mut source = MemorySource::new(vec![
            ckey(&[0x02; 33], &[0x01; 48]),
            mkey(&[0x11; 48], &[0x22; 8], 0, 7),
            name("1address", "label"),
        ]);
        let result = scanner.scan(&mut source);

        assert_eq!(result.stats.filtered, 2);
        assert!(result.model.keys().is_empty());
        assert!(result.model.addresses().is_empty());
        assert!(result.model.is_encrypted());
    }

    #[test]
    fn test_sqlite_sentinel_master_key() {
        let raw = mkey(&[0x11; 48], &[0x22; 8], 0, 3);
        let mut source = MemorySource::with_backend(
            Backend::Sqlite,
            vec![RawRecord::new(
                crate::record::SQLITE_MASTER_KEY_ID.to_vec(),
                raw.value,
            )],
        );
        let result = WalletScanner::new().scan(&mut source);
        assert_eq!(result.backend, Backend::Sqlite);
        assert_eq!(result.model.master_key().unwrap().iterations, 3);
    }

    #[test]
    fn test_unsupported_derivation_keeps_model() {
        let result = scan(vec![mkey(&[0x11; 48], &[0x22; 8], 2, 100)]);
        let master_key = result.model.master_key().unwrap();
        assert_eq!(master_key.derivation_method, 2);
        assert!(matches!(
            result.model.hash_line(),
            Err(Error::UnsupportedDerivation { method: 2 })
        ));
    }

    struct FailingSource {
        yielded: bool,
    }

    impl KvSource for FailingSource {
        fn backend(&self) -> Backend {
            Backend::BerkeleyDb
        }

        fn next_pair(&mut self) -> Result<Option<RawRecord>> {
            if self.yielded {
                return Err(Error::invalid_format(4096, "bad page"));
            }
            self.yielded = true;
            Ok(Some(name("1address", "label")))
        }
    }

    #[test]
    fn test_source_error_keeps_partial_results() {
        let result = WalletScanner::new().scan(&mut FailingSource { yielded: false });
        assert_eq!(result.model.addresses().len(), 1);
        assert!(result.source_error.is_some());
        assert!(!result.is_clean());
    }
}
