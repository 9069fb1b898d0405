//! Human-readable dump of a scanned wallet.

use crate::wallet::WalletScan;
use std::fmt;
use std::path::Path;

const INDENT: &str = "  ";

/// Detail report for one wallet scan, rendered through [`fmt::Display`]
#[derive(Debug, Clone, Copy)]
pub struct DetailReport<'a> {
    scan: &'a WalletScan,
    path: Option<&'a Path>,
}

impl<'a> DetailReport<'a> {
    /// Creates a report for `scan`
    pub fn new(scan: &'a WalletScan) -> Self {
        Self { scan, path: None }
    }

    /// Adds a file header line
    pub fn with_path(mut self, path: &'a Path) -> Self {
        self.path = Some(path);
        self
    }

    fn write_master_key(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = &self.scan.model;
        let Some(master_key) = model.master_key() else {
            writeln!(f, "Encrypted: no")?;
            return writeln!(f, "Master key: not found");
        };

        writeln!(f, "Encrypted: yes")?;
        writeln!(f, "Master key:")?;
        writeln!(f, "{INDENT}Encrypted key: {} bytes", master_key.encrypted_key.len())?;
        writeln!(f, "{INDENT}Salt: {}", hex::encode(&master_key.salt))?;
        writeln!(
            f,
            "{INDENT}Derivation method: {}",
            master_key.derivation_method
        )?;
        writeln!(f, "{INDENT}Iterations: {}", master_key.iterations)?;
        match model.hash_line() {
            Ok(line) => writeln!(f, "{INDENT}Hash: {line}"),
            Err(e) => writeln!(f, "{INDENT}Hash: not available ({e})"),
        }
    }

    fn write_keys(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = &self.scan.model;
        if model.keys().is_empty() {
            return writeln!(f, "Keys: not found");
        }

        writeln!(f, "Keys ({}):", model.keys().len())?;
        for (i, key) in model.keys().iter().enumerate() {
            writeln!(f, "{INDENT}[{}] public: {}", i + 1, hex::encode(&key.public_key))?;
            // Private key bytes of an encrypted wallet are never printed
            if key.encrypted || model.is_encrypted() {
                writeln!(f, "{INDENT}{INDENT}private: [Encrypted]")?;
            } else {
                writeln!(f, "{INDENT}{INDENT}private: {}", hex::encode(&key.private_key))?;
            }
            if key.created_at != 0 {
                writeln!(f, "{INDENT}{INDENT}created: {}", key.created_at)?;
            }
        }
        Ok(())
    }

    fn write_addresses(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addresses = self.scan.model.addresses();
        if addresses.is_empty() {
            return writeln!(f, "Addresses: not found");
        }

        writeln!(f, "Addresses ({}):", addresses.len())?;
        for (i, entry) in addresses.iter().enumerate() {
            if entry.label.is_empty() {
                writeln!(f, "{INDENT}[{}] {}", i + 1, entry.address)?;
            } else {
                writeln!(f, "{INDENT}[{}] {} \"{}\"", i + 1, entry.address, entry.label)?;
            }
        }
        Ok(())
    }

    fn write_warnings(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.scan.stats;
        if stats.failed > 0 {
            writeln!(
                f,
                "Warning: {} record(s) could not be parsed, results may be incomplete",
                stats.failed
            )?;
        }
        if let Some(e) = &self.scan.source_error {
            writeln!(
                f,
                "Warning: reading stopped early ({e}), results may be incomplete"
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for DetailReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = self.path {
            writeln!(f, "File: {}", path.display())?;
        }
        writeln!(f, "Backend: {}", self.scan.backend)?;
        self.write_master_key(f)?;
        self.write_keys(f)?;
        self.write_addresses(f)?;
        self.write_warnings(f)
    }
}
