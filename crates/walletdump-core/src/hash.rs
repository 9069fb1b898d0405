//! `$bitcoin$` password-hash line for offline cracking tools.
//!
//! The line format is fixed by the consuming tools and must match byte for
//! byte:
//!
//! ```text
//! $bitcoin$<len>$<master hex>$<len>$<salt hex>$<iterations>$2$00$2$00
//! ```
//!
//! `<master hex>` is the hex of the **last** 32 bytes of the encrypted master
//! key. Any bytes before that belong to a checksum payload the format does
//! not carry.

use crate::error::{Error, Result};
use crate::record::MasterKey;

/// Leading marker of every hash line
pub const HASH_PREFIX: &str = "$bitcoin$";

/// Trailing fields for the SHA-512 derivation method
const HASH_SUFFIX: &str = "$2$00$2$00";

/// Length of the AES block pair carried in the hash
pub const MASTER_BLOCK_LEN: usize = 32;

/// Check that a master key can be rendered as a hash line
pub fn check_hashable(master_key: &MasterKey) -> Result<()> {
    if master_key.derivation_method != 0 {
        return Err(Error::UnsupportedDerivation {
            method: master_key.derivation_method,
        });
    }
    if master_key.encrypted_key.len() < MASTER_BLOCK_LEN {
        return Err(Error::MasterKeyTooShort {
            len: master_key.encrypted_key.len(),
        });
    }
    if master_key.salt.is_empty() {
        return Err(Error::invalid_record("master key has empty salt"));
    }
    Ok(())
}

/// Render the hash line for a master key
pub fn format_hash(master_key: &MasterKey) -> Result<String> {
    check_hashable(master_key)?;

    let encrypted = &master_key.encrypted_key;
    let master_hex = hex::encode(&encrypted[encrypted.len() - MASTER_BLOCK_LEN..]);
    let salt_hex = hex::encode(&master_key.salt);

    Ok(format!(
        "{HASH_PREFIX}{}${}${}${}${}{HASH_SUFFIX}",
        master_hex.len(),
        master_hex,
        salt_hex.len(),
        salt_hex,
        master_key.iterations
    ))
}
