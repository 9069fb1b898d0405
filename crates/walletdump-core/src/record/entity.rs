//! Typed wallet entities decoded from raw records.

/// Wallet master key: the encrypted symmetric key protecting every private
/// key, plus its key-derivation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKey {
    /// Encrypted master key material (trailing 32 bytes are the AES block pair)
    pub encrypted_key: Vec<u8>,
    /// Key-derivation salt
    pub salt: Vec<u8>,
    /// Key-derivation method (0 = SHA-512 based EVP_BytesToKey)
    pub derivation_method: u32,
    /// Key-derivation iteration count
    pub iterations: u32,
}

/// A `key` or `ckey` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    /// Serialized public key
    pub public_key: Vec<u8>,
    /// Private key bytes, ciphertext when `encrypted`
    pub private_key: Vec<u8>,
    /// Creation time in Unix seconds, 0 when unknown
    pub created_at: u32,
    /// True for `ckey` records
    pub encrypted: bool,
}

/// A `name` record: an address and its user label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressLabel {
    /// Address string as stored
    pub address: String,
    /// User-assigned label, possibly empty
    pub label: String,
}

/// A `keymeta` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMetadata {
    /// Public key the metadata describes
    pub public_key: Vec<u8>,
    /// Creation time in Unix seconds
    pub created_at: u32,
}
