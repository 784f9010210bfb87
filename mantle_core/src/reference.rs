//! Content references and their hex codec.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Size of a plain reference in bytes (BLAKE3 produces 256-bit hashes).
pub const REFERENCE_SIZE: usize = 32;

/// Size of an encrypted reference: address followed by the decryption key.
pub const ENCRYPTED_REFERENCE_SIZE: usize = 64;

/// Hex length of an encrypted reference; reported when parsing fails.
pub const ENCRYPTED_REFERENCE_HEX_LEN: usize = ENCRYPTED_REFERENCE_SIZE * 2;

/// A content reference: the 32-byte address of a blob, optionally followed by
/// the 32-byte key needed to decrypt it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    address: [u8; REFERENCE_SIZE],
    key: Option<[u8; REFERENCE_SIZE]>,
}

impl Reference {
    /// Create a plain reference from an address.
    pub fn from_bytes(address: [u8; REFERENCE_SIZE]) -> Self {
        Reference { address, key: None }
    }

    /// Create an encrypted reference from an address and its key.
    pub fn encrypted(address: [u8; REFERENCE_SIZE], key: [u8; REFERENCE_SIZE]) -> Self {
        Reference {
            address,
            key: Some(key),
        }
    }

    /// Create a reference from 32 or 64 raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            REFERENCE_SIZE => {
                let mut address = [0u8; REFERENCE_SIZE];
                address.copy_from_slice(bytes);
                Ok(Reference::from_bytes(address))
            }
            ENCRYPTED_REFERENCE_SIZE => {
                let mut address = [0u8; REFERENCE_SIZE];
                let mut key = [0u8; REFERENCE_SIZE];
                address.copy_from_slice(&bytes[..REFERENCE_SIZE]);
                key.copy_from_slice(&bytes[REFERENCE_SIZE..]);
                Ok(Reference::encrypted(address, key))
            }
            n => Err(Error::corrupt_manifest(format!(
                "reference must be {} or {} bytes, got {}",
                REFERENCE_SIZE, ENCRYPTED_REFERENCE_SIZE, n
            ))),
        }
    }

    /// Parse a reference from 64 or 128 hex characters.
    ///
    /// Any other input is rejected, citing the encrypted hex length since that
    /// is the last form tried.
    pub fn parse(hex_str: &str) -> Result<Self> {
        let invalid = || Error::invalid_reference(hex_str, ENCRYPTED_REFERENCE_HEX_LEN);

        if hex_str.len() != REFERENCE_SIZE * 2 && hex_str.len() != ENCRYPTED_REFERENCE_HEX_LEN {
            return Err(invalid());
        }

        let bytes = hex::decode(hex_str).map_err(|_| invalid())?;
        Self::from_slice(&bytes).map_err(|_| invalid())
    }

    /// Convert to lowercase hex (64 or 128 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_vec())
    }

    /// The 32-byte address used to locate the blob.
    pub fn address(&self) -> &[u8; REFERENCE_SIZE] {
        &self.address
    }

    /// The decryption key, if this reference points at encrypted content.
    pub fn key(&self) -> Option<&[u8; REFERENCE_SIZE]> {
        self.key.as_ref()
    }

    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    /// Length of the binary form in bytes.
    pub fn size(&self) -> usize {
        if self.is_encrypted() {
            ENCRYPTED_REFERENCE_SIZE
        } else {
            REFERENCE_SIZE
        }
    }

    /// Binary form: address, then key when present.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.extend_from_slice(&self.address);
        if let Some(key) = &self.key {
            buf.extend_from_slice(key);
        }
        buf
    }

    /// First 2 hex characters of the address (for directory sharding).
    pub fn prefix(&self) -> String {
        hex::encode(&self.address[..1])
    }

    /// Remaining 62 hex characters of the address (for filename).
    pub fn suffix(&self) -> String {
        hex::encode(&self.address[1..])
    }

    /// Hash raw bytes using BLAKE3.
    pub fn hash_bytes(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Reference::from_bytes(*hash.as_bytes())
    }
}

impl FromStr for Reference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Reference::parse(s)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({})", self.to_hex())
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hello_world() {
        let reference = Reference::hash_bytes(b"hello world");
        assert_eq!(
            reference.to_hex(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
        assert!(!reference.is_encrypted());
        assert_eq!(reference.size(), REFERENCE_SIZE);
    }

    #[test]
    fn test_parse_plain_and_encrypted() {
        let plain = Reference::parse(&"ab".repeat(32)).unwrap();
        assert_eq!(plain.size(), 32);

        let encrypted = Reference::parse(&format!("{}{}", "01".repeat(32), "02".repeat(32))).unwrap();
        assert!(encrypted.is_encrypted());
        assert_eq!(encrypted.address(), &[1u8; 32]);
        assert_eq!(encrypted.key(), Some(&[2u8; 32]));
        assert_eq!(encrypted.to_hex().len(), 128);
    }

    #[test]
    fn test_parse_accepts_uppercase() {
        let upper = "AB".repeat(32);
        let reference = Reference::parse(&upper).unwrap();
        assert_eq!(reference.to_hex(), "ab".repeat(32));
    }

    #[test]
    fn test_parse_invalid_chars_cites_length_128() {
        let invalid = "g".repeat(64);
        let err = Reference::parse(&invalid).unwrap_err();
        match &err {
            Error::InvalidReference {
                value,
                expected_len,
            } => {
                assert_eq!(value, &invalid);
                assert_eq!(*expected_len, 128);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            format!("value not valid hex string of length 128: {}", invalid)
        );
    }

    #[test]
    fn test_parse_invalid_length() {
        assert!(Reference::parse("abcd").is_err());
        assert!(Reference::parse("").is_err());
        assert!(Reference::parse(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_from_slice_rejects_odd_sizes() {
        assert!(Reference::from_slice(&[0u8; 31]).is_err());
        assert!(Reference::from_slice(&[0u8; 48]).is_err());
        assert!(Reference::from_slice(&[0u8; 64]).unwrap().is_encrypted());
    }

    #[test]
    fn test_prefix_suffix() {
        let reference = Reference::hash_bytes(b"test");
        let full = format!("{}{}", reference.prefix(), reference.suffix());
        assert_eq!(full, reference.to_hex());
    }

    #[test]
    fn test_serialize_as_hex() {
        let reference = Reference::hash_bytes(b"x");
        let json = serde_json::to_string(&reference).unwrap();
        assert_eq!(json, format!("\"{}\"", reference.to_hex()));
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// Hex encoding is bijective for plain references
        #[test]
        fn prop_hex_roundtrip(bytes in prop::array::uniform32(any::<u8>())) {
            let reference = Reference::from_bytes(bytes);
            let parsed = Reference::parse(&reference.to_hex())?;
            prop_assert_eq!(reference, parsed);
        }

        /// Hex encoding is bijective for encrypted references
        #[test]
        fn prop_encrypted_hex_roundtrip(
            address in prop::array::uniform32(any::<u8>()),
            key in prop::array::uniform32(any::<u8>()),
        ) {
            let reference = Reference::encrypted(address, key);
            let parsed: Reference = reference.to_hex().parse()?;
            prop_assert_eq!(reference, parsed);
        }

        /// Any length other than 64 or 128 fails
        #[test]
        fn prop_invalid_hex_length_fails(
            s in "[0-9a-f]{0,63}|[0-9a-f]{65,127}|[0-9a-f]{129,160}"
        ) {
            prop_assert!(Reference::parse(&s).is_err());
        }
    }
}
