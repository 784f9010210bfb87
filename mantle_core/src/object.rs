//! On-disk object framing for [`FsStore`](crate::store::FsStore).
//!
//! Every object file is a 16-byte header followed by the payload:
//!
//! ```text
//! 0x00  4   "MTRO" magic
//! 0x04  1   version (u8) = 1
//! 0x05  1   type: 1=blob, 2=manifest node
//! 0x06  1   algo: 1=blake3-256
//! 0x07  1   compression: 0=none, 1=zstd
//! 0x08  8   payload_len (u64 LE), size as stored
//! 0x10  ... payload
//! ```

use crate::error::{Error, Result};
use crate::node::NODE_MAGIC;

/// Magic bytes at the start of every object file.
pub const MAGIC: &[u8; 4] = b"MTRO";

/// Current object format version.
pub const VERSION: u8 = 1;

/// Size of the object header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Hash algorithms an object store can address content with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// BLAKE3 with 256-bit output.
    Blake3,
}

impl Algorithm {
    /// Name used in the store `config` file and the objects directory.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Blake3 => "blake3-256",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blake3-256" => Ok(Algorithm::Blake3),
            other => Err(Error::invalid_store(
                "config",
                format!("unsupported algorithm: {}", other),
            )),
        }
    }

    /// Identifier byte written into object headers.
    pub fn id(&self) -> u8 {
        match self {
            Algorithm::Blake3 => 1,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Algorithm::Blake3),
            _ => Err(Error::corrupt_manifest(format!(
                "unsupported algorithm id {}",
                id
            ))),
        }
    }
}

/// What an object file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// Opaque file content.
    Blob = 1,
    /// A serialized manifest node.
    Node = 2,
}

impl ObjectType {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ObjectType::Blob),
            2 => Ok(ObjectType::Node),
            _ => Err(Error::corrupt_manifest(format!(
                "invalid object type: {}",
                value
            ))),
        }
    }

    /// Classify raw bytes about to be stored.
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(NODE_MAGIC) {
            ObjectType::Node
        } else {
            ObjectType::Blob
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Node => "node",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None = 0,
    Zstd = 1,
}

impl CompressionType {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Zstd),
            _ => Err(Error::compression_error(format!(
                "invalid compression type: {}",
                value
            ))),
        }
    }
}

/// A decoded 16-byte object header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    pub version: u8,
    pub object_type: ObjectType,
    pub algorithm: Algorithm,
    pub compression: CompressionType,
    /// Length of the payload as stored (compressed size if compressed).
    pub payload_len: u64,
}

impl ObjectHeader {
    pub fn new(
        object_type: ObjectType,
        algorithm: Algorithm,
        compression: CompressionType,
        payload_len: u64,
    ) -> Self {
        Self {
            version: VERSION,
            object_type,
            algorithm,
            compression,
            payload_len,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version;
        buf[5] = self.object_type.to_u8();
        buf[6] = self.algorithm.id();
        buf[7] = self.compression.to_u8();
        buf[8..16].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::corrupt_manifest(format!(
                "object header too short: {} bytes (expected {})",
                buf.len(),
                HEADER_SIZE
            )));
        }
        if &buf[0..4] != MAGIC {
            return Err(Error::corrupt_manifest(format!(
                "invalid object magic {:?}",
                &buf[0..4]
            )));
        }
        let version = buf[4];
        if version != VERSION {
            return Err(Error::corrupt_manifest(format!(
                "unsupported object version {}",
                version
            )));
        }

        let object_type = ObjectType::from_u8(buf[5])?;
        let algorithm = Algorithm::from_id(buf[6])?;
        let compression = CompressionType::from_u8(buf[7])?;

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&buf[8..16]);

        Ok(Self {
            version,
            object_type,
            algorithm,
            compression,
            payload_len: u64::from_le_bytes(len_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn header_bytes(version: u8, object_type: u8, algo: u8, compression: u8) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = version;
        buf[5] = object_type;
        buf[6] = algo;
        buf[7] = compression;
        buf
    }

    #[test]
    fn test_header_layout() {
        let header = ObjectHeader::new(
            ObjectType::Node,
            Algorithm::Blake3,
            CompressionType::Zstd,
            0x0102,
        );
        let encoded = header.encode();
        assert_eq!(&encoded[0..4], b"MTRO");
        assert_eq!(encoded[4..8], [1, 2, 1, 1]);
        assert_eq!(encoded[8..10], [0x02, 0x01]);
        assert_eq!(ObjectHeader::decode(&encoded).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_bad_fields() {
        assert!(ObjectHeader::decode(&[0u8; 10]).is_err());

        let mut bad_magic = header_bytes(1, 1, 1, 0);
        bad_magic[0..4].copy_from_slice(b"CAFS");
        assert!(ObjectHeader::decode(&bad_magic).is_err());

        assert!(ObjectHeader::decode(&header_bytes(2, 1, 1, 0)).is_err());
        assert!(ObjectHeader::decode(&header_bytes(1, 9, 1, 0)).is_err());
        assert!(ObjectHeader::decode(&header_bytes(1, 1, 7, 0)).is_err());
        assert!(ObjectHeader::decode(&header_bytes(1, 1, 1, 3)).is_err());
        assert!(ObjectHeader::decode(&header_bytes(1, 1, 1, 1)).is_ok());
    }

    #[test]
    fn test_detect_object_type() {
        let node = Node::new().encode().unwrap();
        assert_eq!(ObjectType::detect(&node), ObjectType::Node);
        assert_eq!(ObjectType::detect(b"plain file"), ObjectType::Blob);
        assert_eq!(ObjectType::detect(b""), ObjectType::Blob);
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(Algorithm::parse("blake3-256").unwrap(), Algorithm::Blake3);
        assert!(Algorithm::parse("sha256").is_err());
        assert_eq!(Algorithm::from_id(Algorithm::Blake3.id()).unwrap(), Algorithm::Blake3);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_header_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..32)) {
            let _ = ObjectHeader::decode(&bytes);
        }

        #[test]
        fn prop_payload_len_preserved(len in any::<u64>()) {
            let header = ObjectHeader::new(ObjectType::Blob, Algorithm::Blake3, CompressionType::None, len);
            prop_assert_eq!(ObjectHeader::decode(&header.encode())?.payload_len, len);
        }
    }
}
