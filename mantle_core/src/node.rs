//! Manifest trie nodes and their canonical binary encoding.
//!
//! A node is stored as a single blob:
//!
//! ```text
//! 0x00  4   "MTRN" magic
//! 0x04  1   version (u8) = 1
//! 0x05  1   entry kind: 0=none, 1=plain, 2=encrypted
//! 0x06  2   fork count (u16 LE)
//! 0x08  2   metadata count (u16 LE)
//! 0x0A  ... forks, ascending by first prefix byte:
//!           1     flags (child NodeKind bits, 0x20 = 64-byte reference)
//!           2     prefix_len (u16 LE, non-zero)
//!           N     prefix
//!           32|64 child reference
//!       ... entry reference, or 32 zero bytes when entry kind is 0
//!       ... metadata, ascending by key:
//!           2 key_len, key (UTF-8), 2 value_len, value (UTF-8)
//! ```

use crate::error::{Error, Result};
use crate::reference::{ENCRYPTED_REFERENCE_SIZE, REFERENCE_SIZE, Reference};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::ops::BitOr;

/// Magic bytes at the start of every encoded node.
pub const NODE_MAGIC: &[u8; 4] = b"MTRN";

/// Current node format version.
pub const NODE_VERSION: u8 = 1;

/// Size of the fixed node header in bytes.
pub const NODE_HEADER_SIZE: usize = 10;

/// Longest prefix a single fork can carry.
pub const MAX_PREFIX_LEN: usize = u16::MAX as usize;

/// Fork flag marking a 64-byte child reference.
const LONG_REFERENCE: u8 = 0x20;

const ENTRY_NONE: u8 = 0;
const ENTRY_PLAIN: u8 = 1;
const ENTRY_ENCRYPTED: u8 = 2;

/// Free-form key/value pairs attached to a node, iterated in key order.
pub type Metadata = BTreeMap<String, String>;

/// Index of a node inside a [`Trie`](crate::Trie) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Type flags describing a node, recorded on the fork that leads to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeKind(u8);

impl NodeKind {
    /// The node carries an entry reference.
    pub const VALUE: NodeKind = NodeKind(0x02);
    /// The node has at least one fork.
    pub const EDGE: NodeKind = NodeKind(0x04);
    /// The fork prefix leading to the node contains a `/`.
    pub const WITH_PATH_SEPARATOR: NodeKind = NodeKind(0x08);
    /// The node carries metadata.
    pub const WITH_METADATA: NodeKind = NodeKind(0x10);

    const MASK: u8 = 0x02 | 0x04 | 0x08 | 0x10;

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: NodeKind) -> bool {
        self.0 & other.0 == other.0
    }

    fn from_bits(bits: u8) -> Result<Self> {
        if bits & !Self::MASK != 0 {
            return Err(Error::corrupt_manifest(format!(
                "unknown node kind bits: {:#04x}",
                bits
            )));
        }
        Ok(NodeKind(bits))
    }
}

impl BitOr for NodeKind {
    type Output = NodeKind;

    fn bitor(self, rhs: NodeKind) -> NodeKind {
        NodeKind(self.0 | rhs.0)
    }
}

/// Where a fork's child node lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Materialized in the arena.
    Loaded(NodeId),
    /// Persisted in the blob store, fetched on access.
    Stored(Reference),
}

/// A labeled edge from a node to a child node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fork {
    /// Path bytes consumed along this edge (never empty).
    pub prefix: Vec<u8>,
    /// Type flags of the child node.
    pub kind: NodeKind,
    /// The child node.
    pub link: Link,
}

impl Fork {
    /// Create a fork, deriving its flags from the child node.
    pub fn new(prefix: Vec<u8>, child: &Node, link: Link) -> Self {
        Self::from_parts(prefix, child.kind(), link)
    }

    /// Create a fork from a known child kind, recomputing the path
    /// separator flag for the new prefix.
    pub fn from_parts(prefix: Vec<u8>, child_kind: NodeKind, link: Link) -> Self {
        let mut kind = NodeKind(child_kind.0 & !NodeKind::WITH_PATH_SEPARATOR.0);
        if prefix.contains(&b'/') {
            kind = kind | NodeKind::WITH_PATH_SEPARATOR;
        }
        Fork { prefix, kind, link }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        let reference = match &self.link {
            Link::Stored(reference) => reference,
            Link::Loaded(_) => {
                return Err(Error::UnsealedFork {
                    prefix: String::from_utf8_lossy(&self.prefix).into_owned(),
                });
            }
        };

        let mut flags = self.kind.bits();
        if reference.is_encrypted() {
            flags |= LONG_REFERENCE;
        }
        buf.push(flags);
        let prefix_len = u16::try_from(self.prefix.len()).map_err(|_| {
            Error::invalid_path(format!("fork prefix too long: {} bytes", self.prefix.len()))
        })?;
        buf.extend_from_slice(&prefix_len.to_le_bytes());
        buf.extend_from_slice(&self.prefix);
        buf.extend_from_slice(&reference.to_vec());
        Ok(())
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let flags = read_u8(reader)?;
        let kind = NodeKind::from_bits(flags & !LONG_REFERENCE)?;

        let prefix_len = read_u16(reader)? as usize;
        if prefix_len == 0 {
            return Err(Error::corrupt_manifest("fork prefix is empty"));
        }
        let prefix = read_bytes(reader, prefix_len)?;

        let reference_len = if flags & LONG_REFERENCE != 0 {
            ENCRYPTED_REFERENCE_SIZE
        } else {
            REFERENCE_SIZE
        };
        let reference = Reference::from_slice(&read_bytes(reader, reference_len)?)?;

        Ok(Fork {
            prefix,
            kind,
            link: Link::Stored(reference),
        })
    }
}

/// One point in the path-compressed trie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// Outgoing edges keyed by the first byte of their prefix.
    pub forks: BTreeMap<u8, Fork>,
    /// Content reference when a stored path ends at this node.
    pub entry: Option<Reference>,
    pub metadata: Metadata,
}

impl Node {
    /// An empty node: no forks, no entry, no metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// A leaf node holding an entry.
    pub fn leaf(entry: Reference, metadata: Metadata) -> Self {
        Node {
            forks: BTreeMap::new(),
            entry: Some(entry),
            metadata,
        }
    }

    /// Whether the entry designates file content rather than a pure fork holder.
    pub fn is_value_type(&self) -> bool {
        self.entry.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.forks.is_empty() && self.entry.is_none() && self.metadata.is_empty()
    }

    /// Type flags derived from the node's contents.
    pub fn kind(&self) -> NodeKind {
        let mut kind = NodeKind::default();
        if self.entry.is_some() {
            kind = kind | NodeKind::VALUE;
        }
        if !self.forks.is_empty() {
            kind = kind | NodeKind::EDGE;
        }
        if !self.metadata.is_empty() {
            kind = kind | NodeKind::WITH_METADATA;
        }
        kind
    }

    /// Encode the node to its canonical bytes.
    ///
    /// Every fork must link to a stored reference.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.forks.len() > u16::MAX as usize || self.metadata.len() > u16::MAX as usize {
            return Err(Error::invalid_path("node has too many forks or metadata pairs"));
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(NODE_MAGIC);
        buf.push(NODE_VERSION);
        buf.push(match &self.entry {
            None => ENTRY_NONE,
            Some(entry) if entry.is_encrypted() => ENTRY_ENCRYPTED,
            Some(_) => ENTRY_PLAIN,
        });
        buf.extend_from_slice(&(self.forks.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(self.metadata.len() as u16).to_le_bytes());

        // BTreeMap iteration gives ascending key order
        for fork in self.forks.values() {
            fork.encode_into(&mut buf)?;
        }

        match &self.entry {
            Some(entry) => buf.extend_from_slice(&entry.to_vec()),
            None => buf.extend_from_slice(&[0u8; REFERENCE_SIZE]),
        }

        for (key, value) in &self.metadata {
            write_str(&mut buf, key)?;
            write_str(&mut buf, value)?;
        }

        Ok(buf)
    }

    /// Decode a node from bytes. Forks come back as [`Link::Stored`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < NODE_HEADER_SIZE {
            return Err(Error::corrupt_manifest(format!(
                "node too short: {} bytes (expected at least {})",
                data.len(),
                NODE_HEADER_SIZE
            )));
        }
        if &data[0..4] != NODE_MAGIC {
            return Err(Error::corrupt_manifest(format!(
                "invalid magic: expected {:?}, got {:?}",
                NODE_MAGIC,
                &data[0..4]
            )));
        }
        if data[4] != NODE_VERSION {
            return Err(Error::corrupt_manifest(format!(
                "unsupported node version: {}",
                data[4]
            )));
        }

        let entry_kind = data[5];
        let fork_count = u16::from_le_bytes([data[6], data[7]]) as usize;
        let metadata_count = u16::from_le_bytes([data[8], data[9]]) as usize;

        let mut reader = Cursor::new(&data[NODE_HEADER_SIZE..]);

        let mut forks = BTreeMap::new();
        let mut previous: Option<u8> = None;
        for _ in 0..fork_count {
            let fork = Fork::decode(&mut reader)?;
            let first = fork.prefix[0];
            if previous.is_some_and(|p| p >= first) {
                return Err(Error::corrupt_manifest(format!(
                    "fork keys out of order or duplicated at byte {:#04x}",
                    first
                )));
            }
            previous = Some(first);
            forks.insert(first, fork);
        }

        let entry = match entry_kind {
            ENTRY_NONE => {
                let sentinel = read_bytes(&mut reader, REFERENCE_SIZE)?;
                if sentinel.iter().any(|b| *b != 0) {
                    return Err(Error::corrupt_manifest("entry sentinel is not zero"));
                }
                None
            }
            ENTRY_PLAIN => Some(Reference::from_slice(&read_bytes(
                &mut reader,
                REFERENCE_SIZE,
            )?)?),
            ENTRY_ENCRYPTED => Some(Reference::from_slice(&read_bytes(
                &mut reader,
                ENCRYPTED_REFERENCE_SIZE,
            )?)?),
            other => {
                return Err(Error::corrupt_manifest(format!(
                    "invalid entry kind: {}",
                    other
                )));
            }
        };

        let mut metadata = Metadata::new();
        let mut previous_key: Option<String> = None;
        for _ in 0..metadata_count {
            let key = read_str(&mut reader)?;
            let value = read_str(&mut reader)?;
            if previous_key.as_ref().is_some_and(|p| p >= &key) {
                return Err(Error::corrupt_manifest(format!(
                    "metadata keys out of order or duplicated at {:?}",
                    key
                )));
            }
            previous_key = Some(key.clone());
            metadata.insert(key, value);
        }

        let consumed = reader.position() as usize;
        let remaining = data.len() - NODE_HEADER_SIZE - consumed;
        if remaining != 0 {
            return Err(Error::corrupt_manifest(format!(
                "{} trailing bytes after node",
                remaining
            )));
        }

        Ok(Node {
            forks,
            entry,
            metadata,
        })
    }

    /// Content reference of the encoded node.
    pub fn reference(&self) -> Result<Reference> {
        Ok(Reference::hash_bytes(&self.encode()?))
    }
}

fn write_str(buf: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| Error::invalid_path(format!("metadata string too long: {} bytes", value.len())))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

fn read_bytes<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|_| Error::corrupt_manifest(format!("truncated node: expected {} more bytes", len)))?;
    Ok(buf)
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    Ok(read_bytes(reader, 1)?[0])
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let bytes = read_bytes(reader, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_str<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_u16(reader)? as usize;
    String::from_utf8(read_bytes(reader, len)?)
        .map_err(|e| Error::corrupt_manifest(format!("invalid UTF-8 in metadata: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored_fork(prefix: &str, child: &Node, seed: &[u8]) -> Fork {
        Fork::new(
            prefix.as_bytes().to_vec(),
            child,
            Link::Stored(Reference::hash_bytes(seed)),
        )
    }

    fn sample_node() -> Node {
        let leaf = Node::leaf(Reference::hash_bytes(b"leaf"), Metadata::new());
        let mut node = Node::new();
        node.forks.insert(b'i', stored_fork("index.txt", &leaf, b"a"));
        node.forks.insert(b'l', stored_fork("level-one/", &Node::new(), b"b"));
        node.entry = Some(Reference::hash_bytes(b"self"));
        node.metadata
            .insert("Content-Type".to_string(), "text/plain".to_string());
        node.metadata
            .insert("Filename".to_string(), "index.txt".to_string());
        node
    }

    #[test]
    fn test_empty_node_layout() {
        let encoded = Node::new().encode().unwrap();
        assert_eq!(encoded.len(), NODE_HEADER_SIZE + REFERENCE_SIZE);
        assert_eq!(&encoded[0..4], NODE_MAGIC);
        assert_eq!(encoded[4], NODE_VERSION);
        assert_eq!(encoded[5], ENTRY_NONE);
        assert_eq!(Node::decode(&encoded).unwrap(), Node::new());
    }

    #[test]
    fn test_encode_decode() {
        let node = sample_node();
        let decoded = Node::decode(&node.encode().unwrap()).unwrap();
        assert_eq!(decoded, node);
        assert!(decoded.is_value_type());
    }

    #[test]
    fn test_fork_kind_flags() {
        let node = sample_node();
        let index = &node.forks[&b'i'];
        assert!(index.kind.contains(NodeKind::VALUE));
        assert!(!index.kind.contains(NodeKind::WITH_PATH_SEPARATOR));
        let level = &node.forks[&b'l'];
        assert!(level.kind.contains(NodeKind::WITH_PATH_SEPARATOR));
        assert!(!level.kind.contains(NodeKind::VALUE));
    }

    #[test]
    fn test_encrypted_references() {
        let encrypted = Reference::encrypted([7u8; 32], [9u8; 32]);
        let mut node = Node::leaf(encrypted, Metadata::new());
        node.forks.insert(
            b'x',
            Fork::new(b"x".to_vec(), &Node::new(), Link::Stored(encrypted)),
        );
        let encoded = node.encode().unwrap();
        assert_eq!(encoded[5], ENTRY_ENCRYPTED);
        assert_eq!(Node::decode(&encoded).unwrap(), node);
    }

    #[test]
    fn test_unsealed_fork_rejected() {
        let mut node = Node::new();
        node.forks.insert(
            b'a',
            Fork::new(b"a".to_vec(), &Node::new(), Link::Loaded(NodeId(3))),
        );
        assert!(matches!(node.encode(), Err(Error::UnsealedFork { .. })));
    }

    #[test]
    fn test_oversized_prefix_rejected() {
        let mut node = Node::new();
        let prefix = "a".repeat(u16::MAX as usize + 1);
        node.forks
            .insert(b'a', stored_fork(&prefix, &Node::new(), b"long"));
        assert!(matches!(node.encode(), Err(Error::InvalidPath { .. })));

        let mut node = Node::new();
        let prefix = "a".repeat(u16::MAX as usize);
        node.forks
            .insert(b'a', stored_fork(&prefix, &Node::new(), b"max"));
        assert_eq!(Node::decode(&node.encode().unwrap()).unwrap(), node);
    }

    #[test]
    fn test_identical_nodes_hash_identically() {
        assert_eq!(
            sample_node().reference().unwrap(),
            sample_node().reference().unwrap()
        );
        let mut other = sample_node();
        other.metadata.clear();
        assert_ne!(
            sample_node().reference().unwrap(),
            other.reference().unwrap()
        );
    }

    #[test]
    fn test_decode_truncated() {
        let encoded = sample_node().encode().unwrap();
        for len in [0, 5, NODE_HEADER_SIZE, encoded.len() - 1] {
            let err = Node::decode(&encoded[..len]).unwrap_err();
            assert!(matches!(err, Error::CorruptManifest { .. }), "len {len}");
        }
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut encoded = sample_node().encode().unwrap();
        encoded.push(0);
        assert!(matches!(
            Node::decode(&encoded),
            Err(Error::CorruptManifest { .. })
        ));
    }

    #[test]
    fn test_decode_bad_magic_and_version() {
        let mut encoded = Node::new().encode().unwrap();
        encoded[0] = b'X';
        assert!(Node::decode(&encoded).is_err());

        let mut encoded = Node::new().encode().unwrap();
        encoded[4] = 99;
        assert!(Node::decode(&encoded).is_err());
    }

    #[test]
    fn test_decode_nonzero_sentinel() {
        let mut encoded = Node::new().encode().unwrap();
        encoded[NODE_HEADER_SIZE] = 1;
        assert!(Node::decode(&encoded).is_err());
    }

    #[test]
    fn test_decode_invalid_entry_kind() {
        let mut encoded = Node::new().encode().unwrap();
        encoded[5] = 7;
        assert!(Node::decode(&encoded).is_err());
    }

    #[test]
    fn test_decode_unsorted_forks() {
        let leaf = Node::leaf(Reference::hash_bytes(b"x"), Metadata::new());
        let mut buf = Vec::new();
        buf.extend_from_slice(NODE_MAGIC);
        buf.push(NODE_VERSION);
        buf.push(ENTRY_NONE);
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        stored_fork("b", &leaf, b"1").encode_into(&mut buf).unwrap();
        stored_fork("a", &leaf, b"2").encode_into(&mut buf).unwrap();
        buf.extend_from_slice(&[0u8; REFERENCE_SIZE]);
        assert!(matches!(
            Node::decode(&buf),
            Err(Error::CorruptManifest { .. })
        ));
    }

    // Property-based tests
    use proptest::prelude::*;

    fn arb_reference() -> impl Strategy<Value = Reference> {
        prop_oneof![
            prop::array::uniform32(any::<u8>()).prop_map(Reference::from_bytes),
            (
                prop::array::uniform32(any::<u8>()),
                prop::array::uniform32(any::<u8>())
            )
                .prop_map(|(address, key)| Reference::encrypted(address, key)),
        ]
    }

    fn arb_node() -> impl Strategy<Value = Node> {
        (
            prop::collection::btree_map(
                any::<u8>(),
                (prop::collection::vec(any::<u8>(), 0..40), arb_reference(), any::<bool>()),
                0..8,
            ),
            prop::option::of(arb_reference()),
            prop::collection::btree_map("[A-Za-z-]{1,16}", "[ -~]{0,32}", 0..4),
        )
            .prop_map(|(forks, entry, metadata)| {
                let forks = forks
                    .into_iter()
                    .map(|(first, (mut rest, reference, is_value))| {
                        rest.insert(0, first);
                        let child = if is_value {
                            Node::leaf(reference, Metadata::new())
                        } else {
                            Node::new()
                        };
                        (first, Fork::new(rest, &child, Link::Stored(reference)))
                    })
                    .collect();
                Node {
                    forks,
                    entry,
                    metadata,
                }
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// decode(encode(n)) == n
        #[test]
        fn prop_node_roundtrip(node in arb_node()) {
            let encoded = node.encode()?;
            let decoded = Node::decode(&encoded)?;
            prop_assert_eq!(decoded, node);
        }

        /// Equal nodes always encode to equal bytes
        #[test]
        fn prop_encoding_deterministic(node in arb_node()) {
            let copy = node.clone();
            prop_assert_eq!(node.encode()?, copy.encode()?);
        }

        /// Arbitrary bytes never panic the decoder
        #[test]
        fn prop_decode_garbage_no_panic(data in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = Node::decode(&data);
        }
    }
}
