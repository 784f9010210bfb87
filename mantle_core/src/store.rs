//! Filesystem-backed blob store.

use crate::blob::BlobStore;
use crate::error::{Error, Result};
use crate::object::{Algorithm, CompressionType, HEADER_SIZE, ObjectHeader, ObjectType};
use crate::reference::Reference;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Payloads of at least this many bytes are stored zstd-compressed.
const COMPRESSION_THRESHOLD: usize = 4096;

/// zstd level used for stored objects.
const COMPRESSION_LEVEL: i32 = 3;

/// A content-addressed object directory on local disk.
///
/// Layout:
/// - `config`: `version=1` and `algo=blake3-256`
/// - `objects/blake3-256/<2 hex>/<62 hex>`: one file per object
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    algorithm: Algorithm,
}

impl FsStore {
    /// Create the directory structure and config file for a new store.
    ///
    /// Initializing over an existing store leaves its objects in place.
    pub fn init<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let algorithm = Algorithm::Blake3;

        fs::create_dir_all(root.join("objects").join(algorithm.as_str()))?;
        fs::write(
            root.join("config"),
            format!("version=1\nalgo={}\n", algorithm.as_str()),
        )?;

        debug!(root = %root.display(), "initialized store");
        Ok(Self { root, algorithm })
    }

    /// Open an existing store, validating its config and layout.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(Error::invalid_store(&root, "directory does not exist"));
        }

        let config_path = root.join("config");
        if !config_path.exists() {
            return Err(Error::invalid_store(&root, "config file not found"));
        }

        let config = fs::read_to_string(&config_path)?;
        let algorithm =
            Self::parse_config(&config).map_err(|reason| Error::invalid_store(&root, reason))?;

        if !root.join("objects").join(algorithm.as_str()).exists() {
            return Err(Error::invalid_store(&root, "objects directory missing"));
        }

        Ok(Self { root, algorithm })
    }

    fn parse_config(content: &str) -> std::result::Result<Algorithm, String> {
        let mut version = None;
        let mut algo = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                match key.trim() {
                    "version" => version = Some(value.trim()),
                    "algo" => algo = Some(value.trim()),
                    _ => {}
                }
            }
        }

        if version != Some("1") {
            return Err(format!("unsupported config version: {:?}", version));
        }
        let algo = algo.ok_or_else(|| "missing algo in config".to_string())?;
        Algorithm::parse(algo).map_err(|_| format!("unsupported algorithm: {}", algo))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// `objects/<algorithm>/<prefix>/<suffix>`, derived from the address only.
    pub fn object_path(&self, reference: &Reference) -> PathBuf {
        self.root
            .join("objects")
            .join(self.algorithm.as_str())
            .join(reference.prefix())
            .join(reference.suffix())
    }

    pub fn contains(&self, reference: &Reference) -> bool {
        self.object_path(reference).exists()
    }

    /// Read and decode only the header of a stored object.
    pub fn header(&self, reference: &Reference) -> Result<ObjectHeader> {
        let path = self.existing_path(reference)?;
        let mut file = fs::File::open(&path)?;
        let mut buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut buf)?;
        decode_header(&path, &buf)
    }

    fn existing_path(&self, reference: &Reference) -> Result<PathBuf> {
        let path = self.object_path(reference);
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::not_found(reference.to_hex()))
        }
    }

    fn write_object_atomic(
        &self,
        reference: &Reference,
        header: &ObjectHeader,
        payload: &[u8],
    ) -> Result<()> {
        let path = self.object_path(reference);
        let parent = path
            .parent()
            .ok_or_else(|| Error::invalid_store(&self.root, "object path has no parent"))?;
        fs::create_dir_all(parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(&header.encode())?;
        temp.write_all(payload)?;
        temp.flush()?;
        temp.persist(&path)?;
        Ok(())
    }
}

impl BlobStore for FsStore {
    fn put(&self, data: &[u8]) -> Result<Reference> {
        let reference = Reference::hash_bytes(data);
        if self.contains(&reference) {
            trace!(reference = %reference, "object already stored");
            return Ok(reference);
        }

        let (payload, compression) = if data.len() >= COMPRESSION_THRESHOLD {
            (compress_zstd(data)?, CompressionType::Zstd)
        } else {
            (data.to_vec(), CompressionType::None)
        };
        let header = ObjectHeader::new(
            ObjectType::detect(data),
            self.algorithm,
            compression,
            payload.len() as u64,
        );

        self.write_object_atomic(&reference, &header, &payload)?;
        trace!(
            reference = %reference,
            kind = header.object_type.as_str(),
            size = data.len(),
            stored = payload.len(),
            "wrote object"
        );
        Ok(reference)
    }

    fn get(&self, reference: &Reference) -> Result<Vec<u8>> {
        let path = self.existing_path(reference)?;
        let bytes = fs::read(&path)?;
        if bytes.len() < HEADER_SIZE {
            return Err(Error::corrupted_object(&path, "file shorter than header"));
        }
        let header = decode_header(&path, &bytes[..HEADER_SIZE])?;

        let stored = &bytes[HEADER_SIZE..];
        if stored.len() as u64 != header.payload_len {
            return Err(Error::corrupted_object(
                &path,
                format!(
                    "payload length mismatch: expected {}, got {}",
                    header.payload_len,
                    stored.len()
                ),
            ));
        }

        let data = match header.compression {
            CompressionType::None => stored.to_vec(),
            CompressionType::Zstd => decompress_zstd(stored)?,
        };

        let computed = Reference::hash_bytes(&data);
        if computed.address() != reference.address() {
            return Err(Error::corrupted_object(
                &path,
                format!(
                    "hash mismatch: expected {}, got {}",
                    hex::encode(reference.address()),
                    computed.to_hex()
                ),
            ));
        }

        Ok(data)
    }
}

/// A damaged header is a store failure, not a bad manifest node.
fn decode_header(path: &Path, buf: &[u8]) -> Result<ObjectHeader> {
    ObjectHeader::decode(buf).map_err(|e| match e {
        Error::CorruptManifest { reason } => Error::corrupted_object(path, reason),
        other => other,
    })
}

fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, COMPRESSION_LEVEL)
        .map_err(|e| Error::compression_error(format!("zstd compression failed: {}", e)))
}

fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data)
        .map_err(|e| Error::compression_error(format!("zstd decompression failed: {}", e)))
}
