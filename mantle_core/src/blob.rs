//! Blob store abstraction and an in-memory implementation.

use crate::error::{Error, Result};
use crate::reference::{REFERENCE_SIZE, Reference};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Content-addressed storage the manifest trie reads nodes from and writes
/// nodes to.
///
/// Stores locate blobs by [`Reference::address`]; the key half of an encrypted
/// reference is passed through untouched.
pub trait BlobStore {
    /// Store bytes and return their reference. Storing the same bytes twice
    /// returns the same reference.
    fn put(&self, data: &[u8]) -> Result<Reference>;

    /// Fetch the bytes behind a reference, failing with
    /// [`Error::NotFound`] when the store has never seen it.
    fn get(&self, reference: &Reference) -> Result<Vec<u8>>;
}

impl<S: BlobStore + ?Sized> BlobStore for &S {
    fn put(&self, data: &[u8]) -> Result<Reference> {
        (**self).put(data)
    }

    fn get(&self, reference: &Reference) -> Result<Vec<u8>> {
        (**self).get(reference)
    }
}

impl<S: BlobStore + ?Sized> BlobStore for Arc<S> {
    fn put(&self, data: &[u8]) -> Result<Reference> {
        (**self).put(data)
    }

    fn get(&self, reference: &Reference) -> Result<Vec<u8>> {
        (**self).get(reference)
    }
}

/// A blob store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<[u8; REFERENCE_SIZE], Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs stored.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    pub fn contains(&self, reference: &Reference) -> bool {
        self.blobs.read().contains_key(reference.address())
    }
}

impl BlobStore for MemoryStore {
    fn put(&self, data: &[u8]) -> Result<Reference> {
        let reference = Reference::hash_bytes(data);
        self.blobs
            .write()
            .entry(*reference.address())
            .or_insert_with(|| data.to_vec());
        Ok(reference)
    }

    fn get(&self, reference: &Reference) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(reference.address())
            .cloned()
            .ok_or_else(|| Error::not_found(reference.to_hex()))
    }
}
