//! # Mantle Core
//!
//! Content-addressed manifests: a compacted radix trie mapping slash-separated
//! paths to content references, persisted node by node in a blob store.
//!
//! Every node is serialized canonically and addressed by the BLAKE3 hash of
//! its bytes, so a whole manifest is identified by its root [`Reference`].
//! Tries are canonical: the same set of entries always produces the same root
//! reference, whatever order the entries were added or removed in.
//!
//! ## Features
//!
//! - Copy-on-write nodes: mutations return a new root, old roots stay valid
//! - Lazy loading: stored subtrees are fetched only when traversed
//! - Prefix listing, removal of single paths or whole folders
//! - Sync with a local directory and merging of two manifests
//! - In-memory and on-disk blob stores
//!
//! ## Example
//!
//! ```no_run
//! use mantle_core::{FsStore, Metadata, Trie, BlobStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FsStore::init("./mantle-store")?;
//! let content = store.put(b"hello")?;
//!
//! let mut trie = Trie::new(store);
//! let root = trie.create();
//! let root = trie.add(root, "docs/hello.txt", content, Metadata::new())?;
//! let reference = trie.save(root)?;
//!
//! let root = trie.load(&reference)?;
//! for entry in trie.resolve(root, "docs/")? {
//!     let entry = entry?;
//!     println!("{} {}", entry.reference, entry.path);
//! }
//! # Ok(())
//! # }
//! ```

mod blob;
mod error;
mod merge;
mod node;
mod object;
mod reference;
mod store;
mod sync;
mod trie;
mod walk;

pub use blob::{BlobStore, MemoryStore};
pub use error::{Error, ErrorKind, Result, reason_phrase};
pub use node::{Fork, Link, Metadata, Node, NodeId, NodeKind};
pub use object::{Algorithm, CompressionType, ObjectHeader, ObjectType};
pub use reference::{ENCRYPTED_REFERENCE_SIZE, REFERENCE_SIZE, Reference};
pub use store::FsStore;
pub use sync::{LocalFile, SyncEntry, SyncReport, SyncStatus};
pub use trie::{Entries, Entry, Trie};
pub use walk::{FILENAME_KEY, collect_local_files, normalize_folder};
