//! Synchronizing a manifest with a local file listing.

use crate::blob::BlobStore;
use crate::error::{Error, Result};
use crate::node::{Metadata, NodeId};
use crate::reference::Reference;
use crate::trie::Trie;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// A file found locally, already stored in the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Manifest path (`/`-separated).
    pub path: String,
    /// Reference of the file's bytes.
    pub reference: Reference,
    pub metadata: Metadata,
}

/// Outcome for a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Added to the manifest, or its content changed.
    New,
    /// Present with the same content.
    Ok,
    /// In the manifest but not in the local listing.
    Removed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::New => "new",
            SyncStatus::Ok => "ok",
            SyncStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncEntry {
    pub status: SyncStatus,
    pub path: String,
}

/// Per-path outcomes: local files in input order, then removed paths in
/// manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub entries: Vec<SyncEntry>,
}

impl SyncReport {
    fn count(&self, status: SyncStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn new_count(&self) -> usize {
        self.count(SyncStatus::New)
    }

    pub fn ok_count(&self) -> usize {
        self.count(SyncStatus::Ok)
    }

    pub fn removed_count(&self) -> usize {
        self.count(SyncStatus::Removed)
    }
}

impl<S: BlobStore> Trie<S> {
    /// Bring the manifest at `root` in line with `files`.
    ///
    /// Files missing from the manifest, or stored with different content, are
    /// added and reported `new`; identical ones are reported `ok`. Every other
    /// manifest entry is reported `removed`, and deleted only when `remove`
    /// is set.
    pub fn sync<I>(&mut self, root: NodeId, files: I, remove: bool) -> Result<(NodeId, SyncReport)>
    where
        I: IntoIterator<Item = LocalFile>,
    {
        self.sync_under(root, "", files, remove)
    }

    /// Like [`Trie::sync`], but only entries below `scope` are candidates
    /// for removal.
    pub fn sync_under<I>(
        &mut self,
        root: NodeId,
        scope: &str,
        files: I,
        remove: bool,
    ) -> Result<(NodeId, SyncReport)>
    where
        I: IntoIterator<Item = LocalFile>,
    {
        let mut current = root;
        let mut touched = HashSet::new();
        let mut report = SyncReport::default();

        for file in files {
            let status = match self.lookup(current, &file.path)? {
                Some(existing) if existing.reference == file.reference => SyncStatus::Ok,
                _ => {
                    current = self.add(current, &file.path, file.reference, file.metadata)?;
                    SyncStatus::New
                }
            };
            touched.insert(file.path.clone());
            report.entries.push(SyncEntry {
                status,
                path: file.path,
            });
        }

        let stale: Vec<String> = match self.resolve(current, scope) {
            Ok(entries) => entries
                .filter_map(|entry| match entry {
                    Ok(entry) if touched.contains(&entry.path) => None,
                    Ok(entry) => Some(Ok(entry.path)),
                    Err(e) => Some(Err(e)),
                })
                .collect::<Result<_>>()?,
            Err(Error::PathNotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        for path in stale {
            if remove {
                current = self.remove(current, &path)?;
            }
            report.entries.push(SyncEntry {
                status: SyncStatus::Removed,
                path,
            });
        }

        debug!(
            new = report.new_count(),
            ok = report.ok_count(),
            removed = report.removed_count(),
            remove,
            "synced manifest"
        );
        Ok((current, report))
    }
}
