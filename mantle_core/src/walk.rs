//! Moving content between the local filesystem and manifests.

use crate::blob::BlobStore;
use crate::error::{Error, Result};
use crate::node::{Metadata, NodeId};
use crate::sync::LocalFile;
use crate::trie::Trie;
use std::fs;
use std::path::{Component, Path};
use tracing::{debug, trace};

/// Metadata key recording a file's name on disk.
pub const FILENAME_KEY: &str = "Filename";

/// Store every file under `source` and describe it as a [`LocalFile`].
///
/// Directories are walked with `.gitignore` rules applied and hidden files
/// included. Manifest paths are relative to `source`, `/`-separated, and
/// placed under `folder` when one is given. A single file is stored under
/// its own name. The result is sorted by manifest path.
pub fn collect_local_files<S: BlobStore>(
    store: &S,
    source: &Path,
    folder: Option<&str>,
) -> Result<Vec<LocalFile>> {
    let metadata = fs::metadata(source)?;
    let prefix = folder.map(normalize_folder).unwrap_or_default();

    if metadata.is_file() {
        let name = file_name(source)?;
        let file = store_file(store, source, format!("{}{}", prefix, name), name)?;
        return Ok(vec![file]);
    }
    if !metadata.is_dir() {
        return Err(Error::invalid_path(format!(
            "unsupported file type: {}",
            source.display()
        )));
    }

    let walker = ignore::WalkBuilder::new(source)
        .hidden(false)
        .git_ignore(true)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let relative = entry.path().strip_prefix(source).map_err(|_| {
            Error::invalid_path(format!("{} escapes walk root", entry.path().display()))
        })?;
        let path = format!("{}{}", prefix, manifest_path(relative)?);
        let name = file_name(entry.path())?;
        files.push(store_file(store, entry.path(), path, name)?);
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(source = %source.display(), files = files.len(), "collected local files");
    Ok(files)
}

fn store_file<S: BlobStore>(
    store: &S,
    source: &Path,
    path: String,
    name: String,
) -> Result<LocalFile> {
    let bytes = fs::read(source)?;
    let reference = store.put(&bytes)?;
    trace!(path = %path, reference = %reference, "stored file");

    let mut metadata = Metadata::new();
    metadata.insert(FILENAME_KEY.to_string(), name);
    Ok(LocalFile {
        path,
        reference,
        metadata,
    })
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_path(format!("invalid filename: {}", path.display())))
}

fn manifest_path(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                Error::invalid_path(format!("non UTF-8 path: {}", relative.display()))
            })?),
            other => {
                return Err(Error::invalid_path(format!(
                    "unexpected path component {:?} in {}",
                    other,
                    relative.display()
                )));
            }
        }
    }
    Ok(parts.join("/"))
}

/// `"/docs"` and `"docs/"` both become `"docs/"`; empty stays empty.
pub fn normalize_folder(folder: &str) -> String {
    let trimmed = folder.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Reject manifest paths that would land outside the destination directory.
fn checked_relative(path: &str) -> Result<&Path> {
    let relative = Path::new(path);
    let escapes = path.starts_with('/')
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::invalid_path(format!(
            "refusing to write outside destination: {}",
            path
        )));
    }
    Ok(relative)
}

impl<S: BlobStore> Trie<S> {
    /// Write every entry under `prefix` into `dest`, keeping manifest paths
    /// as relative file paths. Returns the written paths in manifest order.
    ///
    /// Paths ending in `/` become empty directories.
    pub fn materialize(&mut self, root: NodeId, prefix: &str, dest: &Path) -> Result<Vec<String>> {
        let entries: Vec<_> = self.resolve(root, prefix)?.collect::<Result<_>>()?;
        // Nothing touches disk unless every path stays inside `dest`.
        let targets = entries
            .iter()
            .map(|entry| checked_relative(&entry.path).map(|relative| dest.join(relative)))
            .collect::<Result<Vec<_>>>()?;

        let mut written = Vec::with_capacity(entries.len());
        for (entry, target) in entries.into_iter().zip(targets) {
            if entry.path.ends_with('/') {
                fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let bytes = self.store().get(&entry.reference)?;
                fs::write(&target, bytes)?;
            }
            trace!(path = %entry.path, "materialized entry");
            written.push(entry.path);
        }

        debug!(dest = %dest.display(), entries = written.len(), "materialized manifest");
        Ok(written)
    }
}
