//! The manifest trie: an arena of immutable nodes with copy-on-write
//! mutation and lazy loading from a blob store.

use crate::blob::BlobStore;
use crate::error::{Error, Result};
use crate::node::{Fork, Link, MAX_PREFIX_LEN, Metadata, Node, NodeId};
use crate::reference::Reference;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// A stored path together with its content reference and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub path: String,
    pub reference: Reference,
    pub metadata: Metadata,
}

/// Arena owning every node materialized for one or more manifest roots.
///
/// Nodes are never modified once pushed. Mutating operations build new nodes
/// along the root-to-leaf path and return a new root id; older roots stay
/// valid and keep sharing their untouched subtrees.
///
/// A [`NodeId`] is only meaningful to the arena that issued it. Passing an id
/// from another `Trie` to any method taking one panics or reads an unrelated
/// node.
pub struct Trie<S> {
    store: S,
    nodes: Vec<Node>,
    references: HashMap<NodeId, Reference>,
    persisted: HashSet<NodeId>,
    loaded: HashMap<Reference, NodeId>,
}

enum Removal {
    Missing,
    Emptied,
    Replaced(NodeId),
}

impl<S: BlobStore> Trie<S> {
    /// Create an empty arena backed by `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            nodes: Vec::new(),
            references: HashMap::new(),
            persisted: HashSet::new(),
            loaded: HashMap::new(),
        }
    }

    /// The backing blob store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Borrow a materialized node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this arena.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Create an empty root.
    pub fn create(&mut self) -> NodeId {
        self.push(Node::new())
    }

    /// Fetch and decode the node stored under `reference`.
    pub fn load(&mut self, reference: &Reference) -> Result<NodeId> {
        if let Some(id) = self.loaded.get(reference) {
            return Ok(*id);
        }

        let bytes = self.store.get(reference)?;
        let node = Node::decode(&bytes)?;
        trace!(%reference, forks = node.forks.len(), "loaded node");

        let id = self.push(node);
        self.references.insert(id, *reference);
        self.persisted.insert(id);
        self.loaded.insert(*reference, id);
        Ok(id)
    }

    fn child(&mut self, link: &Link) -> Result<NodeId> {
        match link {
            Link::Loaded(id) => Ok(*id),
            Link::Stored(reference) => self.load(reference),
        }
    }

    /// Insert or overwrite `path`, returning the new root.
    ///
    /// An existing entry at exactly `path` is replaced together with its
    /// metadata.
    pub fn add(
        &mut self,
        root: NodeId,
        path: &str,
        reference: Reference,
        metadata: Metadata,
    ) -> Result<NodeId> {
        validate_path(path)?;
        debug!(path, %reference, "adding entry");
        self.insert(root, path.as_bytes(), reference, metadata)
    }

    fn insert(
        &mut self,
        id: NodeId,
        path: &[u8],
        reference: Reference,
        metadata: Metadata,
    ) -> Result<NodeId> {
        let mut node = self.nodes[id.0].clone();

        if path.is_empty() {
            node.entry = Some(reference);
            node.metadata = metadata;
            return Ok(self.push(node));
        }

        let first = path[0];
        let fork = match node.forks.get(&first).cloned() {
            None => {
                let leaf = self.push(Node::leaf(reference, metadata));
                Fork::new(path.to_vec(), &self.nodes[leaf.0], Link::Loaded(leaf))
            }
            Some(existing) => {
                let common = common_prefix_len(&existing.prefix, path);
                let child = if common == existing.prefix.len() {
                    let child = self.child(&existing.link)?;
                    self.insert(child, &path[common..], reference, metadata)?
                } else {
                    // Diverges inside the fork: split it at `common`
                    let tail = existing.prefix[common..].to_vec();
                    let mut middle = Node::new();
                    middle
                        .forks
                        .insert(tail[0], Fork::from_parts(tail, existing.kind, existing.link));
                    let middle = self.push(middle);
                    self.insert(middle, &path[common..], reference, metadata)?
                };
                Fork::new(path[..common].to_vec(), &self.nodes[child.0], Link::Loaded(child))
            }
        };

        node.forks.insert(first, fork);
        Ok(self.push(node))
    }

    /// Remove the entry stored at exactly `path`, returning the new root.
    pub fn remove(&mut self, root: NodeId, path: &str) -> Result<NodeId> {
        debug!(path, "removing entry");
        match self.delete(root, path.as_bytes(), true)? {
            Removal::Replaced(id) => Ok(id),
            Removal::Emptied => Ok(self.create()),
            Removal::Missing => Err(self.path_not_found(root, path)),
        }
    }

    fn delete(&mut self, id: NodeId, path: &[u8], is_root: bool) -> Result<Removal> {
        let mut node = self.nodes[id.0].clone();

        if path.is_empty() {
            if node.entry.is_none() {
                return Ok(Removal::Missing);
            }
            node.entry = None;
            node.metadata.clear();
        } else {
            let Some(fork) = node.forks.get(&path[0]).cloned() else {
                return Ok(Removal::Missing);
            };
            if !path.starts_with(&fork.prefix) {
                return Ok(Removal::Missing);
            }

            let child = self.child(&fork.link)?;
            match self.delete(child, &path[fork.prefix.len()..], false)? {
                Removal::Missing => return Ok(Removal::Missing),
                Removal::Emptied => {
                    node.forks.remove(&path[0]);
                }
                Removal::Replaced(child) => {
                    let fork = self.collapse(fork.prefix, child);
                    node.forks.insert(path[0], fork);
                }
            }
        }

        if !is_root && node.is_empty() {
            return Ok(Removal::Emptied);
        }
        Ok(Removal::Replaced(self.push(node)))
    }

    /// Build the fork leading to `child`, merging it into its only fork when
    /// `child` is a bare pass-through node.
    fn collapse(&self, prefix: Vec<u8>, child: NodeId) -> Fork {
        let node = &self.nodes[child.0];
        if node.entry.is_none() && node.metadata.is_empty() && node.forks.len() == 1 {
            if let Some(only) = node.forks.values().next() {
                let mut merged = prefix;
                merged.extend_from_slice(&only.prefix);
                return Fork::from_parts(merged, only.kind, only.link.clone());
            }
        }
        Fork::new(prefix, node, Link::Loaded(child))
    }

    /// Remove the entry at `prefix`, or every entry below the directory
    /// `prefix` when no file is stored there. Returns the new root and the
    /// number of entries removed.
    pub fn remove_prefix(&mut self, root: NodeId, prefix: &str) -> Result<(NodeId, usize)> {
        if self.lookup(root, prefix)?.is_some() {
            return Ok((self.remove(root, prefix)?, 1));
        }

        let directory = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{}/", prefix)
        };
        let paths = match self.resolve(root, &directory) {
            Ok(entries) => entries.map(|e| e.map(|e| e.path)).collect::<Result<Vec<_>>>()?,
            Err(Error::PathNotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        if paths.is_empty() {
            return Err(self.path_not_found(root, prefix));
        }

        let mut current = root;
        for path in &paths {
            current = self.remove(current, path)?;
        }
        Ok((current, paths.len()))
    }

    /// Look up the entry stored at exactly `path`.
    pub fn lookup(&mut self, root: NodeId, path: &str) -> Result<Option<Entry>> {
        let mut id = root;
        let mut rest = path.as_bytes();

        while !rest.is_empty() {
            let Some(fork) = self.nodes[id.0].forks.get(&rest[0]).cloned() else {
                return Ok(None);
            };
            if !rest.starts_with(&fork.prefix) {
                return Ok(None);
            }
            rest = &rest[fork.prefix.len()..];
            id = self.child(&fork.link)?;
        }

        let node = &self.nodes[id.0];
        Ok(node.entry.map(|reference| Entry {
            path: path.to_string(),
            reference,
            metadata: node.metadata.clone(),
        }))
    }

    /// Iterate every entry whose path starts with `prefix`.
    ///
    /// Matching is by string prefix, so a partial final segment such as
    /// `lev` matches `level-one/...`. The returned iterator walks depth first,
    /// a node's own entry before its forks, forks in byte order, and loads
    /// nodes only as it reaches them.
    pub fn resolve(&mut self, root: NodeId, prefix: &str) -> Result<Entries<'_, S>> {
        let mut id = root;
        let mut consumed = Vec::new();
        let mut rest = prefix.as_bytes();

        while !rest.is_empty() {
            let Some(fork) = self.nodes[id.0].forks.get(&rest[0]).cloned() else {
                return Err(self.path_not_found(root, prefix));
            };
            let common = common_prefix_len(&fork.prefix, rest);
            if common < rest.len() && common < fork.prefix.len() {
                return Err(self.path_not_found(root, prefix));
            }
            consumed.extend_from_slice(&fork.prefix);
            rest = &rest[common..];
            id = self.child(&fork.link)?;
        }

        debug!(prefix, "resolved prefix");
        Ok(Entries {
            trie: self,
            stack: vec![(Link::Loaded(id), consumed)],
            failed: false,
        })
    }

    /// Root metadata, e.g. index and error documents.
    pub fn root_metadata(&self, root: NodeId) -> &Metadata {
        &self.nodes[root.0].metadata
    }

    /// Replace the root's metadata, returning the new root.
    pub fn set_root_metadata(&mut self, root: NodeId, metadata: Metadata) -> NodeId {
        let mut node = self.nodes[root.0].clone();
        node.metadata = metadata;
        self.push(node)
    }

    /// Content reference of `root` without writing anything to the store.
    pub fn reference(&mut self, root: NodeId) -> Result<Reference> {
        self.seal(root, false)
    }

    /// Persist every unsaved node reachable from `root`, children before
    /// parents, and return the root's reference.
    pub fn save(&mut self, root: NodeId) -> Result<Reference> {
        let reference = self.seal(root, true)?;
        debug!(%reference, "saved manifest");
        Ok(reference)
    }

    fn seal(&mut self, id: NodeId, persist: bool) -> Result<Reference> {
        if let Some(reference) = self.references.get(&id)
            && (!persist || self.persisted.contains(&id))
        {
            return Ok(*reference);
        }

        let mut sealed = self.nodes[id.0].clone();
        for fork in sealed.forks.values_mut() {
            if let Link::Loaded(child) = fork.link {
                fork.link = Link::Stored(self.seal(child, persist)?);
            }
        }

        let bytes = sealed.encode()?;
        let reference = if persist {
            let reference = self.store.put(&bytes)?;
            trace!(%reference, "stored node");
            self.persisted.insert(id);
            reference
        } else {
            Reference::hash_bytes(&bytes)
        };
        self.references.insert(id, reference);
        Ok(reference)
    }

    /// Number of nodes reachable from `root`, loading any that are not yet
    /// materialized.
    pub fn node_count(&mut self, root: NodeId) -> Result<usize> {
        let mut count = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            count += 1;
            let links: Vec<Link> = self.nodes[id.0]
                .forks
                .values()
                .map(|fork| fork.link.clone())
                .collect();
            for link in &links {
                stack.push(self.child(link)?);
            }
        }
        Ok(count)
    }

    fn path_not_found(&mut self, root: NodeId, path: &str) -> Error {
        match self.reference(root) {
            Ok(reference) => Error::path_not_found(reference.to_hex(), path),
            Err(e) => e,
        }
    }
}

/// Lazy depth-first sequence of entries returned by [`Trie::resolve`].
///
/// Stops after the first error.
pub struct Entries<'a, S> {
    trie: &'a mut Trie<S>,
    stack: Vec<(Link, Vec<u8>)>,
    failed: bool,
}

impl<S: BlobStore> Iterator for Entries<'_, S> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        while let Some((link, path)) = self.stack.pop() {
            let id = match self.trie.child(&link) {
                Ok(id) => id,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };

            let node = &self.trie.nodes[id.0];
            for fork in node.forks.values().rev() {
                let mut child_path = path.clone();
                child_path.extend_from_slice(&fork.prefix);
                self.stack.push((fork.link.clone(), child_path));
            }

            if let Some(reference) = node.entry {
                let metadata = node.metadata.clone();
                return Some(match String::from_utf8(path) {
                    Ok(path) => Ok(Entry {
                        path,
                        reference,
                        metadata,
                    }),
                    Err(e) => {
                        self.failed = true;
                        Err(Error::corrupt_manifest(format!(
                            "path is not valid UTF-8: {}",
                            e
                        )))
                    }
                });
            }
        }
        None
    }
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::invalid_path("path cannot be empty"));
    }
    if path.len() > MAX_PREFIX_LEN {
        return Err(Error::invalid_path(format!(
            "path too long: {} bytes (max {})",
            path.len(),
            MAX_PREFIX_LEN
        )));
    }
    Ok(())
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
