//! Merging two manifests.

use crate::blob::BlobStore;
use crate::error::Result;
use crate::node::NodeId;
use crate::trie::{Entry, Trie};
use tracing::debug;

impl<S: BlobStore> Trie<S> {
    /// Union of two manifests.
    ///
    /// Every entry of `b` is added into `a` in `b`'s traversal order, so on a
    /// path collision the entry from `b` always wins, together with its
    /// metadata. Root metadata is combined the same way: keys from `b`
    /// override keys from `a`. Neither input root is modified.
    pub fn merge(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let entries: Vec<Entry> = self.resolve(b, "")?.collect::<Result<_>>()?;
        let count = entries.len();

        let mut merged = a;
        for entry in entries {
            merged = self.add(merged, &entry.path, entry.reference, entry.metadata)?;
        }

        let overrides = self.root_metadata(b).clone();
        if !overrides.is_empty() {
            let mut metadata = self.root_metadata(merged).clone();
            metadata.extend(overrides);
            merged = self.set_root_metadata(merged, metadata);
        }

        debug!(entries = count, "merged manifests");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use crate::blob::MemoryStore;
    use crate::node::{Metadata, NodeId};
    use crate::reference::Reference;
    use crate::trie::Trie;

    fn manifest(trie: &mut Trie<MemoryStore>, files: &[(&str, &str)]) -> NodeId {
        let mut root = trie.create();
        for (path, content) in files {
            root = trie
                .add(
                    root,
                    path,
                    Reference::hash_bytes(content.as_bytes()),
                    Metadata::new(),
                )
                .unwrap();
        }
        root
    }

    fn content_of(trie: &mut Trie<MemoryStore>, root: NodeId, path: &str) -> Reference {
        trie.lookup(root, path).unwrap().unwrap().reference
    }

    #[test]
    fn test_merge_disjoint() {
        let mut trie = Trie::new(MemoryStore::new());
        let a = manifest(&mut trie, &[("README.md", "r")]);
        let b = manifest(
            &mut trie,
            &[("address.ts", "a"), ("index.ts", "i"), ("stamp.ts", "s")],
        );
        let merged = trie.merge(a, b).unwrap();

        let paths: Vec<String> = trie
            .resolve(merged, "")
            .unwrap()
            .map(|e| e.unwrap().path)
            .collect();
        assert_eq!(paths, vec!["README.md", "address.ts", "index.ts", "stamp.ts"]);
    }

    #[test]
    fn test_merge_b_wins() {
        let mut trie = Trie::new(MemoryStore::new());
        let a = manifest(&mut trie, &[("bravo.txt", "1")]);
        let b = manifest(&mut trie, &[("bravo.txt", "2")]);

        let merged = trie.merge(a, b).unwrap();
        assert_eq!(
            content_of(&mut trie, merged, "bravo.txt"),
            Reference::hash_bytes(b"2")
        );

        let reversed = trie.merge(b, a).unwrap();
        assert_eq!(
            content_of(&mut trie, reversed, "bravo.txt"),
            Reference::hash_bytes(b"1")
        );
    }

    #[test]
    fn test_merge_swapped_names() {
        let mut trie = Trie::new(MemoryStore::new());
        let a = manifest(&mut trie, &[("alpha.txt", "1"), ("bravo.txt", "2")]);
        let b = manifest(&mut trie, &[("bravo.txt", "1"), ("alpha.txt", "2")]);

        let merged = trie.merge(a, b).unwrap();
        assert_eq!(
            content_of(&mut trie, merged, "alpha.txt"),
            Reference::hash_bytes(b"2")
        );
        assert_eq!(
            content_of(&mut trie, merged, "bravo.txt"),
            Reference::hash_bytes(b"1")
        );
    }

    #[test]
    fn test_merge_leaves_inputs_untouched() {
        let mut trie = Trie::new(MemoryStore::new());
        let a = manifest(&mut trie, &[("a.txt", "a")]);
        let b = manifest(&mut trie, &[("b.txt", "b")]);
        let before = trie.reference(a).unwrap();

        trie.merge(a, b).unwrap();
        assert_eq!(trie.reference(a).unwrap(), before);
    }

    #[test]
    fn test_merge_root_metadata() {
        let mut trie = Trie::new(MemoryStore::new());
        let a = manifest(&mut trie, &[("index.html", "i")]);
        let mut metadata = Metadata::new();
        metadata.insert("website-index-document".to_string(), "index.html".to_string());
        metadata.insert("website-error-document".to_string(), "404.html".to_string());
        let a = trie.set_root_metadata(a, metadata);

        let b = manifest(&mut trie, &[("home.html", "h")]);
        let mut metadata = Metadata::new();
        metadata.insert("website-index-document".to_string(), "home.html".to_string());
        let b = trie.set_root_metadata(b, metadata);

        let merged = trie.merge(a, b).unwrap();
        let root_metadata = trie.root_metadata(merged);
        assert_eq!(root_metadata["website-index-document"], "home.html");
        assert_eq!(root_metadata["website-error-document"], "404.html");
    }

    #[test]
    fn test_merge_with_empty() {
        let mut trie = Trie::new(MemoryStore::new());
        let a = manifest(&mut trie, &[("a.txt", "a")]);
        let empty = trie.create();

        let merged = trie.merge(a, empty).unwrap();
        assert_eq!(trie.reference(merged).unwrap(), trie.reference(a).unwrap());

        let merged = trie.merge(empty, a).unwrap();
        assert_eq!(trie.reference(merged).unwrap(), trie.reference(a).unwrap());
    }
}
