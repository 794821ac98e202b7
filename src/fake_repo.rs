//! An in-memory [`GitSource`] double over hand-built commit/tree/blob maps,
//! used by the `vfm`, `commit_index` and `resolver` test modules in place of
//! a live `gix` checkout (SPEC_FULL.md §8).

#![cfg(test)]

use std::collections::HashMap;

use gix::ObjectId;

use crate::error::{VfmError, VfmResult};
use crate::repo::{CommitInfo, EntryKind, GitSource, RefNamespace, TreeEntry};

#[derive(Default)]
pub struct FakeRepo {
    refs: HashMap<(RefNamespace, String), ObjectId>,
    commits: HashMap<ObjectId, CommitInfo>,
    trees: HashMap<ObjectId, Vec<TreeEntry>>,
    blobs: HashMap<ObjectId, Vec<u8>>,
    /// First-parent chain only, matching `log_from`'s contract.
    first_parent: HashMap<ObjectId, ObjectId>,
}

pub fn oid(hex: &str) -> ObjectId {
    ObjectId::from_hex(hex.as_bytes()).unwrap_or_else(|_| panic!("bad test oid: {hex}"))
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ref(&mut self, ns: RefNamespace, name: &str, target: ObjectId) -> &mut Self {
        self.refs.insert((ns, name.to_string()), target);
        self
    }

    pub fn add_commit(&mut self, id: ObjectId, tree: ObjectId, parent: Option<ObjectId>) -> &mut Self {
        self.commits.insert(id, CommitInfo { id, tree });
        if let Some(parent) = parent {
            self.first_parent.insert(id, parent);
        }
        self
    }

    pub fn add_tree(&mut self, id: ObjectId, entries: Vec<TreeEntry>) -> &mut Self {
        self.trees.insert(id, entries);
        self
    }

    pub fn add_blob(&mut self, id: ObjectId, data: &[u8]) -> &mut Self {
        self.blobs.insert(id, data.to_vec());
        self
    }
}

impl GitSource for FakeRepo {
    fn resolve_ref(&self, ns: RefNamespace, short_name: &str) -> VfmResult<ObjectId> {
        self.refs
            .get(&(ns, short_name.to_string()))
            .copied()
            .ok_or_else(|| VfmError::not_found(short_name))
    }

    fn list_refs(&self, ns: RefNamespace) -> VfmResult<Vec<(String, ObjectId)>> {
        let mut refs: Vec<_> = self
            .refs
            .iter()
            .filter(|((namespace, _), _)| *namespace == ns)
            .map(|((_, name), id)| (name.clone(), *id))
            .collect();
        refs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(refs)
    }

    fn get_commit(&self, id: &ObjectId) -> VfmResult<CommitInfo> {
        self.commits
            .get(id)
            .cloned()
            .ok_or_else(|| VfmError::not_found(id.to_string()))
    }

    fn get_tree(&self, id: &ObjectId) -> VfmResult<Vec<TreeEntry>> {
        self.trees
            .get(id)
            .cloned()
            .ok_or_else(|| VfmError::not_found(id.to_string()))
    }

    fn read_blob(&self, id: &ObjectId) -> VfmResult<Vec<u8>> {
        self.blobs
            .get(id)
            .cloned()
            .ok_or_else(|| VfmError::not_found(id.to_string()))
    }

    fn log_from(&self, head: &ObjectId, limit: usize) -> VfmResult<Vec<ObjectId>> {
        let mut history = Vec::with_capacity(limit.min(256));
        let mut current = *head;
        loop {
            history.push(current);
            if history.len() >= limit || !self.commits.contains_key(&current) {
                break;
            }
            match self.first_parent.get(&current) {
                Some(parent) => current = *parent,
                None => break,
            }
        }
        Ok(history)
    }

    fn iter_packed_commits(&self) -> VfmResult<Vec<ObjectId>> {
        Ok(self.commits.keys().copied().collect())
    }

    fn iter_loose_object_ids(&self) -> VfmResult<Vec<ObjectId>> {
        Ok(Vec::new())
    }
}

/// A minimal fixture matching end-to-end scenario 1 from SPEC_FULL.md §8: one
/// commit, one file `README` with content `"hello\n"`.
pub fn single_commit_readme() -> (FakeRepo, ObjectId) {
    let commit_id = oid("da39a3ee5e6b4b0d3255bfef95601890afd80709");
    let tree_id = oid("4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    let blob_id = oid("ce013625030ba8dba906f756967f9e9ca394464a");

    let mut repo = FakeRepo::new();
    repo.add_commit(commit_id, tree_id, None);
    repo.add_tree(
        tree_id,
        vec![TreeEntry {
            name: "README".to_string(),
            kind: EntryKind::Regular,
            target: blob_id,
        }],
    );
    repo.add_blob(blob_id, b"hello\n");
    (repo, commit_id)
}
