//! Repository access helpers for GitSnapFS.
//!
//! These abstractions wrap `gix` primitives so the virtual filesystem code
//! can remain largely agnostic of the underlying git library. Every method
//! opens a fresh thread-local repository handle (`to_thread_local`), since
//! `gix::Repository` is not `Send` and must never be held across a call that
//! might migrate to another thread (see SPEC_FULL.md §5).

use std::collections::HashSet;
use std::path::Path;

use gix::bstr::ByteSlice;
use gix::{ObjectId, ThreadSafeRepository};
use parking_lot::Mutex;

use crate::error::{VfmError, VfmResult};

/// The two reference namespaces the VFM cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefNamespace {
    Branch,
    Tag,
}

impl RefNamespace {
    fn prefix(self) -> &'static str {
        match self {
            RefNamespace::Branch => "refs/heads/",
            RefNamespace::Tag => "refs/tags/",
        }
    }
}

/// The subset of a commit the VFM needs: its own id and its root tree.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: ObjectId,
    pub tree: ObjectId,
}

/// A tree entry's git file mode, collapsed onto the six kinds the VFM
/// distinguishes (spec §3.1). `Unknown` covers raw mode bits no git
/// porcelain would write but that can still appear in a historical tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    Regular,
    Executable,
    Symlink,
    Submodule,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
    pub target: ObjectId,
}

/// The read surface the VFM needs from a repository (spec §4.1), abstracted
/// behind a trait so tests can substitute a `FakeRepo` built from hand-held
/// commit/tree/blob maps instead of a real `gix` checkout (SPEC_FULL.md §8).
pub trait GitSource: Send + Sync {
    fn resolve_ref(&self, ns: RefNamespace, short_name: &str) -> VfmResult<ObjectId>;
    fn list_refs(&self, ns: RefNamespace) -> VfmResult<Vec<(String, ObjectId)>>;
    fn get_commit(&self, id: &ObjectId) -> VfmResult<CommitInfo>;
    fn get_tree(&self, id: &ObjectId) -> VfmResult<Vec<TreeEntry>>;
    fn read_blob(&self, id: &ObjectId) -> VfmResult<Vec<u8>>;
    fn log_from(&self, head: &ObjectId, limit: usize) -> VfmResult<Vec<ObjectId>>;
    fn iter_packed_commits(&self) -> VfmResult<Vec<ObjectId>>;
    fn iter_loose_object_ids(&self) -> VfmResult<Vec<ObjectId>>;
}

/// Thin façade over `gix::ThreadSafeRepository`.
pub struct RepoAdapter {
    inner: ThreadSafeRepository,
    warned_modes: Mutex<HashSet<u32>>,
}

impl RepoAdapter {
    pub fn open(path: &Path) -> VfmResult<Self> {
        let repo = ThreadSafeRepository::open(path).map_err(VfmError::io)?;
        Ok(Self {
            inner: repo,
            warned_modes: Mutex::new(HashSet::new()),
        })
    }

    fn local(&self) -> gix::Repository {
        self.inner.to_thread_local()
    }

    /// Resolve `refs/{heads,tags}/<short_name>` to a commit id, following
    /// symbolic chains (an annotated tag is peeled down to its commit).
    pub fn resolve_ref(&self, ns: RefNamespace, short_name: &str) -> VfmResult<ObjectId> {
        let repo = self.local();
        let full_name = format!("{}{}", ns.prefix(), short_name);
        let mut reference = repo
            .find_reference(full_name.as_str())
            .map_err(|_| VfmError::not_found(full_name.clone()))?;
        let id = reference
            .peel_to_id_in_place()
            .map_err(|err| VfmError::corrupt(err.to_string()))?
            .detach();
        Ok(id)
    }

    /// List every short name in a namespace, paired with the commit it
    /// resolves to. Sorted by name so adapters get deterministic ordering
    /// even though the underlying reference store does not guarantee one.
    pub fn list_refs(&self, ns: RefNamespace) -> VfmResult<Vec<(String, ObjectId)>> {
        let repo = self.local();
        let platform = repo.references().map_err(VfmError::io)?;
        let iter = match ns {
            RefNamespace::Branch => platform.local_branches(),
            RefNamespace::Tag => platform.tags(),
        }
        .map_err(VfmError::io)?;

        let mut refs = Vec::new();
        for reference in iter {
            let mut reference = reference.map_err(VfmError::io)?;
            let id = match reference.peel_to_id_in_place() {
                Ok(id) => id.detach(),
                // A tag or branch whose target no longer exists; skip it
                // rather than failing the whole listing.
                Err(_) => continue,
            };
            let name_bytes = reference.name().as_bstr().as_bytes();
            let short = name_bytes
                .strip_prefix(ns.prefix().as_bytes())
                .unwrap_or(name_bytes);
            refs.push((String::from_utf8_lossy(short).into_owned(), id));
        }
        refs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(refs)
    }

    pub fn get_commit(&self, id: &ObjectId) -> VfmResult<CommitInfo> {
        let repo = self.local();
        let commit = repo
            .find_commit(*id)
            .map_err(|_| VfmError::not_found(id.to_string()))?;
        let tree = commit
            .tree_id()
            .map_err(|err| VfmError::corrupt(err.to_string()))?
            .detach();
        Ok(CommitInfo { id: *id, tree })
    }

    pub fn get_tree(&self, id: &ObjectId) -> VfmResult<Vec<TreeEntry>> {
        let repo = self.local();
        let tree = repo
            .find_tree(*id)
            .map_err(|_| VfmError::not_found(id.to_string()))?;

        let mut entries = Vec::new();
        for entry in tree.iter() {
            let entry = entry.map_err(|err| VfmError::corrupt(err.to_string()))?;
            let name = entry.inner.filename.to_str_lossy().into_owned();
            let raw_mode: u32 = entry.inner.mode.value().into();
            let kind = classify_mode(raw_mode);
            if kind == EntryKind::Unknown && self.warned_modes.lock().insert(raw_mode) {
                tracing::warn!(name = %name, mode = format!("{raw_mode:o}"), "tree entry has unrecognized mode");
            }
            entries.push(TreeEntry {
                name,
                kind,
                target: entry.inner.oid.to_owned(),
            });
        }
        Ok(entries)
    }

    pub fn read_blob(&self, id: &ObjectId) -> VfmResult<Vec<u8>> {
        let repo = self.local();
        let blob = repo
            .find_blob(*id)
            .map_err(|_| VfmError::not_found(id.to_string()))?;
        Ok(blob.data.clone())
    }

    /// First-parent-only history starting at `head`, capped at `limit`
    /// entries. See SPEC_FULL.md §9 for why first-parent was chosen over a
    /// full topological walk.
    pub fn log_from(&self, head: &ObjectId, limit: usize) -> VfmResult<Vec<ObjectId>> {
        let repo = self.local();
        let mut history = Vec::with_capacity(limit.min(256));
        let mut current = *head;
        loop {
            history.push(current);
            if history.len() >= limit {
                break;
            }
            let commit = match repo.find_commit(current) {
                Ok(commit) => commit,
                Err(_) => break,
            };
            match commit.parent_ids().next() {
                Some(parent) => current = parent.detach(),
                None => break,
            }
        }
        Ok(history)
    }

    /// Every commit reachable through the combined (pack + loose) object
    /// database, scanned once at startup. See SPEC_FULL.md §3.5 for why this
    /// stands in for "packed storage only".
    pub fn iter_packed_commits(&self) -> VfmResult<Vec<ObjectId>> {
        let repo = self.local();
        let ids = repo.objects.iter().map_err(VfmError::io)?;
        let mut commits = Vec::new();
        for id in ids {
            let id = id.map_err(VfmError::io)?;
            let is_commit = repo
                .find_header(id)
                .map(|header| header.kind() == gix::object::Kind::Commit)
                .unwrap_or(false);
            if is_commit {
                commits.push(id);
            }
        }
        Ok(commits)
    }

    /// Every object id under `objects/xx/` (the loose fan-out directories),
    /// skipping `objects/pack/` entirely. Caller filters to commits via
    /// `get_commit`.
    pub fn iter_loose_object_ids(&self) -> VfmResult<Vec<ObjectId>> {
        let repo = self.local();
        let objects_dir = repo.git_dir().join("objects");
        let loose = gix::odb::loose::Store::at(objects_dir, repo.object_hash());
        let mut ids = Vec::new();
        for id in loose.iter().map_err(VfmError::io)? {
            ids.push(id.map_err(VfmError::io)?);
        }
        Ok(ids)
    }
}

impl GitSource for RepoAdapter {
    fn resolve_ref(&self, ns: RefNamespace, short_name: &str) -> VfmResult<ObjectId> {
        RepoAdapter::resolve_ref(self, ns, short_name)
    }

    fn list_refs(&self, ns: RefNamespace) -> VfmResult<Vec<(String, ObjectId)>> {
        RepoAdapter::list_refs(self, ns)
    }

    fn get_commit(&self, id: &ObjectId) -> VfmResult<CommitInfo> {
        RepoAdapter::get_commit(self, id)
    }

    fn get_tree(&self, id: &ObjectId) -> VfmResult<Vec<TreeEntry>> {
        RepoAdapter::get_tree(self, id)
    }

    fn read_blob(&self, id: &ObjectId) -> VfmResult<Vec<u8>> {
        RepoAdapter::read_blob(self, id)
    }

    fn log_from(&self, head: &ObjectId, limit: usize) -> VfmResult<Vec<ObjectId>> {
        RepoAdapter::log_from(self, head, limit)
    }

    fn iter_packed_commits(&self) -> VfmResult<Vec<ObjectId>> {
        RepoAdapter::iter_packed_commits(self)
    }

    fn iter_loose_object_ids(&self) -> VfmResult<Vec<ObjectId>> {
        RepoAdapter::iter_loose_object_ids(self)
    }
}

fn classify_mode(raw_mode: u32) -> EntryKind {
    match raw_mode {
        0o040000 => EntryKind::Dir,
        0o100644 | 0o100664 | 0o100600 => EntryKind::Regular,
        0o100755 => EntryKind::Executable,
        0o120000 => EntryKind::Symlink,
        0o160000 => EntryKind::Submodule,
        _ => EntryKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_mode_covers_standard_git_modes() {
        assert_eq!(classify_mode(0o040000), EntryKind::Dir);
        assert_eq!(classify_mode(0o100644), EntryKind::Regular);
        assert_eq!(classify_mode(0o100755), EntryKind::Executable);
        assert_eq!(classify_mode(0o120000), EntryKind::Symlink);
        assert_eq!(classify_mode(0o160000), EntryKind::Submodule);
        assert_eq!(classify_mode(0o100000), EntryKind::Unknown);
    }

    #[test]
    fn ref_namespace_prefixes() {
        assert_eq!(RefNamespace::Branch.prefix(), "refs/heads/");
        assert_eq!(RefNamespace::Tag.prefix(), "refs/tags/");
    }
}
