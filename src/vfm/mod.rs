//! The Virtual Filesystem Model: a lazy, polymorphic tree of [`Node`]s that
//! maps git objects onto directory/file/symlink semantics.
//!
//! Each node is an immutable value carrying just enough state to answer
//! [`Node::attr`], [`Node::lookup`], [`Node::read_dir`], [`Node::read_all`]
//! and [`Node::readlink`] without mutation (SPEC_FULL.md §3.2/§4.3). Missing
//! operations return [`VfmError::NotSupported`] rather than panicking — this
//! is the tagged-variant design the teacher's own `NodeKind` enum in `fs.rs`
//! used for a single protocol, generalized here to the full node set and
//! shared across all three adapters.

use std::sync::Arc;

use gix::ObjectId;

use crate::commit_index::CommitIndex;
use crate::error::{VfmError, VfmResult};
use crate::inode::{inode_for_object, inode_for_path};
use crate::repo::{EntryKind, GitSource, RefNamespace};

/// Default cap on branch history length (spec §3.2, §4.3), overridable via
/// `--max-commits`.
pub const DEFAULT_MAX_COMMITS: usize = 100;

/// Both `fuse-backend-rs` (`ROOT_ID`) and `nfsserve` (this crate's own
/// `ROOT_ID` constant in `adapters::nfs`) fix the root at inode/fileid 1;
/// `Node::Root` reports that value directly rather than hashing `""`, so a
/// `getattr` on the mount root always round-trips to the same id the
/// protocol handed out.
pub const ROOT_INODE: u64 = 1;

/// Shared context every [`Node`] operation is given: the repository, the
/// commit index, and the process-wide configuration that affects node
/// behavior (currently just the branch-history cap).
pub struct Vfm {
    pub repo: Arc<dyn GitSource>,
    pub index: Arc<CommitIndex>,
    pub max_commits: usize,
}

impl Vfm {
    pub fn new(repo: Arc<dyn GitSource>, index: Arc<CommitIndex>, max_commits: usize) -> Self {
        Self {
            repo,
            index,
            max_commits,
        }
    }

    pub fn root(&self) -> Node {
        Node::Root
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Directory,
    File,
    Symlink,
}

/// Protocol-agnostic attributes (stat64/fattr3/DAV metadata are all derived
/// from this). mtime/ctime are fixed at epoch-0 per §4.5 — historical
/// objects have no notion of "current" modification time.
#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub node_type: NodeType,
    pub mode: u32,
    pub size: u64,
    pub inode: u64,
}

fn dir_attr(inode: u64) -> Attr {
    Attr {
        node_type: NodeType::Directory,
        mode: 0o555,
        size: 0,
        inode,
    }
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub node_type: NodeType,
}

/// Where a [`Node::Symlink`]'s target string comes from — determines how its
/// inode is hashed (I5: object-ID hex for content nodes, canonical path for
/// everything synthesized by the VFM itself).
#[derive(Debug, Clone)]
pub enum SymlinkSource {
    /// A tree entry whose mode is `Link`; the blob backing it has its own
    /// object-ID.
    Blob(ObjectId),
    /// A symlink synthesized by the VFM (branch/tag/branch-history entries),
    /// identified by its own canonical mount-relative path.
    Synthetic(String),
}

/// The tagged variant set from spec §3.2. Each node is a plain value; the
/// repository and commit index it needs are passed in per-call via `&Vfm`
/// rather than captured, so nodes stay cheap to construct and compare.
#[derive(Debug, Clone)]
pub enum Node {
    Root,
    CommitsRoot,
    BranchesRoot,
    TagsRoot,
    BranchHistoriesRoot,
    /// `commits/<p1>`.
    Shard1 { prefix: String },
    /// `commits/<p1>/<p2>`.
    Shard2 { prefix: String },
    /// A tree, reached either as a commit's root tree or as a subdirectory
    /// of one. The original spec's separate `CommitDir` variant collapses
    /// into this one: a commit's root tree is just a `Tree` like any other.
    Tree { id: ObjectId },
    Blob { id: ObjectId, executable: bool },
    Symlink { target: String, source: SymlinkSource },
    BranchHistoryDir { branch: String },
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Blob { .. } => NodeType::File,
            Node::Symlink { .. } => NodeType::Symlink,
            _ => NodeType::Directory,
        }
    }

    pub fn attr(&self, vfm: &Vfm) -> VfmResult<Attr> {
        match self {
            Node::Root => Ok(dir_attr(ROOT_INODE)),
            Node::CommitsRoot => Ok(dir_attr(inode_for_path("commits"))),
            Node::BranchesRoot => Ok(dir_attr(inode_for_path("branches"))),
            Node::TagsRoot => Ok(dir_attr(inode_for_path("tags"))),
            Node::BranchHistoriesRoot => Ok(dir_attr(inode_for_path("branch_histories"))),
            Node::Shard1 { prefix } => Ok(dir_attr(inode_for_path(&format!("commits/{prefix}")))),
            Node::Shard2 { prefix } => Ok(dir_attr(inode_for_path(&format!(
                "commits/{}/{}",
                &prefix[..2.min(prefix.len())],
                prefix
            )))),
            Node::BranchHistoryDir { branch } => Ok(dir_attr(inode_for_path(&format!(
                "branch_histories/{branch}"
            )))),
            Node::Tree { id } => Ok(dir_attr(inode_for_object(id))),
            Node::Blob { id, executable } => {
                let data = vfm.repo.read_blob(id)?;
                let mode = if *executable { 0o555 } else { 0o444 };
                Ok(Attr {
                    node_type: NodeType::File,
                    mode,
                    size: data.len() as u64,
                    inode: inode_for_object(id),
                })
            }
            Node::Symlink { target, source } => {
                let inode = match source {
                    SymlinkSource::Blob(id) => inode_for_object(id),
                    SymlinkSource::Synthetic(path) => inode_for_path(path),
                };
                Ok(Attr {
                    node_type: NodeType::Symlink,
                    mode: 0o555,
                    size: target.len() as u64,
                    inode,
                })
            }
        }
    }

    pub fn read_dir(&self, vfm: &Vfm) -> VfmResult<Vec<DirEntry>> {
        match self {
            Node::Root => Ok(vec![
                dir_entry("commits"),
                dir_entry("branches"),
                dir_entry("tags"),
                dir_entry("branch_histories"),
            ]),
            Node::CommitsRoot => Ok(vfm
                .index
                .shards1()?
                .into_iter()
                .map(|name| dir_entry(&name))
                .collect()),
            Node::Shard1 { prefix } => Ok(vfm
                .index
                .shards2(prefix)?
                .into_iter()
                .map(|name| dir_entry(&name))
                .collect()),
            Node::Shard2 { prefix } => Ok(vfm
                .index
                .ids(prefix)?
                .into_iter()
                .map(|name| dir_entry(&name))
                .collect()),
            Node::Tree { id } => {
                let entries = vfm.repo.get_tree(id)?;
                Ok(entries
                    .into_iter()
                    .filter_map(|entry| entry_type(entry.kind).map(|t| (entry.name, t)))
                    .map(|(name, node_type)| DirEntry { name, node_type })
                    .collect())
            }
            Node::BranchesRoot => list_ref_symlinks(vfm, RefNamespace::Branch),
            Node::TagsRoot => list_ref_symlinks(vfm, RefNamespace::Tag),
            Node::BranchHistoriesRoot => Ok(vfm
                .repo
                .list_refs(RefNamespace::Branch)?
                .into_iter()
                .map(|(name, _)| DirEntry {
                    name,
                    node_type: NodeType::Directory,
                })
                .collect()),
            Node::BranchHistoryDir { branch } => {
                let head = vfm.repo.resolve_ref(RefNamespace::Branch, branch)?;
                let history = vfm.repo.log_from(&head, vfm.max_commits)?;
                Ok(history
                    .iter()
                    .enumerate()
                    .map(|(i, id)| DirEntry {
                        name: format!("{i:02}-{id}"),
                        node_type: NodeType::Symlink,
                    })
                    .collect())
            }
            Node::Blob { .. } | Node::Symlink { .. } => {
                Err(VfmError::not_supported("read_dir on a non-directory node"))
            }
        }
    }

    pub fn lookup(&self, vfm: &Vfm, name: &str) -> VfmResult<Node> {
        match self {
            Node::Root => match name {
                "commits" => Ok(Node::CommitsRoot),
                "branches" => Ok(Node::BranchesRoot),
                "tags" => Ok(Node::TagsRoot),
                "branch_histories" => Ok(Node::BranchHistoriesRoot),
                _ => Err(VfmError::not_found(name)),
            },
            Node::CommitsRoot => Ok(Node::Shard1 {
                prefix: name.to_string(),
            }),
            Node::Shard1 { prefix: p1 } => {
                // A `p2` inconsistent with its parent `p1` (e.g. `commits/ab/cdef`)
                // must not alias the real `cd/cdef` shard; key it on both so it
                // can never match a real 4-hex shard and reads back empty.
                let prefix = if name.starts_with(p1.as_str()) {
                    name.to_string()
                } else {
                    format!("{p1}!{name}")
                };
                Ok(Node::Shard2 { prefix })
            }
            Node::Shard2 { .. } => {
                let id = ObjectId::from_hex(name.as_bytes())
                    .map_err(|_| VfmError::not_found(name))?;
                let commit = vfm.repo.get_commit(&id)?;
                Ok(Node::Tree { id: commit.tree })
            }
            Node::Tree { id } => {
                let entries = vfm.repo.get_tree(id)?;
                let entry = entries
                    .into_iter()
                    .find(|e| e.name == name)
                    .ok_or_else(|| VfmError::not_found(name))?;
                dispatch_tree_entry(vfm, entry)
            }
            Node::BranchesRoot => branch_or_tag_symlink(vfm, RefNamespace::Branch, name, "branches"),
            Node::TagsRoot => branch_or_tag_symlink(vfm, RefNamespace::Tag, name, "tags"),
            Node::BranchHistoriesRoot => {
                vfm.repo.resolve_ref(RefNamespace::Branch, name)?;
                Ok(Node::BranchHistoryDir {
                    branch: name.to_string(),
                })
            }
            Node::BranchHistoryDir { branch } => {
                let hex = name
                    .get(3..)
                    .ok_or_else(|| VfmError::not_found(name))?;
                let id = ObjectId::from_hex(hex.as_bytes())
                    .map_err(|_| VfmError::not_found(name))?;
                vfm.repo.get_commit(&id)?;
                let target = format!("../../{}", commit_path(&id));
                let source_path = format!("branch_histories/{branch}/{name}");
                Ok(Node::Symlink {
                    target,
                    source: SymlinkSource::Synthetic(source_path),
                })
            }
            Node::Blob { .. } | Node::Symlink { .. } => {
                Err(VfmError::not_supported("lookup on a non-directory node"))
            }
        }
    }

    pub fn read_all(&self, vfm: &Vfm) -> VfmResult<Vec<u8>> {
        match self {
            Node::Blob { id, .. } => vfm.repo.read_blob(id),
            _ => Err(VfmError::not_supported("read_all on a non-file node")),
        }
    }

    pub fn readlink(&self) -> VfmResult<String> {
        match self {
            Node::Symlink { target, .. } => Ok(target.clone()),
            _ => Err(VfmError::not_supported("readlink on a non-symlink node")),
        }
    }
}

fn dir_entry(name: &str) -> DirEntry {
    DirEntry {
        name: name.to_string(),
        node_type: NodeType::Directory,
    }
}

/// I7/I8: submodules and unknown modes are invisible to ReadDir.
fn entry_type(kind: EntryKind) -> Option<NodeType> {
    match kind {
        EntryKind::Dir => Some(NodeType::Directory),
        EntryKind::Regular | EntryKind::Executable => Some(NodeType::File),
        EntryKind::Symlink => Some(NodeType::Symlink),
        EntryKind::Submodule | EntryKind::Unknown => None,
    }
}

fn dispatch_tree_entry(vfm: &Vfm, entry: crate::repo::TreeEntry) -> VfmResult<Node> {
    match entry.kind {
        EntryKind::Dir => Ok(Node::Tree { id: entry.target }),
        EntryKind::Regular => Ok(Node::Blob {
            id: entry.target,
            executable: false,
        }),
        EntryKind::Executable => Ok(Node::Blob {
            id: entry.target,
            executable: true,
        }),
        EntryKind::Symlink => {
            let bytes = vfm.repo.read_blob(&entry.target)?;
            let target = String::from_utf8(bytes)
                .map_err(|_| VfmError::corrupt("symlink blob is not valid UTF-8"))?;
            Ok(Node::Symlink {
                target,
                source: SymlinkSource::Blob(entry.target),
            })
        }
        EntryKind::Submodule | EntryKind::Unknown => Err(VfmError::not_found(entry.name)),
    }
}

fn list_ref_symlinks(vfm: &Vfm, ns: RefNamespace) -> VfmResult<Vec<DirEntry>> {
    Ok(vfm
        .repo
        .list_refs(ns)?
        .into_iter()
        .map(|(name, _)| DirEntry {
            name,
            node_type: NodeType::Symlink,
        })
        .collect())
}

fn branch_or_tag_symlink(
    vfm: &Vfm,
    ns: RefNamespace,
    name: &str,
    root_name: &str,
) -> VfmResult<Node> {
    let id = vfm.repo.resolve_ref(ns, name)?;
    Ok(Node::Symlink {
        target: format!("../commits/{id}"),
        source: SymlinkSource::Synthetic(format!("{root_name}/{name}")),
    })
}

/// `commits/<id[:2]>/<id[:4]>/<id>` (I6).
pub fn commit_path(id: &ObjectId) -> String {
    let hex = id.to_string();
    format!("commits/{}/{}/{}", &hex[..2], &hex[..4], hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit_index::CommitIndex;
    use crate::fake_repo::{oid, single_commit_readme, FakeRepo};
    use crate::repo::TreeEntry;

    fn vfm_over(repo: FakeRepo) -> Vfm {
        let repo: Arc<dyn GitSource> = Arc::new(repo);
        let index = Arc::new(CommitIndex::new(repo.clone()));
        Vfm::new(repo, index, DEFAULT_MAX_COMMITS)
    }

    #[test]
    fn commit_path_matches_shard_layout() {
        let id = oid("da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(
            commit_path(&id),
            "commits/da/da39/da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn entry_type_suppresses_submodule_and_unknown() {
        assert_eq!(entry_type(EntryKind::Submodule), None);
        assert_eq!(entry_type(EntryKind::Unknown), None);
        assert_eq!(entry_type(EntryKind::Dir), Some(NodeType::Directory));
    }

    #[test]
    fn root_read_dir_and_lookup_dispatch_fixed_children() {
        let vfm = vfm_over(FakeRepo::new());
        let names: Vec<_> = Node::Root
            .read_dir(&vfm)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["commits", "branches", "tags", "branch_histories"]);

        assert!(matches!(Node::Root.lookup(&vfm, "commits"), Ok(Node::CommitsRoot)));
        assert!(matches!(
            Node::Root.lookup(&vfm, "nonexistent"),
            Err(VfmError::NotFound(_))
        ));
    }

    // Scenario 1 (SPEC_FULL.md §8): commit browse.
    #[test]
    fn commit_browse_resolves_to_tree_and_reads_blob() {
        let (repo, commit_id) = single_commit_readme();
        let vfm = vfm_over(repo);

        let shard2 = Node::Shard2 {
            prefix: commit_id.to_string()[..4].to_string(),
        };
        let tree = shard2.lookup(&vfm, &commit_id.to_string()).unwrap();
        let entries = tree.read_dir(&vfm).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "README");

        let readme = tree.lookup(&vfm, "README").unwrap();
        assert_eq!(readme.read_all(&vfm).unwrap(), b"hello\n");
        assert_eq!(readme.attr(&vfm).unwrap().size, 6);
    }

    // Scenario 2: branch symlink.
    #[test]
    fn branch_symlink_targets_commit() {
        let commit_id = oid("0123456789abcdef0123456789abcdef01234567");
        let mut repo = FakeRepo::new();
        repo.add_ref(RefNamespace::Branch, "main", commit_id);
        let vfm = vfm_over(repo);

        let link = Node::BranchesRoot.lookup(&vfm, "main").unwrap();
        assert_eq!(link.readlink().unwrap(), format!("../commits/{commit_id}"));
    }

    // Scenario 3: tags mirror branches; RepoAdapter does the peeling, Node
    // just trusts whatever commit resolve_ref hands back.
    #[test]
    fn tag_symlink_targets_resolved_commit() {
        let commit_id = oid("abcd000100000000000000000000000000000001");
        let mut repo = FakeRepo::new();
        repo.add_ref(RefNamespace::Tag, "v1", commit_id);
        let vfm = vfm_over(repo);

        let link = Node::TagsRoot.lookup(&vfm, "v1").unwrap();
        assert_eq!(link.readlink().unwrap(), format!("../commits/{commit_id}"));
    }

    // Scenario 4: branch history indexing.
    #[test]
    fn branch_history_lists_first_parent_chain_and_resolves_entries() {
        let h2 = oid("2222222222222222222222222222222222222222");
        let h1 = oid("1111111111111111111111111111111111111111");
        let h0 = oid("0000000000000000000000000000000000000000");
        let empty_tree = oid("4b825dc642cb6eb9a060e54bf8d69288fbee4904");

        let mut repo = FakeRepo::new();
        repo.add_commit(h2, empty_tree, None);
        repo.add_commit(h1, empty_tree, Some(h2));
        repo.add_commit(h0, empty_tree, Some(h1));
        repo.add_ref(RefNamespace::Branch, "main", h0);
        let vfm = vfm_over(repo);

        let history_dir = Node::BranchHistoriesRoot.lookup(&vfm, "main").unwrap();
        let names: Vec<_> = history_dir
            .read_dir(&vfm)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec![format!("00-{h0}"), format!("01-{h1}"), format!("02-{h2}")]);

        let entry = history_dir.lookup(&vfm, &format!("01-{h1}")).unwrap();
        assert_eq!(
            entry.readlink().unwrap(),
            format!("../../{}", commit_path(&h1))
        );
    }

    // Scenario 5 & 6: submodule suppression and the executable bit.
    #[test]
    fn tree_suppresses_submodule_and_marks_executable_bit() {
        let tree_id = oid("3333333333333333333333333333333333333333");
        let script_id = oid("4444444444444444444444444444444444444444");
        let vendor_id = oid("5555555555555555555555555555555555555555");

        let mut repo = FakeRepo::new();
        repo.add_tree(
            tree_id,
            vec![
                TreeEntry {
                    name: "run.sh".to_string(),
                    kind: EntryKind::Executable,
                    target: script_id,
                },
                TreeEntry {
                    name: "vendor".to_string(),
                    kind: EntryKind::Submodule,
                    target: vendor_id,
                },
            ],
        );
        repo.add_blob(script_id, b"#!/bin/sh\n");
        let vfm = vfm_over(repo);

        let tree = Node::Tree { id: tree_id };
        let names: Vec<_> = tree.read_dir(&vfm).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["run.sh"]);

        assert!(matches!(
            tree.lookup(&vfm, "vendor"),
            Err(VfmError::NotFound(_))
        ));

        let script = tree.lookup(&vfm, "run.sh").unwrap();
        assert_eq!(script.attr(&vfm).unwrap().mode & 0o111, 0o111);
    }

    #[test]
    fn dir_attr_reports_directory_mode() {
        let attr = dir_attr(42);
        assert_eq!(attr.node_type, NodeType::Directory);
        assert_eq!(attr.mode, 0o555);
        assert_eq!(attr.inode, 42);
    }
}
