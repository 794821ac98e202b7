//! NFSv3 transport, built on `nfsserve`'s `NFSFileSystem` trait.
//!
//! `nfsserve` addresses files the same way FUSE does — `(dirid: fileid3,
//! name) -> fileid3` — not by a flat path the way the Go prototype's
//! `go-nfs` + `billy.Filesystem` bridge did (SPEC_FULL.md §4.6), so lookups
//! here chain `Node::lookup` exactly like the FUSE adapter and keep their own
//! `fileid3 -> Node` table; the Path Resolver is unused. `readdir`'s
//! `start_after` cookie needs a stable per-directory enumeration order, so
//! the first page request for a directory buffers `(fileid3, name, Node)`
//! triples and that buffer is reused (not rebuilt) until it goes stale —
//! there is no NFS "open directory" call to anchor a handle's lifetime to,
//! so a short TTL stands in for one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nfsserve::nfs::{fattr3, fileid3, filename3, ftype3, nfspath3, nfsstat3, nfstime3, sattr3};
use nfsserve::vfs::{DirEntry as NfsDirEntry, NFSFileSystem, ReadDirResult, VFSCapabilities};
use parking_lot::{Mutex, RwLock};

use crate::error::VfmError;
use crate::vfm::{Attr, Node, NodeType, Vfm, ROOT_INODE};

const ROOT_ID: fileid3 = ROOT_INODE;
const DIRENT_BUFFER_TTL: Duration = Duration::from_secs(2);

struct DirentBuffer {
    entries: Vec<(fileid3, String, Node)>,
    built_at: Instant,
}

pub struct GitSnapNfs {
    vfm: Arc<Vfm>,
    nodes: RwLock<HashMap<fileid3, Node>>,
    dirent_cache: Mutex<HashMap<fileid3, DirentBuffer>>,
}

impl GitSnapNfs {
    pub fn new(vfm: Arc<Vfm>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID, Node::Root);
        Self {
            vfm,
            nodes: RwLock::new(nodes),
            dirent_cache: Mutex::new(HashMap::new()),
        }
    }

    fn node_for_id(&self, id: fileid3) -> Result<Node, nfsstat3> {
        self.nodes
            .read()
            .get(&id)
            .cloned()
            .ok_or(nfsstat3::NFS3ERR_STALE)
    }

    fn remember(&self, id: fileid3, node: Node) {
        self.nodes.write().entry(id).or_insert(node);
    }

    fn fattr3_for(&self, node: &Node) -> Result<fattr3, nfsstat3> {
        let attr = node.attr(&self.vfm).map_err(vfm_err_to_nfsstat)?;
        self.remember(attr.inode, node.clone());
        Ok(attr_to_fattr3(&attr))
    }
}

#[async_trait]
impl NFSFileSystem for GitSnapNfs {
    fn root_dir(&self) -> fileid3 {
        ROOT_ID
    }

    fn capabilities(&self) -> VFSCapabilities {
        VFSCapabilities::ReadOnly
    }

    async fn lookup(&self, dirid: fileid3, filename: &filename3) -> Result<fileid3, nfsstat3> {
        let parent = self.node_for_id(dirid)?;
        let name = std::str::from_utf8(filename).map_err(|_| nfsstat3::NFS3ERR_INVAL)?;
        let child = parent.lookup(&self.vfm, name).map_err(vfm_err_to_nfsstat)?;
        let attr = child.attr(&self.vfm).map_err(vfm_err_to_nfsstat)?;
        self.remember(attr.inode, child);
        Ok(attr.inode)
    }

    async fn getattr(&self, id: fileid3) -> Result<fattr3, nfsstat3> {
        let node = self.node_for_id(id)?;
        self.fattr3_for(&node)
    }

    async fn setattr(&self, _id: fileid3, _setattr: sattr3) -> Result<fattr3, nfsstat3> {
        Err(nfsstat3::NFS3ERR_ROFS)
    }

    async fn read(&self, id: fileid3, offset: u64, count: u32) -> Result<(Vec<u8>, bool), nfsstat3> {
        let node = self.node_for_id(id)?;
        let data = node.read_all(&self.vfm).map_err(vfm_err_to_nfsstat)?;
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok((Vec::new(), true));
        }
        let end = offset.saturating_add(count as usize).min(data.len());
        Ok((data[offset..end].to_vec(), end >= data.len()))
    }

    async fn write(&self, _id: fileid3, _offset: u64, _data: &[u8]) -> Result<fattr3, nfsstat3> {
        Err(nfsstat3::NFS3ERR_ROFS)
    }

    async fn create(
        &self,
        _dirid: fileid3,
        _filename: &filename3,
        _attr: sattr3,
    ) -> Result<(fileid3, fattr3), nfsstat3> {
        Err(nfsstat3::NFS3ERR_ROFS)
    }

    async fn create_exclusive(&self, _dirid: fileid3, _filename: &filename3) -> Result<fileid3, nfsstat3> {
        Err(nfsstat3::NFS3ERR_ROFS)
    }

    async fn mkdir(&self, _dirid: fileid3, _dirname: &filename3) -> Result<(fileid3, fattr3), nfsstat3> {
        Err(nfsstat3::NFS3ERR_ROFS)
    }

    async fn remove(&self, _dirid: fileid3, _filename: &filename3) -> Result<(), nfsstat3> {
        Err(nfsstat3::NFS3ERR_ROFS)
    }

    async fn rename(
        &self,
        _from_dirid: fileid3,
        _from_filename: &filename3,
        _to_dirid: fileid3,
        _to_filename: &filename3,
    ) -> Result<(), nfsstat3> {
        Err(nfsstat3::NFS3ERR_ROFS)
    }

    async fn readdir(
        &self,
        dirid: fileid3,
        start_after: fileid3,
        max_entries: usize,
    ) -> Result<ReadDirResult, nfsstat3> {
        let node = self.node_for_id(dirid)?;

        let mut cache = self.dirent_cache.lock();
        let stale = match cache.get(&dirid) {
            Some(buf) => buf.built_at.elapsed() > DIRENT_BUFFER_TTL,
            None => true,
        };
        if stale {
            let children = node.read_dir(&self.vfm).map_err(vfm_err_to_nfsstat)?;
            let mut entries = Vec::with_capacity(children.len());
            for entry in children {
                let child = node.lookup(&self.vfm, &entry.name).map_err(vfm_err_to_nfsstat)?;
                let attr = child.attr(&self.vfm).map_err(vfm_err_to_nfsstat)?;
                entries.push((attr.inode, entry.name, child));
            }
            cache.insert(
                dirid,
                DirentBuffer {
                    entries,
                    built_at: Instant::now(),
                },
            );
        }
        let buffer = cache.get(&dirid).expect("populated above");

        let start_index = if start_after == 0 {
            0
        } else {
            buffer
                .entries
                .iter()
                .position(|(id, _, _)| *id == start_after)
                .map(|pos| pos + 1)
                .ok_or(nfsstat3::NFS3ERR_BAD_COOKIE)?
        };

        let mut entries = Vec::new();
        let mut end = true;
        for (id, name, child) in buffer.entries.iter().skip(start_index) {
            if entries.len() >= max_entries {
                end = false;
                break;
            }
            let attr = child.attr(&self.vfm).map_err(vfm_err_to_nfsstat)?;
            self.remember(*id, child.clone());
            entries.push(NfsDirEntry {
                fileid: *id,
                name: name.as_bytes().into(),
                attr: attr_to_fattr3(&attr),
            });
        }

        Ok(ReadDirResult { entries, end })
    }

    async fn symlink(
        &self,
        _dirid: fileid3,
        _linkname: &filename3,
        _symlink: &nfspath3,
        _attr: &sattr3,
    ) -> Result<(fileid3, fattr3), nfsstat3> {
        Err(nfsstat3::NFS3ERR_ROFS)
    }

    async fn readlink(&self, id: fileid3) -> Result<nfspath3, nfsstat3> {
        let node = self.node_for_id(id)?;
        let target = node.readlink().map_err(vfm_err_to_nfsstat)?;
        Ok(target.into_bytes().into())
    }
}

fn attr_to_fattr3(attr: &Attr) -> fattr3 {
    let ftype = match attr.node_type {
        NodeType::Directory => ftype3::NF3DIR,
        NodeType::File => ftype3::NF3REG,
        NodeType::Symlink => ftype3::NF3LNK,
    };
    fattr3 {
        ftype,
        mode: attr.mode,
        nlink: if attr.node_type == NodeType::Directory { 2 } else { 1 },
        // SAFETY: getuid/getgid take no arguments and always succeed.
        uid: unsafe { libc::getuid() },
        gid: unsafe { libc::getgid() },
        size: attr.size,
        used: attr.size,
        rdev: Default::default(),
        fsid: 0,
        fileid: attr.inode,
        atime: nfstime3::default(),
        mtime: nfstime3::default(),
        ctime: nfstime3::default(),
    }
}

fn vfm_err_to_nfsstat(err: VfmError) -> nfsstat3 {
    match err {
        VfmError::NotFound(_) => nfsstat3::NFS3ERR_NOENT,
        VfmError::NotSupported(_) => nfsstat3::NFS3ERR_NOTSUPP,
        VfmError::Io(_) | VfmError::Corrupt(_) => nfsstat3::NFS3ERR_IO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vfm_err_to_nfsstat_maps_taxonomy() {
        assert!(matches!(
            vfm_err_to_nfsstat(VfmError::not_found("x")),
            nfsstat3::NFS3ERR_NOENT
        ));
        assert!(matches!(
            vfm_err_to_nfsstat(VfmError::not_supported("x")),
            nfsstat3::NFS3ERR_NOTSUPP
        ));
    }

    #[test]
    fn attr_to_fattr3_maps_node_type_to_ftype() {
        let attr = Attr {
            node_type: NodeType::File,
            mode: 0o444,
            size: 6,
            inode: 99,
        };
        let fattr = attr_to_fattr3(&attr);
        assert!(matches!(fattr.ftype, ftype3::NF3REG));
        assert_eq!(fattr.size, 6);
        assert_eq!(fattr.fileid, 99);
    }
}
