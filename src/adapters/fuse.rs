//! FUSE transport, built on `fuse-backend-rs`'s `FileSystem` trait.
//!
//! Grounded on the teacher's original `fs.rs`: the `stat64`-building helpers
//! and the lookup/getattr/readdir/readlink/read shape survive almost
//! unchanged, but node materialization is now delegated to [`vfm::Node`]
//! instead of the teacher's ad hoc `NodeKind`, and the fixed root children
//! (`commits`/`branches`/`tags`/`branch_histories`) are just another
//! `Node::Root` lookup rather than hardcoded inode constants.

use std::collections::HashMap;
use std::io;
use std::str;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuse_backend_rs::abi::fuse_abi::{stat64, ROOT_ID};
use fuse_backend_rs::api::filesystem::{Context, DirEntry as FuseDirEntry, Entry, FileSystem, ZeroCopyWriter};
use parking_lot::RwLock;

use crate::error::VfmError;
use crate::vfm::{Attr, Node, NodeType, Vfm};

const ENTRY_TTL: Duration = Duration::from_secs(1);
const ATTR_TTL: Duration = Duration::from_secs(1);

const NAME_DOT: &[u8] = b".";
const NAME_DOT_DOT: &[u8] = b"..";

pub struct GitSnapFuse {
    vfm: Arc<Vfm>,
    nodes: RwLock<HashMap<u64, Node>>,
}

impl GitSnapFuse {
    pub fn new(vfm: Arc<Vfm>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID, Node::Root);
        Self {
            vfm,
            nodes: RwLock::new(nodes),
        }
    }

    fn node_for_inode(&self, inode: u64) -> io::Result<Node> {
        self.nodes
            .read()
            .get(&inode)
            .cloned()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn remember(&self, inode: u64, node: Node) {
        self.nodes.write().entry(inode).or_insert(node);
    }

    fn entry_for(&self, node: Node) -> io::Result<(Node, Entry)> {
        let attr = node.attr(&self.vfm).map_err(vfm_err_to_io)?;
        self.remember(attr.inode, node.clone());
        let entry = Entry {
            inode: attr.inode,
            generation: 0,
            attr: to_stat64(&attr),
            attr_flags: 0,
            attr_timeout: ATTR_TTL,
            entry_timeout: ENTRY_TTL,
        };
        Ok((node, entry))
    }
}

impl FileSystem for GitSnapFuse {
    type Inode = u64;
    type Handle = u64;

    fn lookup(&self, _ctx: &Context, parent: Self::Inode, name: &std::ffi::CStr) -> io::Result<Entry> {
        let name = str::from_utf8(name.to_bytes())
            .map_err(|_| io::Error::from_raw_os_error(libc::ENOENT))?;
        let parent_node = self.node_for_inode(parent)?;
        let child = parent_node
            .lookup(&self.vfm, name)
            .map_err(vfm_err_to_io)?;
        let (_, entry) = self.entry_for(child)?;
        Ok(entry)
    }

    fn getattr(
        &self,
        _ctx: &Context,
        inode: Self::Inode,
        _handle: Option<Self::Handle>,
    ) -> io::Result<(stat64, Duration)> {
        let node = self.node_for_inode(inode)?;
        let attr = node.attr(&self.vfm).map_err(vfm_err_to_io)?;
        Ok((to_stat64(&attr), ATTR_TTL))
    }

    fn readdir(
        &self,
        _ctx: &Context,
        inode: Self::Inode,
        _handle: Self::Handle,
        _size: u32,
        offset: u64,
        add_entry: &mut dyn FnMut(FuseDirEntry) -> io::Result<usize>,
    ) -> io::Result<()> {
        let node = self.node_for_inode(inode)?;
        let mut offset = offset;

        if offset == 0 {
            if add_entry(FuseDirEntry { ino: inode, offset: 1, type_: libc::DT_DIR as u32, name: NAME_DOT })? == 0 {
                return Ok(());
            }
            offset = 1;
        }
        if offset == 1 {
            if add_entry(FuseDirEntry { ino: inode, offset: 2, type_: libc::DT_DIR as u32, name: NAME_DOT_DOT })? == 0 {
                return Ok(());
            }
            offset = 2;
        }

        let children = node.read_dir(&self.vfm).map_err(vfm_err_to_io)?;
        for (index, entry) in children.iter().enumerate() {
            let entry_offset = (index as u64) + 3;
            if offset > entry_offset {
                continue;
            }
            let child = node.lookup(&self.vfm, &entry.name).map_err(vfm_err_to_io)?;
            let (_, fuse_entry) = self.entry_for(child)?;
            let type_ = dirent_type(entry.node_type);
            if add_entry(FuseDirEntry {
                ino: fuse_entry.inode,
                offset: entry_offset + 1,
                type_,
                name: entry.name.as_bytes(),
            })? == 0
            {
                return Ok(());
            }
        }
        Ok(())
    }

    fn readlink(&self, _ctx: &Context, inode: Self::Inode) -> io::Result<Vec<u8>> {
        let node = self.node_for_inode(inode)?;
        Ok(node.readlink().map_err(vfm_err_to_io)?.into_bytes())
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &self,
        _ctx: &Context,
        inode: Self::Inode,
        _handle: Self::Handle,
        w: &mut dyn ZeroCopyWriter,
        size: u32,
        offset: u64,
        _lock_owner: Option<u64>,
        _flags: u32,
    ) -> io::Result<usize> {
        let node = self.node_for_inode(inode)?;
        let data = node.read_all(&self.vfm).map_err(vfm_err_to_io)?;
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let end = offset.saturating_add(size as usize).min(data.len());
        w.write_all(&data[offset..end])?;
        Ok(end - offset)
    }
}

fn dirent_type(node_type: NodeType) -> u32 {
    match node_type {
        NodeType::Directory => libc::DT_DIR as u32,
        NodeType::File => libc::DT_REG as u32,
        NodeType::Symlink => libc::DT_LNK as u32,
    }
}

fn to_stat64(attr: &Attr) -> stat64 {
    let (secs, nsecs) = time_to_unix_parts(UNIX_EPOCH);
    let (mode, nlink) = match attr.node_type {
        NodeType::Directory => (libc::S_IFDIR | attr.mode, 2),
        NodeType::File => (libc::S_IFREG | attr.mode, 1),
        NodeType::Symlink => (libc::S_IFLNK | attr.mode, 1),
    };
    let mut stat: stat64 = unsafe { std::mem::zeroed() };
    stat.st_ino = attr.inode;
    stat.st_mode = mode;
    stat.st_nlink = nlink;
    // SAFETY: getuid/getgid take no arguments and always succeed.
    stat.st_uid = unsafe { libc::getuid() };
    stat.st_gid = unsafe { libc::getgid() };
    stat.st_blksize = 4096;
    stat.st_size = attr.size as i64;
    stat.st_atime = secs;
    stat.st_atime_nsec = nsecs;
    stat.st_mtime = secs;
    stat.st_mtime_nsec = nsecs;
    stat.st_ctime = secs;
    stat.st_ctime_nsec = nsecs;
    stat
}

fn time_to_unix_parts(time: SystemTime) -> (i64, i64) {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => (duration.as_secs() as i64, duration.subsec_nanos() as i64),
        Err(err) => {
            let duration = err.duration();
            (-(duration.as_secs() as i64), duration.subsec_nanos() as i64)
        }
    }
}

fn vfm_err_to_io(err: VfmError) -> io::Error {
    match err {
        VfmError::NotFound(_) => io::Error::from_raw_os_error(libc::ENOENT),
        VfmError::NotSupported(_) => io::Error::from_raw_os_error(libc::EPERM),
        VfmError::Io(_) | VfmError::Corrupt(_) => io::Error::from_raw_os_error(libc::EIO),
    }
}
