//! WebDAV transport, built on `dav-server`'s `DavFileSystem` trait.
//!
//! Unlike NFS, `dav-server`'s trait set is genuinely path-addressed
//! (`open(&DavPath, ...)`, `read_dir(&DavPath, ...)`, `metadata(&DavPath)`),
//! so this is the adapter that actually exercises the Path Resolver
//! (SPEC_FULL.md §4.7). `GitSnapDavFile` is the BufferedFile pattern of
//! §4.6: it buffers the full blob on first `read_bytes` or `seek` and
//! tracks a byte cursor from then on.

use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::{Buf, Bytes};
use dav_server::davpath::DavPath;
use dav_server::fs::{
    DavDirEntry, DavFile, DavFileSystem, DavMetaData, FsError, FsFuture, FsResult, FsStream,
    OpenOptions, ReadDirMeta,
};
use futures_util::stream;

use crate::error::VfmError;
use crate::resolver::resolve;
use crate::vfm::{Attr, Node, NodeType, Vfm};

pub struct GitSnapDav {
    vfm: Arc<Vfm>,
}

impl GitSnapDav {
    pub fn new(vfm: Arc<Vfm>) -> Self {
        Self { vfm }
    }

    fn resolve_path(&self, path: &DavPath) -> FsResult<Node> {
        resolve(&self.vfm, &Node::Root, &path.as_utf8_string()).map_err(vfm_err_to_fs_error)
    }
}

impl fmt::Debug for GitSnapDav {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitSnapDav").finish()
    }
}

impl DavFileSystem for GitSnapDav {
    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<Box<dyn DavFile>> {
        Box::pin(async move {
            if options.write || options.append || options.create || options.create_new || options.truncate {
                return Err(FsError::Forbidden);
            }
            let node = self.resolve_path(path)?;
            if node.node_type() != NodeType::File {
                return Err(FsError::GeneralFailure);
            }
            Ok(Box::new(GitSnapDavFile {
                vfm: self.vfm.clone(),
                node,
                buffered: None,
                cursor: 0,
            }) as Box<dyn DavFile>)
        })
    }

    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        _meta: ReadDirMeta,
    ) -> FsFuture<FsStream<Box<dyn DavDirEntry>>> {
        Box::pin(async move {
            let node = self.resolve_path(path)?;
            let children = node.read_dir(&self.vfm).map_err(vfm_err_to_fs_error)?;
            let mut dav_entries: Vec<FsResult<Box<dyn DavDirEntry>>> = Vec::with_capacity(children.len());
            for entry in children {
                let child = node.lookup(&self.vfm, &entry.name).map_err(vfm_err_to_fs_error)?;
                let attr = child.attr(&self.vfm).map_err(vfm_err_to_fs_error)?;
                dav_entries.push(Ok(Box::new(GitSnapDirEntry {
                    name: entry.name,
                    attr,
                }) as Box<dyn DavDirEntry>));
            }
            let boxed: FsStream<Box<dyn DavDirEntry>> = Box::pin(stream::iter(dav_entries));
            Ok(boxed)
        })
    }

    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<Box<dyn DavMetaData>> {
        Box::pin(async move {
            let node = self.resolve_path(path)?;
            let attr = node.attr(&self.vfm).map_err(vfm_err_to_fs_error)?;
            Ok(Box::new(GitSnapMeta { attr }) as Box<dyn DavMetaData>)
        })
    }
}

struct GitSnapDavFile {
    vfm: Arc<Vfm>,
    node: Node,
    buffered: Option<Vec<u8>>,
    cursor: usize,
}

impl fmt::Debug for GitSnapDavFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitSnapDavFile").finish()
    }
}

impl GitSnapDavFile {
    fn ensure_buffered(&mut self) -> FsResult<&Vec<u8>> {
        if self.buffered.is_none() {
            let data = self.node.read_all(&self.vfm).map_err(vfm_err_to_fs_error)?;
            self.buffered = Some(data);
        }
        Ok(self.buffered.as_ref().expect("just populated"))
    }
}

impl DavFile for GitSnapDavFile {
    fn metadata<'a>(&'a mut self) -> FsFuture<Box<dyn DavMetaData>> {
        Box::pin(async move {
            let attr = self.node.attr(&self.vfm).map_err(vfm_err_to_fs_error)?;
            Ok(Box::new(GitSnapMeta { attr }) as Box<dyn DavMetaData>)
        })
    }

    fn write_bytes(&mut self, _buf: Bytes) -> FsFuture<()> {
        Box::pin(async move { Err(FsError::Forbidden) })
    }

    fn write_buf(&mut self, _buf: Box<dyn Buf + Send>) -> FsFuture<()> {
        Box::pin(async move { Err(FsError::Forbidden) })
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<Bytes> {
        Box::pin(async move {
            let cursor = self.cursor;
            let data = self.ensure_buffered()?;
            let start = cursor.min(data.len());
            let end = start.saturating_add(count).min(data.len());
            self.cursor = end;
            Ok(Bytes::copy_from_slice(&self.buffered.as_ref().unwrap()[start..end]))
        })
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<u64> {
        Box::pin(async move {
            let len = self.ensure_buffered()?.len() as i64;
            let new_pos = match pos {
                SeekFrom::Start(offset) => offset as i64,
                SeekFrom::Current(offset) => self.cursor as i64 + offset,
                SeekFrom::End(offset) => len + offset,
            };
            let new_pos = new_pos.clamp(0, len) as usize;
            self.cursor = new_pos;
            Ok(new_pos as u64)
        })
    }

    fn flush(&mut self) -> FsFuture<()> {
        Box::pin(async move { Ok(()) })
    }
}

struct GitSnapMeta {
    attr: Attr,
}

impl fmt::Debug for GitSnapMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitSnapMeta").field("size", &self.attr.size).finish()
    }
}

impl DavMetaData for GitSnapMeta {
    fn len(&self) -> u64 {
        self.attr.size
    }

    fn modified(&self) -> FsResult<SystemTime> {
        Ok(SystemTime::UNIX_EPOCH)
    }

    fn is_dir(&self) -> bool {
        self.attr.node_type == NodeType::Directory
    }

    fn is_file(&self) -> bool {
        self.attr.node_type == NodeType::File
    }

    fn is_symlink(&self) -> bool {
        self.attr.node_type == NodeType::Symlink
    }

    fn executable(&self) -> FsResult<bool> {
        Ok(self.attr.mode & 0o111 != 0)
    }
}

struct GitSnapDirEntry {
    name: String,
    attr: Attr,
}

impl fmt::Debug for GitSnapDirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitSnapDirEntry").field("name", &self.name).finish()
    }
}

impl DavDirEntry for GitSnapDirEntry {
    fn name(&self) -> Vec<u8> {
        self.name.clone().into_bytes()
    }

    fn metadata(&self) -> FsFuture<Box<dyn DavMetaData>> {
        let attr = self.attr;
        Box::pin(async move { Ok(Box::new(GitSnapMeta { attr }) as Box<dyn DavMetaData>) })
    }
}

fn vfm_err_to_fs_error(err: VfmError) -> FsError {
    match err {
        VfmError::NotFound(_) => FsError::NotFound,
        VfmError::NotSupported(_) => FsError::Forbidden,
        VfmError::Io(_) | VfmError::Corrupt(_) => FsError::GeneralFailure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vfm_err_to_fs_error_maps_taxonomy() {
        assert!(matches!(vfm_err_to_fs_error(VfmError::not_found("x")), FsError::NotFound));
        assert!(matches!(
            vfm_err_to_fs_error(VfmError::not_supported("x")),
            FsError::Forbidden
        ));
    }

    #[test]
    fn meta_reports_executable_bit() {
        let meta = GitSnapMeta {
            attr: Attr {
                node_type: NodeType::File,
                mode: 0o555,
                size: 10,
                inode: 1,
            },
        };
        assert!(meta.executable().unwrap());
        assert!(meta.is_file());
        assert!(!meta.is_dir());
    }
}
