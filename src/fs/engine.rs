//! The path-addressed filesystem engine.
//!
//! One method per filesystem operation. Every entry point parses its path,
//! walks the tree from the root, performs the mutation, and reports failures
//! as [`ScratchError`] values that the bridge translates to negative errno.
//! Dispatch is single-threaded; the bridge delivers one operation at a time.

use std::time::SystemTime;

use tracing::debug;

use crate::error::{Result, ScratchError};
use crate::fs::hash::{content_sha256, hash_hex};
use crate::fs::node::{Node, NodeArena, NodeId, NodeStat};
use crate::fs::path;

/// Reported filesystem block size. Decoupled from the 1 KiB file storage
/// blocks on purpose.
const STATFS_BLOCK_SIZE: u64 = 4096;

/// One readdir entry. `mode` carries the type bits for the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub mode: u32,
}

/// Outcome of a sized xattr query: the required length for a zero-size
/// probe, or the bytes themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XattrAnswer {
    Size(u32),
    Data(Vec<u8>),
}

/// statvfs-shaped summary for the mount.
#[derive(Debug, Clone, Copy)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

pub struct Engine {
    arena: NodeArena,
    root: NodeId,
    hash_check: bool,
}

impl Engine {
    /// Build an empty filesystem: a lone root directory, `drwxr-xr-x`,
    /// timestamps set to now.
    pub fn new(hash_check: bool) -> Self {
        let now = SystemTime::now();
        let mut root = Node::new();
        root.stat.mode = libc::S_IFDIR as u32 | 0o755;
        root.stat.atime = now;
        root.stat.mtime = now;
        root.stat.ctime = now;

        let mut arena = NodeArena::new();
        let root = arena.insert(root);
        Self {
            arena,
            root,
            hash_check,
        }
    }

    fn resolve_components(&self, components: &[String]) -> Result<NodeId> {
        let mut cur = self.root;
        for component in components {
            cur = self.arena.child(cur, component)?;
        }
        Ok(cur)
    }

    fn resolve(&self, path: &str) -> Result<NodeId> {
        self.resolve_components(&path::split(path))
    }

    /// Resolve the parent of a to-be-created entry; the parent must be a
    /// directory.
    fn resolve_parent_dir(&self, parent: &[String], full_path: &str) -> Result<NodeId> {
        let id = self.resolve_components(parent)?;
        if !self.arena.node(id)?.stat.is_dir() {
            return Err(ScratchError::NotADirectory(full_path.to_string()));
        }
        Ok(id)
    }

    fn log_content_hash(&self, id: NodeId, when: &str) {
        if !self.hash_check {
            return;
        }
        if let Ok(node) = self.arena.node(id) {
            debug!(
                "content sha256 ({when}): {}",
                hash_hex(&content_sha256(node.data.chunks()))
            );
        }
    }

    pub fn getattr(&self, path: &str) -> Result<NodeStat> {
        let id = self.resolve(path)?;
        Ok(self.arena.node(id)?.stat)
    }

    /// List a directory: `.`, `..`, then the children in name order.
    /// Updates the directory's atime.
    pub fn readdir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        let id = self.resolve(path)?;
        self.arena.node_mut(id)?.stat.atime = SystemTime::now();

        let node = self.arena.node(id)?;
        let mut entries = vec![
            DirEntry {
                name: ".".to_string(),
                mode: node.stat.mode,
            },
            DirEntry {
                name: "..".to_string(),
                mode: libc::S_IFDIR as u32 | 0o755,
            },
        ];
        for (name, &child) in &node.children {
            entries.push(DirEntry {
                name: name.clone(),
                mode: self.arena.node(child)?.stat.mode,
            });
        }
        Ok(entries)
    }

    pub fn mkdir(&mut self, path: &str, mode: u32) -> Result<NodeStat> {
        let Some((parent, name)) = path::split_parent(path) else {
            return Err(ScratchError::AlreadyExists(path.to_string()));
        };
        let parent = self.resolve_parent_dir(&parent, path)?;

        let now = SystemTime::now();
        let mut node = Node::new();
        node.stat.mode = mode | libc::S_IFDIR as u32;
        node.stat.atime = now;
        node.stat.mtime = now;
        node.stat.ctime = now;
        let stat = node.stat;

        self.arena.emplace(parent, &name, node)?;
        Ok(stat)
    }

    pub fn create(&mut self, path: &str, mode: u32) -> Result<NodeStat> {
        let Some((parent, name)) = path::split_parent(path) else {
            return Err(ScratchError::AlreadyExists(path.to_string()));
        };
        let parent = self.resolve_parent_dir(&parent, path)?;

        let now = SystemTime::now();
        let mut node = Node::new();
        node.stat.mode = mode;
        node.stat.nlink = 1;
        node.stat.atime = now;
        node.stat.mtime = now;
        node.stat.ctime = now;
        let stat = node.stat;

        self.arena.emplace(parent, &name, node)?;
        Ok(stat)
    }

    pub fn mknod(&mut self, path: &str, mode: u32, rdev: u64) -> Result<NodeStat> {
        let Some((parent, name)) = path::split_parent(path) else {
            return Err(ScratchError::AlreadyExists(path.to_string()));
        };
        let parent = self.resolve_parent_dir(&parent, path)?;

        let now = SystemTime::now();
        let mut node = Node::new();
        node.stat.mode = mode;
        node.stat.nlink = 1;
        node.stat.rdev = rdev;
        node.stat.atime = now;
        node.stat.mtime = now;
        node.stat.ctime = now;
        let stat = node.stat;

        self.arena.emplace(parent, &name, node)?;
        Ok(stat)
    }

    /// Create a symlink at `link_path` whose block storage holds `target`
    /// (no trailing NUL).
    pub fn symlink(&mut self, target: &str, link_path: &str) -> Result<NodeStat> {
        let Some((parent, name)) = path::split_parent(link_path) else {
            return Err(ScratchError::AlreadyExists(link_path.to_string()));
        };
        let parent = self.resolve_parent_dir(&parent, link_path)?;

        let now = SystemTime::now();
        let mut node = Node::new();
        node.stat.mode = libc::S_IFLNK as u32 | 0o755;
        node.stat.nlink = 1;
        node.stat.atime = now;
        node.stat.mtime = now;
        node.stat.ctime = now;
        node.data.write(target.as_bytes(), 0);
        node.stat.size = node.data.len() as u64;
        let stat = node.stat;

        self.arena.emplace(parent, &name, node)?;
        Ok(stat)
    }

    /// Read the symlink payload. Updates atime.
    pub fn readlink(&mut self, path: &str) -> Result<Vec<u8>> {
        let id = self.resolve(path)?;
        let node = self.arena.node_mut(id)?;
        node.stat.atime = SystemTime::now();

        let mut buf = vec![0u8; node.data.len()];
        let n = node.data.read(&mut buf, 0);
        buf.truncate(n);
        Ok(buf)
    }

    /// Open is only a resolution check plus an atime touch; no per-open
    /// state exists.
    pub fn open(&mut self, path: &str) -> Result<()> {
        let id = self.resolve(path)?;
        self.arena.node_mut(id)?.stat.atime = SystemTime::now();
        Ok(())
    }

    pub fn read(&mut self, path: &str, size: u32, offset: u64) -> Result<Vec<u8>> {
        let id = self.resolve(path)?;
        self.log_content_hash(id, "read");

        let node = self.arena.node_mut(id)?;
        node.stat.atime = SystemTime::now();
        let mut buf = vec![0u8; size as usize];
        let n = node.data.read(&mut buf, offset as usize);
        buf.truncate(n);
        Ok(buf)
    }

    pub fn write(&mut self, path: &str, data: &[u8], offset: u64) -> Result<usize> {
        let id = self.resolve(path)?;
        self.log_content_hash(id, "before write");

        let node = self.arena.node_mut(id)?;
        node.stat.ctime = SystemTime::now();
        let n = node.data.write(data, offset as usize);
        node.stat.size = node.data.len() as u64;

        self.log_content_hash(id, "after write");
        Ok(n)
    }

    pub fn truncate(&mut self, path: &str, size: u64) -> Result<()> {
        let id = self.resolve(path)?;
        let node = self.arena.node_mut(id)?;
        node.stat.size = size;
        node.data.truncate(size as usize);
        Ok(())
    }

    /// Pre-allocate storage. Also normalizes the node into a regular file;
    /// allocation flags are not interpreted.
    pub fn fallocate(&mut self, path: &str, mode: u32, offset: u64, length: u64) -> Result<()> {
        let id = self.resolve(path)?;
        let node = self.arena.node_mut(id)?;
        node.stat.mode = mode | libc::S_IFREG as u32;
        node.stat.nlink = 1;
        node.stat.ctime = SystemTime::now();
        node.stat.size = offset + length;
        node.data.truncate((offset + length) as usize);
        Ok(())
    }

    /// Change permission bits, preserving the file type bits.
    pub fn chmod(&mut self, path: &str, mode: u32) -> Result<()> {
        let id = self.resolve(path)?;
        let stat = &mut self.arena.node_mut(id)?.stat;
        let fmt = libc::S_IFMT as u32;
        stat.mode = (stat.mode & fmt) | (mode & !fmt);
        Ok(())
    }

    pub fn chown(&mut self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        let id = self.resolve(path)?;
        let stat = &mut self.arena.node_mut(id)?.stat;
        if let Some(uid) = uid {
            stat.uid = uid;
        }
        if let Some(gid) = gid {
            stat.gid = gid;
        }
        Ok(())
    }

    pub fn utimens(
        &mut self,
        path: &str,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> Result<()> {
        let id = self.resolve(path)?;
        let stat = &mut self.arena.node_mut(id)?.stat;
        if let Some(atime) = atime {
            stat.atime = atime;
        }
        if let Some(mtime) = mtime {
            stat.mtime = mtime;
        }
        Ok(())
    }

    /// Remove a non-directory entry. Always destroys the node; link counts
    /// are stored but never consulted.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let Some((parent, name)) = path::split_parent(path) else {
            return Err(ScratchError::IsDirectory(path.to_string()));
        };
        let parent = self.resolve_components(&parent)?;
        self.arena.remove(parent, &name)
    }

    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let Some((parent, name)) = path::split_parent(path) else {
            return Err(ScratchError::Busy(path.to_string()));
        };
        let parent = self.resolve_components(&parent)?;

        let child = self.arena.child(parent, &name)?;
        let node = self.arena.node(child)?;
        if !node.stat.is_dir() {
            return Err(ScratchError::NotADirectory(path.to_string()));
        }
        if !node.children.is_empty() {
            return Err(ScratchError::NotEmpty(path.to_string()));
        }

        self.arena.remove(parent, &name)
    }

    /// Move an entry. The node is detached from the source parent and
    /// re-attached under the destination name; an existing destination
    /// entry is destroyed by the attach.
    pub fn rename(&mut self, src: &str, dst: &str) -> Result<()> {
        let Some((src_parent, src_name)) = path::split_parent(src) else {
            return Err(ScratchError::Busy(src.to_string()));
        };
        let Some((dst_parent, dst_name)) = path::split_parent(dst) else {
            return Err(ScratchError::Busy(dst.to_string()));
        };

        let src_parent = self.resolve_components(&src_parent)?;
        let dst_parent = self.resolve_components(&dst_parent)?;

        let moved = self.arena.child(src_parent, &src_name)?;
        self.arena.detach(src_parent, &src_name)?;
        self.arena.attach(dst_parent, &dst_name, moved)?;

        self.arena.node_mut(moved)?.stat.ctime = SystemTime::now();
        Ok(())
    }

    pub fn setxattr(&mut self, path: &str, name: &str, value: &[u8], flags: i32) -> Result<()> {
        let id = self.resolve(path)?;
        let node = self.arena.node_mut(id)?;

        let exists = node.xattrs.contains_key(name);
        if flags == libc::XATTR_CREATE && exists {
            return Err(ScratchError::XattrExists(name.to_string()));
        }
        if flags == libc::XATTR_REPLACE && !exists {
            return Err(ScratchError::NoData(name.to_string()));
        }

        node.xattrs.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    pub fn getxattr(&self, path: &str, name: &str, size: u32) -> Result<XattrAnswer> {
        let id = self.resolve(path)?;
        let value = self
            .arena
            .node(id)?
            .xattrs
            .get(name)
            .ok_or_else(|| ScratchError::NoData(name.to_string()))?;

        if size == 0 {
            return Ok(XattrAnswer::Size(value.len() as u32));
        }
        if (size as usize) < value.len() {
            return Err(ScratchError::Range(name.to_string()));
        }
        Ok(XattrAnswer::Data(value.clone()))
    }

    /// Attribute names, each followed by a NUL, concatenated in name order.
    pub fn listxattr(&self, path: &str, size: u32) -> Result<XattrAnswer> {
        let id = self.resolve(path)?;
        let node = self.arena.node(id)?;

        let total: usize = node.xattrs.keys().map(|name| name.len() + 1).sum();
        if size == 0 {
            return Ok(XattrAnswer::Size(total as u32));
        }
        if (size as usize) < total {
            return Err(ScratchError::Range(path.to_string()));
        }

        let mut out = Vec::with_capacity(total);
        for name in node.xattrs.keys() {
            out.extend_from_slice(name.as_bytes());
            out.push(0);
        }
        Ok(XattrAnswer::Data(out))
    }

    pub fn removexattr(&mut self, path: &str, name: &str) -> Result<()> {
        let id = self.resolve(path)?;
        let node = self.arena.node_mut(id)?;
        if node.xattrs.remove(name).is_none() {
            return Err(ScratchError::NoData(name.to_string()));
        }
        Ok(())
    }

    /// Filesystem-wide numbers: capacity from host RAM, file count from the
    /// live tree.
    pub fn statfs(&self) -> StatFs {
        let (total_ram, free_ram) = host_ram();
        let used = total_ram.saturating_sub(free_ram) / STATFS_BLOCK_SIZE;
        StatFs {
            blocks: total_ram / STATFS_BLOCK_SIZE,
            bfree: used,
            bavail: used,
            files: self.arena.count(self.root),
            ffree: 4096,
            bsize: STATFS_BLOCK_SIZE as u32,
            namelen: 128,
            frsize: STATFS_BLOCK_SIZE as u32,
        }
    }
}

fn host_ram() -> (u64, u64) {
    unsafe {
        let mut info: libc::sysinfo = std::mem::zeroed();
        if libc::sysinfo(&mut info) != 0 {
            return (0, 0);
        }
        (info.totalram as u64, info.freeram as u64)
    }
}
