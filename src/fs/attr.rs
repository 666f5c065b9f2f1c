//! Conversion between the engine's stat records and FUSE attribute types.

use fuser::{FileAttr, FileType};

use crate::fs::block::BLOCK_SIZE;
use crate::fs::node::NodeStat;

/// Convert an engine stat record to fuser::FileAttr.
pub fn stat_to_attr(ino: u64, st: &NodeStat) -> FileAttr {
    FileAttr {
        ino,
        size: st.size,
        blocks: (st.size + 511) / 512,
        atime: st.atime,
        mtime: st.mtime,
        ctime: st.ctime,
        crtime: st.ctime,
        kind: mode_to_filetype(st.mode),
        perm: (st.mode & 0o7777) as u16,
        nlink: st.nlink,
        uid: st.uid,
        gid: st.gid,
        rdev: st.rdev as u32,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

pub fn mode_to_filetype(mode: u32) -> FileType {
    let fmt = mode & libc::S_IFMT as u32;
    match fmt {
        x if x == libc::S_IFREG as u32 => FileType::RegularFile,
        x if x == libc::S_IFDIR as u32 => FileType::Directory,
        x if x == libc::S_IFLNK as u32 => FileType::Symlink,
        x if x == libc::S_IFBLK as u32 => FileType::BlockDevice,
        x if x == libc::S_IFCHR as u32 => FileType::CharDevice,
        x if x == libc::S_IFIFO as u32 => FileType::NamedPipe,
        x if x == libc::S_IFSOCK as u32 => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_bits_map_to_file_types() {
        assert_eq!(
            mode_to_filetype(libc::S_IFDIR as u32 | 0o755),
            FileType::Directory
        );
        assert_eq!(
            mode_to_filetype(libc::S_IFLNK as u32 | 0o755),
            FileType::Symlink
        );
        assert_eq!(
            mode_to_filetype(libc::S_IFREG as u32 | 0o644),
            FileType::RegularFile
        );
    }

    #[test]
    fn attr_carries_perm_and_size() {
        let mut st = NodeStat::default();
        st.mode = libc::S_IFREG as u32 | 0o640;
        st.size = 1025;
        st.nlink = 1;
        let attr = stat_to_attr(7, &st);
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.perm, 0o640);
        assert_eq!(attr.blocks, 3);
        assert_eq!(attr.kind, FileType::RegularFile);
    }
}
