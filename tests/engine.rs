//! Engine-level integration tests.
//!
//! These drive the in-memory tree through the same path-based entry points
//! the FUSE bridge uses, so they run without a mount or any FUSE support.

use scratchfs::error::ScratchError;
use scratchfs::fs::engine::{Engine, XattrAnswer};

fn reg(mode: u32) -> u32 {
    libc::S_IFREG as u32 | mode
}

#[test]
fn mkdir_readdir_rmdir_lifecycle() {
    let mut engine = Engine::new(false);

    engine.mkdir("/a", 0o755).unwrap();
    engine.mkdir("/a/b", 0o755).unwrap();

    let names: Vec<String> = engine
        .readdir("/a")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, [".", "..", "b"]);

    assert!(matches!(engine.rmdir("/a"), Err(ScratchError::NotEmpty(_))));
    engine.rmdir("/a/b").unwrap();
    engine.rmdir("/a").unwrap();
    assert!(matches!(
        engine.getattr("/a"),
        Err(ScratchError::NoSuchEntry(_))
    ));
}

#[test]
fn create_write_read() {
    let mut engine = Engine::new(false);

    engine.create("/f", reg(0o644)).unwrap();
    assert_eq!(engine.write("/f", b"hello world", 0).unwrap(), 11);
    assert_eq!(engine.getattr("/f").unwrap().size, 11);
    assert_eq!(engine.read("/f", 5, 6).unwrap(), b"world");
}

#[test]
fn sparse_write_past_a_block_boundary() {
    let mut engine = Engine::new(false);

    engine.create("/f", reg(0o644)).unwrap();
    assert_eq!(engine.write("/f", b"X", 2000).unwrap(), 1);
    assert_eq!(engine.getattr("/f").unwrap().size, 2001);
    assert_eq!(engine.read("/f", 1, 2000).unwrap(), b"X");
    // The hole before the written byte reads back as zeros.
    assert_eq!(engine.read("/f", 1, 5).unwrap(), [0]);
}

#[test]
fn symlink_round_trip() {
    let mut engine = Engine::new(false);

    engine.symlink("/target", "/link").unwrap();
    assert_eq!(engine.readlink("/link").unwrap(), b"/target");

    let stat = engine.getattr("/link").unwrap();
    assert!(stat.is_symlink());
    assert_eq!(stat.size, 7);
}

#[test]
fn rename_moves_and_overwrites() {
    let mut engine = Engine::new(false);

    engine.create("/a", reg(0o644)).unwrap();
    engine.rename("/a", "/b").unwrap();
    assert!(matches!(
        engine.getattr("/a"),
        Err(ScratchError::NoSuchEntry(_))
    ));
    engine.getattr("/b").unwrap();

    engine.create("/c", reg(0o644)).unwrap();
    engine.write("/c", b"content", 0).unwrap();
    engine.rename("/c", "/b").unwrap();
    assert_eq!(engine.read("/b", 7, 0).unwrap(), b"content");
    assert!(matches!(
        engine.getattr("/c"),
        Err(ScratchError::NoSuchEntry(_))
    ));
}

#[test]
fn rename_there_and_back_restores_the_tree() {
    let mut engine = Engine::new(false);

    engine.mkdir("/d", 0o755).unwrap();
    engine.create("/d/f", reg(0o644)).unwrap();
    engine.write("/d/f", b"payload", 0).unwrap();

    engine.rename("/d/f", "/g").unwrap();
    engine.rename("/g", "/d/f").unwrap();

    assert_eq!(engine.read("/d/f", 7, 0).unwrap(), b"payload");
    assert_eq!(engine.statfs().files, 3);
}

#[test]
fn rename_into_a_subdirectory() {
    let mut engine = Engine::new(false);

    engine.mkdir("/dir", 0o755).unwrap();
    engine.create("/f", reg(0o644)).unwrap();
    engine.write("/f", b"abc", 0).unwrap();

    engine.rename("/f", "/dir/f").unwrap();
    assert!(engine.getattr("/f").is_err());
    assert_eq!(engine.read("/dir/f", 3, 0).unwrap(), b"abc");
}

#[test]
fn xattr_set_list_remove() {
    let mut engine = Engine::new(false);

    engine.create("/f", reg(0o644)).unwrap();
    engine.setxattr("/f", "user.k1", b"v1", 0).unwrap();
    engine.setxattr("/f", "user.k2", b"v22", 0).unwrap();

    assert_eq!(engine.listxattr("/f", 0).unwrap(), XattrAnswer::Size(16));
    assert_eq!(
        engine.listxattr("/f", 16).unwrap(),
        XattrAnswer::Data(b"user.k1\0user.k2\0".to_vec())
    );

    engine.removexattr("/f", "user.k1").unwrap();
    assert!(matches!(
        engine.getxattr("/f", "user.k1", 64),
        Err(ScratchError::NoData(_))
    ));
    assert_eq!(
        engine.getxattr("/f", "user.k2", 64).unwrap(),
        XattrAnswer::Data(b"v22".to_vec())
    );
}

#[test]
fn xattr_create_and_replace_flags() {
    let mut engine = Engine::new(false);

    engine.create("/f", reg(0o644)).unwrap();
    engine
        .setxattr("/f", "user.k", b"v", libc::XATTR_CREATE)
        .unwrap();
    assert!(matches!(
        engine.setxattr("/f", "user.k", b"v2", libc::XATTR_CREATE),
        Err(ScratchError::XattrExists(_))
    ));
    assert!(matches!(
        engine.setxattr("/f", "user.other", b"v", libc::XATTR_REPLACE),
        Err(ScratchError::NoData(_))
    ));
    engine
        .setxattr("/f", "user.k", b"v2", libc::XATTR_REPLACE)
        .unwrap();
    assert_eq!(
        engine.getxattr("/f", "user.k", 64).unwrap(),
        XattrAnswer::Data(b"v2".to_vec())
    );
}

#[test]
fn xattr_short_buffer_is_range() {
    let mut engine = Engine::new(false);

    engine.create("/f", reg(0o644)).unwrap();
    engine.setxattr("/f", "user.k", b"longvalue", 0).unwrap();

    assert_eq!(engine.getxattr("/f", "user.k", 0).unwrap(), XattrAnswer::Size(9));
    assert!(matches!(
        engine.getxattr("/f", "user.k", 4),
        Err(ScratchError::Range(_))
    ));
    // The stored value is untouched by the failed query.
    assert_eq!(
        engine.getxattr("/f", "user.k", 9).unwrap(),
        XattrAnswer::Data(b"longvalue".to_vec())
    );

    assert!(matches!(
        engine.listxattr("/f", 3),
        Err(ScratchError::Range(_))
    ));
}

#[test]
fn read_boundaries() {
    let mut engine = Engine::new(false);

    engine.create("/f", reg(0o644)).unwrap();
    engine.write("/f", b"0123456789", 0).unwrap();

    // At the end and past the end both read nothing.
    assert!(engine.read("/f", 4, 10).unwrap().is_empty());
    assert!(engine.read("/f", 4, 11).unwrap().is_empty());
    // A long read clamps to the logical end.
    assert_eq!(engine.read("/f", 100, 8).unwrap(), b"89");
}

#[test]
fn write_read_round_trip_across_blocks() {
    let mut engine = Engine::new(false);
    engine.create("/f", reg(0o644)).unwrap();

    for &(len, offset) in &[(10usize, 0u64), (1024, 0), (1500, 700), (2048, 1024), (1, 2047)] {
        let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        assert_eq!(engine.write("/f", &data, offset).unwrap(), len);
        assert_eq!(engine.read("/f", len as u32, offset).unwrap(), data);
    }
}

#[test]
fn truncate_is_idempotent_and_syncs_size() {
    let mut engine = Engine::new(false);

    engine.create("/f", reg(0o644)).unwrap();
    engine.write("/f", &[9u8; 3000], 0).unwrap();

    engine.truncate("/f", 1500).unwrap();
    let first = engine.getattr("/f").unwrap().size;
    engine.truncate("/f", 1500).unwrap();
    assert_eq!(engine.getattr("/f").unwrap().size, first);
    assert_eq!(first, 1500);
}

#[test]
fn rmdir_of_a_file_is_not_a_directory() {
    let mut engine = Engine::new(false);
    engine.create("/f", reg(0o644)).unwrap();
    assert!(matches!(
        engine.rmdir("/f"),
        Err(ScratchError::NotADirectory(_))
    ));
}

#[test]
fn unlink_destroys_for_good() {
    let mut engine = Engine::new(false);

    engine.create("/f", reg(0o644)).unwrap();
    engine.write("/f", b"gone", 0).unwrap();
    engine.unlink("/f").unwrap();

    assert!(matches!(
        engine.getattr("/f"),
        Err(ScratchError::NoSuchEntry(_))
    ));
    assert!(matches!(
        engine.unlink("/f"),
        Err(ScratchError::NoSuchEntry(_))
    ));
    assert_eq!(engine.statfs().files, 1);
}

#[test]
fn readdir_is_sorted_and_hides_dot_entries() {
    let mut engine = Engine::new(false);

    engine.create("/zz", reg(0o644)).unwrap();
    engine.mkdir("/aa", 0o755).unwrap();
    engine.create("/mm", reg(0o644)).unwrap();

    let names: Vec<String> = engine
        .readdir("/")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, [".", "..", "aa", "mm", "zz"]);
}

#[test]
fn chown_and_utimens_update_the_stat() {
    use std::time::{Duration, SystemTime};

    let mut engine = Engine::new(false);
    engine.create("/f", reg(0o644)).unwrap();

    engine.chown("/f", Some(1000), Some(1000)).unwrap();
    let stat = engine.getattr("/f").unwrap();
    assert_eq!((stat.uid, stat.gid), (1000, 1000));

    let then = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
    engine.utimens("/f", Some(then), Some(then)).unwrap();
    let stat = engine.getattr("/f").unwrap();
    assert_eq!(stat.atime, then);
    assert_eq!(stat.mtime, then);
}

#[test]
fn statfs_reports_the_fixed_shape() {
    let engine = Engine::new(false);
    let s = engine.statfs();
    assert_eq!(s.bsize, 4096);
    assert_eq!(s.frsize, 4096);
    assert_eq!(s.namelen, 128);
    assert_eq!(s.ffree, 4096);
    assert_eq!(s.files, 1);
}
