//! scratchfs: an ephemeral in-memory filesystem served over FUSE.
//!
//! The crate splits into a path-addressed engine (`fs::engine`) that owns the
//! whole inode tree in process memory, and a thin bridge (`fs`) that adapts
//! the kernel's inode-addressed FUSE protocol onto it. Nothing is ever
//! persisted; unmounting discards the tree.

pub mod config;
pub mod error;
pub mod fs;
