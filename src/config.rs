use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "scratchfs",
    version,
    about = "In-memory FUSE filesystem; all contents are lost on unmount"
)]
pub struct Cli {
    /// Path to the mount point
    pub mountpoint: PathBuf,

    /// Log SHA-256 content hashes around every read and write
    #[arg(short = 'k', long)]
    pub hash_check: bool,

    /// Log file path
    #[arg(long, default_value = "/tmp/scratchfs.log")]
    pub log_file: PathBuf,

    /// Allow other users to access the mount
    #[arg(long)]
    pub allow_other: bool,

    /// Unmount the given mount point and exit
    #[arg(long)]
    pub unmount: bool,
}

#[derive(Debug, Clone)]
pub struct ScratchConfig {
    pub mountpoint: PathBuf,
    pub hash_check: bool,
    pub log_file: PathBuf,
    pub allow_other: bool,
}
