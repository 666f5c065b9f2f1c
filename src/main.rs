use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use fuser::MountOption;
use tracing::{error, info};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use scratchfs::config::{Cli, ScratchConfig};
use scratchfs::error::ScratchError;
use scratchfs::fs::ScratchFs;

fn main() {
    let cli = Cli::parse();

    if cli.unmount {
        unmount(&cli.mountpoint);
        return;
    }

    let mountpoint = std::fs::canonicalize(&cli.mountpoint).unwrap_or_else(|e| {
        eprintln!("Error: mountpoint {:?}: {}", cli.mountpoint, e);
        std::process::exit(1);
    });

    if !mountpoint.is_dir() {
        eprintln!("Error: mountpoint is not a directory: {:?}", mountpoint);
        std::process::exit(1);
    }

    // Set up logging: stderr plus the log file.
    let log_dir = cli
        .log_file
        .parent()
        .unwrap_or_else(|| Path::new("/tmp"));
    let log_name = cli
        .log_file
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("scratchfs.log"));
    let file_appender = tracing_appender::rolling::never(log_dir, log_name);
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if cli.hash_check { "debug" } else { "info" };
    let subscriber = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false));
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config = ScratchConfig {
        mountpoint: mountpoint.clone(),
        hash_check: cli.hash_check,
        log_file: cli.log_file,
        allow_other: cli.allow_other,
    };

    info!(
        "scratchfs starting: mountpoint={}, hash_check={}",
        mountpoint.display(),
        config.hash_check
    );

    register_signal_handlers();

    let fs = ScratchFs::new(config);

    let mut options = vec![
        MountOption::FSName("scratchfs".to_string()),
        MountOption::AutoUnmount,
    ];
    if cli.allow_other {
        options.push(MountOption::AllowOther);
    }

    // mount2 dispatches requests sequentially on this thread; the engine
    // never sees two operations at once.
    match fuser::mount2(fs, &mountpoint, &options) {
        Ok(()) => {
            if SIGNAL_RECEIVED.load(Ordering::Relaxed) {
                info!("scratchfs interrupted; unmounted");
            } else {
                info!("scratchfs unmounted cleanly");
            }
        }
        Err(e) => {
            let err = ScratchError::Mount(e.to_string());
            error!("{err}");
            std::process::exit(1);
        }
    }
}

fn unmount(mountpoint: &Path) {
    let mp = mountpoint.to_string_lossy();
    eprintln!("Unmounting {}...", mp);

    // Try fusermount first, then plain umount.
    let status = std::process::Command::new("fusermount")
        .args(["-u", &mp])
        .status();

    match status {
        Ok(s) if s.success() => {
            eprintln!("Successfully unmounted {}", mp);
        }
        _ => {
            let status = std::process::Command::new("umount").arg(&*mp).status();
            match status {
                Ok(s) if s.success() => {
                    eprintln!("Successfully unmounted {}", mp);
                }
                _ => {
                    eprintln!("Failed to unmount {}. Try: sudo umount -f {}", mp, mp);
                    std::process::exit(1);
                }
            }
        }
    }
}

fn register_signal_handlers() {
    let _ = std::thread::Builder::new()
        .name("scratchfs-signal".to_string())
        .spawn(move || {
            use nix::sys::signal::{self, SigHandler, Signal};

            unsafe {
                signal::signal(Signal::SIGTERM, SigHandler::Handler(signal_handler)).ok();
                signal::signal(Signal::SIGINT, SigHandler::Handler(signal_handler)).ok();
            }
        });
}

static SIGNAL_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn signal_handler(_sig: libc::c_int) {
    SIGNAL_RECEIVED.store(true, Ordering::Relaxed);
}
