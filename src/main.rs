//! autoripd - unattended optical disc ripping
//!
//! Polls an optical drive and, whenever a disc is ready, queries it with
//! MakeMKV, rips the selected title, and ejects. Runs until interrupted.

mod drive;
mod engine;
mod logging;
mod watch;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use watch::{DriveWatcher, WatchConfig};

/// Set by the signal handler; checked by every blocking loop.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(
    name = "autoripd",
    about = "Rip every disc inserted into a drive, unattended"
)]
struct Cli {
    /// Optical drive device node (e.g. /dev/sr0)
    device: PathBuf,

    /// Directory that ripped discs are written under
    output: PathBuf,
}

#[cfg(unix)]
extern "C" fn request_shutdown(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, request_shutdown as libc::sighandler_t);
        libc::signal(libc::SIGTERM, request_shutdown as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {}

fn main() {
    let cli = Cli::parse();
    logging::init_logging();
    install_signal_handlers();

    let mut watcher = DriveWatcher::new(WatchConfig::new(cli.device, cli.output));
    match watcher.run(&SHUTDOWN) {
        Ok(()) => log::info!("Shutting down"),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
