//! Drive polling and the rip cycle
//!
//! Polls the drive tray on a fixed interval and, whenever a disc reports
//! ready, sequences one full query -> rip -> eject cycle. The loop runs
//! until the shutdown flag is set or a drive error makes polling
//! impossible.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::drive::{self, DriveState};
use crate::engine::{RipProgress, rip_title, scan_disc};

/// Delay between tray polls while waiting for a disc.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Configuration for the watch loop.
pub struct WatchConfig {
    /// Optical drive device node.
    pub device: PathBuf,
    /// Directory that per-disc output directories are created under.
    pub output_root: PathBuf,
    /// Delay between tray polls.
    pub poll_interval: Duration,
}

impl WatchConfig {
    pub fn new(device: PathBuf, output_root: PathBuf) -> Self {
        Self {
            device,
            output_root,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Polls the drive and rips every disc that becomes ready.
pub struct DriveWatcher {
    config: WatchConfig,
    last_state: Option<DriveState>,
}

impl DriveWatcher {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            last_state: None,
        }
    }

    /// Run until `shutdown` is set or a drive error occurs.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), String> {
        while !shutdown.load(Ordering::SeqCst) {
            self.poll_once(shutdown)?;
        }
        Ok(())
    }

    /// One poll tick: read the tray state and act on it.
    ///
    /// A ready drive starts a full rip cycle on every tick it is observed,
    /// not only on the transition into ready; ejecting at the end of the
    /// cycle is what moves the drive out of that state.
    fn poll_once(&mut self, shutdown: &AtomicBool) -> Result<(), String> {
        let state = drive::drive_status(&self.config.device)?;
        match state {
            DriveState::Ready => {
                log::info!("Drive is {}", state);
                self.rip_cycle(shutdown)?;
            }
            DriveState::NoDisc => {
                log::info!("No disc, ejecting");
                drive::chime();
                drive::eject(&self.config.device);
            }
            _ => {
                if self.last_state != Some(state) {
                    log::info!("Waiting for disc, drive is {}", state);
                }
                sleep_unless_shutdown(self.config.poll_interval, shutdown);
            }
        }
        self.last_state = Some(state);
        Ok(())
    }

    /// Query the disc, rip the selected title, then eject.
    fn rip_cycle(&self, shutdown: &AtomicBool) -> Result<(), String> {
        let device = &self.config.device;

        let mut progress = RipProgress::new();
        let selection = scan_disc(device, &mut progress, shutdown)?;
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }

        let output_dir = prepare_output_dir(&self.config.output_root, &selection.name)?;
        log::info!(
            "Ripping {:?} (title {}) to {}",
            selection.name,
            selection.title,
            output_dir.display()
        );

        let mut progress = RipProgress::new();
        rip_title(device, &selection.title, &output_dir, &mut progress, shutdown)?;
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }

        drive::chime();
        drive::eject(device);
        Ok(())
    }
}

/// Resolve and create the per-disc output directory.
///
/// Creating an already-existing directory is not an error.
fn prepare_output_dir(root: &Path, name: &str) -> Result<PathBuf, String> {
    let dir = root.join(name);
    fs::create_dir_all(&dir).map_err(|e| {
        format!(
            "Failed to create output directory {}: {}",
            dir.display(),
            e
        )
    })?;
    Ok(dir)
}

/// Sleep for `duration`, returning early once `shutdown` is set.
fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) {
    let mut remaining = duration;
    while !shutdown.load(Ordering::SeqCst) && !remaining.is_zero() {
        let slice = remaining.min(SLEEP_SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    #[test]
    fn test_output_dir_creation_is_idempotent() {
        let root = TempDir::new().unwrap();

        let first = prepare_output_dir(root.path(), "My Movie").unwrap();
        assert!(first.is_dir());

        let second = prepare_output_dir(root.path(), "My Movie").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_disc_name_resolves_to_the_root() {
        let root = TempDir::new().unwrap();
        let dir = prepare_output_dir(root.path(), "").unwrap();
        assert_eq!(dir, root.path());
    }

    #[test]
    fn test_sleep_returns_immediately_once_shutdown_is_set() {
        let shutdown = AtomicBool::new(true);
        let started = Instant::now();
        sleep_unless_shutdown(Duration::from_secs(5), &shutdown);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_config_uses_the_default_poll_interval() {
        let config = WatchConfig::new(PathBuf::from("/dev/sr0"), PathBuf::from("/rips"));
        assert_eq!(config.poll_interval, POLL_INTERVAL);
    }
}
