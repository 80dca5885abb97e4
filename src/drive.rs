//! Optical drive status, eject, and the completion chime
//!
//! The tray state comes straight from the drive on every poll via the
//! CDROM_DRIVE_STATUS ioctl; nothing is cached here.

use std::fmt;
use std::path::Path;
use std::process::Command;

/// Tray status reported by the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    /// No drive information available.
    Absent,
    /// Drive present, no disc seated.
    NoDisc,
    /// Tray is open.
    TrayOpen,
    /// Disc present but not readable yet.
    NotReady,
    /// Disc seated and readable.
    Ready,
}

impl DriveState {
    /// Map a CDROM_DRIVE_STATUS result to a state.
    pub fn from_code(code: i32) -> Option<DriveState> {
        match code {
            0 => Some(DriveState::Absent),
            1 => Some(DriveState::NoDisc),
            2 => Some(DriveState::TrayOpen),
            3 => Some(DriveState::NotReady),
            4 => Some(DriveState::Ready),
            _ => None,
        }
    }
}

impl fmt::Display for DriveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriveState::Absent => "absent",
            DriveState::NoDisc => "no disc",
            DriveState::TrayOpen => "tray open",
            DriveState::NotReady => "not ready",
            DriveState::Ready => "ready",
        };
        f.write_str(name)
    }
}

#[cfg(unix)]
const CDROM_DRIVE_STATUS: libc::c_ulong = 0x5326;

/// Query the tray status of `device`.
///
/// Failures here are fatal to the watch loop: a drive that cannot be
/// opened or queried leaves nothing to poll.
#[cfg(unix)]
pub fn drive_status(device: &Path) -> Result<DriveState, String> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let path = CString::new(device.as_os_str().as_bytes())
        .map_err(|e| format!("Invalid device path {}: {}", device.display(), e))?;

    // Non-blocking open; the poll must not stall while the drive spins up.
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY | libc::O_NONBLOCK) };
    if fd < 0 {
        return Err(format!(
            "Failed to open {}: {}",
            device.display(),
            std::io::Error::last_os_error()
        ));
    }

    let code = unsafe { libc::ioctl(fd, CDROM_DRIVE_STATUS as _, 0) };
    unsafe { libc::close(fd) };

    if code < 0 {
        return Err(format!(
            "Failed to query drive status on {}: {}",
            device.display(),
            std::io::Error::last_os_error()
        ));
    }
    DriveState::from_code(code).ok_or_else(|| {
        format!(
            "Unknown drive status code {} from {}",
            code,
            device.display()
        )
    })
}

#[cfg(not(unix))]
pub fn drive_status(device: &Path) -> Result<DriveState, String> {
    Err(format!(
        "Drive status polling is not supported on this platform ({})",
        device.display()
    ))
}

/// Open the tray. Fire-and-forget; failures are logged and ignored.
pub fn eject(device: &Path) {
    match Command::new("eject").arg(device).status() {
        Ok(status) if status.success() => {}
        Ok(status) => log::warn!("eject {} exited with {}", device.display(), status),
        Err(e) => log::warn!("Failed to run eject for {}: {}", device.display(), e),
    }
}

/// Ring the terminal bell.
pub fn chime() {
    use std::io::Write;
    print!("\x07");
    let _ = std::io::stdout().flush();
}
