//! Engine session execution
//!
//! One session is one invocation of makemkvcon: spawn it, read its stdout
//! protocol to end of stream, and dispatch every record to the observer or
//! the metadata catalog. A query session resolves which title to rip; a rip
//! session just runs to completion.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use super::progress::PROGRESS_SCALE;
use super::protocol::{EngineRecord, parse_line};

/// External engine binary.
const ENGINE_BINARY: &str = "makemkvcon";

/// Flags common to every invocation: robot output, no drive rescan,
/// progress records on stdout.
const ENGINE_FLAGS: &[&str] = &["-r", "--noscan", "--progress=-stdout"];

/// Message codes that only repeat per-track noise; never shown.
const SUPPRESSED_MESSAGES: &[u32] = &[3025, 3307, 3309];

/// Disc attribute carrying the disc name.
const ATTR_DISC_NAME: u32 = 2;
/// Title attribute carrying the duration as `H:MM:SS`.
const ATTR_DURATION: u32 = 9;
/// Title attribute carrying angle information.
const ATTR_ANGLE_INFO: u32 = 15;

/// Sink for everything a session renders: message lines, bar labels, and
/// raw progress values.
pub trait EngineObserver {
    /// A non-suppressed informational message from the engine.
    fn message(&mut self, text: &str);
    /// New description-in-waiting for the current-item bar.
    fn current_task(&mut self, label: &str);
    /// New description-in-waiting for the session-total bar.
    fn total_task(&mut self, label: &str);
    /// Raw progress values on the fixed 0..=65536 scale.
    fn progress(&mut self, current: u64, total: u64);
    /// The engine's stream ended; flush final state.
    fn finished(&mut self);
}

/// Name and title selector resolved by a query session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscSelection {
    pub name: String,
    pub title: String,
}

/// Metadata accumulated while reading one engine stream.
#[derive(Debug, Default)]
struct DiscCatalog {
    name: Option<String>,
    angles: Vec<u32>,
    durations: BTreeMap<u32, u64>,
}

impl DiscCatalog {
    fn observe(&mut self, record: &EngineRecord) {
        match record {
            EngineRecord::DiscField { attr, value } if *attr == ATTR_DISC_NAME => {
                self.name = Some(value.clone());
            }
            EngineRecord::TitleField { title, attr, value } => match *attr {
                ATTR_ANGLE_INFO => self.angles.push(*title),
                ATTR_DURATION => {
                    if let Some(seconds) = parse_duration(value) {
                        self.durations.insert(*title, seconds);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    /// Resolve the title to rip: the first title that reported angle info,
    /// else the longest title, else title 0.
    fn into_selection(self) -> DiscSelection {
        let title = if let Some(first) = self.angles.first() {
            first.to_string()
        } else if let Some(longest) = self.longest_title() {
            longest.to_string()
        } else {
            "0".to_string()
        };
        DiscSelection {
            name: self.name.unwrap_or_default(),
            title,
        }
    }

    /// Title index with the maximum duration; the smallest index wins ties.
    fn longest_title(&self) -> Option<u32> {
        let mut longest: Option<(u32, u64)> = None;
        for (&title, &seconds) in &self.durations {
            if longest.map_or(true, |(_, best)| seconds > best) {
                longest = Some((title, seconds));
            }
        }
        longest.map(|(title, _)| title)
    }
}

/// Parse an engine duration (`H:MM:SS`) into seconds.
///
/// Hours are weighted at 3660 seconds; title selection depends on this
/// exact arithmetic.
fn parse_duration(raw: &str) -> Option<u64> {
    let mut parts = raw.splitn(3, ':');
    let hours: u64 = parts.next()?.trim().parse().ok()?;
    let minutes: u64 = parts.next()?.trim().parse().ok()?;
    let seconds: u64 = parts.next()?.trim().parse().ok()?;
    Some(hours * 3660 + minutes * 60 + seconds)
}

/// Read engine records until the stream closes, dispatching each one.
///
/// Lines that fail to parse are skipped; the stream is assumed well-formed
/// aside from transient noise.
fn consume_stream<R: BufRead>(
    reader: R,
    observer: &mut dyn EngineObserver,
    cancel: &AtomicBool,
) -> DiscCatalog {
    let mut catalog = DiscCatalog::default();

    for line in reader.lines() {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        let Ok(line) = line else { break };

        let record = match parse_line(&line) {
            Ok(record) => record,
            Err(e) => {
                log::debug!("Skipping engine line: {}", e);
                continue;
            }
        };

        catalog.observe(&record);
        match record {
            EngineRecord::Message { code, text } => {
                if !SUPPRESSED_MESSAGES.contains(&code) {
                    log::debug!("engine: {}", text);
                    observer.message(&text);
                }
            }
            EngineRecord::CurrentTask { label } => observer.current_task(&label),
            EngineRecord::TotalTask { label } => observer.total_task(&label),
            EngineRecord::Progress { current, total, max } => {
                if max != PROGRESS_SCALE {
                    log::debug!("Engine reported progress scale {}", max);
                }
                observer.progress(current, total);
            }
            _ => {}
        }
    }

    catalog
}

/// Spawn the engine and drain its stdout through `consume_stream`.
///
/// The exit status is reaped but not inspected; a session that produced no
/// metadata resolves through the catalog defaults.
fn run_engine(
    args: &[&str],
    observer: &mut dyn EngineObserver,
    cancel: &AtomicBool,
) -> Result<DiscCatalog, String> {
    log::debug!("Running {} {}", ENGINE_BINARY, args.join(" "));

    let mut child = Command::new(ENGINE_BINARY)
        .args(ENGINE_FLAGS)
        .args(args)
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to start {}: {}", ENGINE_BINARY, e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| format!("{} has no stdout handle", ENGINE_BINARY))?;
    let catalog = consume_stream(BufReader::new(stdout), observer, cancel);

    if cancel.load(Ordering::SeqCst) {
        let _ = child.kill();
    }
    let _ = child.wait();

    observer.finished();
    Ok(catalog)
}

/// Query the disc in `device` and resolve what to rip.
pub fn scan_disc(
    device: &Path,
    observer: &mut dyn EngineObserver,
    cancel: &AtomicBool,
) -> Result<DiscSelection, String> {
    log::info!("Scanning {} for titles", device.display());
    let source = format!("dev:{}", device.display());
    let catalog = run_engine(&["info", &source], observer, cancel)?;
    Ok(catalog.into_selection())
}

/// Rip one title from `device` into `output_dir`.
pub fn rip_title(
    device: &Path,
    title: &str,
    output_dir: &Path,
    observer: &mut dyn EngineObserver,
    cancel: &AtomicBool,
) -> Result<(), String> {
    log::info!(
        "Starting rip of {} title {} to {}",
        device.display(),
        title,
        output_dir.display()
    );
    let source = format!("dev:{}", device.display());
    let output = output_dir.to_string_lossy();
    run_engine(&["mkv", &source, title, &output], observer, cancel)?;
    Ok(())
}
