//! Dual progress tracking for engine sessions
//!
//! The engine reports two bars worth of progress: the current item and the
//! whole session, both on a fixed 0..=65536 scale. Raw values arrive with
//! duplicates, replays, and explicit resets to zero at phase boundaries;
//! [`ProgressCounter`] turns that stream into non-negative display steps,
//! and [`RipProgress`] renders the two bars in the terminal.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::session::EngineObserver;

/// Fixed scale the engine uses for both progress values.
pub const PROGRESS_SCALE: u64 = 65536;

/// Outcome of feeding one raw value to a [`ProgressCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStep {
    /// The value returned to zero: a new progress phase begins.
    Reset,
    /// The displayed value moved forward by this amount.
    Advance(u64),
    /// Duplicate or replayed value; nothing to display.
    Unchanged,
}

/// One monotonic counter on the engine's progress scale.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    value: u64,
    previous: u64,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw value from the engine.
    ///
    /// Zero is an explicit reset, not backward movement. A repeat of the
    /// previous value is suppressed. A value below the displayed one is a
    /// replay and is absorbed; the counter never steps backward.
    pub fn update(&mut self, raw: u64) -> ProgressStep {
        let raw = raw.min(PROGRESS_SCALE);
        if raw == 0 {
            self.value = 0;
            self.previous = 0;
            ProgressStep::Reset
        } else if raw == self.previous {
            ProgressStep::Unchanged
        } else if raw < self.value {
            self.previous = raw;
            ProgressStep::Unchanged
        } else {
            let delta = raw - self.value;
            self.value = raw;
            self.previous = raw;
            ProgressStep::Advance(delta)
        }
    }

    /// Current displayed value (used in tests).
    #[allow(dead_code)]
    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Terminal rendering for one engine session: a session-total bar above a
/// current-item bar.
pub struct RipProgress {
    multi: MultiProgress,
    total: TrackedBar,
    current: TrackedBar,
}

struct TrackedBar {
    bar: ProgressBar,
    counter: ProgressCounter,
    pending_label: String,
}

impl TrackedBar {
    fn new(multi: &MultiProgress) -> Self {
        let bar = multi.add(ProgressBar::new(PROGRESS_SCALE));
        bar.set_style(
            ProgressStyle::with_template("{msg:<32!} [{bar:40.cyan/blue}] {percent:>3}%")
                .unwrap()
                .progress_chars("#>-"),
        );
        Self {
            bar,
            counter: ProgressCounter::new(),
            pending_label: String::new(),
        }
    }

    /// Apply the stashed label and keep the new one in waiting.
    fn swap_label(&mut self, label: &str) {
        let applied = std::mem::replace(&mut self.pending_label, label.to_string());
        self.bar.set_message(applied);
    }

    fn record(&mut self, raw: u64) {
        match self.counter.update(raw) {
            ProgressStep::Reset => {
                // Show the last value once more before the bar snaps back.
                self.bar.tick();
                self.bar.reset();
            }
            ProgressStep::Advance(delta) => self.bar.inc(delta),
            ProgressStep::Unchanged => {}
        }
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

impl RipProgress {
    /// Bars drawn to the terminal.
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Invisible bars (used in tests).
    #[allow(dead_code)]
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let total = TrackedBar::new(&multi);
        let current = TrackedBar::new(&multi);
        Self {
            multi,
            total,
            current,
        }
    }
}

impl EngineObserver for RipProgress {
    fn message(&mut self, text: &str) {
        // Print above the bars instead of through them.
        let _ = self.multi.println(text);
    }

    fn current_task(&mut self, label: &str) {
        self.current.swap_label(label);
    }

    fn total_task(&mut self, label: &str) {
        self.total.swap_label(label);
    }

    fn progress(&mut self, current: u64, _total: u64) {
        // Both bars follow the first value field of the record; the second
        // is decoded but does not drive a bar.
        self.current.record(current);
        self.total.record(current);
    }

    fn finished(&mut self) {
        self.current.finish();
        self.total.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_reset_duplicate_and_advance_sequence() {
        let mut counter = ProgressCounter::new();
        assert_eq!(counter.update(0), ProgressStep::Reset);
        assert_eq!(counter.update(1000), ProgressStep::Advance(1000));
        assert_eq!(counter.update(1000), ProgressStep::Unchanged);
        assert_eq!(counter.update(2500), ProgressStep::Advance(1500));
        assert_eq!(counter.value(), 2500);
    }

    #[test]
    fn test_counter_accepts_the_full_scale_value() {
        let mut counter = ProgressCounter::new();
        assert_eq!(counter.update(PROGRESS_SCALE), ProgressStep::Advance(PROGRESS_SCALE));
        assert_eq!(counter.value(), PROGRESS_SCALE);
    }

    #[test]
    fn test_counter_clamps_values_beyond_the_scale() {
        let mut counter = ProgressCounter::new();
        assert_eq!(counter.update(70000), ProgressStep::Advance(PROGRESS_SCALE));
    }

    #[test]
    fn test_counter_absorbs_a_regression() {
        let mut counter = ProgressCounter::new();
        counter.update(1000);
        assert_eq!(counter.update(500), ProgressStep::Unchanged);
        assert_eq!(counter.value(), 1000);
        // Later forward movement resumes from the displayed value.
        assert_eq!(counter.update(1500), ProgressStep::Advance(500));
    }

    #[test]
    fn test_counter_resets_after_progress() {
        let mut counter = ProgressCounter::new();
        counter.update(40000);
        assert_eq!(counter.update(0), ProgressStep::Reset);
        assert_eq!(counter.value(), 0);
        assert_eq!(counter.update(100), ProgressStep::Advance(100));
    }

    #[test]
    fn test_bars_follow_counter_steps() {
        let mut progress = RipProgress::hidden();
        progress.progress(1000, 1000);
        progress.progress(2500, 2500);
        assert_eq!(progress.current.bar.position(), 2500);
        assert_eq!(progress.total.bar.position(), 2500);

        progress.progress(0, 0);
        assert_eq!(progress.current.bar.position(), 0);
        assert_eq!(progress.total.bar.position(), 0);
    }

    #[test]
    fn test_labels_apply_one_behind() {
        let mut progress = RipProgress::hidden();
        progress.current_task("first pass");
        assert_eq!(progress.current.bar.message(), "");

        progress.current_task("second pass");
        assert_eq!(progress.current.bar.message(), "first pass");

        progress.total_task("whole disc");
        assert_eq!(progress.total.bar.message(), "");
    }
}
