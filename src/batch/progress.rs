use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Receives best-effort progress feedback. Nothing reads a return value.
pub trait ProgressSink: Send + Sync {
    /// Announce how many ticks to expect
    fn start(&self, total: u64, label: &str);

    /// Advance by `delta` completed units
    fn update(&self, delta: u64, message: &str);

    fn finish(&self);
}

/// Discards all progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn start(&self, _total: u64, _label: &str) {}

    fn update(&self, _delta: u64, _message: &str) {}

    fn finish(&self) {}
}

/// Counts ticks; handy for asserting on progress in tests
#[derive(Debug, Default)]
pub struct CountingProgress {
    ticks: AtomicU64,
    finished: AtomicU64,
}

impl CountingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst) > 0
    }
}

impl ProgressSink for CountingProgress {
    fn start(&self, _total: u64, _label: &str) {}

    fn update(&self, delta: u64, _message: &str) {
        self.ticks.fetch_add(delta, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Terminal progress bar drawn on stderr
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} {prefix:.bold} [{bar:24.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉░");
        bar.set_style(style);
        Self { bar }
    }

    /// A bar that never draws
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for IndicatifProgress {
    fn start(&self, total: u64, label: &str) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_prefix(label.to_string());
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn update(&self, delta: u64, message: &str) {
        self.bar.set_message(message.to_string());
        self.bar.inc(delta);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_progress() {
        let progress = CountingProgress::new();
        progress.start(3, "Installing");
        progress.update(1, "a");
        progress.update(2, "b");
        assert_eq!(progress.ticks(), 3);
        assert!(!progress.finished());
        progress.finish();
        assert!(progress.finished());
    }

    #[test]
    fn test_hidden_bar_accepts_updates() {
        let progress = IndicatifProgress::hidden();
        progress.start(2, "Removing");
        progress.update(1, "vim");
        progress.finish();
    }
}
