//! Progress reporter implementation
//!
//! Uses indicatif for progress bars with:
//! - Item count progress (URLs, shards, JSONL files)
//! - Byte transfer progress with throughput
//! - Transient per-item bars for parallel downloads

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress reporter for one pipeline stage
pub struct ProgressReporter {
    /// Multi-progress container
    multi: MultiProgress,
    /// Item count progress bar
    items_bar: ProgressBar,
    /// Byte progress bar
    bytes_bar: ProgressBar,
    /// Is progress enabled
    enabled: AtomicBool,
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

impl ProgressReporter {
    /// Create a new progress reporter; `label` names the items, e.g. "shards"
    pub fn new(label: &str) -> Self {
        let multi = MultiProgress::new();

        let items_bar = multi.add(ProgressBar::new(0));
        items_bar.set_style(style(&format!(
            "{{prefix:.bold.dim}} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{percent}}%)",
            label
        )));
        items_bar.set_prefix("Total");

        let bytes_bar = multi.add(ProgressBar::new_spinner());
        bytes_bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {bytes} ({bytes_per_sec}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        Self {
            multi,
            items_bar,
            bytes_bar,
            enabled: AtomicBool::new(true),
        }
    }

    /// Create a disabled progress reporter (quiet mode, tests, batch logs)
    pub fn disabled() -> Self {
        let reporter = Self::new("items");
        reporter.enabled.store(false, Ordering::SeqCst);
        reporter.multi.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Set total number of items
    pub fn set_total_items(&self, total: u64) {
        self.items_bar.set_length(total);
    }

    /// Mark items as finished
    pub fn increment_items(&self, count: u64) {
        self.items_bar.inc(count);
    }

    /// Account processed bytes
    pub fn increment_bytes(&self, bytes: u64) {
        self.bytes_bar.inc(bytes);
    }

    /// Add a transient bar for a single transfer; `total` of 0 means unknown
    pub fn add_transfer(&self, name: &str, total: u64) -> ProgressBar {
        let bar = if total > 0 {
            let bar = ProgressBar::new(total);
            bar.set_style(style(
                "  {msg} [{bar:30.green/white}] {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta})",
            ));
            bar
        } else {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("  {spinner} {msg} {bytes} ({bytes_per_sec})")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        };
        bar.set_message(name.to_string());
        if self.is_enabled() {
            self.multi.add(bar)
        } else {
            bar.set_draw_target(ProgressDrawTarget::hidden());
            bar
        }
    }

    /// Set current status message
    pub fn set_status(&self, msg: &str) {
        self.bytes_bar.set_message(msg.to_string());
    }

    /// Finish all bars
    pub fn finish(&self, message: &str) {
        self.bytes_bar.finish_with_message(message.to_string());
        self.items_bar.finish();
    }

    /// Check if progress is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_reporter() {
        let reporter = ProgressReporter::disabled();

        reporter.set_total_items(10);
        reporter.increment_items(5);
        reporter.increment_bytes(500);

        assert_eq!(reporter.items_bar.length(), Some(10));
        assert_eq!(reporter.items_bar.position(), 5);
        assert_eq!(reporter.bytes_bar.position(), 500);
        assert!(!reporter.is_enabled());
    }

    #[test]
    fn test_transfer_bar_hidden_when_disabled() {
        let reporter = ProgressReporter::disabled();
        let bar = reporter.add_transfer("cc_en_head-0000.json.gz", 1024);
        bar.inc(512);
        assert_eq!(bar.position(), 512);
        assert!(bar.is_hidden());
        bar.finish_and_clear();
    }
}
