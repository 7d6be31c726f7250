//! Terminal progress for the long phases of a run.
//!
//! Bars are drawn on stderr. In log-only mode (`--log-only`) they stay
//! hidden and each phase emits a tracing line every few items instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

fn log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Run time for the summary: "42.3s", "3m 05s", "1h 02m".
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        0..=59 => format!("{:.1}s", d.as_secs_f64()),
        60..=3599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fetching episode tracklists from NTS
    Episodes,
    /// Searching tracks on Spotify
    Search,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Episodes => "Fetching tracklists",
            Phase::Search => "Searching Spotify",
        }
    }

    /// Items between two log-only lines.
    fn log_every(self) -> u64 {
        match self {
            Phase::Episodes => 10,
            Phase::Search => 50,
        }
    }
}

/// Progress of one phase. Shared by reference between workers.
pub struct PhaseProgress {
    phase: Phase,
    bar: ProgressBar,
    total: u64,
    log_lines: bool,
}

impl PhaseProgress {
    /// A silent phase (`visible == false`) counts but never draws or logs.
    pub fn new(phase: Phase, total: u64, visible: bool) -> Self {
        let bar = if visible && !log_only() {
            let bar = ProgressBar::new(total);
            let style = ProgressStyle::default_bar()
                .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");
            bar.set_style(style);
            bar.set_message(phase.label());
            bar
        } else {
            ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::hidden())
        };

        Self {
            phase,
            bar,
            total,
            log_lines: visible && log_only(),
        }
    }

    /// Count one finished item.
    pub fn tick(&self) {
        self.bar.inc(1);
        if !self.log_lines || self.total == 0 {
            return;
        }
        let done = self.bar.position();
        if done % self.phase.log_every() == 0 || done == self.total {
            let pct = 100.0 * done as f64 / self.total as f64;
            tracing::info!(phase = self.phase.label(), "{}/{} ({:.1}%)", done, self.total, pct);
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// The underlying bar, for suspending it around terminal prompts.
    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(185)), "3m 05s");
        assert_eq!(format_duration(Duration::from_secs(3720)), "1h 02m");
    }

    #[test]
    fn test_silent_phase_counts() {
        let progress = PhaseProgress::new(Phase::Search, 3, false);
        progress.tick();
        progress.tick();
        assert_eq!(progress.position(), 2);
        assert_eq!(progress.bar().length(), Some(3));
        progress.finish();
    }

    #[test]
    fn test_empty_phase_tick_is_harmless() {
        let progress = PhaseProgress::new(Phase::Episodes, 0, false);
        progress.tick();
        assert_eq!(progress.position(), 1);
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(Phase::Episodes.label(), "Fetching tracklists");
        assert_eq!(Phase::Search.label(), "Searching Spotify");
        assert!(Phase::Episodes.log_every() < Phase::Search.log_every());
    }
}
