//! Progress bars for index rebuilds.

use cellmap_spatial::{BuildObserver, Stop, StopOutcome, StopStatus};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// One bar per stop, added as each stop pass starts.
pub struct RebuildProgress {
    multi: MultiProgress,
    style: ProgressStyle,
    current: Option<ProgressBar>,
}

impl RebuildProgress {
    /// `hidden` draws nothing; used for `--quiet` and in tests.
    pub fn new(hidden: bool) -> Self {
        let multi = if hidden {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        let style = ProgressStyle::with_template(
            "{prefix:14} {spinner:.dim} [{bar:25}] {percent:>3}%  {pos}/{len} cells  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_strings(&["|", "/", "-", "\\", " "])
        .progress_chars("=>-");
        Self {
            multi,
            style,
            current: None,
        }
    }
}

impl BuildObserver for RebuildProgress {
    fn stop_started(&mut self, stop: &Stop, total: u64) {
        let bar = self.multi.add(ProgressBar::new(total));
        bar.set_style(self.style.clone());
        bar.set_prefix(format!("{}", format!("r{}", stop.resolution).green().bold()));
        bar.set_message(format!("z{}-{}", stop.min_zoom, stop.max_zoom));
        bar.enable_steady_tick(Duration::from_millis(120));
        self.current = Some(bar);
    }

    fn batch_processed(&mut self, _stop: &Stop, cells: u64) {
        if let Some(bar) = &self.current {
            bar.inc(cells);
        }
    }

    fn stop_finished(&mut self, outcome: &StopOutcome) {
        let Some(bar) = self.current.take() else {
            return;
        };
        match &outcome.status {
            StopStatus::Complete => {
                bar.finish_with_message(format!("{} entries", outcome.entries));
            }
            StopStatus::Failed(e) => {
                bar.abandon_with_message(format!("{} {e}", "failed:".red().bold()));
            }
        }
    }
}
