//! Progress reporting with TTY detection.
//!
//! Mirrors a package-publish progress bar, but tracks pipeline stages
//! instead: one tick per `prepare_output`/`clone_repos`/.../`post_process`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use atty::Stream;
use indicatif::{ProgressBar, ProgressStyle};

use wharf::observer::Observer;
use wharf::pipeline::CANONICAL_ORDER;
use wharf::report::{BuildReport, StageResult};

/// Detects whether stdout is connected to a TTY.
pub fn is_tty() -> bool {
    atty::is(Stream::Stdout)
}

/// Stage-driven progress reporter. Implements [`Observer`] so it can be
/// handed straight to [`wharf::orchestrator::Generator`].
pub struct ProgressReporter {
    is_tty: bool,
    total_stages: usize,
    completed: AtomicUsize,
    progress_bar: Option<ProgressBar>,
    start_time: Instant,
}

impl ProgressReporter {
    /// Creates a new progress reporter sized to the canonical stage count.
    pub fn new() -> Self {
        Self::with_total_stages(CANONICAL_ORDER.len())
    }

    fn with_total_stages(total_stages: usize) -> Self {
        let is_tty = is_tty();
        let progress_bar = if is_tty {
            let pb = ProgressBar::new(total_stages as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        Self { is_tty, total_stages, completed: AtomicUsize::new(0), progress_bar, start_time: Instant::now() }
    }

    /// Creates a silent progress reporter that never renders a bar, for
    /// scripted/non-interactive runs.
    pub fn silent() -> Self {
        Self { is_tty: false, total_stages: CANONICAL_ORDER.len(), completed: AtomicUsize::new(0), progress_bar: None, start_time: Instant::now() }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for ProgressReporter {
    fn on_stage_start(&self, stage: &str) {
        let elapsed = self.start_time.elapsed();
        let done = self.completed.load(Ordering::SeqCst);
        let msg = format!("[{}/{}] {stage}... ({elapsed:?})", done + 1, self.total_stages);

        if self.is_tty {
            if let Some(pb) = &self.progress_bar {
                pb.set_message(msg);
                pb.set_position(done as u64);
            }
        } else {
            eprintln!("{msg}");
        }
    }

    fn on_stage_complete(&self, stage: &str, duration: Duration, result: StageResult) {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if self.is_tty {
            if let Some(pb) = &self.progress_bar {
                pb.inc(1);
            }
        } else {
            eprintln!("[{done}/{}] {stage} finished in {duration:?}: {result:?}", self.total_stages);
        }
    }

    fn on_build_complete(&self, report: &BuildReport) {
        let elapsed = self.start_time.elapsed();
        let msg = format!("build finished in {elapsed:?}: {}", report.summary_line());
        if self.is_tty {
            if let Some(pb) = &self.progress_bar {
                pb.set_message(msg);
                pb.finish();
            }
        } else {
            eprintln!("{msg}");
        }
    }
}
