//! Recorder capability interface (spec §4.4, §6.5) — best-effort metrics sink.

use std::time::Duration;

/// Fine-grained metrics callbacks, separate from [`crate::observer::Observer`]
/// because a build may want stage-level progress without per-repo metrics
/// (or vice versa). Default is a no-op, matching the teacher's `Reporter`
/// default-does-nothing posture for optional instrumentation.
pub trait Recorder: Send + Sync {
    fn record_repo_fetch(&self, _name: &str, _duration: Duration, _succeeded: bool) {}
    fn record_transform(&self, _duration: Duration) {}
    fn record_retry(&self, _stage: &str) {}
    fn record_configured_concurrency(&self, _workers: usize) {}
    fn record_effective_render_mode(&self, _mode: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {}
