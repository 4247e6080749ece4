//! C1 — BuildReport: accumulates timings, counters, and issues; derives the
//! terminal outcome; persists atomically.
//!
//! The persistence routine mirrors `shipper::state::atomic_write_json`: write
//! to a `.tmp` sibling, `fsync`, then `rename` over the final path so a crash
//! mid-write never leaves a half-written `build-report.json` behind.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::{IssueCode, StageErrorKind};
use crate::types::Timestamp;

/// Severity of a recorded issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// The per-stage result recorded against `stage_counts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageResult {
    Success,
    Warning,
    Fatal,
    Canceled,
}

/// Monotone per-stage result counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageCounts {
    pub success: u32,
    pub warning: u32,
    pub fatal: u32,
    pub canceled: u32,
}

impl StageCounts {
    fn increment(&mut self, result: StageResult) {
        match result {
            StageResult::Success => self.success += 1,
            StageResult::Warning => self.warning += 1,
            StageResult::Fatal => self.fatal += 1,
            StageResult::Canceled => self.canceled += 1,
        }
    }
}

/// A single recorded issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub code: String,
    pub stage: String,
    pub severity: Severity,
    pub message: String,
    pub transient: bool,
}

/// The terminal outcome of a build, derived from recorded issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Warning,
    Failed,
    Canceled,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::Warning => "warning",
            Outcome::Failed => "failed",
            Outcome::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// The mutable build report. Created at build start, finalized after the
/// last stage, persisted after staging promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub schema_version: u32,
    pub repositories: u32,
    pub files: u32,
    pub cloned_repositories: u32,
    pub failed_repositories: u32,
    pub skipped_repositories: u32,
    pub rendered_pages: u32,
    pub retries: u32,
    pub retries_exhausted: bool,

    pub start: Timestamp,
    pub end: Option<Timestamp>,
    pub stage_durations: BTreeMap<String, Duration>,

    pub stage_error_kinds: BTreeMap<String, StageErrorKind>,
    pub stage_counts: BTreeMap<String, StageCounts>,

    pub issues: Vec<Issue>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,

    pub outcome: Outcome,

    pub static_rendered: bool,
    pub config_hash: String,
    pub doc_files_hash: String,
    pub pipeline_version: u32,
    pub effective_render_mode: String,
    pub skip_reason: String,

    #[serde(default)]
    pub clone_stage_skipped: bool,
}

pub const SCHEMA_VERSION: u32 = 1;
pub const PIPELINE_VERSION: u32 = 1;

impl BuildReport {
    pub fn new(start: Timestamp) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            repositories: 0,
            files: 0,
            cloned_repositories: 0,
            failed_repositories: 0,
            skipped_repositories: 0,
            rendered_pages: 0,
            retries: 0,
            retries_exhausted: false,
            start,
            end: None,
            stage_durations: BTreeMap::new(),
            stage_error_kinds: BTreeMap::new(),
            stage_counts: BTreeMap::new(),
            issues: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            outcome: Outcome::Success,
            static_rendered: false,
            config_hash: String::new(),
            doc_files_hash: String::new(),
            pipeline_version: PIPELINE_VERSION,
            effective_render_mode: String::new(),
            skip_reason: String::new(),
            clone_stage_skipped: false,
        }
    }

    pub fn record_stage_result(&mut self, stage: &str, result: StageResult) {
        self.stage_counts.entry(stage.to_string()).or_default().increment(result);
    }

    /// Appends an issue; if a source error is provided, mirrors its display
    /// text into `errors` (severity=error) or `warnings` (severity=warning).
    pub fn add_issue(
        &mut self,
        code: IssueCode,
        stage: &str,
        severity: Severity,
        message: impl Into<String>,
        transient: bool,
        err: Option<&anyhow::Error>,
    ) {
        let message = message.into();
        self.issues.push(Issue {
            code: code.to_string(),
            stage: stage.to_string(),
            severity,
            message: message.clone(),
            transient,
        });
        if let Some(err) = err {
            match severity {
                Severity::Error => self.errors.push(err.to_string()),
                Severity::Warning => self.warnings.push(err.to_string()),
            }
        }
    }

    pub fn finish(&mut self, now: Timestamp) {
        if self.end.is_none() {
            self.end = Some(now);
        }
    }

    /// Single pass over recorded issues: canceled > failed > warning > success.
    /// Idempotent — calling this repeatedly on the same issue set always
    /// yields the same outcome.
    pub fn derive_outcome(&mut self) -> Outcome {
        let mut has_fatal = false;
        let mut has_canceled = false;
        let mut has_warning = false;
        for issue in &self.issues {
            match (issue.severity, self.stage_error_kinds.get(issue.stage.as_str())) {
                (Severity::Error, Some(StageErrorKind::Canceled)) => has_canceled = true,
                (Severity::Error, _) => has_fatal = true,
                (Severity::Warning, _) => has_warning = true,
            }
        }
        self.outcome = if has_canceled {
            Outcome::Canceled
        } else if has_fatal {
            Outcome::Failed
        } else if has_warning {
            Outcome::Warning
        } else {
            Outcome::Success
        };
        self.outcome
    }

    /// The one-line human summary written to `build-report.txt`.
    pub fn summary_line(&self) -> String {
        let duration_ms = self
            .end
            .map(|end| (end - self.start).num_milliseconds().max(0))
            .unwrap_or(0);
        format!(
            "repos={} files={} duration={}ms errors={} warnings={} stages={} rendered={} outcome={}",
            self.repositories,
            self.files,
            duration_ms,
            self.errors.len(),
            self.warnings.len(),
            self.stage_counts.len(),
            self.rendered_pages,
            self.outcome,
        )
    }

    /// Serializes `build-report.json` and `build-report.txt` atomically
    /// under `root`. Never leaves a half-written file visible.
    pub fn persist(&self, root: &Path) -> Result<()> {
        let json_path = root.join("build-report.json");
        atomic_write_json(&json_path, self)?;

        let txt_path = root.join("build-report.txt");
        let tmp = txt_path.with_extension("txt.tmp");
        {
            let mut f = fs::File::create(&tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            writeln!(f, "{}", self.summary_line())?;
            f.sync_all().ok();
        }
        fs::rename(&tmp, &txt_path)
            .with_context(|| format!("failed to rename {} to {}", tmp.display(), txt_path.display()))?;

        Ok(())
    }
}

/// Write `value` as JSON to `path` atomically via a `.tmp` sibling + rename.
fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value).context("failed to serialize build report")?;
    {
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        f.write_all(&data)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        f.sync_all().ok();
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to rename {} to {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Transient classification (spec §4.1): whether a retry of this stage might
/// succeed. Canceled is never transient.
pub fn is_transient(stage: &str, kind: StageErrorKind, severity: Severity, is_clone_sentinel: bool, is_hugo_sentinel: bool) -> bool {
    if matches!(kind, StageErrorKind::Canceled) {
        return false;
    }
    match stage {
        "clone_repos" => is_clone_sentinel,
        "run_hugo" => is_hugo_sentinel,
        "discover_docs" => matches!(severity, Severity::Warning),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        // Deterministic stand-in timestamp for unit tests (Utc::now is
        // avoided so these tests do not depend on wall-clock state).
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn derive_outcome_success_with_no_issues() {
        let mut report = BuildReport::new(now());
        assert_eq!(report.derive_outcome(), Outcome::Success);
    }

    #[test]
    fn derive_outcome_warning_only() {
        let mut report = BuildReport::new(now());
        report.add_issue(IssueCode::PartialClone, "clone_repos", Severity::Warning, "1 failed out of 2", false, None);
        assert_eq!(report.derive_outcome(), Outcome::Warning);
    }

    #[test]
    fn derive_outcome_failed_on_fatal_error() {
        let mut report = BuildReport::new(now());
        report.stage_error_kinds.insert("layouts".to_string(), StageErrorKind::Fatal);
        report.add_issue(IssueCode::GenericStageError, "layouts", Severity::Error, "boom", false, None);
        assert_eq!(report.derive_outcome(), Outcome::Failed);
    }

    #[test]
    fn derive_outcome_canceled_takes_priority() {
        let mut report = BuildReport::new(now());
        report.stage_error_kinds.insert("layouts".to_string(), StageErrorKind::Fatal);
        report.add_issue(IssueCode::GenericStageError, "layouts", Severity::Error, "boom", false, None);
        report.stage_error_kinds.insert("clone_repos".to_string(), StageErrorKind::Canceled);
        report.add_issue(IssueCode::BuildCanceled, "clone_repos", Severity::Error, "canceled", false, None);
        assert_eq!(report.derive_outcome(), Outcome::Canceled);
    }

    #[test]
    fn derive_outcome_is_idempotent() {
        let mut report = BuildReport::new(now());
        report.add_issue(IssueCode::PartialClone, "clone_repos", Severity::Warning, "1 failed out of 2", false, None);
        let first = report.derive_outcome();
        let second = report.derive_outcome();
        assert_eq!(first, second);
    }

    #[test]
    fn persist_writes_both_files_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = BuildReport::new(now());
        report.finish(now());
        report.derive_outcome();
        report.persist(dir.path()).unwrap();

        assert!(dir.path().join("build-report.json").is_file());
        assert!(dir.path().join("build-report.txt").is_file());
        assert!(!dir.path().join("build-report.json.tmp").exists());
        assert!(!dir.path().join("build-report.txt.tmp").exists());

        let contents = fs::read_to_string(dir.path().join("build-report.txt")).unwrap();
        assert!(contents.starts_with("repos=0 files=0"));
    }

    #[test]
    fn is_transient_never_true_for_canceled() {
        assert!(!is_transient("clone_repos", StageErrorKind::Canceled, Severity::Error, true, false));
    }

    #[test]
    fn is_transient_clone_sentinel() {
        assert!(is_transient("clone_repos", StageErrorKind::Warning, Severity::Warning, true, false));
        assert!(!is_transient("clone_repos", StageErrorKind::Warning, Severity::Warning, false, false));
    }

    #[test]
    fn is_transient_discovery_only_on_warning() {
        assert!(is_transient("discover_docs", StageErrorKind::Warning, Severity::Warning, false, false));
        assert!(!is_transient("discover_docs", StageErrorKind::Fatal, Severity::Error, false, false));
    }

    proptest::proptest! {
        #[test]
        fn sum_of_stage_counts_matches_issue_free_increments(n in 0u32..50) {
            let mut report = BuildReport::new(now());
            for _ in 0..n {
                report.record_stage_result("prepare_output", StageResult::Success);
            }
            let counts = report.stage_counts.get("prepare_output").unwrap();
            assert_eq!(counts.success, n);
            assert_eq!(counts.warning + counts.fatal + counts.canceled, 0);
        }
    }
}
