//! Error kinds, typed sentinels, and the issue taxonomy shared across stages.
//!
//! The runner classifies every stage error into one of three kinds before it
//! ever reaches the report. Sentinels are plain marker types carried inside
//! an [`anyhow::Error`] chain and recovered with `downcast_ref`, mirroring how
//! the teacher keeps error *classification* decoupled from error *carriage*.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three kinds the stage runner recognizes at a stage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageErrorKind {
    Fatal,
    Warning,
    Canceled,
}

/// A stage error: a kind plus the underlying cause chain.
///
/// Stage closures return `Result<(), StageError>`. The runner records exactly
/// one issue per failed stage from `code`/`transient` here; any finer-grained
/// issues (e.g. one `AUTH_FAILURE` per failed repository) are added directly
/// by the stage closure via `BuildReport::add_issue` before it returns.
#[derive(Debug, Error)]
#[error("{kind:?}: {source}")]
pub struct StageError {
    pub kind: StageErrorKind,
    pub code: Option<IssueCode>,
    pub transient: bool,
    #[source]
    pub source: anyhow::Error,
}

impl StageError {
    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        Self { kind: StageErrorKind::Fatal, code: None, transient: false, source: err.into() }
    }

    pub fn warning(err: impl Into<anyhow::Error>) -> Self {
        Self { kind: StageErrorKind::Warning, code: None, transient: false, source: err.into() }
    }

    pub fn canceled() -> Self {
        Self { kind: StageErrorKind::Canceled, code: Some(IssueCode::BuildCanceled), transient: false, source: anyhow::anyhow!("build canceled") }
    }

    pub fn with_code(mut self, code: IssueCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }
}

/// Stable, additive-only issue taxonomy (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueCode {
    CloneFailure,
    PartialClone,
    AllClonesFailed,
    DiscoveryFailure,
    NoRepositories,
    HugoExecution,
    BuildCanceled,
    GenericStageError,
    AuthFailure,
    RepoNotFound,
    UnsupportedProto,
    RemoteDiverged,
    RateLimit,
    NetworkTimeout,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueCode::CloneFailure => "CLONE_FAILURE",
            IssueCode::PartialClone => "PARTIAL_CLONE",
            IssueCode::AllClonesFailed => "ALL_CLONES_FAILED",
            IssueCode::DiscoveryFailure => "DISCOVERY_FAILURE",
            IssueCode::NoRepositories => "NO_REPOSITORIES",
            IssueCode::HugoExecution => "HUGO_EXECUTION",
            IssueCode::BuildCanceled => "BUILD_CANCELED",
            IssueCode::GenericStageError => "GENERIC_STAGE_ERROR",
            IssueCode::AuthFailure => "AUTH_FAILURE",
            IssueCode::RepoNotFound => "REPO_NOT_FOUND",
            IssueCode::UnsupportedProto => "UNSUPPORTED_PROTO",
            IssueCode::RemoteDiverged => "REMOTE_DIVERGED",
            IssueCode::RateLimit => "RATE_LIMIT",
            IssueCode::NetworkTimeout => "NETWORK_TIMEOUT",
        };
        f.write_str(s)
    }
}

/// Typed git failure sentinels (spec §4.4), carried inside an `anyhow::Error`
/// chain produced by the git client and recovered via `downcast_ref`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GitFailureKind {
    #[error("authentication failed")]
    Auth,
    #[error("repository not found")]
    NotFound,
    #[error("unsupported protocol")]
    UnsupportedProtocol,
    #[error("remote diverged")]
    RemoteDiverged,
    #[error("rate limit exceeded")]
    RateLimit,
    #[error("network timeout")]
    NetworkTimeout,
    #[error("clone failed")]
    Generic,
}

impl GitFailureKind {
    pub fn issue_code(self) -> IssueCode {
        match self {
            GitFailureKind::Auth => IssueCode::AuthFailure,
            GitFailureKind::NotFound => IssueCode::RepoNotFound,
            GitFailureKind::UnsupportedProtocol => IssueCode::UnsupportedProto,
            GitFailureKind::RemoteDiverged => IssueCode::RemoteDiverged,
            GitFailureKind::RateLimit => IssueCode::RateLimit,
            GitFailureKind::NetworkTimeout => IssueCode::NetworkTimeout,
            GitFailureKind::Generic => IssueCode::CloneFailure,
        }
    }

    /// Fallback substring heuristic over a raw error message (spec §4.4),
    /// used when the underlying error did not come from a typed sentinel
    /// (e.g. the git binary's stderr text).
    pub fn classify_message(message: &str) -> GitFailureKind {
        let lower = message.to_lowercase();
        if lower.contains("authentication failed") {
            GitFailureKind::Auth
        } else if lower.contains("not found") {
            GitFailureKind::NotFound
        } else if lower.contains("unsupported protocol") {
            GitFailureKind::UnsupportedProtocol
        } else if lower.contains("diverged") && lower.contains("hard reset") {
            GitFailureKind::RemoteDiverged
        } else if lower.contains("rate limit") {
            GitFailureKind::RateLimit
        } else if lower.contains("timeout") {
            GitFailureKind::NetworkTimeout
        } else {
            GitFailureKind::Generic
        }
    }
}

/// Marker sentinel for a Hugo (renderer) execution failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("renderer execution failed")]
pub struct HugoExecutionSentinel;

/// Marker sentinel for a documentation discovery walk failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("discovery failed")]
pub struct DiscoveryFailureSentinel;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_message_prefers_specific_categories() {
        assert_eq!(GitFailureKind::classify_message("Authentication failed for url"), GitFailureKind::Auth);
        assert_eq!(GitFailureKind::classify_message("repository not found"), GitFailureKind::NotFound);
        assert_eq!(GitFailureKind::classify_message("unsupported protocol scheme"), GitFailureKind::UnsupportedProtocol);
        assert_eq!(
            GitFailureKind::classify_message("branches have diverged, needs hard reset"),
            GitFailureKind::RemoteDiverged
        );
        assert_eq!(GitFailureKind::classify_message("secondary rate limit hit"), GitFailureKind::RateLimit);
        assert_eq!(GitFailureKind::classify_message("connection timeout"), GitFailureKind::NetworkTimeout);
        assert_eq!(GitFailureKind::classify_message("something else broke"), GitFailureKind::Generic);
    }

    #[test]
    fn diverged_requires_both_substrings() {
        assert_eq!(GitFailureKind::classify_message("refs diverged"), GitFailureKind::Generic);
    }
}
