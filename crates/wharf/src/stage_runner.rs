//! C2 — StageRunner: executes ordered stages honoring cancellation,
//! classifies errors, emits observer callbacks, enforces abort policy
//! (spec §4.2).

use std::time::Instant;

use crate::cancel::CancellationToken;
use crate::changes;
use crate::errors::{IssueCode, StageError, StageErrorKind};
use crate::observer::Observer;
use crate::orchestrator::BuildState;
use crate::pipeline::{CLONE_REPOS, Pipeline};
use crate::report::{Severity, StageResult};

/// Stateless executor: all mutable state lives in [`BuildState`].
pub struct StageRunner;

impl StageRunner {
    /// Runs every stage in `pipeline` against `state`, in order.
    ///
    /// Returns `Ok(())` on normal completion (including an early skip) and
    /// `Err(StageError)` when a stage aborted the build (fatal or canceled).
    /// In both cases `state.report` carries the issues/durations/outcome
    /// recorded so far — callers decide staging promotion vs. abort from the
    /// `Result`, not from report contents.
    pub fn run(
        cancellation: &CancellationToken,
        state: &mut BuildState,
        pipeline: &mut Pipeline<'_>,
        observer: &dyn Observer,
    ) -> Result<(), StageError> {
        for stage in pipeline.stages.iter_mut() {
            if cancellation.is_canceled() {
                let err = StageError::canceled();
                record_outcome(state, stage.name, StageResult::Canceled, &err);
                observer.on_stage_complete(stage.name, std::time::Duration::ZERO, StageResult::Canceled);
                return Err(err);
            }

            observer.on_stage_start(stage.name);
            let started = Instant::now();
            let outcome = (stage.run)(cancellation, state);
            let duration = started.elapsed();
            state.report.stage_durations.insert(stage.name.to_string(), duration);

            match outcome {
                Ok(()) => {
                    state.report.record_stage_result(stage.name, StageResult::Success);
                    observer.on_stage_complete(stage.name, duration, StageResult::Success);
                }
                Err(mut err) => {
                    if err.code.is_none() {
                        err.code = Some(IssueCode::GenericStageError);
                    }
                    let result = match err.kind {
                        StageErrorKind::Warning => StageResult::Warning,
                        StageErrorKind::Fatal => StageResult::Fatal,
                        StageErrorKind::Canceled => StageResult::Canceled,
                    };
                    record_outcome(state, stage.name, result, &err);
                    observer.on_stage_complete(stage.name, duration, result);

                    if matches!(err.kind, StageErrorKind::Fatal | StageErrorKind::Canceled) {
                        return Err(err);
                    }
                }
            }

            if stage.name == CLONE_REPOS
                && state.all_repos_unchanged
                && changes::existing_site_valid_for_skip(&state.final_root)
            {
                state.report.skip_reason = "no_changes".to_string();
                state.report.finish(state.now);
                state.report.derive_outcome();
                observer.on_build_complete(&state.report);
                return Ok(());
            }
        }

        state.report.finish(state.now);
        state.report.derive_outcome();
        observer.on_build_complete(&state.report);
        Ok(())
    }
}

fn record_outcome(state: &mut BuildState, stage: &str, result: StageResult, err: &StageError) {
    state.report.record_stage_result(stage, result);
    state.report.stage_error_kinds.insert(stage.to_string(), err.kind);
    let severity = match err.kind {
        StageErrorKind::Warning => Severity::Warning,
        StageErrorKind::Fatal | StageErrorKind::Canceled => Severity::Error,
    };
    let code = err.code.unwrap_or(IssueCode::GenericStageError);
    state.report.add_issue(code, stage, severity, err.source.to_string(), err.transient, Some(&err.source));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::pipeline::Stage;
    use crate::types::Repository;
    use std::path::PathBuf;

    fn state() -> BuildState {
        BuildState::new(Vec::<Repository>::new(), "2026-01-01T00:00:00Z".parse().unwrap(), PathBuf::from("/tmp/does-not-exist-wharf-test"))
    }

    #[test]
    fn success_path_records_success_counts() {
        let mut st = state();
        let mut pipeline = Pipeline::new();
        pipeline.push(Stage::new("prepare_output", |_c, _s| Ok(())));
        pipeline.push(Stage::new("clone_repos", |_c, _s| Ok(())));

        let result = StageRunner::run(&CancellationToken::new(), &mut st, &mut pipeline, &NoopObserver);
        assert!(result.is_ok());
        assert_eq!(st.report.stage_counts.get("prepare_output").unwrap().success, 1);
        assert_eq!(st.report.stage_durations.len(), 2);
    }

    #[test]
    fn fatal_stage_aborts_and_stops_remaining_stages() {
        let mut st = state();
        let mut pipeline = Pipeline::new();
        pipeline.push(Stage::new("prepare_output", |_c, _s| Err(StageError::fatal(anyhow::anyhow!("boom")))));
        pipeline.push(Stage::new("clone_repos", |_c, _s| Ok(())));

        let result = StageRunner::run(&CancellationToken::new(), &mut st, &mut pipeline, &NoopObserver);
        assert!(result.is_err());
        assert!(!st.report.stage_counts.contains_key("clone_repos"));
        assert_eq!(st.report.stage_error_kinds.get("prepare_output"), Some(&StageErrorKind::Fatal));
    }

    #[test]
    fn warning_stage_continues_pipeline() {
        let mut st = state();
        let mut pipeline = Pipeline::new();
        pipeline.push(Stage::new("discover_docs", |_c, _s| Err(StageError::warning(anyhow::anyhow!("partial")))));
        pipeline.push(Stage::new("generate_config", |_c, _s| Ok(())));

        let result = StageRunner::run(&CancellationToken::new(), &mut st, &mut pipeline, &NoopObserver);
        assert!(result.is_ok());
        assert_eq!(st.report.stage_counts.get("generate_config").unwrap().success, 1);
    }

    #[test]
    fn pre_canceled_token_short_circuits_first_stage() {
        let mut st = state();
        let mut pipeline = Pipeline::new();
        pipeline.push(Stage::new("prepare_output", |_c, _s| Ok(())));

        let result = StageRunner::run(&CancellationToken::already_canceled(), &mut st, &mut pipeline, &NoopObserver);
        assert!(result.is_err());
        assert_eq!(st.report.stage_counts.get("prepare_output").unwrap().canceled, 1);
    }

    #[test]
    fn missing_code_defaults_to_generic_stage_error() {
        let mut st = state();
        let mut pipeline = Pipeline::new();
        pipeline.push(Stage::new("layouts", |_c, _s| Err(StageError::fatal(anyhow::anyhow!("boom")))));

        StageRunner::run(&CancellationToken::new(), &mut st, &mut pipeline, &NoopObserver).unwrap_err();
        assert_eq!(st.report.issues[0].code, "GENERIC_STAGE_ERROR");
    }
}
