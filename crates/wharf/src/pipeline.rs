//! C2 (part) — the ordered stage list the runner executes (spec §4.2).
//!
//! Stage names are part of the external contract: `build-report.json`'s
//! `stage_durations`/`stage_counts`/`stage_error_kinds` maps are keyed by
//! these exact strings, and consumers match on them. Never rename or reorder.

use crate::errors::StageError;
use crate::orchestrator::BuildState;
use crate::cancel::CancellationToken;

pub const PREPARE_OUTPUT: &str = "prepare_output";
pub const CLONE_REPOS: &str = "clone_repos";
pub const DISCOVER_DOCS: &str = "discover_docs";
pub const GENERATE_CONFIG: &str = "generate_config";
pub const LAYOUTS: &str = "layouts";
pub const COPY_CONTENT: &str = "copy_content";
pub const INDEXES: &str = "indexes";
pub const RUN_HUGO: &str = "run_hugo";
pub const POST_PROCESS: &str = "post_process";

/// The nine canonical stage names in declared pipeline order.
pub const CANONICAL_ORDER: &[&str] = &[
    PREPARE_OUTPUT,
    CLONE_REPOS,
    DISCOVER_DOCS,
    GENERATE_CONFIG,
    LAYOUTS,
    COPY_CONTENT,
    INDEXES,
    RUN_HUGO,
    POST_PROCESS,
];

/// A single named unit of work. `run` mutates the shared [`BuildState`] and
/// observes `cancellation` for its own inner-loop checks (spec §5).
pub struct Stage<'a> {
    pub name: &'static str,
    pub run: Box<dyn FnMut(&CancellationToken, &mut BuildState) -> Result<(), StageError> + 'a>,
}

impl<'a> Stage<'a> {
    pub fn new(
        name: &'static str,
        run: impl FnMut(&CancellationToken, &mut BuildState) -> Result<(), StageError> + 'a,
    ) -> Self {
        Self { name, run: Box::new(run) }
    }
}

/// An ordered, cancellable sequence of named stages (spec §2).
#[derive(Default)]
pub struct Pipeline<'a> {
    pub stages: Vec<Stage<'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn push(&mut self, stage: Stage<'a>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name).collect()
    }
}
