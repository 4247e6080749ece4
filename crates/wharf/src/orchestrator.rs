//! Orchestrator / glue (spec §2, §6.1) — owns [`BuildState`], assembles the
//! nine canonical stages into a [`Pipeline`], and exposes the two public
//! entry points: [`Generator::generate_site`] and
//! [`Generator::generate_full_site`].
//!
//! Ownership is strictly tree-shaped (spec §9): `Generator` owns its
//! collaborators; `BuildState` (constructed fresh per build) owns the
//! `BuildReport` and, for the build's duration, the `Staging` handle.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::cancel::CancellationToken;
use crate::changes;
use crate::config::SiteConfig;
use crate::discovery::{Discovery, FilesystemDiscovery};
use crate::editlink::{EditLinkResolver, ForgesConfig};
use crate::errors::{GitFailureKind, IssueCode, StageError};
use crate::fetch::{FetchResults, fetch_repositories};
use crate::git_client::{GitClient, ShellGitClient};
use crate::observer::{NoopObserver, Observer};
use crate::pipeline::{
    CLONE_REPOS, COPY_CONTENT, DISCOVER_DOCS, GENERATE_CONFIG, INDEXES, LAYOUTS, POST_PROCESS,
    PREPARE_OUTPUT, Pipeline, RUN_HUGO, Stage,
};
use crate::recorder::{NoopRecorder, Recorder};
use crate::renderer::{NoopRenderer, Renderer};
use crate::report::{BuildReport, Severity};
use crate::stage_runner::StageRunner;
use crate::staging::Staging;
use crate::theme::{DefaultTheme, Theme};
use crate::transform::{TransformContext, transform_file};
use crate::types::{BuildOptions, DocFile, FetchStrategy, RenderMode, Repository};

/// Shared mutable state threaded through every stage (spec §2, "Control flow").
pub struct BuildState {
    pub repositories: Vec<Repository>,
    pub workspace_dir: PathBuf,
    pub final_root: PathBuf,
    pub now: DateTime<Utc>,
    pub staging: Option<Staging>,
    pub fetch_results: Option<FetchResults>,
    pub discovered_files: Vec<DocFile>,
    pub all_repos_unchanged: bool,
    pub report: BuildReport,
}

impl BuildState {
    pub fn new(repositories: Vec<Repository>, now: DateTime<Utc>, final_root: PathBuf) -> Self {
        let mut report = BuildReport::new(now);
        report.repositories = repositories.len() as u32;
        Self {
            workspace_dir: final_root.clone(),
            final_root,
            repositories,
            now,
            staging: None,
            fetch_results: None,
            discovered_files: Vec::new(),
            all_repos_unchanged: false,
            report,
        }
    }
}

/// Bundles every collaborator the core depends on but does not implement
/// itself (spec §9's capability interfaces), plus the options bag. Built
/// once per target output directory and reused across builds.
pub struct Generator {
    pub final_root: PathBuf,
    pub workspace_dir: PathBuf,
    pub site: SiteConfig,
    pub forges: ForgesConfig,
    pub options: BuildOptions,
    pub fetch_strategy: FetchStrategy,
    pub theme: Box<dyn Theme>,
    pub renderer: Box<dyn Renderer>,
    pub discovery: Box<dyn Discovery>,
    pub git_client: Box<dyn GitClient>,
    pub observer: Box<dyn Observer>,
    pub recorder: Box<dyn Recorder>,
}

impl Generator {
    pub fn new(final_root: impl Into<PathBuf>, workspace_dir: impl Into<PathBuf>, site: SiteConfig) -> Self {
        Self {
            final_root: final_root.into(),
            workspace_dir: workspace_dir.into(),
            site,
            forges: ForgesConfig::new(),
            options: BuildOptions::default(),
            fetch_strategy: FetchStrategy::Auto,
            theme: Box::new(DefaultTheme::default()),
            renderer: Box::new(NoopRenderer),
            discovery: Box::new(FilesystemDiscovery),
            git_client: Box::new(ShellGitClient),
            observer: Box::new(NoopObserver),
            recorder: Box::new(NoopRecorder),
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_forges(mut self, forges: ForgesConfig) -> Self {
        self.forges = forges;
        self
    }

    pub fn with_fetch_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.fetch_strategy = strategy;
        self
    }

    pub fn with_theme(mut self, theme: Box<dyn Theme>) -> Self {
        self.theme = theme;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_discovery(mut self, discovery: Box<dyn Discovery>) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_git_client(mut self, git_client: Box<dyn GitClient>) -> Self {
        self.git_client = git_client;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_recorder(mut self, recorder: Box<dyn Recorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Direct path assuming documentation files are already available;
    /// skips `clone_repos` and `discover_docs` (spec §6.1).
    pub fn generate_site(&self, doc_files: Vec<DocFile>) -> Result<BuildReport> {
        self.run(Vec::new(), Some(doc_files))
    }

    /// Full pipeline including repository cloning (spec §6.1).
    pub fn generate_full_site(&self, repositories: Vec<Repository>) -> Result<BuildReport> {
        self.run(repositories, None)
    }

    fn run(&self, repositories: Vec<Repository>, direct_files: Option<Vec<DocFile>>) -> Result<BuildReport> {
        let now = Utc::now();
        let mut state = BuildState::new(repositories, now, self.final_root.clone());
        state.workspace_dir = self.workspace_dir.clone();

        let include_clone = direct_files.is_none();
        state.report.clone_stage_skipped = !include_clone;

        if let Some(files) = direct_files {
            state.report.files = files.len() as u32;
            state.report.doc_files_hash = changes::doc_files_hash(&files);
            state.discovered_files = files;
        }
        state.report.config_hash = self.site.compute_config_hash();

        let mut pipeline = self.build_pipeline(include_clone);
        let run_result = StageRunner::run(&self.options.cancellation, &mut state, &mut pipeline, self.observer.as_ref());

        match run_result {
            Ok(()) => {
                if state.report.skip_reason.is_empty() {
                    if let Some(staging) = state.staging.take() {
                        staging.finalize().context("failed to promote staged output")?;
                    }
                    state.report.finish(Utc::now());
                    state.report.derive_outcome();
                    state.report.persist(&self.final_root).context("failed to persist build report")?;
                } else if let Some(staging) = state.staging.take() {
                    staging.abort().context("failed to discard unused staging directory")?;
                }
            }
            Err(_stage_err) => {
                if let Some(staging) = state.staging.take() {
                    staging.abort().context("failed to abort staging directory")?;
                }
                state.report.finish(Utc::now());
                state.report.derive_outcome();
            }
        }

        Ok(state.report)
    }

    fn build_pipeline(&self, include_clone: bool) -> Pipeline<'_> {
        let mut pipeline = Pipeline::new();
        pipeline.push(Stage::new(PREPARE_OUTPUT, move |c, s| self.stage_prepare_output(c, s)));
        if include_clone {
            pipeline.push(Stage::new(CLONE_REPOS, move |c, s| self.stage_clone_repos(c, s)));
            pipeline.push(Stage::new(DISCOVER_DOCS, move |c, s| self.stage_discover_docs(c, s)));
        }
        pipeline.push(Stage::new(GENERATE_CONFIG, move |c, s| self.stage_generate_config(c, s)));
        pipeline.push(Stage::new(LAYOUTS, move |c, s| self.stage_layouts(c, s)));
        pipeline.push(Stage::new(COPY_CONTENT, move |c, s| self.stage_copy_content(c, s)));
        pipeline.push(Stage::new(INDEXES, move |c, s| self.stage_indexes(c, s)));
        pipeline.push(Stage::new(RUN_HUGO, move |c, s| self.stage_run_hugo(c, s)));
        pipeline.push(Stage::new(POST_PROCESS, move |c, s| self.stage_post_process(c, s)));
        pipeline
    }

    fn stage_prepare_output(&self, _cancellation: &CancellationToken, state: &mut BuildState) -> Result<(), StageError> {
        crate::staging::recover_orphaned_prev(&self.final_root).map_err(StageError::fatal)?;
        let staging = Staging::begin(&self.final_root).map_err(StageError::fatal)?;
        state.staging = Some(staging);
        Ok(())
    }

    fn stage_clone_repos(&self, cancellation: &CancellationToken, state: &mut BuildState) -> Result<(), StageError> {
        let results = fetch_repositories(
            &state.repositories,
            &state.workspace_dir,
            self.fetch_strategy,
            self.options.concurrency,
            cancellation,
            self.git_client.as_ref(),
            self.recorder.as_ref(),
        );

        if results.canceled {
            return Err(StageError::canceled());
        }

        let cloned = results.cloned();
        let failed = results.failed();
        state.report.cloned_repositories = cloned as u32;
        state.report.failed_repositories = failed as u32;
        state.all_repos_unchanged = results.all_unchanged();

        // Per-repo issues are recorded at the same severity the stage itself
        // will resolve to (a warning, whether the clone failure is partial or
        // total), so `derive_outcome` (which keys off `stage_error_kinds` per
        // stage, not per issue) never disagrees with the issues it holds.
        if failed > 0 {
            for outcome in results.outcomes.iter().filter(|o| o.error.is_some()) {
                let message = outcome.error.as_deref().unwrap();
                let kind = GitFailureKind::classify_message(message);
                let transient = matches!(kind, GitFailureKind::Generic | GitFailureKind::RateLimit | GitFailureKind::NetworkTimeout);
                state.report.add_issue(
                    kind.issue_code(),
                    CLONE_REPOS,
                    Severity::Warning,
                    format!("{}: {message}", outcome.name),
                    transient,
                    None,
                );
            }
        }

        state.fetch_results = Some(results);

        if cloned == 0 && failed > 0 {
            return Err(StageError::warning(anyhow::anyhow!("all clones failed")).with_code(IssueCode::AllClonesFailed));
        }
        if failed > 0 {
            return Err(StageError::warning(anyhow::anyhow!("{failed} failed out of {}", cloned + failed))
                .with_code(IssueCode::PartialClone));
        }
        Ok(())
    }

    fn stage_discover_docs(&self, cancellation: &CancellationToken, state: &mut BuildState) -> Result<(), StageError> {
        let results = state.fetch_results.as_ref().expect("clone_repos runs before discover_docs");
        if results.cloned() == 0 {
            return Err(StageError::warning(anyhow::anyhow!("no repositories cloned")).with_code(IssueCode::NoRepositories));
        }

        let mut files = Vec::new();
        for outcome in &results.outcomes {
            if cancellation.is_canceled() {
                return Err(StageError::canceled());
            }
            if !outcome.succeeded() {
                continue;
            }
            let repo = state
                .repositories
                .iter()
                .find(|r| r.name == outcome.name)
                .expect("fetch outcome name matches a configured repository");
            let found = self
                .discovery
                .discover(repo, &outcome.local_path)
                .map_err(|e| StageError::fatal(e).with_code(IssueCode::DiscoveryFailure))?;
            files.extend(found);
        }

        state.report.files = files.len() as u32;
        state.report.doc_files_hash = changes::doc_files_hash(&files);
        state.discovered_files = files;
        Ok(())
    }

    fn stage_generate_config(&self, _cancellation: &CancellationToken, state: &mut BuildState) -> Result<(), StageError> {
        let build_root = build_root(state)?;
        self.theme.write_config(&build_root, &self.site).map_err(StageError::fatal)?;
        state.report.config_hash = self.site.compute_config_hash();
        Ok(())
    }

    fn stage_layouts(&self, _cancellation: &CancellationToken, state: &mut BuildState) -> Result<(), StageError> {
        let build_root = build_root(state)?;
        self.theme.write_layouts(&build_root).map_err(StageError::fatal)
    }

    fn stage_copy_content(&self, cancellation: &CancellationToken, state: &mut BuildState) -> Result<(), StageError> {
        let content_root = build_root(state)?.join("content");
        let resolver = EditLinkResolver::new(&state.repositories, &self.forges);
        let ctx = TransformContext { now: state.now, resolver: &resolver, theme: self.theme.as_ref(), site: &self.site };

        let files = std::mem::take(&mut state.discovered_files);
        let mut processed = Vec::with_capacity(files.len());
        let mut rendered = 0u32;

        for file in files {
            if cancellation.is_canceled() {
                state.discovered_files = processed;
                return Err(StageError::canceled());
            }

            let dest = content_root.join(file.hugo_path());
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(StageError::fatal)?;
            }

            if file.is_asset {
                std::fs::write(&dest, &file.content).map_err(StageError::fatal)?;
                processed.push(file);
                continue;
            }

            let started = std::time::Instant::now();
            let page = transform_file(file, &ctx);
            self.recorder.record_transform(started.elapsed());
            std::fs::write(&dest, &page.raw).map_err(StageError::fatal)?;
            rendered += 1;
            processed.push(page.file);
        }

        state.discovered_files = processed;
        state.report.rendered_pages = rendered;
        Ok(())
    }

    /// Generates a minimal `_index.md` for every directory of transformed
    /// content that has no `index`/`readme`/`_index` page of its own.
    fn stage_indexes(&self, _cancellation: &CancellationToken, state: &mut BuildState) -> Result<(), StageError> {
        let content_root = build_root(state)?.join("content");

        let mut by_dir: std::collections::BTreeMap<PathBuf, Vec<&DocFile>> = std::collections::BTreeMap::new();
        for file in state.discovered_files.iter().filter(|f| !f.is_asset) {
            let path = PathBuf::from(file.hugo_path());
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            by_dir.entry(dir).or_default().push(file);
        }

        for (dir, files) in by_dir {
            let has_index = files.iter().any(|f| matches!(f.name.to_lowercase().as_str(), "index" | "readme" | "_index"));
            if has_index {
                continue;
            }

            let mut body = String::from("---\ntitle: Index\ntype: docs\n---\n\n");
            for file in &files {
                let title = file.name.replace(['-', '_'], " ");
                body.push_str(&format!("- [{title}]({}/)\n", file.name));
            }

            let index_dir = content_root.join(&dir);
            std::fs::create_dir_all(&index_dir).map_err(StageError::fatal)?;
            std::fs::write(index_dir.join("_index.md"), body).map_err(StageError::fatal)?;
        }

        Ok(())
    }

    fn stage_run_hugo(&self, _cancellation: &CancellationToken, state: &mut BuildState) -> Result<(), StageError> {
        let build_root = build_root(state)?;
        state.report.effective_render_mode = self.options.render_mode.to_string();
        self.recorder.record_effective_render_mode(&state.report.effective_render_mode);

        if matches!(self.options.render_mode, RenderMode::Never) {
            state.report.static_rendered = false;
            return Ok(());
        }

        match self.renderer.execute(&build_root) {
            Ok(()) => {
                state.report.static_rendered = directory_nonempty(&build_root.join("public"));
                Ok(())
            }
            Err(err) => {
                if self.options.render_mode.degrades_renderer_failures() {
                    Err(StageError::warning(err).with_code(IssueCode::HugoExecution).transient())
                } else {
                    Err(StageError::fatal(err).with_code(IssueCode::HugoExecution))
                }
            }
        }
    }

    fn stage_post_process(&self, _cancellation: &CancellationToken, _state: &mut BuildState) -> Result<(), StageError> {
        Ok(())
    }
}

fn build_root(state: &BuildState) -> Result<PathBuf, StageError> {
    Ok(state
        .staging
        .as_ref()
        .ok_or_else(|| StageError::fatal(anyhow::anyhow!("prepare_output did not initialize a staging directory")))?
        .build_root()
        .to_path_buf())
}

fn directory_nonempty(dir: &Path) -> bool {
    std::fs::read_dir(dir).map(|mut entries| entries.next().is_some()).unwrap_or(false)
}
