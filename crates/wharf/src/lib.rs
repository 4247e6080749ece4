//! # Wharf
//!
//! A build orchestration core for multi-repository static-documentation
//! generation.
//!
//! Wharf clones a set of source repositories, discovers their documentation
//! files, merges front matter from multiple sources, rewrites relative
//! links into forge-aware edit links, and stages the result atomically
//! before handing it to an external static-site renderer. It makes
//! "run the doc build" safe to start and safe to re-run across a large
//! repository fleet.
//!
//! ## Pipeline
//!
//! The core flow is nine ordered, named stages (spec §4.2), run by
//! [`stage_runner::StageRunner`] against a [`orchestrator::BuildState`]:
//!
//! 1. `prepare_output` — begin an isolated [`staging::Staging`] directory.
//! 2. `clone_repos` — fetch every configured [`types::Repository`] concurrently
//!    via [`fetch::fetch_repositories`].
//! 3. `discover_docs` — walk each clone for documentation and asset files.
//! 4. `generate_config` / `layouts` — write theme configuration and scaffolding.
//! 5. `copy_content` — run every markdown file through
//!    [`transform::transform_file`], the fixed six-step transform pipeline.
//! 6. `indexes` — synthesize missing section indexes.
//! 7. `run_hugo` — invoke the external [`renderer::Renderer`].
//! 8. `post_process` — reserved extension point.
//!
//! [`orchestrator::Generator`] exposes the two public entry points:
//! `generate_full_site` (the full pipeline) and `generate_site` (skips
//! `clone_repos`/`discover_docs` for callers that already have
//! [`types::DocFile`]s in hand).
//!
//! ## Key Types
//!
//! - [`types::Repository`] / [`types::DocFile`] — input and discovered-file domain types
//! - [`report::BuildReport`] — the persisted build report (`build-report.json`)
//! - [`errors::StageError`] — the fatal/warning/canceled classification every stage returns
//! - [`orchestrator::Generator`] / [`orchestrator::BuildState`] — the orchestration glue
//! - [`frontmatter`] — the merge engine backing `copy_content`
//! - [`editlink::EditLinkResolver`] — forge-specific edit-link computation
//!
//! ## Modules
//!
//! - [`types`] — domain types shared across the pipeline
//! - [`errors`] — error kinds, typed sentinels, issue taxonomy
//! - [`cancel`] — cooperative cancellation token
//! - [`report`] — the build report: counters, issues, outcome, persistence
//! - [`staging`] — atomic build-then-promote output staging
//! - [`fetch`] — concurrent repository cloning/updating
//! - [`git_client`] — the git transport seam and its shell-out default
//! - [`discovery`] — repository filesystem walking into `DocFile`s
//! - [`frontmatter`] — ordered front-matter patch merging
//! - [`transform`] — the fixed per-file transform pipeline
//! - [`editlink`] — forge-specific edit-link resolution
//! - [`changes`] — early-skip decision and doc-file fingerprinting
//! - [`config`] — site configuration loading and hashing
//! - [`theme`] / [`renderer`] / [`observer`] / [`recorder`] — capability interfaces
//! - [`pipeline`] — the ordered stage list and its closure type
//! - [`stage_runner`] — the stage executor
//! - [`orchestrator`] — `BuildState`, `Generator`, and the two public entry points
//!
//! Configurable retry strategies with backoff and jitter, re-exported from
//! the `wharf-retry` microcrate.
pub use wharf_retry as retry;

pub mod cancel;
pub mod changes;
pub mod config;
pub mod discovery;
pub mod editlink;
pub mod errors;
pub mod fetch;
pub mod frontmatter;
pub mod git_client;
pub mod observer;
pub mod orchestrator;
pub mod pipeline;
pub mod recorder;
pub mod renderer;
pub mod report;
pub mod stage_runner;
pub mod staging;
pub mod theme;
pub mod transform;
pub mod types;
