//! Core domain types shared across the build pipeline (spec §3).

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An input repository, immutable for the duration of a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub clone_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub forge: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Repository {
    pub fn branch(&self) -> &str {
        if self.branch.is_empty() { "main" } else { &self.branch }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Clone/update strategy, resolved per repository (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    Fresh,
    Update,
    #[default]
    Auto,
}

/// Outcome of fetching a single repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoFetchOutcome {
    pub name: String,
    pub local_path: PathBuf,
    pub pre_head: String,
    pub post_head: String,
    pub updated: bool,
    pub error: Option<String>,
}

impl RepoFetchOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// A single discovered documentation (or asset) file.
#[derive(Debug, Clone)]
pub struct DocFile {
    pub repository: String,
    pub forge: Option<String>,
    pub name: String,
    pub relative_path: String,
    pub docs_base: String,
    pub extension: String,
    pub section: String,
    pub metadata: BTreeMap<String, String>,
    pub content: Vec<u8>,
    pub is_asset: bool,
    pub transformed_bytes: Option<Vec<u8>>,
}

impl DocFile {
    /// The path under `content/` that this file's transformed bytes are
    /// written to, mirroring Hugo's `<repo>/<relative_path-minus-ext>` layout.
    pub fn hugo_path(&self) -> String {
        let forge_prefix = self.forge.as_deref().map(|f| format!("{f}/")).unwrap_or_default();
        format!("{forge_prefix}{}/{}", self.repository, self.relative_path)
    }
}

/// Merge mode for a single front-matter patch (spec §3 / §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    Deep,
    Replace,
    SetIfMissing,
}

/// Array-merge strategy for a single key (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayStrategy {
    #[default]
    Replace,
    Union,
    Append,
}

/// A single contribution to a front-matter merge.
#[derive(Debug, Clone)]
pub struct FrontMatterPatch {
    pub source: String,
    pub mode: MergeMode,
    pub array_strategy: ArrayStrategy,
    pub priority: i32,
    pub data: BTreeMap<String, serde_yaml::Value>,
}

impl FrontMatterPatch {
    pub fn new(source: impl Into<String>, mode: MergeMode, priority: i32) -> Self {
        Self {
            source: source.into(),
            mode,
            array_strategy: ArrayStrategy::default(),
            priority,
            data: BTreeMap::new(),
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: serde_yaml::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// An audited merge conflict (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub key: String,
    pub action: ConflictAction,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    KeptOriginal,
    Overwritten,
    SetIfMissing,
}

/// In-flight transform state for a single file (spec §3).
pub struct Page {
    pub file: DocFile,
    pub original_front_matter: BTreeMap<String, serde_yaml::Value>,
    pub had_front_matter: bool,
    pub patches: Vec<FrontMatterPatch>,
    pub content: Vec<u8>,
    pub merged_front_matter: BTreeMap<String, serde_yaml::Value>,
    pub conflicts: Vec<MergeConflict>,
    pub raw: Vec<u8>,
}

impl Page {
    pub fn new(file: DocFile) -> Self {
        let content = file.content.clone();
        Self {
            file,
            original_front_matter: BTreeMap::new(),
            had_front_matter: false,
            patches: Vec::new(),
            content,
            merged_front_matter: BTreeMap::new(),
            conflicts: Vec::new(),
            raw: Vec::new(),
        }
    }
}

/// Render invocation mode for the terminal `run_hugo` stage (spec §6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    Never,
    #[default]
    Always,
    Preview,
}

impl RenderMode {
    /// Whether a renderer failure degrades to a warning instead of aborting.
    pub fn degrades_renderer_failures(self) -> bool {
        matches!(self, RenderMode::Preview)
    }
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RenderMode::Never => "never",
            RenderMode::Always => "always",
            RenderMode::Preview => "preview",
        };
        f.write_str(s)
    }
}

/// Options bundling concurrency, cancellation, retry, and render mode —
/// the single options bag threaded through `GenerateSite`/`GenerateFullSite`.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub concurrency: usize,
    pub cancellation: crate::cancel::CancellationToken,
    pub retry_policy: wharf_retry::RetryStrategyConfig,
    pub render_mode: RenderMode,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            cancellation: crate::cancel::CancellationToken::new(),
            retry_policy: wharf_retry::RetryPolicy::Default.to_config(),
            render_mode: RenderMode::Always,
        }
    }
}

/// A build timestamp, re-exported for convenience across modules.
pub type Timestamp = DateTime<Utc>;
