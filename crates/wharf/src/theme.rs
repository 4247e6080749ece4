//! Theme capability interface (spec §9) — theme-specific configuration
//! generation is opaque to the core; only the contract is declared here.

use std::path::Path;

use anyhow::Result;

use crate::config::SiteConfig;

/// A theme's payload is opaque to the core: the core only needs to know its
/// identity (for `generate_config`/`layouts` stage bookkeeping) and whether
/// it supports per-page edit links (consumed by `EditLinkResolver`, spec §4.7
/// step 1).
pub trait Theme: Send + Sync {
    fn id(&self) -> &str;
    fn supports_edit_link(&self) -> bool;

    /// Writes theme configuration files under `stage_root`. Payload format is
    /// opaque; the core only requires that it is written before `layouts`.
    fn write_config(&self, stage_root: &Path, site: &SiteConfig) -> Result<()>;

    /// Scaffolds layout files under `stage_root`. Opaque payload.
    fn write_layouts(&self, stage_root: &Path) -> Result<()>;
}

/// A minimal scaffold theme: writes a `hugo.toml` stub and an empty
/// `layouts/` directory. Supports edit links, since that is the common case
/// for the themes this core targets.
#[derive(Debug, Clone)]
pub struct DefaultTheme {
    id: String,
}

impl DefaultTheme {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Default for DefaultTheme {
    fn default() -> Self {
        Self::new("default")
    }
}

impl Theme for DefaultTheme {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports_edit_link(&self) -> bool {
        true
    }

    fn write_config(&self, stage_root: &Path, site: &SiteConfig) -> Result<()> {
        let contents = format!(
            "baseURL = \"{}\"\ntitle = \"{}\"\ntheme = \"{}\"\n",
            site.base_url, site.title, self.id
        );
        std::fs::write(stage_root.join("hugo.toml"), contents)?;
        Ok(())
    }

    fn write_layouts(&self, stage_root: &Path) -> Result<()> {
        std::fs::create_dir_all(stage_root.join("layouts"))?;
        Ok(())
    }
}

/// A theme with no edit-link support, used to exercise the "theme doesn't
/// support edit links" branch of `EditLinkResolver`.
#[derive(Debug, Clone, Default)]
pub struct BareTheme;

impl Theme for BareTheme {
    fn id(&self) -> &str {
        "bare"
    }

    fn supports_edit_link(&self) -> bool {
        false
    }

    fn write_config(&self, stage_root: &Path, _site: &SiteConfig) -> Result<()> {
        std::fs::create_dir_all(stage_root)?;
        Ok(())
    }

    fn write_layouts(&self, _stage_root: &Path) -> Result<()> {
        Ok(())
    }
}
