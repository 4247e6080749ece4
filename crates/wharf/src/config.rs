//! Site configuration loading (TOML via `toml` + `serde`, the teacher's
//! `shipper::config` idiom) and the config fingerprint used by `ChangeDetection`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The subset of site configuration that materially affects build output
/// (spec §4.8): theme id, base URL, title, and opaque params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub title: String,
    /// Stringified params, kept in deterministic (sorted) order for hashing.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_theme() -> String {
    "default".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { theme: default_theme(), base_url: String::new(), title: String::new(), params: BTreeMap::new() }
    }
}

impl SiteConfig {
    /// Loads and flattens a `.toml` site config. Nested tables under
    /// `[params]` are stringified with `toml::Value`'s display form so that
    /// `ComputeConfigHash` can treat every param as a plain string.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read site config at {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct RawSiteConfig {
            #[serde(default = "default_theme")]
            theme: String,
            #[serde(default)]
            base_url: String,
            #[serde(default)]
            title: String,
            #[serde(default)]
            params: BTreeMap<String, toml::Value>,
        }

        let raw_config: RawSiteConfig = toml::from_str(raw).context("failed to parse site config TOML")?;
        let params = raw_config
            .params
            .into_iter()
            .map(|(k, v)| (k, stringify_toml_value(&v)))
            .collect();

        Ok(Self { theme: raw_config.theme, base_url: raw_config.base_url, title: raw_config.title, params })
    }

    /// Returns the site-level edit URL override (spec §4.7 step 2), empty
    /// string treated as absent.
    pub fn edit_url_base(&self) -> Option<&str> {
        self.params.get("editURL.base").map(String::as_str).filter(|s| !s.is_empty())
    }

    /// A stable SHA-256 over the fields that materially affect output
    /// (spec §4.8). Deterministic across runs for the same config.
    pub fn compute_config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"theme=");
        hasher.update(self.theme.as_bytes());
        hasher.update(b"\nbase_url=");
        hasher.update(self.base_url.as_bytes());
        hasher.update(b"\ntitle=");
        hasher.update(self.title.as_bytes());
        hasher.update(b"\n");
        for (key, value) in &self.params {
            hasher.update(b"param:");
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

fn stringify_toml_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(d) => d.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults_on_empty_input() {
        let cfg = SiteConfig::parse("").unwrap();
        assert_eq!(cfg.theme, "default");
        assert_eq!(cfg.base_url, "");
    }

    #[test]
    fn parse_flattens_params_table() {
        let cfg = SiteConfig::parse(
            r#"
            theme = "docs"
            base_url = "https://example.com"
            title = "Example"

            [params]
            "editURL.base" = "https://github.com/org"
            "feature.count" = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.edit_url_base(), Some("https://github.com/org"));
        assert_eq!(cfg.params.get("feature.count").map(String::as_str), Some("3"));
    }

    #[test]
    fn empty_edit_url_base_is_treated_as_absent() {
        let mut cfg = SiteConfig::default();
        cfg.params.insert("editURL.base".to_string(), String::new());
        assert_eq!(cfg.edit_url_base(), None);
    }

    #[test]
    fn config_hash_is_deterministic() {
        let cfg = SiteConfig::parse(
            r#"
            theme = "docs"
            base_url = "https://example.com"
            title = "Example"
            "#,
        )
        .unwrap();
        let a = cfg.compute_config_hash();
        let b = cfg.compute_config_hash();
        assert_eq!(a, b);
    }

    #[test]
    fn config_hash_changes_with_title() {
        let mut cfg = SiteConfig::default();
        let before = cfg.compute_config_hash();
        cfg.title = "New Title".to_string();
        let after = cfg.compute_config_hash();
        assert_ne!(before, after);
    }

    #[test]
    fn config_hash_is_order_independent_across_param_insertion() {
        let mut a = SiteConfig::default();
        a.params.insert("z".to_string(), "1".to_string());
        a.params.insert("a".to_string(), "2".to_string());

        let mut b = SiteConfig::default();
        b.params.insert("a".to_string(), "2".to_string());
        b.params.insert("z".to_string(), "1".to_string());

        assert_eq!(a.compute_config_hash(), b.compute_config_hash());
    }
}
