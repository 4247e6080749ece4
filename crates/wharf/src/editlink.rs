//! C7 — EditLinkResolver: computes forge-specific edit URLs from repository
//! metadata (spec §4.7).

use std::collections::BTreeMap;

use crate::config::SiteConfig;
use crate::theme::Theme;
use crate::types::{DocFile, Repository};

/// Configured forges: forge type (`"github"`, `"gitlab"`, ...) to its base URL.
pub type ForgesConfig = BTreeMap<String, String>;

pub struct EditLinkResolver<'a> {
    pub repositories: &'a [Repository],
    pub forges: &'a ForgesConfig,
}

impl<'a> EditLinkResolver<'a> {
    pub fn new(repositories: &'a [Repository], forges: &'a ForgesConfig) -> Self {
        Self { repositories, forges }
    }

    /// Returns the computed edit URL, or an empty string when it cannot be
    /// determined (spec §4.7: "return empty when forge type or full_name
    /// cannot be determined").
    pub fn resolve(&self, file: &DocFile, theme: &dyn Theme, site: &SiteConfig) -> String {
        if !theme.supports_edit_link() {
            return String::new();
        }
        if site.edit_url_base().is_some() {
            return String::new();
        }
        let Some(repo) = self.repositories.iter().find(|r| r.name == file.repository) else {
            return String::new();
        };

        let branch = repo.branch();
        let path = repo_relative_path(&file.docs_base, &file.relative_path);
        let normalized_url = normalize_clone_url(&repo.clone_url);

        let Some(forge_type) = self.resolve_forge_type(repo, &normalized_url) else {
            return String::new();
        };
        let Some(full_name) = derive_full_name(repo, &normalized_url) else {
            return String::new();
        };

        let base = self.forges.get(&forge_type).cloned().unwrap_or_else(|| default_forge_base(&forge_type));

        match forge_type.as_str() {
            "github" => format!("{base}/{full_name}/edit/{branch}/{path}"),
            "gitlab" => format!("{base}/{full_name}/-/edit/{branch}/{path}"),
            "bitbucket" => format!("{base}/{full_name}/src/{branch}/{path}?mode=edit"),
            "forgejo" | "gitea" => format!("{base}/{full_name}/_edit/{branch}/{path}"),
            _ => String::new(),
        }
    }

    fn resolve_forge_type(&self, repo: &Repository, normalized_url: &str) -> Option<String> {
        if let Some(explicit) = repo.tag("forge_type") {
            return Some(explicit.to_string());
        }
        let host = extract_host(normalized_url);
        if let Some(host) = &host {
            for (forge_type, base_url) in self.forges {
                if extract_host(base_url).as_deref() == Some(host.as_str()) {
                    return Some(forge_type.clone());
                }
            }
        }
        if let Some(host) = host {
            if host.contains("github.") {
                return Some("github".to_string());
            }
            if host.contains("gitlab.") {
                return Some("gitlab".to_string());
            }
            if host == "bitbucket.org" {
                return Some("bitbucket".to_string());
            }
            if host.contains("forgejo") || host.contains("gitea") {
                return Some("forgejo".to_string());
            }
        }
        None
    }
}

fn repo_relative_path(docs_base: &str, relative_path: &str) -> String {
    if docs_base.is_empty() || docs_base == "." {
        relative_path.to_string()
    } else {
        format!("{}/{}", docs_base.trim_end_matches('/'), relative_path)
    }
}

/// Strips a trailing `.git` and expands `git@host:org/repo` into
/// `https://host/org/repo` (spec §4.7 step 6).
fn normalize_clone_url(url: &str) -> String {
    let without_suffix = url.strip_suffix(".git").unwrap_or(url);
    if let Some(rest) = without_suffix.strip_prefix("git@") {
        if let Some((host, path)) = rest.split_once(':') {
            return format!("https://{host}/{path}");
        }
    }
    without_suffix.to_string()
}

fn extract_host(normalized_url: &str) -> Option<String> {
    let without_scheme = normalized_url.split("://").nth(1).unwrap_or(normalized_url);
    without_scheme.split('/').next().map(|s| s.to_string()).filter(|s| !s.is_empty())
}

fn derive_full_name(repo: &Repository, normalized_url: &str) -> Option<String> {
    if let Some(explicit) = repo.tag("full_name") {
        return Some(explicit.to_string());
    }
    let without_scheme = normalized_url.split("://").nth(1)?;
    let mut parts = without_scheme.splitn(2, '/');
    let _host = parts.next();
    let path = parts.next()?.trim_matches('/');
    if path.is_empty() { None } else { Some(path.to_string()) }
}

fn default_forge_base(forge_type: &str) -> String {
    match forge_type {
        "github" => "https://github.com".to_string(),
        "gitlab" => "https://gitlab.com".to_string(),
        "bitbucket" => "https://bitbucket.org".to_string(),
        _ => String::new(),
    }
}
