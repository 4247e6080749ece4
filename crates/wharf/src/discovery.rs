//! Discovery capability interface (spec §9) — repository filesystem walking.
//!
//! Concrete git transport and renderer invocation are out of scope per
//! spec.md, but the walking of a cloned repository's tree into `DocFile`s is
//! the connective tissue `discover_docs` needs to run at all, so a real
//! filesystem-backed implementation is provided (grounded on `walkdir`, the
//! traversal crate the broader corpus reaches for in doc-builder tools).

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::types::{DocFile, Repository};

pub trait Discovery: Send + Sync {
    /// Walks `local_path` for the given repository and returns every
    /// discovered file (markdown and assets alike).
    fn discover(&self, repo: &Repository, local_path: &Path) -> Result<Vec<DocFile>>;
}

/// Walks each of `repo.paths` (or the repository root when empty) for `.md`
/// files and co-located assets.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemDiscovery;

impl Discovery for FilesystemDiscovery {
    fn discover(&self, repo: &Repository, local_path: &Path) -> Result<Vec<DocFile>> {
        let bases: Vec<String> = if repo.paths.is_empty() { vec![String::new()] } else { repo.paths.clone() };

        let mut files = Vec::new();
        for docs_base in bases {
            let base_dir = if docs_base.is_empty() { local_path.to_path_buf() } else { local_path.join(&docs_base) };
            if !base_dir.exists() {
                continue;
            }
            for entry in WalkDir::new(&base_dir).follow_links(false) {
                let entry = entry.with_context(|| format!("failed to walk {}", base_dir.display()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry.path().components().any(|c| c.as_os_str() == ".git") {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&base_dir)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                let extension = entry.path().extension().and_then(|e| e.to_str()).unwrap_or("").to_string();
                let is_asset = extension.to_lowercase() != "md" && extension.to_lowercase() != "markdown";
                let name = entry
                    .path()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let section = relative.split('/').next().filter(|s| !s.is_empty() && *s != relative).unwrap_or("").to_string();
                let content = std::fs::read(entry.path())
                    .with_context(|| format!("failed to read {}", entry.path().display()))?;

                files.push(DocFile {
                    repository: repo.name.clone(),
                    forge: repo.tag("forge_type").map(str::to_string).or_else(|| repo.forge.clone()),
                    name,
                    relative_path: relative,
                    docs_base: docs_base.clone(),
                    extension,
                    section,
                    metadata: BTreeMap::new(),
                    content,
                    is_asset,
                    transformed_bytes: None,
                });
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(name: &str, paths: &[&str]) -> Repository {
        Repository {
            name: name.to_string(),
            clone_url: String::new(),
            branch: "main".to_string(),
            paths: paths.iter().map(|s| s.to_string()).collect(),
            tags: BTreeMap::new(),
            forge: None,
        }
    }

    #[test]
    fn discovers_markdown_and_asset_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("docs/sub")).unwrap();
        std::fs::write(dir.path().join("docs/page.md"), "# Page\n").unwrap();
        std::fs::write(dir.path().join("docs/sub/image.png"), [0u8, 1, 2]).unwrap();

        let files = FilesystemDiscovery.discover(&repo("demo", &["docs"]), dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        let page = files.iter().find(|f| f.name == "page").unwrap();
        assert!(!page.is_asset);
        assert_eq!(page.section, "");

        let image = files.iter().find(|f| f.relative_path.ends_with("image.png")).unwrap();
        assert!(image.is_asset);
        assert_eq!(image.section, "sub");
    }

    #[test]
    fn empty_paths_walks_repository_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.md"), "hi").unwrap();
        let files = FilesystemDiscovery.discover(&repo("demo", &[]), dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].docs_base, "");
    }

    #[test]
    fn skips_git_internals() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        std::fs::write(dir.path().join(".git/objects/blob"), "x").unwrap();
        std::fs::write(dir.path().join("page.md"), "# Page\n").unwrap();
        let files = FilesystemDiscovery.discover(&repo("demo", &[]), dir.path()).unwrap();
        assert_eq!(files.len(), 1);
    }
}
