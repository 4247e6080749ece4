//! C8 — ChangeDetection: decides whether the pipeline may short-circuit
//! after `clone_repos`, and computes the doc-file fingerprint used for
//! external diffing (spec §4.8).

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::report::BuildReport;
use crate::types::DocFile;

/// True iff the previously promoted output at `final_root` is a valid
/// target for the early-skip optimization.
pub fn existing_site_valid_for_skip(final_root: &Path) -> bool {
    let report_path = final_root.join("build-report.json");
    if !report_path.is_file() {
        return false;
    }

    let public_dir = final_root.join("public");
    if !directory_nonempty(&public_dir) {
        return false;
    }

    let content_dir = final_root.join("content");
    if !content_dir.is_dir() {
        return false;
    }

    if !has_markdown_besides_root_index(&content_dir) {
        return false;
    }

    let Ok(raw) = fs::read_to_string(&report_path) else { return false };
    let Ok(report) = serde_json::from_str::<BuildReport>(&raw) else { return false };
    report.files > 0
}

fn directory_nonempty(dir: &Path) -> bool {
    let Ok(mut entries) = fs::read_dir(dir) else { return false };
    entries.next().is_some()
}

fn has_markdown_besides_root_index(content_dir: &Path) -> bool {
    for entry in walkdir::WalkDir::new(content_dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let is_markdown = entry.path().extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("md")).unwrap_or(false);
        if !is_markdown {
            continue;
        }
        let is_root_index = entry.path().parent() == Some(content_dir)
            && entry.path().file_name().and_then(|n| n.to_str()) == Some("_index.md");
        if !is_root_index {
            return true;
        }
    }
    false
}

/// A stable SHA-256 over the sorted `(repository, relative_path,
/// content_length, content_sha256)` tuples of every discovered file.
pub fn doc_files_hash(files: &[DocFile]) -> String {
    let mut tuples: Vec<(String, String, usize, String)> = files
        .iter()
        .map(|f| {
            let content_sha = hex::encode(Sha256::digest(&f.content));
            (f.repository.clone(), f.relative_path.clone(), f.content.len(), content_sha)
        })
        .collect();
    tuples.sort();

    let mut hasher = Sha256::new();
    for (repo, path, len, sha) in &tuples {
        hasher.update(repo.as_bytes());
        hasher.update(b"\0");
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(len.to_le_bytes());
        hasher.update(b"\0");
        hasher.update(sha.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn make_file(repo: &str, path: &str, content: &[u8]) -> DocFile {
        DocFile {
            repository: repo.to_string(),
            forge: None,
            name: "x".to_string(),
            relative_path: path.to_string(),
            docs_base: String::new(),
            extension: "md".to_string(),
            section: String::new(),
            metadata: BTreeMap::new(),
            content: content.to_vec(),
            is_asset: false,
            transformed_bytes: None,
        }
    }

    #[test]
    fn doc_files_hash_is_order_independent() {
        let a = vec![make_file("r1", "a.md", b"hi"), make_file("r2", "b.md", b"bye")];
        let b = vec![make_file("r2", "b.md", b"bye"), make_file("r1", "a.md", b"hi")];
        assert_eq!(doc_files_hash(&a), doc_files_hash(&b));
    }

    #[test]
    fn doc_files_hash_changes_with_content() {
        let a = vec![make_file("r1", "a.md", b"hi")];
        let b = vec![make_file("r1", "a.md", b"bye")];
        assert_ne!(doc_files_hash(&a), doc_files_hash(&b));
    }

    #[test]
    fn invalid_without_build_report() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!existing_site_valid_for_skip(dir.path()));
    }

    #[test]
    fn invalid_when_content_has_only_root_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("build-report.json"), r#"{"files":3}"#).unwrap();
        std::fs::create_dir_all(dir.path().join("public")).unwrap();
        std::fs::write(dir.path().join("public/index.html"), "hi").unwrap();
        std::fs::create_dir_all(dir.path().join("content")).unwrap();
        std::fs::write(dir.path().join("content/_index.md"), "root").unwrap();
        assert!(!existing_site_valid_for_skip(dir.path()));
    }

    #[test]
    fn valid_with_full_population() {
        let dir = tempfile::tempdir().unwrap();
        let report = BuildReport::new("2026-01-01T00:00:00Z".parse().unwrap());
        let mut report = report;
        report.files = 2;
        std::fs::write(dir.path().join("build-report.json"), serde_json::to_string(&report).unwrap()).unwrap();
        std::fs::create_dir_all(dir.path().join("public")).unwrap();
        std::fs::write(dir.path().join("public/index.html"), "hi").unwrap();
        std::fs::create_dir_all(dir.path().join("content/r1")).unwrap();
        std::fs::write(dir.path().join("content/r1/page.md"), "hi").unwrap();
        assert!(existing_site_valid_for_skip(dir.path()));
    }
}
