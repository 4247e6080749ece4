//! GitClient capability interface (spec §9) and its shell-out default
//! implementation, grounded in the teacher's `shipper::git` module: invoke
//! the `git` binary via `std::process::Command`, with an env var override
//! (`WHARF_GIT_BIN`, mirroring `SHIPPER_GIT_BIN`) so tests can inject a fake
//! git script.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};

use crate::errors::GitFailureKind;

/// Concrete git transport is out of scope per the core's own non-goals;
/// this interface is the seam RepoFetcher depends on.
pub trait GitClient: Send + Sync {
    fn clone_repo(&self, url: &str, branch: &str, dest: &Path) -> Result<()>;
    fn fetch_and_reset(&self, dest: &Path, branch: &str) -> Result<()>;
    fn read_head(&self, dest: &Path) -> Result<String>;
    fn has_local_clone(&self, dest: &Path) -> bool;
}

/// Returns the configured git binary, defaulting to `"git"` on `PATH`.
pub fn git_program() -> String {
    std::env::var("WHARF_GIT_BIN").unwrap_or_else(|_| "git".to_string())
}

fn run_git(args: &[&str], cwd: &Path) -> Result<String> {
    let program = git_program();
    let output = Command::new(&program)
        .args(args)
        .current_dir(cwd)
        .output()
        .with_context(|| format!("failed to spawn {program} {args:?}"))?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        let kind = GitFailureKind::classify_message(&stderr);
        return Err(anyhow::anyhow!("{stderr}")).context(kind);
    }
    Ok(stdout)
}

/// Shells out to a real `git` binary (or the `WHARF_GIT_BIN` override).
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellGitClient;

impl GitClient for ShellGitClient {
    fn clone_repo(&self, url: &str, branch: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        if dest.exists() {
            std::fs::remove_dir_all(dest)
                .with_context(|| format!("failed to remove existing destination {}", dest.display()))?;
        }
        let dest_str = dest.to_string_lossy().into_owned();
        let parent = dest.parent().unwrap_or(dest);
        run_git(&["clone", "--branch", branch, "--single-branch", url, &dest_str], parent)?;
        Ok(())
    }

    fn fetch_and_reset(&self, dest: &Path, branch: &str) -> Result<()> {
        run_git(&["fetch", "origin", branch], dest)?;
        run_git(&["reset", "--hard", &format!("origin/{branch}")], dest)?;
        Ok(())
    }

    fn read_head(&self, dest: &Path) -> Result<String> {
        read_head_indirect(dest)
    }

    fn has_local_clone(&self, dest: &Path) -> bool {
        dest.join(".git").exists()
    }
}

/// Reads the commit SHA that `HEAD` resolves to, following a single `ref:`
/// indirection into `.git/<ref>` the way spec §4.4 step 2 requires. Falls
/// back to `git rev-parse HEAD` if the plain-file read doesn't resolve,
/// since `.git/HEAD` may be a packed-refs entry rather than a loose file.
fn read_head_indirect(dest: &Path) -> Result<String> {
    let head_path = dest.join(".git/HEAD");
    let head_contents = std::fs::read_to_string(&head_path)
        .with_context(|| format!("failed to read {}", head_path.display()))?;
    let head_contents = head_contents.trim();

    if let Some(ref_path) = head_contents.strip_prefix("ref: ") {
        let target = dest.join(".git").join(ref_path);
        if let Ok(sha) = std::fs::read_to_string(&target) {
            return Ok(sha.trim().to_string());
        }
        // Not a loose ref file; the ref may live in packed-refs. Fall back
        // to asking git directly.
        let sha = run_git(&["rev-parse", "HEAD"], dest)?;
        return Ok(sha.trim().to_string());
    }

    if head_contents.len() == 40 && head_contents.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(head_contents.to_string());
    }

    bail!("unrecognized HEAD contents in {}", head_path.display())
}
