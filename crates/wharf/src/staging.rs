//! C3 — Staging: builds into an isolated directory, promotes or aborts
//! without ever leaving partial output visible (spec §4.3).

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

const FINALIZE_REMOVE_RETRIES: u32 = 3;
const FINALIZE_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Owns the staging directory's lifetime: created by [`Staging::begin`],
/// released by exactly one of [`Staging::finalize`] or [`Staging::abort`].
pub struct Staging {
    final_root: PathBuf,
    stage_root: PathBuf,
}

impl Staging {
    /// Creates `final + "_stage"` as an empty directory. Fails fatally if it
    /// already exists and cannot be removed — a pre-existing staging
    /// directory means another build may be in progress (spec §5).
    pub fn begin(final_root: impl Into<PathBuf>) -> Result<Self> {
        let final_root = final_root.into();
        let stage_root = stage_path(&final_root);

        if stage_root.exists() {
            std::fs::remove_dir_all(&stage_root).with_context(|| {
                format!("a staging directory already exists at {} and could not be removed", stage_root.display())
            })?;
        }
        std::fs::create_dir_all(&stage_root)
            .with_context(|| format!("failed to create staging directory {}", stage_root.display()))?;

        Ok(Self { final_root, stage_root })
    }

    pub fn build_root(&self) -> &Path {
        &self.stage_root
    }

    pub fn final_root(&self) -> &Path {
        &self.final_root
    }

    /// Promotes the staged tree: backs up the previous `final` to
    /// `final.prev`, then renames `stage` over `final`. Step 3 (the final
    /// rename) is the atomicity point.
    pub fn finalize(self) -> Result<()> {
        let prev_root = prev_path(&self.final_root);

        if prev_root.exists() {
            remove_with_retries(&prev_root)?;
        }

        if self.final_root.exists() {
            std::fs::rename(&self.final_root, &prev_root).with_context(|| {
                format!("failed to back up {} to {}", self.final_root.display(), prev_root.display())
            })?;
        }

        std::fs::rename(&self.stage_root, &self.final_root).with_context(|| {
            format!("failed to promote {} to {}", self.stage_root.display(), self.final_root.display())
        })?;

        // Best-effort cleanup; a leftover `.prev` does not affect correctness.
        let _ = std::fs::remove_dir_all(&prev_root);

        Ok(())
    }

    /// Removes the staging directory; `final` remains untouched. Idempotent.
    pub fn abort(self) -> Result<()> {
        if self.stage_root.exists() {
            std::fs::remove_dir_all(&self.stage_root)
                .with_context(|| format!("failed to remove staging directory {}", self.stage_root.display()))?;
        }
        Ok(())
    }
}

fn stage_path(final_root: &Path) -> PathBuf {
    let mut os_string = final_root.as_os_str().to_owned();
    os_string.push("_stage");
    PathBuf::from(os_string)
}

fn prev_path(final_root: &Path) -> PathBuf {
    let mut os_string = final_root.as_os_str().to_owned();
    os_string.push(".prev");
    PathBuf::from(os_string)
}

fn remove_with_retries(path: &Path) -> Result<()> {
    let mut last_err = None;
    for _ in 0..FINALIZE_REMOVE_RETRIES {
        match std::fs::remove_dir_all(path) {
            Ok(()) => return Ok(()),
            Err(err) => {
                last_err = Some(err);
                thread::sleep(FINALIZE_RETRY_BACKOFF);
            }
        }
    }
    // Final attempt: force-chmod writable, then retry once more.
    force_writable(path);
    std::fs::remove_dir_all(path)
        .with_context(|| format!("failed to remove {} after {} retries: {:?}", path.display(), FINALIZE_REMOVE_RETRIES, last_err))
}

#[cfg(unix)]
fn force_writable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    for entry in walkdir::WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if let Ok(metadata) = entry.metadata() {
            let mut perms = metadata.permissions();
            perms.set_mode(0o755);
            let _ = std::fs::set_permissions(entry.path(), perms);
        }
    }
}

#[cfg(not(unix))]
fn force_writable(_path: &Path) {}

/// Startup recovery policy: if both `final` and `final.prev` exist, keep
/// `final` and remove `final.prev` (spec §4.3).
pub fn recover_orphaned_prev(final_root: &Path) -> Result<()> {
    let prev_root = prev_path(final_root);
    if final_root.exists() && prev_root.exists() {
        std::fs::remove_dir_all(&prev_root)
            .with_context(|| format!("failed to remove orphaned {}", prev_root.display()))?;
    }
    Ok(())
}

/// True iff no staging/backup sibling remains next to `final_root` (the
/// invariant checked by spec §8's post-build scenarios).
pub fn no_sibling_staging_dirs(final_root: &Path) -> bool {
    !stage_path(final_root).exists() && !prev_path(final_root).exists()
}
