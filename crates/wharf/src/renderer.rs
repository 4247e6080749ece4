//! Renderer capability interface (spec §6.4) — the external static-site
//! renderer invocation. The core only depends on `Execute(rootDir) -> error`;
//! this module supplies a no-op (render mode `never`) and a shell-out
//! implementation grounded in the teacher's `process::run_command_with_timeout`.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};

use crate::errors::HugoExecutionSentinel;

pub trait Renderer: Send + Sync {
    fn execute(&self, root_dir: &Path) -> Result<()>;
}

/// Selected when render mode is `never` or no renderer binary is configured.
/// A failure in this mode cannot occur, since it is never invoked.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn execute(&self, _root_dir: &Path) -> Result<()> {
        Ok(())
    }
}

/// The output of a bounded command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status_success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program args...` in `cwd`, polling for completion and killing the
/// child if `timeout` elapses, mirroring the teacher's `run_command_with_timeout`.
pub fn run_command_with_timeout(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<CommandOutput> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().context("failed to poll child process")? {
            let output = child.wait_with_output().context("failed to collect child output")?;
            return Ok(CommandOutput {
                status_success: status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            bail!("{program} timed out after {timeout:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Shells out to a configured renderer binary (e.g. `hugo`).
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    pub binary: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandRenderer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into(), args: Vec::new(), timeout: Duration::from_secs(300) }
    }
}

impl Renderer for CommandRenderer {
    fn execute(&self, root_dir: &Path) -> Result<()> {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let output = run_command_with_timeout(&self.binary, &args, root_dir, self.timeout)
            .context(HugoExecutionSentinel)?;
        if !output.status_success {
            return Err(anyhow::anyhow!("{}", output.stderr)).context(HugoExecutionSentinel);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_renderer_always_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NoopRenderer.execute(dir.path()).is_ok());
    }

    #[test]
    fn run_command_with_timeout_captures_success() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_command_with_timeout("true", &[], dir.path(), Duration::from_secs(5)).unwrap();
        assert!(out.status_success);
    }

    #[test]
    fn run_command_with_timeout_captures_failure() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_command_with_timeout("false", &[], dir.path(), Duration::from_secs(5)).unwrap();
        assert!(!out.status_success);
    }
}
