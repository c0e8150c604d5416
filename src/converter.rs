//! Supervised invocation of the external conversion engine.
//!
//! The engine runs as a child process against a single workspace. Its exit is
//! raced against a wall-clock timer; on timeout the engine's whole process
//! group is killed and the call fails with [`ConvertError::Timeout`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::{ConvertError, Result};

pub const OUTPUT_EXTENSION: &str = "pdf";

// Stderr beyond this is dropped
const STDERR_CAPTURE_LIMIT: u64 = 16 * 1024;
const STDERR_DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct Converter {
    engine: PathBuf,
    timeout: Duration,
}

/// One in-flight engine invocation.
#[derive(Debug, Clone)]
pub struct PendingConversion {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub started_at: Instant,
}

impl Converter {
    pub fn new(engine: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            engine: engine.into(),
            timeout,
        }
    }

    /// Convert `input` (which must live inside `workspace`) and return the
    /// path of the produced PDF.
    pub async fn convert(&self, input: &Path, workspace: &Path) -> Result<PathBuf> {
        let pending = self.prepare(input, workspace)?;
        self.run_engine(&pending).await?;

        let output = discover_output(&pending.input, &pending.output_dir).await?;
        tracing::info!(
            workspace = %pending.output_dir.display(),
            elapsed_ms = pending.started_at.elapsed().as_millis() as u64,
            "Conversion finished"
        );
        Ok(output)
    }

    // Resolve both paths and refuse any input outside the workspace
    fn prepare(&self, input: &Path, workspace: &Path) -> Result<PendingConversion> {
        let violation = || ConvertError::PathViolation {
            path: input.to_path_buf(),
            boundary: workspace.to_path_buf(),
        };

        let output_dir = workspace.canonicalize().map_err(|_| violation())?;
        let input = input.canonicalize().map_err(|_| violation())?;

        if input == output_dir || !input.starts_with(&output_dir) {
            tracing::warn!(
                security = true,
                input = %input.display(),
                workspace = %output_dir.display(),
                "Conversion input escapes its workspace"
            );
            return Err(violation());
        }

        Ok(PendingConversion {
            input,
            output_dir,
            started_at: Instant::now(),
        })
    }

    async fn run_engine(&self, pending: &PendingConversion) -> Result<()> {
        let mut command = Command::new(&self.engine);
        command
            .arg("--headless")
            .arg("--nologo")
            .arg("--nofirststartwizard")
            .arg("--convert-to")
            .arg(OUTPUT_EXTENSION)
            .arg("--outdir")
            .arg(&pending.output_dir)
            .arg(&pending.input)
            .current_dir(&pending.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout also reaches workers the engine forks
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| ConvertError::Conversion(format!("failed to spawn {:?}: {}", self.engine, e)))?;
        #[cfg(unix)]
        let engine_pid = child.id();

        // Drain stderr concurrently so a chatty engine can't block on a full pipe
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut limited = stderr.take(STDERR_CAPTURE_LIMIT);
                let _ = limited.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| ConvertError::Conversion(format!("failed to wait for engine: {}", e)))?;
                // Bounded: a detached grandchild may keep the pipe open
                let stderr = match stderr_task {
                    Some(task) => tokio::time::timeout(STDERR_DRAIN_GRACE, task)
                        .await
                        .ok()
                        .and_then(|joined| joined.ok())
                        .unwrap_or_default(),
                    None => String::new(),
                };

                if status.success() {
                    if !stderr.trim().is_empty() {
                        tracing::debug!(stderr = %stderr.trim(), "Engine stderr");
                    }
                    Ok(())
                } else {
                    tracing::warn!(%status, stderr = %stderr.trim(), "Engine exited with failure");
                    Err(ConvertError::Conversion(format!("engine exited with {}", status)))
                }
            }
            _ = tokio::time::sleep(self.timeout) => {
                tracing::warn!(
                    timeout = ?self.timeout,
                    input = %pending.input.display(),
                    "Engine timed out, killing child"
                );
                #[cfg(unix)]
                if let Some(pid) = engine_pid {
                    kill_process_group(pid);
                }
                if let Err(e) = child.kill().await {
                    tracing::error!(error = %e, pid = ?child.id(), "Failed to kill timed-out engine");
                }
                if let Some(task) = stderr_task {
                    task.abort();
                }
                Err(ConvertError::Timeout(self.timeout))
            }
        }
    }
}

/// Locate the engine's output: `<stem>.pdf` first, then any `*.pdf` in the
/// workspace. Safe only while a workspace holds exactly one conversion.
pub async fn discover_output(input: &Path, output_dir: &Path) -> Result<PathBuf> {
    let mut expected_name = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    expected_name.push(".");
    expected_name.push(OUTPUT_EXTENSION);
    let expected = output_dir.join(expected_name);

    if is_regular_file(&expected).await {
        return Ok(expected);
    }

    let mut entries = tokio::fs::read_dir(output_dir)
        .await
        .map_err(|e| ConvertError::resource(output_dir, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConvertError::resource(output_dir, e))?
    {
        let path = entry.path();
        let matches_ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(OUTPUT_EXTENSION));

        if matches_ext && is_regular_file(&path).await {
            tracing::info!(
                expected = %expected.display(),
                found = %path.display(),
                "Engine chose a different output name"
            );
            return Ok(path);
        }
    }

    Err(ConvertError::OutputMissing(output_dir.to_path_buf()))
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created at spawn
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::error!(pgid, error = %err, "Failed to kill engine process group");
        }
    }
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
