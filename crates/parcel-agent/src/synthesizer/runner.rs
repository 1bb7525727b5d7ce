//! Child-process execution of generated scripts.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use parcel_core::{AnalysisConfig, Error, Result};
use tokio::process::Command;
use tokio::time::timeout;

/// Result of running a script
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    /// Exit code, `-1` when the process was killed by a signal
    pub exit_code: i32,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Wall-clock run time
    pub duration: Duration,
    /// Whether the exit code was 0
    pub success: bool,
}

/// Runs `interpreter [args] <script>` inside a working directory.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    interpreter: String,
    args: Vec<String>,
    working_dir: PathBuf,
    limit: Duration,
}

impl ScriptRunner {
    /// Runner configured from the `[analysis]` section.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            args: config.interpreter_args.clone(),
            working_dir: config.work_dir.clone(),
            limit: config.timeout(),
        }
    }

    /// Directory scripts run in.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Runs `script` with stdin closed and output captured.
    ///
    /// A non-zero exit is reported in the output, not as an error. The child
    /// is killed if the limit passes.
    ///
    /// # Errors
    /// `Error::Timeout` when the limit is exceeded, `Error::Other` when the
    /// interpreter cannot be started.
    pub async fn run(&self, script: &Path) -> Result<ScriptOutput> {
        let start = Instant::now();

        tracing::debug!(
            "Running {} {:?} {} in {}",
            self.interpreter,
            self.args,
            script.display(),
            self.working_dir.display()
        );

        let child = Command::new(&self.interpreter)
            .args(&self.args)
            .arg(script)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                Error::Other(format!(
                    "Failed to start interpreter '{}': {err}",
                    self.interpreter
                ))
            })?;

        let output = timeout(self.limit, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout {
                operation: "analysis script".to_owned(),
                seconds: self.limit.as_secs(),
            })??;

        let duration = start.elapsed();
        let exit_code = output.status.code().unwrap_or(-1);
        let success = output.status.success();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        tracing::debug!("Script exited with code {exit_code} in {duration:?}");
        if !success {
            tracing::debug!("Script stderr: {stderr}");
        }

        Ok(ScriptOutput {
            exit_code,
            stdout,
            stderr,
            duration,
            success,
        })
    }
}
