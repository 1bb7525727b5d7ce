//! Analysis synthesis: the model writes a script for the query, the script
//! runs in a child process, and its printed insights and chart come back.
//!
//! Every run writes the same chart path, so executions are serialized.
//! Interpretation and search keep running concurrently.

mod runner;
mod sanitize;

pub use runner::{ScriptOutput, ScriptRunner};
pub use sanitize::sanitize_code;

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parcel_core::{AnalysisConfig, Context, Dataset, Error, ModelProvider, Parameters, Query, Result};
use tempfile::{Builder, NamedTempFile};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::prompts::{ANALYSIS_SYSTEM, analysis_prompt};
use crate::retry::RetryPolicy;

/// Chart file extensions collected after a run.
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Where a dataset built in memory is written for scripts to reload,
/// relative to the work directory.
const MATERIALIZED_DATASET: &str = ".parcel/dataset.json";

/// Sanitized script text, fixed once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    source: String,
}

impl GeneratedCode {
    pub(crate) fn new(source: &str) -> Self {
        Self {
            source: source.to_owned(),
        }
    }

    /// Script text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Outcome of one successful analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Script that ran
    pub code: GeneratedCode,
    /// Printed insights
    pub stdout: String,
    /// Warnings the script wrote to stderr
    pub stderr: String,
    /// Exit status, always 0 here
    pub exit_status: i32,
    /// The fixed chart path, when the chart exists
    pub plot_path: Option<PathBuf>,
    /// Images in the plot directory written or changed by this run, sorted
    pub plot_files: Vec<PathBuf>,
    /// Script run time
    pub duration: Duration,
}

/// Generates and runs analysis scripts against the shared dataset.
pub struct AnalysisSynthesizer {
    provider: Arc<dyn ModelProvider>,
    dataset: Arc<Dataset>,
    reload_path: PathBuf,
    config: AnalysisConfig,
    retry: RetryPolicy,
    runner: ScriptRunner,
    execution: Mutex<()>,
}

impl AnalysisSynthesizer {
    /// Synthesizer with the default retry policy.
    pub fn new(provider: Arc<dyn ModelProvider>, dataset: Arc<Dataset>, config: AnalysisConfig) -> Self {
        let runner = ScriptRunner::from_config(&config);
        let reload_path = dataset
            .source()
            .map_or_else(|| PathBuf::from(MATERIALIZED_DATASET), Path::to_path_buf);
        Self {
            provider,
            dataset,
            reload_path,
            config,
            retry: RetryPolicy::default(),
            runner,
            execution: Mutex::new(()),
        }
    }

    /// Replaces the retry policy for model calls.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Settings in use.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Path generated scripts reload the dataset from: the file it was
    /// loaded from, or a copy in the work directory for in-memory data.
    pub fn reload_path(&self) -> &Path {
        &self.reload_path
    }

    /// Asks the model for a script answering `query`.
    ///
    /// # Errors
    /// Provider errors after retries, or `Error::CodeGeneration` when the reply
    /// holds no code.
    pub async fn generate(&self, query: &str, parameters: &Parameters) -> Result<GeneratedCode> {
        let prompt = Query::new(analysis_prompt(
            query,
            parameters,
            &self.dataset,
            &self.reload_path,
            &self.config,
        ));
        let context = Context::new(ANALYSIS_SYSTEM);
        debug!("Analysis prompt: {}", prompt.text);

        let response = self
            .retry
            .run("analysis generation", || self.provider.generate(&prompt, &context))
            .await?;
        debug!(
            "Generated analysis reply ({} tokens): {}",
            response.tokens_used.total(),
            response.text
        );

        let code = sanitize_code(&response.text, self.config.strip_marker.as_deref())?;
        info!("Generated {} lines of analysis code", code.source().lines().count());
        Ok(code)
    }

    /// Runs `code` and collects its output and chart.
    ///
    /// Any chart left by an earlier run is removed first, so a chart present
    /// afterwards was written by this run. Other images count only when the
    /// run created or modified them.
    ///
    /// # Errors
    /// - `Error::Timeout` if the script exceeds its time limit
    /// - `Error::Execution` with verbatim stderr on a non-zero exit
    /// - `Error::ArtifactMissing` if the chart is required but absent
    pub async fn execute(&self, code: &GeneratedCode) -> Result<AnalysisResult> {
        let _guard = self.execution.lock().await;

        let work_dir = self.runner.working_dir();
        fs::create_dir_all(work_dir).await?;
        let plot_dir = self.config.plot_dir_path();
        fs::create_dir_all(&plot_dir).await?;
        let plot_path = self.config.plot_path();

        match fs::remove_file(&plot_path).await {
            Ok(()) => debug!("Removed stale chart {}", plot_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        if self.dataset.source().is_none() {
            self.materialize_dataset(work_dir).await?;
        }
        let before: HashMap<PathBuf, Option<SystemTime>> =
            list_images(&plot_dir).await?.into_iter().collect();

        let work_dir = fs::canonicalize(work_dir).await?;
        let script = write_script(&work_dir, code)?;
        let output = self.runner.run(script.path()).await?;
        drop(script);

        if !output.success {
            warn!("Analysis script failed with status {}", output.exit_code);
            return Err(Error::Execution {
                status: output.exit_code,
                stderr: output.stderr,
            });
        }

        let chart_exists = fs::try_exists(&plot_path).await.unwrap_or(false);
        if !chart_exists && self.config.require_plot {
            return Err(Error::ArtifactMissing(plot_path));
        }

        let plot_files: Vec<PathBuf> = list_images(&plot_dir)
            .await?
            .into_iter()
            .filter(|(path, modified)| before.get(path) != Some(modified))
            .map(|(path, _)| path)
            .collect();
        info!(
            "Analysis finished in {:?} with {} chart(s)",
            output.duration,
            plot_files.len()
        );

        Ok(AnalysisResult {
            code: code.clone(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_status: output.exit_code,
            plot_path: chart_exists.then_some(plot_path),
            plot_files,
            duration: output.duration,
        })
    }

    /// `generate` followed by `execute`.
    ///
    /// # Errors
    /// Any error from either step.
    pub async fn synthesize(&self, query: &str, parameters: &Parameters) -> Result<AnalysisResult> {
        let code = self.generate(query, parameters).await?;
        self.execute(&code).await
    }

    /// Writes an in-memory dataset to the work directory.
    async fn materialize_dataset(&self, work_dir: &Path) -> Result<()> {
        let target = work_dir.join(&self.reload_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, serde_json::to_vec(&self.dataset.to_json_records())?).await?;
        debug!("Wrote dataset copy to {}", target.display());
        Ok(())
    }
}

/// Writes `code` to a uniquely named script in `dir`, removed on drop.
fn write_script(dir: &Path, code: &GeneratedCode) -> Result<NamedTempFile> {
    let mut script = Builder::new()
        .prefix("parcel-analysis-")
        .suffix(".py")
        .tempfile_in(dir)?;
    script.write_all(code.source().as_bytes())?;
    script.write_all(b"\n")?;
    script.flush()?;
    Ok(script)
}

/// Images in `dir` with their modification times, sorted by path.
async fn list_images(dir: &Path) -> Result<Vec<(PathBuf, Option<SystemTime>)>> {
    let mut images = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if !is_image {
            continue;
        }
        let metadata = entry.metadata().await?;
        if metadata.is_file() {
            images.push((path, metadata.modified().ok()));
        }
    }
    images.sort();
    Ok(images)
}
