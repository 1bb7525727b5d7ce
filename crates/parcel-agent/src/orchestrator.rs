use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parcel_core::{Error, Intent, QueryInterpretation, Result};
use parcel_search::{EmbeddingIndex, EmbeddingProvider};
use tracing::{Instrument as _, debug, info, info_span, warn};
use uuid::Uuid;

use crate::interpreter::QueryInterpreter;
use crate::retry::RetryPolicy;
use crate::session::SessionContext;
use crate::synthesizer::{AnalysisResult, AnalysisSynthesizer};

/// Where a query is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Not started
    Idle,
    /// Waiting on the model's interpretation
    Interpreting,
    /// Ranking records
    Searching,
    /// Waiting on generated code
    Synthesizing,
    /// Running generated code
    Executing,
    /// Finished with a result
    Done,
    /// Finished with an error
    Failed,
}

impl PipelineStage {
    /// Whether moving from `self` to `next` is allowed.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Interpreting)
                | (Self::Interpreting, Self::Searching | Self::Synthesizing)
                | (Self::Synthesizing, Self::Executing)
                | (Self::Searching | Self::Executing, Self::Done)
        ) || (next == Self::Failed && !self.is_terminal())
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Checked transition.
    ///
    /// # Errors
    /// `Error::Pipeline` for a transition outside the allowed graph.
    pub fn advance(self, next: Self) -> Result<Self> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(Error::Pipeline(format!(
                "illegal stage transition {self} -> {next}"
            )))
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Interpreting => "interpreting",
            Self::Searching => "searching",
            Self::Synthesizing => "synthesizing",
            Self::Executing => "executing",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// Stage tracker for one query.
struct PipelineRun {
    stage: PipelineStage,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            stage: PipelineStage::Idle,
        }
    }

    fn advance(&mut self, next: PipelineStage) -> Result<()> {
        self.stage = self.stage.advance(next)?;
        debug!("Stage: {}", self.stage);
        Ok(())
    }

    /// Records a stage failure and hands the error back.
    fn fail(&mut self, error: Error) -> Error {
        warn!("Query failed while {}: {error}", self.stage);
        if let Ok(failed) = self.stage.advance(PipelineStage::Failed) {
            self.stage = failed;
        }
        error
    }
}

/// Records matching a search query.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// How the query was read
    pub interpretation: QueryInterpretation,
    /// Matching record positions, best first
    pub records: Vec<usize>,
    /// Similarity of each entry in `records`
    pub scores: Vec<f32>,
}

/// Result of an analysis query.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// How the query was read
    pub interpretation: QueryInterpretation,
    /// Insights printed by the script
    pub narrative: String,
    /// Chart written by the script, if any
    pub plot_path: Option<PathBuf>,
    /// Full run details
    pub result: AnalysisResult,
}

/// What a query produced, by intent.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// Ranked records
    Search(SearchOutcome),
    /// Narrative and chart
    Analysis(AnalysisOutcome),
}

impl QueryOutcome {
    /// Interpretation the outcome was routed on.
    pub fn interpretation(&self) -> &QueryInterpretation {
        match self {
            Self::Search(outcome) => &outcome.interpretation,
            Self::Analysis(outcome) => &outcome.interpretation,
        }
    }
}

/// Routes queries through interpretation to search or analysis.
///
/// Safe to share between tasks: searches and interpretations run
/// concurrently, analysis runs one at a time.
pub struct Orchestrator<E> {
    interpreter: QueryInterpreter,
    index: Arc<EmbeddingIndex<E>>,
    synthesizer: AnalysisSynthesizer,
    top_k: usize,
}

impl<E: EmbeddingProvider> Orchestrator<E> {
    /// Orchestrator over the session's provider, dataset and index.
    pub fn new(session: &SessionContext<E>) -> Self {
        let config = &session.config;
        let retry = RetryPolicy::from_config(&config.provider);

        let interpreter = QueryInterpreter::new(Arc::clone(&session.provider))
            .with_retry_policy(retry)
            .with_bedroom_enforcement(config.interpreter.enforce_bedrooms);
        let synthesizer = AnalysisSynthesizer::new(
            Arc::clone(&session.provider),
            Arc::clone(&session.dataset),
            config.analysis.clone(),
        )
        .with_retry_policy(retry);

        Self {
            interpreter,
            index: Arc::clone(&session.index),
            synthesizer,
            top_k: config.embedding.top_k,
        }
    }

    /// Runs one query end to end.
    ///
    /// # Errors
    /// Whatever stage failed: interpretation, generation or execution.
    /// A search never fails once interpreted; an unavailable index yields no
    /// records.
    pub async fn process(&self, query: &str) -> Result<QueryOutcome> {
        let query_id = Uuid::new_v4();
        let span = info_span!("query", id = %query_id);

        async {
            info!("Processing query: {query}");
            let mut run = PipelineRun::new();

            run.advance(PipelineStage::Interpreting)?;
            let interpretation = self
                .interpreter
                .interpret(query)
                .await
                .map_err(|error| run.fail(error))?;

            let outcome = match interpretation.intent {
                Intent::Search => {
                    run.advance(PipelineStage::Searching)?;
                    let hits = self
                        .index
                        .search_scored(query, &interpretation.parameters, self.top_k)
                        .await;
                    info!("Search returned {} record(s)", hits.len());
                    QueryOutcome::Search(SearchOutcome {
                        interpretation,
                        records: hits.iter().map(|hit| hit.index).collect(),
                        scores: hits.iter().map(|hit| hit.score).collect(),
                    })
                }
                Intent::Analysis => {
                    run.advance(PipelineStage::Synthesizing)?;
                    let code = self
                        .synthesizer
                        .generate(query, &interpretation.parameters)
                        .await
                        .map_err(|error| run.fail(error))?;

                    run.advance(PipelineStage::Executing)?;
                    let result = self
                        .synthesizer
                        .execute(&code)
                        .await
                        .map_err(|error| run.fail(error))?;

                    QueryOutcome::Analysis(AnalysisOutcome {
                        interpretation,
                        narrative: result.stdout.clone(),
                        plot_path: result.plot_path.clone(),
                        result,
                    })
                }
            };

            run.advance(PipelineStage::Done)?;
            Ok(outcome)
        }
        .instrument(span)
        .await
    }
}
