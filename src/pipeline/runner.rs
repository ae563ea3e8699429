//! Advisory Runner - sequential stage execution for one pipeline run
//!
//! ```text
//! 1. Validate input (malformed input never creates a record)
//! 2. Create record: Running, current stage = first stage
//! 3. For each stage, in order:
//!      a. write current stage
//!      b. invoke agent (optionally bounded by the stage timeout)
//!      c. write stage log, keep output for scoring
//!      d. on error: stop, mark Failed, return the error
//! 4. Score: risk, shelf life, recommendation
//! 5. Write Completed record with the Advisory
//! ```
//!
//! Stages never overlap within a run. Separate runs share nothing but the
//! store and the invoker.

use super::PipelineError;
use crate::agents::AgentInvoker;
use crate::scoring::{advisory_formatter_tool, crop_risk_tool, shelf_life_tool};
use crate::store::ProgressStore;
use crate::types::{
    Advisory, FarmerInput, PipelineId, PipelineRecord, Stage, StageInput, StageLogEntry,
    StageOutput,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default per-stage timeout.
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 30;

/// Placeholder market volatility until a real price feed exists.
pub const DEFAULT_PRICE_VOLATILITY: f64 = 15.0;

/// Placeholder; produce is assumed freshly harvested.
pub const DEFAULT_HOURS_SINCE_HARVEST: f64 = 0.0;

/// Runner tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// `None` lets a hung agent stall its pipeline indefinitely
    pub stage_timeout: Option<Duration>,
    pub price_volatility: f64,
    pub hours_since_harvest: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stage_timeout: Some(Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS)),
            price_volatility: DEFAULT_PRICE_VOLATILITY,
            hours_since_harvest: DEFAULT_HOURS_SINCE_HARVEST,
        }
    }
}

/// Runs advisory pipelines against a shared invoker and progress store.
#[derive(Clone)]
pub struct AdvisoryRunner {
    invoker: Arc<dyn AgentInvoker>,
    store: Arc<dyn ProgressStore>,
    settings: PipelineSettings,
}

impl AdvisoryRunner {
    pub fn new(
        invoker: Arc<dyn AgentInvoker>,
        store: Arc<dyn ProgressStore>,
        settings: PipelineSettings,
    ) -> Self {
        info!(
            agents = invoker.backend_name(),
            store = store.backend_name(),
            timeout = ?settings.stage_timeout,
            "Advisory runner initialized"
        );
        Self {
            invoker,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }

    pub const fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn agent_backend(&self) -> &'static str {
        self.invoker.backend_name()
    }

    /// Run every stage for `pipeline_id` and return the final Advisory.
    ///
    /// All intermediate state is observable through the progress store. Any
    /// stage failure is terminal: the record is marked `Failed` once and the
    /// error is returned.
    ///
    /// The stages run on their own task, so dropping this future detaches
    /// the run instead of cancelling it; the record still reaches a terminal
    /// status.
    pub async fn run(
        &self,
        input: FarmerInput,
        pipeline_id: PipelineId,
    ) -> Result<Advisory, PipelineError> {
        let handle = self.spawn(input, pipeline_id.clone())?;
        match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                let cause = PipelineError::Aborted {
                    pipeline_id,
                    reason: join_err.to_string(),
                };
                self.fail_abandoned(&cause);
                Err(cause)
            }
        }
    }

    /// Claim the id, then run the stages on a background task.
    ///
    /// Malformed input and ids owned by another run are rejected before
    /// anything is spawned, and the record is readable as soon as this
    /// returns.
    pub fn spawn(
        &self,
        input: FarmerInput,
        pipeline_id: PipelineId,
    ) -> Result<JoinHandle<Result<Advisory, PipelineError>>, PipelineError> {
        let record = self.begin(input, pipeline_id)?;
        let runner = self.clone();
        Ok(tokio::spawn(async move { runner.drive(record).await }))
    }

    /// Validate and atomically claim the id with a Running record.
    ///
    /// The claim makes this run the record's only writer until it reaches a
    /// terminal status.
    fn begin(
        &self,
        input: FarmerInput,
        pipeline_id: PipelineId,
    ) -> Result<PipelineRecord, PipelineError> {
        input.validate()?;

        let mut record = PipelineRecord::new(pipeline_id, input);
        record.start(Utc::now())?;

        // Nothing is written when the claim is refused or fails
        if let Some(existing) = self.store.create_record(&record)? {
            let pipeline_id = record.pipeline_id;
            warn!(pipeline_id = %pipeline_id, status = %existing.status, "Pipeline id already taken");
            return Err(if existing.status.is_terminal() {
                PipelineError::AlreadyFinished {
                    pipeline_id,
                    status: existing.status,
                }
            } else {
                PipelineError::AlreadyRunning { pipeline_id }
            });
        }

        info!(pipeline_id = %record.pipeline_id, crop = %record.input.crop, "Pipeline started");
        Ok(record)
    }

    async fn drive(&self, mut record: PipelineRecord) -> Result<Advisory, PipelineError> {
        let started = Instant::now();

        let result = match self.execute(&mut record).await {
            Ok(advisory) => self.finish(&record, advisory),
            Err(e) => Err(e),
        };

        match result {
            Ok(advisory) => {
                info!(
                    pipeline_id = %record.pipeline_id,
                    risk_score = advisory.risk_score,
                    elapsed = ?started.elapsed(),
                    "Pipeline completed"
                );
                Ok(advisory)
            }
            Err(e) => {
                self.mark_failed(&mut record, &e);
                Err(e)
            }
        }
    }

    async fn execute(&self, record: &mut PipelineRecord) -> Result<Advisory, PipelineError> {
        let stage_input = StageInput::from(&record.input);
        let mut results: HashMap<Stage, StageOutput> = HashMap::with_capacity(Stage::ALL.len());

        for stage in Stage::ALL {
            record.enter_stage(stage)?;
            self.store.put_record(record)?;

            let stage_started = Instant::now();
            info!(pipeline_id = %record.pipeline_id, stage = %stage, "Invoking agent");

            let output = self.invoke_stage(stage, &stage_input).await?;
            debug!(pipeline_id = %record.pipeline_id, stage = %stage, output = ?output, "Agent output");

            let entry = StageLogEntry {
                agent: stage,
                output: output.clone(),
                timestamp: Utc::now(),
            };
            self.store.put_stage_log(&record.pipeline_id, &entry)?;
            results.insert(stage, output);

            info!(
                pipeline_id = %record.pipeline_id,
                stage = %stage,
                elapsed = ?stage_started.elapsed(),
                "Stage complete"
            );
        }

        assemble_advisory(&record.input, &results, &self.settings)
    }

    async fn invoke_stage(
        &self,
        stage: Stage,
        input: &StageInput,
    ) -> Result<StageOutput, PipelineError> {
        let call = self.invoker.invoke(stage, input);

        let result = match self.settings.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| PipelineError::StageTimeout { stage, limit })?,
            None => call.await,
        };

        result.map_err(|source| PipelineError::Agent { stage, source })
    }

    /// Write the Completed record. On failure the caller still holds a
    /// Running record and can mark it Failed.
    fn finish(&self, record: &PipelineRecord, advisory: Advisory) -> Result<Advisory, PipelineError> {
        let mut done = record.clone();
        done.complete(advisory.clone(), Utc::now())?;
        self.store.put_record(&done)?;
        Ok(advisory)
    }

    fn mark_failed(&self, record: &mut PipelineRecord, cause: &PipelineError) {
        warn!(pipeline_id = %record.pipeline_id, error = %cause, "Pipeline failed");

        if let Err(e) = record.fail(cause.to_string(), Utc::now()) {
            error!(pipeline_id = %record.pipeline_id, error = %e, "Cannot mark pipeline failed");
            return;
        }
        if let Err(e) = self.store.put_record(record) {
            error!(pipeline_id = %record.pipeline_id, error = %e, "Failed to persist failed status");
        }
    }

    /// Mark the record Failed after its task died without reaching a
    /// terminal status.
    fn fail_abandoned(&self, cause: &PipelineError) {
        let PipelineError::Aborted { pipeline_id, .. } = cause else {
            return;
        };
        match self.store.get_record(pipeline_id) {
            Ok(Some(mut record)) if !record.status.is_terminal() => {
                self.mark_failed(&mut record, cause);
            }
            Ok(_) => {}
            Err(e) => {
                error!(pipeline_id = %pipeline_id, error = %e, "Cannot read aborted pipeline");
            }
        }
    }
}

// ============================================================================
// Scoring
// ============================================================================

fn stage_output(
    results: &HashMap<Stage, StageOutput>,
    stage: Stage,
) -> Result<&StageOutput, PipelineError> {
    results.get(&stage).ok_or(PipelineError::MissingStageOutput(stage))
}

fn number_field(output: &StageOutput, stage: Stage, field: &'static str) -> Result<f64, PipelineError> {
    output
        .number(field)
        .ok_or(PipelineError::MissingOutputField { stage, field })
}

fn text_field<'a>(
    output: &'a StageOutput,
    stage: Stage,
    field: &'static str,
) -> Result<&'a str, PipelineError> {
    output
        .text(field)
        .ok_or(PipelineError::MissingOutputField { stage, field })
}

/// Build the Advisory from the stage outputs of a finished run.
///
/// Reads Weather Intelligence (`weatherScore`, `forecast`), Decision
/// Orchestrator (`optimizedYield`, `priceTrend`) and Explanation & Compliance
/// (`reasoning`, `confidence`).
pub fn assemble_advisory(
    input: &FarmerInput,
    results: &HashMap<Stage, StageOutput>,
    settings: &PipelineSettings,
) -> Result<Advisory, PipelineError> {
    let weather = stage_output(results, Stage::WeatherIntelligence)?;
    let weather_score = number_field(weather, Stage::WeatherIntelligence, "weatherScore")?;
    let forecast = text_field(weather, Stage::WeatherIntelligence, "forecast")?;

    let decision = stage_output(results, Stage::DecisionOrchestrator)?;
    let yield_expectation = text_field(decision, Stage::DecisionOrchestrator, "optimizedYield")?;
    let price_trend = text_field(decision, Stage::DecisionOrchestrator, "priceTrend")?;

    let explanation = stage_output(results, Stage::ExplanationCompliance)?;
    let reasoning = text_field(explanation, Stage::ExplanationCompliance, "reasoning")?;
    let confidence = number_field(explanation, Stage::ExplanationCompliance, "confidence")?;

    let risk_score = crop_risk_tool(weather_score, &input.soil_type, settings.price_volatility);
    let shelf_life = shelf_life_tool(input.temperature, input.humidity, settings.hours_since_harvest);
    let recommendation = advisory_formatter_tool(&input.crop, risk_score, shelf_life, forecast);

    debug!(weather_score, risk_score, shelf_life, "Advisory scored");

    Ok(Advisory {
        yield_expectation: yield_expectation.to_string(),
        price_trend: price_trend.to_string(),
        risk_score,
        recommendation,
        reasoning: reasoning.to_string(),
        confidence,
        shelf_life,
    })
}
