//! Pipeline stages and per-run reporting.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ordered unit of the training-preparation pipeline.
///
/// Stages form a strict total order; a stage never begins before its
/// predecessor reports success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Point the captioner workflow at the right directories.
    PatchWorkflow,
    /// Run the external captioning tool.
    RunCaptioner,
    /// Inject the trigger word into the generated captions.
    RewriteCaptions,
    /// Substitute resolved paths into the trainer config/command files.
    PatchConfigs,
    /// Run the external latents-cache tool.
    CacheLatents,
    /// Run the external text-encoder-output-cache tool.
    CacheTextEncoderOutputs,
    /// Run the external network-training tool.
    TrainNetwork,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 7] = [
        Stage::PatchWorkflow,
        Stage::RunCaptioner,
        Stage::RewriteCaptions,
        Stage::PatchConfigs,
        Stage::CacheLatents,
        Stage::CacheTextEncoderOutputs,
        Stage::TrainNetwork,
    ];

    /// The stage that runs after this one, if any.
    pub fn successor(self) -> Option<Stage> {
        let idx = Stage::ALL.iter().position(|s| *s == self)?;
        Stage::ALL.get(idx + 1).copied()
    }

    /// Stable stage name used in logs and reports.
    pub fn name(self) -> &'static str {
        match self {
            Stage::PatchWorkflow => "patch_workflow",
            Stage::RunCaptioner => "run_captioner",
            Stage::RewriteCaptions => "rewrite_captions",
            Stage::PatchConfigs => "patch_configs",
            Stage::CacheLatents => "cache_latents",
            Stage::CacheTextEncoderOutputs => "cache_text_encoder_outputs",
            Stage::TrainNetwork => "train_network",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of a single stage within one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed successfully.
    Succeeded,
    /// Stage failed; the pipeline stopped here.
    Failed,
    /// Stage never ran because an earlier stage failed.
    Skipped,
}

/// Outcome of one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    /// The stage this report describes.
    pub stage: Stage,
    /// Final status.
    pub status: StageStatus,
    /// Wall-clock duration (zero for skipped stages).
    pub duration: Duration,
    /// Human-readable summary of what the stage did.
    pub detail: Option<String>,
    /// Error message if the stage failed.
    pub error: Option<String>,
    /// Captured error stream of the failing external process, verbatim.
    pub stderr: Option<String>,
}

impl StageReport {
    /// Creates a report for a successful stage.
    pub fn succeeded(stage: Stage, duration: Duration, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Succeeded,
            duration,
            detail: Some(detail.into()),
            error: None,
            stderr: None,
        }
    }

    /// Creates a report for a failed stage.
    pub fn failed(
        stage: Stage,
        duration: Duration,
        error: impl Into<String>,
        stderr: Option<String>,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            duration,
            detail: None,
            error: Some(error.into()),
            stderr,
        }
    }

    /// Creates a report for a stage skipped due to an earlier failure.
    pub fn skipped(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            duration: Duration::ZERO,
            detail: None,
            error: None,
            stderr: None,
        }
    }
}

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum PipelineOutcome {
    /// Every stage completed.
    Succeeded,
    /// The named stage failed; later stages were skipped.
    Failed {
        /// The stage that failed.
        stage: Stage,
        /// Why it failed.
        cause: String,
    },
}

/// Full record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Unique identifier for this run.
    pub run_id: String,
    /// Timestamp when the run started.
    pub started_at: DateTime<Utc>,
    /// Timestamp when the run completed or aborted.
    pub completed_at: DateTime<Utc>,
    /// Per-stage outcomes in execution order.
    pub stages: Vec<StageReport>,
    /// Terminal state.
    pub outcome: PipelineOutcome,
}

impl PipelineReport {
    /// Returns true if every stage completed.
    pub fn is_success(&self) -> bool {
        self.outcome == PipelineOutcome::Succeeded
    }

    /// The failing stage, if the run failed.
    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.outcome {
            PipelineOutcome::Succeeded => None,
            PipelineOutcome::Failed { stage, .. } => Some(*stage),
        }
    }

    /// The report for a given stage, if it was recorded.
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }
}
