//! The sequential stage machine driving dataset preparation and training.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::caption::CaptionDatasetEditor;
use crate::error::{CaptionError, TemplateError, WorkflowError};
use crate::template::{self, rules};
use crate::utils::image_files;
use crate::workflow;

use super::config::{ConfigError, PipelineConfig};
use super::process::{self, CommandSpec, ProcessError};
use super::stage::{PipelineOutcome, PipelineReport, Stage, StageReport};

/// Errors that can occur while constructing or driving the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors that fail a single stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Caption(#[from] CaptionError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    /// An expected output file is absent even though the external process
    /// reported success.
    #[error("Missing artifact: {0}")]
    MissingArtifact(PathBuf),

    /// The captioner left some images without a caption file.
    #[error("{missing} of {expected} caption files missing after captioner (e.g. {example})")]
    IncompleteCaptions {
        missing: usize,
        expected: usize,
        example: PathBuf,
    },

    /// Some caption files could not be rewritten.
    #[error("{failed} caption files failed to rewrite (e.g. {example})")]
    IncompleteRewrite { failed: usize, example: PathBuf },

    /// The external tool exited with a failure status.
    #[error("External process exited with code {exit_code}")]
    ProcessFailure { exit_code: i32, stderr: String },

    /// The pipeline was cancelled before this stage started.
    #[error("Pipeline cancelled")]
    Cancelled,
}

impl StageError {
    /// Captured error-stream content, when the failure came from an external
    /// process.
    fn stderr(&self) -> Option<String> {
        match self {
            StageError::ProcessFailure { stderr, .. } if !stderr.is_empty() => {
                Some(stderr.clone())
            }
            _ => None,
        }
    }
}

/// Handle for cancelling an in-flight pipeline run.
///
/// Cancellation terminates the currently running external process and skips
/// the remaining stages; side effects of completed stages are not undone.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Drives the stages `PatchWorkflow → RunCaptioner → RewriteCaptions →
/// PatchConfigs → CacheLatents → CacheTextEncoderOutputs → TrainNetwork`
/// strictly in order, short-circuiting on the first failure.
///
/// There is no rollback: file-system edits made by completed stages stay in
/// place when a later stage fails.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator with a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Ok(Self {
            config,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        })
    }

    /// Returns a handle that cancels this orchestrator's runs.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the full pipeline once and reports every stage's outcome.
    pub async fn run(&self) -> PipelineReport {
        let run_id = format!("run-{}", Uuid::new_v4());
        let started_at = Utc::now();
        info!(
            "Starting pipeline {} (trigger word '{}', root {})",
            run_id,
            self.config.trigger_word,
            self.config.root_dir.display()
        );

        let mut stages = Vec::with_capacity(Stage::ALL.len());
        let mut outcome = PipelineOutcome::Succeeded;

        let mut order = Stage::ALL.iter().copied();
        for stage in &mut order {
            let start = Instant::now();
            info!("Stage {} starting", stage);

            let result = if self.is_cancelled() {
                Err(StageError::Cancelled)
            } else {
                self.run_stage(stage).await
            };
            let duration = start.elapsed();

            match result {
                Ok(detail) => {
                    info!("Stage {} succeeded in {:?}: {}", stage, duration, detail);
                    stages.push(StageReport::succeeded(stage, duration, detail));
                }
                Err(e) => {
                    error!("Stage {} failed after {:?}: {}", stage, duration, e);
                    if let Some(stderr) = e.stderr() {
                        error!("Stage {} stderr:\n{}", stage, stderr);
                    }
                    outcome = PipelineOutcome::Failed {
                        stage,
                        cause: e.to_string(),
                    };
                    stages.push(StageReport::failed(stage, duration, e.to_string(), e.stderr()));
                    break;
                }
            }
        }

        // Remaining stages never ran.
        for stage in order {
            stages.push(StageReport::skipped(stage));
        }

        let report = PipelineReport {
            run_id,
            started_at,
            completed_at: Utc::now(),
            stages,
            outcome,
        };

        match &report.outcome {
            PipelineOutcome::Succeeded => info!("Pipeline {} succeeded", report.run_id),
            PipelineOutcome::Failed { stage, cause } => {
                error!("Pipeline {} failed at {}: {}", report.run_id, stage, cause)
            }
        }

        report
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    async fn run_stage(&self, stage: Stage) -> Result<String, StageError> {
        match stage {
            Stage::PatchWorkflow => self.patch_workflow(),
            Stage::RunCaptioner => self.run_captioner().await,
            Stage::RewriteCaptions => self.rewrite_captions().await,
            Stage::PatchConfigs => self.patch_configs(),
            Stage::CacheLatents => self.cache_latents().await,
            Stage::CacheTextEncoderOutputs => self.cache_text_encoder_outputs().await,
            Stage::TrainNetwork => self.train_network().await,
        }
    }

    fn patch_workflow(&self) -> Result<String, StageError> {
        let patched = workflow::patch(
            &self.config.workflow_path,
            &self.config.raw_dataset_dir,
            &self.config.caption_dir,
        )?;
        Ok(format!("patched {patched} workflow nodes"))
    }

    async fn run_captioner(&self) -> Result<String, StageError> {
        let spec = CommandSpec::new("bash")
            .arg(self.config.captioner_script.to_string_lossy())
            .current_dir(&self.config.root_dir);

        let output = self.run_external(&spec).await?;

        // The exit status alone is not trusted: every image must have a
        // caption before the trainer stages may run.
        let images = image_files(&self.config.raw_dataset_dir);
        if images.is_empty() {
            warn!(
                "No images found in {}",
                self.config.raw_dataset_dir.display()
            );
        }

        let missing: Vec<PathBuf> = images
            .iter()
            .filter_map(|image| {
                let stem = image.file_stem()?;
                let caption = self
                    .config
                    .caption_dir
                    .join(stem)
                    .with_extension("txt");
                (!caption.is_file()).then_some(caption)
            })
            .collect();

        if let Some(example) = missing.first() {
            return Err(StageError::IncompleteCaptions {
                missing: missing.len(),
                expected: images.len(),
                example: example.clone(),
            });
        }

        Ok(format!(
            "captioned {} images ({} bytes stdout)",
            images.len(),
            output.stdout.len()
        ))
    }

    async fn rewrite_captions(&self) -> Result<String, StageError> {
        let editor = CaptionDatasetEditor::new(&self.config.trigger_word)
            .with_max_concurrent_files(self.config.caption_concurrency);
        let summary = editor.apply_concurrent(&self.config.caption_dir).await?;

        if let Some(failure) = summary.failures.first() {
            return Err(StageError::IncompleteRewrite {
                failed: summary.failures.len(),
                example: failure.path.clone(),
            });
        }

        Ok(format!("rewrote {} caption files", summary.files_rewritten))
    }

    fn patch_configs(&self) -> Result<String, StageError> {
        let dataset_jsonl = self.config.dataset_jsonl_path();
        let dataset_rules = rules::dataset_config_rules(&dataset_jsonl);
        let trainer_rules =
            rules::trainer_config_rules(&self.config.dataset_config_path, &self.config.models);
        let command_rules =
            rules::command_file_rules(&self.config.dataset_config_path, &self.config.models);

        let mut replaced = 0;
        replaced += template::rewrite_file(&self.config.dataset_config_path, &dataset_rules)?;
        replaced += template::rewrite_file(&self.config.trainer_config_path, &trainer_rules)?;
        for path in self.config.command_arg_files() {
            replaced += template::rewrite_file(path, &command_rules)?;
        }

        Ok(format!("replaced {replaced} directive lines across 5 files"))
    }

    async fn cache_latents(&self) -> Result<String, StageError> {
        // The captioner is expected to have emitted the dataset jsonl; the
        // cache tools read it through the patched dataset config.
        let jsonl = self.config.dataset_jsonl_path();
        if !jsonl.is_file() {
            return Err(StageError::MissingArtifact(jsonl));
        }

        self.run_arg_file_stage(&self.config.cache_latents_args).await
    }

    async fn cache_text_encoder_outputs(&self) -> Result<String, StageError> {
        self.run_arg_file_stage(&self.config.cache_text_encoder_args)
            .await
    }

    async fn train_network(&self) -> Result<String, StageError> {
        self.run_arg_file_stage(&self.config.train_network_args).await
    }

    async fn run_arg_file_stage(&self, arg_file: &std::path::Path) -> Result<String, StageError> {
        let spec = CommandSpec::from_arg_file(arg_file)?.current_dir(&self.config.root_dir);
        let output = self.run_external(&spec).await?;
        Ok(format!(
            "'{}' exited 0 ({} bytes stdout)",
            spec.display_line(),
            output.stdout.len()
        ))
    }

    async fn run_external(
        &self,
        spec: &CommandSpec,
    ) -> Result<process::ProcessOutput, StageError> {
        let output =
            process::run(spec, self.config.stage_timeout, self.cancel_rx.clone()).await?;

        if !output.is_success() {
            return Err(StageError::ProcessFailure {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }
}
