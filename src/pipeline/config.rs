//! Pipeline configuration for the orchestrator.
//!
//! Resolves every path the pipeline touches (workflow document, dataset
//! directories, config and command files, model checkpoints) from a single
//! root directory, with environment-variable and builder overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::caption::DEFAULT_TRIGGER_WORD;
use crate::template::{ModelPaths, DATASET_JSONL_NAME};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory the stage commands run in.
    pub root_dir: PathBuf,
    /// Directory holding the raw training images.
    pub raw_dataset_dir: PathBuf,
    /// Directory the captioner writes captions to and the trainer reads from.
    pub caption_dir: PathBuf,
    /// Directory for training outputs.
    pub output_dir: PathBuf,
    /// ComfyUI workflow document driving the captioner.
    pub workflow_path: PathBuf,
    /// Shell script that launches the captioner.
    pub captioner_script: PathBuf,

    /// Trigger word injected into every caption. Never empty after
    /// resolution; an empty override falls back to the default.
    pub trigger_word: String,

    /// Dataset-image TOML consumed by the trainer toolchain.
    pub dataset_config_path: PathBuf,
    /// Trainer TOML with checkpoint/encoder paths.
    pub trainer_config_path: PathBuf,
    /// Command-argument file for the latents-cache tool.
    pub cache_latents_args: PathBuf,
    /// Command-argument file for the text-encoder-output-cache tool.
    pub cache_text_encoder_args: PathBuf,
    /// Command-argument file for the network-training tool.
    pub train_network_args: PathBuf,
    /// Resolved model checkpoint paths.
    pub models: ModelPaths,

    /// Timeout applied to each external-process stage.
    pub stage_timeout: Duration,
    /// Bound on concurrently rewritten caption files.
    pub caption_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_root(".")
    }
}

impl PipelineConfig {
    /// Creates a configuration with the conventional layout under `root`:
    /// `dataset/` for images, `input/` for captions, `configs/` and
    /// `commands/` for the trainer files, `models/` for checkpoints.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            raw_dataset_dir: root.join("dataset"),
            caption_dir: root.join("input"),
            output_dir: root.join("output"),
            workflow_path: root
                .join("comfyui-workflows")
                .join("GenTextForImages.json"),
            captioner_script: root.join("run_comfy.sh"),
            trigger_word: DEFAULT_TRIGGER_WORD.to_string(),
            dataset_config_path: root.join("configs").join("dataset.toml"),
            trainer_config_path: root.join("configs").join("trainer.toml"),
            cache_latents_args: root.join("commands").join("cache_latents.args"),
            cache_text_encoder_args: root
                .join("commands")
                .join("cache_text_encoder_outputs.args"),
            train_network_args: root.join("commands").join("train_network.args"),
            models: ModelPaths::under(&root.join("models")),
            stage_timeout: Duration::from_secs(3600),
            caption_concurrency: 8,
            root_dir: root,
        }
    }

    /// Creates configuration from environment variables, on top of the
    /// conventional layout.
    ///
    /// # Environment Variables
    ///
    /// - `LORAFORGE_ROOT`: Pipeline root directory (default: `.`)
    /// - `LORAFORGE_DATASET_DIR`: Raw image directory override
    /// - `LORAFORGE_CAPTION_DIR`: Caption directory override
    /// - `LORAFORGE_WORKFLOW`: Workflow document override
    /// - `LORAFORGE_TRIGGER_WORD`: Trigger word override
    /// - `LORAFORGE_STAGE_TIMEOUT_SECS`: Per-stage timeout in seconds (default: 3600)
    /// - `LORAFORGE_CAPTION_CONCURRENCY`: Caption rewrite concurrency (default: 8)
    pub fn from_env() -> Result<Self, ConfigError> {
        let root = std::env::var("LORAFORGE_ROOT").unwrap_or_else(|_| ".".to_string());
        let mut config = Self::for_root(root);

        if let Ok(val) = std::env::var("LORAFORGE_DATASET_DIR") {
            config.raw_dataset_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("LORAFORGE_CAPTION_DIR") {
            config.caption_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("LORAFORGE_WORKFLOW") {
            config.workflow_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("LORAFORGE_TRIGGER_WORD") {
            config = config.with_trigger_word(val);
        }

        if let Ok(val) = std::env::var("LORAFORGE_STAGE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "LORAFORGE_STAGE_TIMEOUT_SECS")?;
            config.stage_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("LORAFORGE_CAPTION_CONCURRENCY") {
            config.caption_concurrency = parse_env_value(&val, "LORAFORGE_CAPTION_CONCURRENCY")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the trigger word, falling back to the default when the override
    /// is empty or whitespace.
    pub fn with_trigger_word(mut self, trigger_word: impl Into<String>) -> Self {
        let word = trigger_word.into();
        let word = word.trim();
        self.trigger_word = if word.is_empty() {
            DEFAULT_TRIGGER_WORD.to_string()
        } else {
            word.to_string()
        };
        self
    }

    /// Sets the raw image directory.
    pub fn with_raw_dataset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw_dataset_dir = dir.into();
        self
    }

    /// Sets the per-stage timeout.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Sets the caption rewrite concurrency bound.
    pub fn with_caption_concurrency(mut self, concurrency: usize) -> Self {
        self.caption_concurrency = concurrency;
        self
    }

    /// Path of the caption dataset jsonl the captioner is expected to emit.
    pub fn dataset_jsonl_path(&self) -> PathBuf {
        self.caption_dir.join(DATASET_JSONL_NAME)
    }

    /// The three command-argument files, in stage order.
    pub fn command_arg_files(&self) -> [&Path; 3] {
        [
            &self.cache_latents_args,
            &self.cache_text_encoder_args,
            &self.train_network_args,
        ]
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger_word.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "trigger_word must not be empty".to_string(),
            ));
        }

        if self.caption_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "caption_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.stage_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "stage_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parses an environment variable value with a typed error.
fn parse_env_value<T: std::str::FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
