//! Concrete rule sets for the trainer toolchain files.
//!
//! Five files get their directive lines swapped for resolved paths before the
//! training stages run: the dataset TOML (caption jsonl location), the trainer
//! TOML (checkpoint/encoder/VAE paths) and the three command-argument files
//! driving the cache-latents, cache-text-encoder-outputs and train-network
//! invocations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::line_rewriter::RewriteRule;

/// File name of the caption dataset emitted by the captioner.
pub const DATASET_JSONL_NAME: &str = "0_dataset.jsonl";

/// Resolved model checkpoint paths substituted into the trainer files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPaths {
    /// Diffusion transformer checkpoint.
    pub dit: PathBuf,
    /// VAE checkpoint.
    pub vae: PathBuf,
    /// Text encoder checkpoint.
    pub text_encoder: PathBuf,
    /// Image encoder checkpoint.
    pub image_encoder: PathBuf,
}

impl ModelPaths {
    /// Default model layout under a `models/` directory.
    pub fn under(models_dir: &Path) -> Self {
        Self {
            dit: models_dir.join("dit.safetensors"),
            vae: models_dir.join("vae.safetensors"),
            text_encoder: models_dir.join("text_encoder.safetensors"),
            image_encoder: models_dir.join("image_encoder.safetensors"),
        }
    }
}

/// Rules for the dataset-image TOML: points the trainer at the caption jsonl
/// produced by the captioning run.
pub fn dataset_config_rules(dataset_jsonl: &Path) -> Vec<RewriteRule> {
    vec![RewriteRule::assignment(
        "image_jsonl_file",
        dataset_jsonl.display(),
    )]
}

/// Rules for the trainer TOML: dataset config plus model checkpoint paths.
///
/// Rule order is fixed and first-match-wins. `dataset_config` and the two
/// `*_encoder` keywords precede the short `dit`/`vae` keywords so a longer
/// directive is never claimed by a shorter keyword it happens to contain.
pub fn trainer_config_rules(dataset_config: &Path, models: &ModelPaths) -> Vec<RewriteRule> {
    vec![
        RewriteRule::assignment("dataset_config", dataset_config.display()),
        RewriteRule::assignment("image_encoder", models.image_encoder.display()),
        RewriteRule::assignment("text_encoder", models.text_encoder.display()),
        RewriteRule::assignment("dit", models.dit.display()),
        RewriteRule::assignment("vae", models.vae.display()),
    ]
}

/// Rules for the flag-per-line command-argument files: the same resolved
/// paths as [`trainer_config_rules`], expressed as CLI flags.
pub fn command_file_rules(dataset_config: &Path, models: &ModelPaths) -> Vec<RewriteRule> {
    vec![
        RewriteRule::flag("--dataset_config", dataset_config.display()),
        RewriteRule::flag("--image_encoder", models.image_encoder.display()),
        RewriteRule::flag("--text_encoder", models.text_encoder.display()),
        RewriteRule::flag("--dit", models.dit.display()),
        RewriteRule::flag("--vae", models.vae.display()),
    ]
}
