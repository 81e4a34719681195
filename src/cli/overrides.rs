//! Lenient `key=value` override parsing.
//!
//! The pipeline historically accepted its input-directory and trigger-word
//! overrides as bare `key=value` arguments; unrecognized or malformed
//! arguments are ignored with a warning rather than rejected.

use std::path::PathBuf;

use tracing::warn;

use crate::pipeline::PipelineConfig;

/// Applies `key=value` overrides to a pipeline configuration.
///
/// Recognized keys: `in` (raw image directory), `triggerword` / `tw`
/// (trigger word). Anything else is logged and skipped.
pub fn apply_overrides(config: PipelineConfig, overrides: &[String]) -> PipelineConfig {
    let mut config = config;

    for arg in overrides {
        let Some((key, value)) = arg.split_once('=') else {
            warn!("Ignoring malformed override '{}', expected key=value", arg);
            continue;
        };

        match key {
            "in" => config = config.with_raw_dataset_dir(PathBuf::from(value)),
            "triggerword" | "tw" => config = config.with_trigger_word(value),
            _ => warn!("Ignoring unrecognized override '{}'", key),
        }
    }

    config
}
