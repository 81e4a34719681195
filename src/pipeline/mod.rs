//! Pipeline orchestration for dataset preparation and training.
//!
//! # Pipeline Flow
//!
//! 1. **PatchWorkflow**: the captioner workflow document is pointed at the
//!    raw image directory and the caption output directory
//! 2. **RunCaptioner**: the external captioning tool runs; every image must
//!    have a caption file afterwards
//! 3. **RewriteCaptions**: the trigger word is injected into every caption
//! 4. **PatchConfigs**: resolved paths are substituted into the dataset TOML,
//!    trainer TOML and command-argument files
//! 5. **CacheLatents** / **CacheTextEncoderOutputs** / **TrainNetwork**: the
//!    external trainer tools run in order
//!
//! Stages are strictly sequential; the first failure aborts the remaining
//! sequence and the report surfaces the stage name and captured stderr.
//! Completed stages are never rolled back.

pub mod config;
pub mod orchestrator;
pub mod process;
pub mod stage;

pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::{CancelHandle, PipelineError, PipelineOrchestrator, StageError};
pub use process::{CommandSpec, ProcessError, ProcessOutput};
pub use stage::{PipelineOutcome, PipelineReport, Stage, StageReport, StageStatus};
