//! loraforge: LoRA dataset preparation and training orchestration.
//!
//! This library rewrites image captions to inject a trigger word, patches a
//! ComfyUI captioning workflow, templates trainer config/command files and
//! drives the external caption/cache/train tools as a sequential,
//! short-circuiting pipeline.

// Core modules
pub mod caption;
pub mod cli;
pub mod error;
pub mod pipeline;
pub mod template;
pub mod utils;
pub mod workflow;

// Re-export commonly used error types
pub use error::{CaptionError, TemplateError, WorkflowError};
