//! Error types for loraforge operations.
//!
//! Defines error types for the major subsystems:
//! - Caption rewriting and dataset editing
//! - Workflow document patching
//! - Config/command file templating
//!
//! Pipeline-level errors (stage failures, configuration) live next to the
//! orchestrator in [`crate::pipeline`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while rewriting caption files.
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("Caption directory '{0}' not found or not readable")]
    DirectoryUnreadable(PathBuf),

    #[error("Failed to rewrite caption file '{path}': {source}")]
    FileRewrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while patching a workflow document.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Malformed workflow document '{path}': {source}")]
    MalformedDocument {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize workflow document: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while rewriting config/command files.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Config file '{0}' not found")]
    FileNotFound(PathBuf),

    #[error("Failed to rewrite config file '{path}': {source}")]
    FileRewrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
