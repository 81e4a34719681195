//! Caption rewriting for trigger-word injection.
//!
//! A trigger word is a token injected into every caption so that all training
//! images are associated with a single concept during fine-tuning. This module
//! provides the pure rewrite rule ([`rewrite`]) and the dataset editor that
//! applies it to every caption file in a directory ([`CaptionDatasetEditor`]).

pub mod editor;
pub mod rewriter;

pub use editor::{CaptionDatasetEditor, FileFailure, RewriteSummary};
pub use rewriter::{rewrite, DEFAULT_TRIGGER_WORD};
