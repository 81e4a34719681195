//! Patching of ComfyUI-style workflow documents.

pub mod patcher;

pub use patcher::{patch, WorkflowGraphPatcher, IMAGE_LOADER_NODE, IMAGE_SAVE_NODE, TEXT_SAVE_NODE};
