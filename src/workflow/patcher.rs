//! Rewrites directory paths inside a captioning workflow document.
//!
//! The workflow is a JSON node graph consumed by an external captioning tool.
//! Each node carries a `type` tag and an ordered `widgets_values` array of
//! positional parameters; for the node types we know about, the directory
//! path always sits at index 0. Everything else in the document is preserved
//! byte-for-byte (modulo re-indentation).

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::error::WorkflowError;
use crate::utils::{absolute_path, atomic_write};

/// Node type that loads the raw image list for the captioner.
pub const IMAGE_LOADER_NODE: &str = "LoadImageListFromDir //Inspire";

/// Node type that writes processed images.
pub const IMAGE_SAVE_NODE: &str = "Image Save";

/// Node type that writes generated caption text files.
pub const TEXT_SAVE_NODE: &str = "Save Text File";

/// Patches a workflow document so the captioner reads images from
/// `image_source_dir` and writes its output to `caption_output_dir`.
///
/// The patch is all-or-nothing: the document is parsed fully, mutated in
/// memory and atomically replaced on disk (write-to-temp-then-rename). A
/// parse failure leaves the file untouched and returns
/// [`WorkflowError::MalformedDocument`].
///
/// Returns the number of nodes that were patched.
pub fn patch(
    document_path: &Path,
    image_source_dir: &Path,
    caption_output_dir: &Path,
) -> Result<usize, WorkflowError> {
    WorkflowGraphPatcher::new(document_path)
        .load()?
        .point_at(image_source_dir, caption_output_dir)
        .save()
}

/// Loads, patches and saves one workflow document.
///
/// Split into explicit load/patch/save steps so callers (and tests) can
/// inspect the patched document before it is written back.
pub struct WorkflowGraphPatcher {
    document_path: PathBuf,
}

/// A parsed workflow document ready to be patched.
pub struct LoadedWorkflow {
    document_path: PathBuf,
    document: Value,
    patched_nodes: usize,
}

impl WorkflowGraphPatcher {
    /// Creates a patcher for the document at `document_path`.
    pub fn new(document_path: impl Into<PathBuf>) -> Self {
        Self {
            document_path: document_path.into(),
        }
    }

    /// Reads and parses the workflow document.
    pub fn load(self) -> Result<LoadedWorkflow, WorkflowError> {
        let raw = std::fs::read_to_string(&self.document_path)?;
        let document: Value =
            serde_json::from_str(&raw).map_err(|source| WorkflowError::MalformedDocument {
                path: self.document_path.clone(),
                source,
            })?;

        Ok(LoadedWorkflow {
            document_path: self.document_path,
            document,
            patched_nodes: 0,
        })
    }
}

impl LoadedWorkflow {
    /// Overwrites the directory slots of the known node types.
    ///
    /// Nodes of other types are left untouched; nodes with an empty or
    /// missing `widgets_values` array are skipped without error.
    pub fn point_at(mut self, image_source_dir: &Path, caption_output_dir: &Path) -> Self {
        let image_dir = absolute_path(image_source_dir);
        let output_dir = absolute_path(caption_output_dir);

        let nodes = self
            .document
            .get_mut("nodes")
            .and_then(Value::as_array_mut);

        if let Some(nodes) = nodes {
            for node in nodes {
                let node_type = node.get("type").and_then(Value::as_str);
                let target = match node_type {
                    Some(IMAGE_LOADER_NODE) => &image_dir,
                    Some(IMAGE_SAVE_NODE) | Some(TEXT_SAVE_NODE) => &output_dir,
                    _ => continue,
                };

                let widgets = node.get_mut("widgets_values").and_then(Value::as_array_mut);
                match widgets {
                    Some(values) if !values.is_empty() => {
                        values[0] = Value::String(target.to_string_lossy().into_owned());
                        self.patched_nodes += 1;
                    }
                    _ => debug!("Node without widget values skipped"),
                }
            }
        }

        self
    }

    /// Serializes the document back to its original path, pretty-printed,
    /// replacing the file atomically.
    pub fn save(self) -> Result<usize, WorkflowError> {
        let rendered =
            serde_json::to_string_pretty(&self.document).map_err(WorkflowError::Serialize)?;
        atomic_write(&self.document_path, &rendered)?;

        info!(
            "Patched {} nodes in {}",
            self.patched_nodes,
            self.document_path.display()
        );
        Ok(self.patched_nodes)
    }

    /// The parsed document, for inspection.
    pub fn document(&self) -> &Value {
        &self.document
    }
}
