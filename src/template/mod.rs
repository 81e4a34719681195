//! Line-oriented templating of trainer config and command files.
//!
//! A "directive line" is a single line in a config or command-argument file
//! identified by a keyword substring. Rewrites replace whole directive lines
//! under first-match-wins rule ordering and never change line count or order.

pub mod line_rewriter;
pub mod rules;

pub use line_rewriter::{rewrite_file, rewrite_lines, RewriteRule};
pub use rules::{
    command_file_rules, dataset_config_rules, trainer_config_rules, ModelPaths, DATASET_JSONL_NAME,
};
