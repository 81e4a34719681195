//! Generic first-match-wins line rewriting.

use std::path::Path;

use tracing::debug;

use crate::error::TemplateError;
use crate::utils::atomic_write;

/// One rewrite rule: a keyword that selects directive lines by substring
/// containment, and the full replacement line.
///
/// Matching is intentionally coarse: any line containing the keyword anywhere
/// is replaced wholesale, including comments that mention it. Collisions are
/// avoided by choosing unambiguous keywords and by rule order, not by smarter
/// matching.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    keyword: String,
    replacement: String,
}

impl RewriteRule {
    /// Creates a rule replacing any line containing `keyword` with
    /// `replacement`.
    pub fn new(keyword: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            replacement: replacement.into(),
        }
    }

    /// Creates a rule producing a TOML-style `key = "value"` line.
    pub fn assignment(key: &str, value: impl std::fmt::Display) -> Self {
        Self::new(key, format!("{key} = \"{value}\""))
    }

    /// Creates a rule producing a `--flag value` command-argument line.
    pub fn flag(flag: &str, value: impl std::fmt::Display) -> Self {
        Self::new(flag, format!("{flag} {value}"))
    }

    /// Returns true if this rule selects `line`.
    pub fn matches(&self, line: &str) -> bool {
        line.contains(&self.keyword)
    }

    /// The replacement line this rule produces.
    pub fn replacement(&self) -> &str {
        &self.replacement
    }
}

/// Rewrites an ordered sequence of lines against an ordered rule list.
///
/// For each line the rules are evaluated in declared order and the first
/// matching rule replaces the entire line; lines matching no rule are copied
/// unchanged. Output length and order always equal the input.
pub fn rewrite_lines(lines: &[String], rules: &[RewriteRule]) -> Vec<String> {
    lines
        .iter()
        .map(|line| {
            rules
                .iter()
                .find(|rule| rule.matches(line))
                .map(|rule| rule.replacement().to_string())
                .unwrap_or_else(|| line.clone())
        })
        .collect()
}

/// Rewrites a whole config/command file in place.
///
/// The file is read fully, rewritten line-for-line and written back
/// atomically; any failure aborts the whole rewrite and leaves the file
/// unchanged. Returns the number of lines that were replaced.
pub fn rewrite_file(path: &Path, rules: &[RewriteRule]) -> Result<usize, TemplateError> {
    if !path.is_file() {
        return Err(TemplateError::FileNotFound(path.to_path_buf()));
    }

    let content =
        std::fs::read_to_string(path).map_err(|source| TemplateError::FileRewrite {
            path: path.to_path_buf(),
            source,
        })?;

    let lines: Vec<String> = content.lines().map(str::to_string).collect();
    let rewritten = rewrite_lines(&lines, rules);
    let replaced = lines
        .iter()
        .zip(rewritten.iter())
        .filter(|(before, after)| before != after)
        .count();

    let mut out = rewritten.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }

    atomic_write(path, &out).map_err(|source| TemplateError::FileRewrite {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("Replaced {} directive lines in {}", replaced, path.display());
    Ok(replaced)
}
