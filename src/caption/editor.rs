//! Applies the trigger-word rewrite to every caption file in a directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::CaptionError;

use super::rewriter;

/// A caption file that could not be rewritten.
#[derive(Debug, Clone)]
pub struct FileFailure {
    /// Path of the failing caption file.
    pub path: PathBuf,
    /// Description of the underlying IO error.
    pub error: String,
}

/// Outcome of one rewrite pass over a caption directory.
#[derive(Debug, Default)]
pub struct RewriteSummary {
    /// Number of caption files successfully rewritten.
    pub files_rewritten: usize,
    /// Files that failed and were skipped; the rest of the batch continued.
    pub failures: Vec<FileFailure>,
}

impl RewriteSummary {
    /// Returns true if every caption file in the directory was rewritten.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Rewrites every `.txt` caption file directly inside a directory
/// (non-recursive), injecting the trigger word into each line.
///
/// Offers a blocking mode ([`apply`](Self::apply)) and an awaitable mode
/// ([`apply_concurrent`](Self::apply_concurrent)) with identical output. A
/// failing file aborts only that file's rewrite; the batch continues and the
/// failure is reported in the summary.
#[derive(Debug, Clone)]
pub struct CaptionDatasetEditor {
    trigger_word: String,
    max_concurrent_files: usize,
}

impl CaptionDatasetEditor {
    /// Creates an editor for the given trigger word.
    pub fn new(trigger_word: impl Into<String>) -> Self {
        Self {
            trigger_word: trigger_word.into(),
            max_concurrent_files: 8,
        }
    }

    /// Sets the bound on concurrently processed files in
    /// [`apply_concurrent`](Self::apply_concurrent).
    pub fn with_max_concurrent_files(mut self, max: usize) -> Self {
        self.max_concurrent_files = max.max(1);
        self
    }

    /// Rewrites all caption files in `directory`, one at a time.
    pub fn apply(&self, directory: &Path) -> Result<RewriteSummary, CaptionError> {
        let mut summary = RewriteSummary::default();

        for path in caption_files(directory)? {
            match rewrite_file(&path, &self.trigger_word) {
                Ok(lines) => {
                    debug!("Rewrote {} lines in {}", lines, path.display());
                    summary.files_rewritten += 1;
                }
                Err(e) => {
                    warn!("Skipping caption file {}: {}", path.display(), e);
                    summary.failures.push(FileFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }

    /// Rewrites all caption files in `directory` with bounded concurrency.
    ///
    /// One task per file; a file is written back exactly once, after all of its
    /// line rewrites are computed, so no two writes ever touch the same file.
    pub async fn apply_concurrent(&self, directory: &Path) -> Result<RewriteSummary, CaptionError> {
        let files = caption_files(directory)?;
        let limiter = Arc::new(Semaphore::new(self.max_concurrent_files));

        let rewrites: Vec<_> = files
            .into_iter()
            .map(|path| {
                let limiter = Arc::clone(&limiter);
                let trigger_word = self.trigger_word.clone();
                async move {
                    // The semaphore lives for the whole batch and is never closed.
                    let _permit = limiter
                        .acquire_owned()
                        .await
                        .expect("caption semaphore closed");
                    let result = rewrite_file_async(&path, &trigger_word).await;
                    (path, result)
                }
            })
            .collect();

        let mut summary = RewriteSummary::default();
        for (path, result) in futures::future::join_all(rewrites).await {
            match result {
                Ok(lines) => {
                    debug!("Rewrote {} lines in {}", lines, path.display());
                    summary.files_rewritten += 1;
                }
                Err(e) => {
                    warn!("Skipping caption file {}: {}", path.display(), e);
                    summary.failures.push(FileFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }
}

/// Lists `.txt` files directly inside `directory`, sorted by path.
fn caption_files(directory: &Path) -> Result<Vec<PathBuf>, CaptionError> {
    let entries = std::fs::read_dir(directory)
        .map_err(|_| CaptionError::DirectoryUnreadable(directory.to_path_buf()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map(|ext| ext == "txt").unwrap_or(false))
        .collect();
    files.sort();
    Ok(files)
}

/// Rewrites the full content of one caption file in memory.
///
/// Lines are replaced by index, front to back, which keeps the behavior
/// deterministic when a file contains duplicate lines.
fn rewrite_content(content: &str, trigger_word: &str) -> (String, usize) {
    let lines: Vec<String> = content
        .lines()
        .map(|line| rewriter::rewrite(line, trigger_word))
        .collect();

    let count = lines.len();
    let mut out = lines.join("\n");
    if count > 0 {
        out.push('\n');
    }
    (out, count)
}

fn rewrite_file(path: &Path, trigger_word: &str) -> std::io::Result<usize> {
    let content = std::fs::read_to_string(path)?;
    let (rewritten, lines) = rewrite_content(&content, trigger_word);
    std::fs::write(path, rewritten)?;
    Ok(lines)
}

async fn rewrite_file_async(path: &Path, trigger_word: &str) -> std::io::Result<usize> {
    let content = tokio::fs::read_to_string(path).await?;
    let (rewritten, lines) = rewrite_content(&content, trigger_word);
    tokio::fs::write(path, rewritten).await?;
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_caption(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_apply_rewrites_all_txt_files() {
        let temp = TempDir::new().unwrap();
        let a = write_caption(temp.path(), "1.txt", "a woman smiling\n");
        let b = write_caption(temp.path(), "2.txt", "a dog running\n");
        write_caption(temp.path(), "skip.png", "not a caption");

        let editor = CaptionDatasetEditor::new("zed123");
        let summary = editor.apply(temp.path()).unwrap();

        assert_eq!(summary.files_rewritten, 2);
        assert!(summary.is_complete());
        assert_eq!(fs::read_to_string(a).unwrap(), "a zed123 smiling\n");
        assert_eq!(fs::read_to_string(b).unwrap(), "zed123 a dog running\n");
    }

    #[test]
    fn test_apply_preserves_line_count_and_order() {
        let temp = TempDir::new().unwrap();
        let path = write_caption(temp.path(), "multi.txt", "a woman\na man\na dog\n");

        CaptionDatasetEditor::new("tw").apply(temp.path()).unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["a tw", "a tw", "tw a dog"]);
    }

    #[test]
    fn test_apply_duplicate_lines_replaced_by_index() {
        let temp = TempDir::new().unwrap();
        let path = write_caption(temp.path(), "dup.txt", "a woman\na woman\n");

        CaptionDatasetEditor::new("tw").apply(temp.path()).unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "a tw\na tw\n");
    }

    #[test]
    fn test_apply_missing_directory_is_an_error() {
        let editor = CaptionDatasetEditor::new("tw");
        let result = editor.apply(Path::new("/nonexistent/captions"));
        assert!(matches!(result, Err(CaptionError::DirectoryUnreadable(_))));
    }

    #[test]
    fn test_apply_empty_file_stays_empty() {
        let temp = TempDir::new().unwrap();
        let path = write_caption(temp.path(), "empty.txt", "");

        let summary = CaptionDatasetEditor::new("tw").apply(temp.path()).unwrap();
        assert_eq!(summary.files_rewritten, 1);
        assert_eq!(fs::read_to_string(path).unwrap(), "");
    }

    #[tokio::test]
    async fn test_apply_concurrent_matches_blocking_output() {
        let blocking = TempDir::new().unwrap();
        let concurrent = TempDir::new().unwrap();
        for dir in [blocking.path(), concurrent.path()] {
            write_caption(dir, "1.txt", "a woman smiling\n");
            write_caption(dir, "2.txt", "a man and a dog\nsecond line\n");
            write_caption(dir, "3.txt", "already zed123 here\n");
        }

        let editor = CaptionDatasetEditor::new("zed123").with_max_concurrent_files(2);
        editor.apply(blocking.path()).unwrap();
        let summary = editor.apply_concurrent(concurrent.path()).await.unwrap();
        assert_eq!(summary.files_rewritten, 3);

        for name in ["1.txt", "2.txt", "3.txt"] {
            assert_eq!(
                fs::read_to_string(blocking.path().join(name)).unwrap(),
                fs::read_to_string(concurrent.path().join(name)).unwrap(),
            );
        }
    }

    #[tokio::test]
    async fn test_apply_concurrent_with_single_permit() {
        let temp = TempDir::new().unwrap();
        for i in 0..5 {
            write_caption(temp.path(), &format!("{i}.txt"), "a woman\n");
        }

        let editor = CaptionDatasetEditor::new("tw").with_max_concurrent_files(1);
        let summary = editor.apply_concurrent(temp.path()).await.unwrap();

        assert_eq!(summary.files_rewritten, 5);
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn test_failing_file_is_reported_and_batch_continues() {
        let temp = TempDir::new().unwrap();
        let good = write_caption(temp.path(), "good.txt", "a woman\n");
        // Invalid UTF-8 makes the read fail for this file only.
        fs::write(temp.path().join("bad.txt"), [0xff, 0xfe, 0xfd]).unwrap();

        let editor = CaptionDatasetEditor::new("tw");
        let summary = editor.apply_concurrent(temp.path()).await.unwrap();

        assert_eq!(summary.files_rewritten, 1);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].path.ends_with("bad.txt"));
        assert_eq!(fs::read_to_string(good).unwrap(), "a tw\n");
    }
}
