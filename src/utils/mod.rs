//! Small filesystem helpers shared across subsystems.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// File extensions recognized as training images.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Writes `contents` to `path` atomically.
///
/// The data is written to a temporary file in the same directory and then
/// renamed over the target, so a crash mid-write never leaves a partially
/// written file behind.
pub fn atomic_write(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))?;
    tmp.write_all(contents.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Resolves `path` to an absolute path.
///
/// Prefers the canonical path when the target exists; otherwise falls back to
/// joining against the current working directory without touching the
/// filesystem.
pub fn absolute_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Lists image files directly inside `dir` (non-recursive), sorted by path.
pub fn image_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_file() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");

        atomic_write(&target, "hello\n").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "hello\n");
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");
        fs::write(&target, "old").unwrap();

        atomic_write(&target, "new").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn test_image_files_filters_by_extension() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.png"), b"").unwrap();
        fs::write(temp.path().join("b.JPG"), b"").unwrap();
        fs::write(temp.path().join("c.txt"), b"").unwrap();
        fs::create_dir(temp.path().join("nested")).unwrap();
        fs::write(temp.path().join("nested").join("d.png"), b"").unwrap();

        let files = image_files(temp.path());
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.parent() == Some(temp.path())));
    }

    #[test]
    fn test_absolute_path_resolves_relative() {
        let resolved = absolute_path(Path::new("some/relative/dir"));
        assert!(resolved.is_absolute());
    }
}
