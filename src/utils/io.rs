//! File I/O primitives with consistent error handling.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Read file contents with standardized error handling.
///
/// Wraps `fs::read_to_string` with consistent `Error::internal_io` formatting.
pub fn read_file(path: &Path, operation: &str) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Write content to file with standardized error handling.
pub fn write_file(path: &Path, content: &str, operation: &str) -> Result<()> {
    fs::write(path, content)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Write content to file atomically (write to .tmp, then rename).
///
/// The rename is atomic on POSIX filesystems, so readers always see either
/// the old content or the new content, never a partial write.
pub fn write_file_atomic(path: &Path, content: &str, operation: &str) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        Error::internal_io(
            format!("Invalid path: {}", path.display()),
            Some(operation.to_string()),
        )
    })?;

    let filename = path.file_name().ok_or_else(|| {
        Error::internal_io(
            format!("Invalid path: {}", path.display()),
            Some(operation.to_string()),
        )
    })?;

    let tmp_path = parent.join(format!("{}.tmp", filename.to_string_lossy()));

    fs::write(&tmp_path, content).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("{} (write temp)", operation)))
    })?;

    fs::rename(&tmp_path, path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} (rename)", operation))))?;

    Ok(())
}

/// Copy a directory tree. Existing files at the destination are
/// overwritten; symlinks are not followed.
pub fn copy_dir_recursive(src: &Path, dest: &Path, operation: &str) -> Result<()> {
    fs::create_dir_all(dest)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))?;

    let entries = fs::read_dir(src)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))?;
        let file_type = entry
            .file_type()
            .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))?;
        let target = dest.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &target, operation)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)
                .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_file_returns_error_for_missing_file() {
        let result = read_file(Path::new("/nonexistent/shipwright.json"), "read config");
        assert!(result.is_err());
    }

    #[test]
    fn write_file_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        write_file_atomic(&path, "{\"version\":\"1.0.0\"}", "write config").unwrap();
        write_file_atomic(&path, "{\"version\":\"1.0.1\"}", "write config").unwrap();

        let content = read_file(&path, "read config").unwrap();
        assert!(content.contains("1.0.1"));
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn copy_dir_recursive_preserves_layout() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.json"), "{}").unwrap();
        fs::write(src.join("nested/b.json"), "{}").unwrap();

        let dest = dir.path().join("out");
        copy_dir_recursive(&src, &dest, "copy project").unwrap();

        assert!(dest.join("a.json").exists());
        assert!(dest.join("nested/b.json").exists());
    }
}
