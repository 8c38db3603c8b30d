//! Name validation and collision-free restore names.

use std::path::{Path, PathBuf};

use ferry_core::TransferError;

/// Validate a filename for cross-platform compatibility.
pub fn validate_filename(name: &str) -> Result<(), TransferError> {
    let invalid = |reason: &str| TransferError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }

    if name.len() > 255 {
        return Err(invalid("name is too long (max 255 characters)"));
    }

    for c in ['/', '\\', '\0'] {
        if name.contains(c) {
            return Err(invalid(&format!("name cannot contain '{}'", c.escape_default())));
        }
    }

    // Leading/trailing spaces and trailing dots break SMB and FAT-backed storage
    if name.starts_with(' ') || name.ends_with(' ') {
        return Err(invalid("name cannot start or end with spaces"));
    }

    if name == "." || name == ".." {
        return Err(invalid("'.' and '..' are reserved names"));
    }

    if name.ends_with('.') {
        return Err(invalid("name cannot end with a dot"));
    }

    Ok(())
}

/// First free path among `path`, `stem_restored.ext`, `stem_restored_2.ext`, ...
pub fn restored_path(path: &Path) -> PathBuf {
    if path.symlink_metadata().is_err() {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or(Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let candidate = |suffix: String| {
        let name = match &extension {
            Some(ext) => format!("{}{}.{}", stem, suffix, ext),
            None => format!("{}{}", stem, suffix),
        };
        parent.join(name)
    };

    let first = candidate("_restored".to_string());
    if first.symlink_metadata().is_err() {
        return first;
    }

    for i in 2..1000 {
        let next = candidate(format!("_restored_{}", i));
        if next.symlink_metadata().is_err() {
            return next;
        }
    }

    // Fallback: use timestamp
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    candidate(format!("_restored_{}", timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_filename_valid() {
        assert!(validate_filename("test.txt").is_ok());
        assert!(validate_filename("my-file").is_ok());
        assert!(validate_filename(".hidden").is_ok());
        assert!(validate_filename("file with spaces").is_ok());
    }

    #[test]
    fn test_validate_filename_invalid() {
        assert!(validate_filename("").is_err());
        assert!(validate_filename("test/file").is_err());
        assert!(validate_filename("test\\file").is_err());
        assert!(validate_filename(".").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("file ").is_err());
        assert!(validate_filename(" file").is_err());
        assert!(validate_filename("file.").is_err());
    }

    #[test]
    fn test_restored_path_free() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        assert_eq!(restored_path(&path), path);
    }

    #[test]
    fn test_restored_path_variants() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, "x").unwrap();
        assert_eq!(restored_path(&path), dir.path().join("a_restored.jpg"));

        fs::write(dir.path().join("a_restored.jpg"), "x").unwrap();
        assert_eq!(restored_path(&path), dir.path().join("a_restored_2.jpg"));
    }

    #[test]
    fn test_restored_path_no_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes");
        fs::write(&path, "x").unwrap();
        assert_eq!(restored_path(&path), dir.path().join("notes_restored"));
    }
}
