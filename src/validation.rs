use crate::constants::MAX_FILE_SIZE;
use crate::error::{CompressionError, Result};
use std::fs;
use std::path::Path;

/// Longest context identifier kept in a derived filename.
const MAX_FILENAME_COMPONENT_LEN: usize = 64;

/// Checks that `path` is a readable regular file within the size limit.
pub fn validate_input_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(CompressionError::FileNotFound(path.to_path_buf()));
    }

    if !path.is_file() {
        return Err(CompressionError::UnsupportedFormat(
            "Input path is not a file".to_string(),
        ));
    }

    let metadata =
        fs::metadata(path).map_err(|_| CompressionError::FileNotFound(path.to_path_buf()))?;
    if metadata.len() > MAX_FILE_SIZE {
        return Err(CompressionError::FileTooLarge(metadata.len(), MAX_FILE_SIZE));
    }

    Ok(())
}

/// Reduce an identifier to characters that are safe in a filename.
///
/// Anything outside `[A-Za-z0-9_-]` becomes `_`; empty input becomes `unknown`.
pub fn sanitize_filename_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .take(MAX_FILENAME_COMPONENT_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Context identifiers (inspection, checkpoint, user) must be non-blank.
pub fn validate_context_id(kind: &str, value: &str) -> std::result::Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} must not be empty", kind));
    }
    if value.chars().any(char::is_control) {
        return Err(format!("{} contains control characters", kind));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_validate_input_path_not_found() {
        let result = validate_input_path(Path::new("nonexistent.jpg"));
        assert!(matches!(result, Err(CompressionError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_input_path_rejects_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = validate_input_path(temp_dir.path());
        assert!(matches!(result, Err(CompressionError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_validate_input_path_valid_file() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("test.jpg");
        let mut file = File::create(&test_file).unwrap();
        file.write_all(b"fake image data").unwrap();

        assert!(validate_input_path(&test_file).is_ok());
    }

    #[test]
    fn test_sanitize_filename_component() {
        assert_eq!(sanitize_filename_component("CP-12_a"), "CP-12_a");
        assert_eq!(sanitize_filename_component("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_filename_component("  "), "unknown");
        assert_eq!(sanitize_filename_component("é"), "_");
        assert_eq!(sanitize_filename_component(&"x".repeat(200)).len(), 64);
    }

    #[test]
    fn test_validate_context_id() {
        assert!(validate_context_id("inspection id", "INS-1").is_ok());
        assert!(validate_context_id("inspection id", " ").is_err());
        assert!(validate_context_id("user id", "a\nb").is_err());
    }
}
