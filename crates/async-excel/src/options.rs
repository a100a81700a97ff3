//! Open-time configuration and document path validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// File extensions accepted by [`AsyncWorkbook::open`](crate::AsyncWorkbook::open).
///
/// Matched ignoring ASCII case, so `book.XLSX` is accepted as well.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xls"];

/// Configuration for watching a document.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Save pending edits when the workbook is closed. Default: true.
    pub save_on_close: bool,
    /// Show the application window. Default: true.
    pub visible: bool,
    /// Cadence of both reconnect attempts and snapshot refreshes. Default: 1 second.
    pub update_interval: Duration,
    /// Connect attempts before the watch loop gives up. Default: 5.
    pub max_retries: u32,
    /// Consecutive failed reads after which the connection is torn down and
    /// re-established. `None` keeps reading the same handles forever.
    /// Default: 3.
    pub reconnect_after_read_failures: Option<u32>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            save_on_close: true,
            visible: true,
            update_interval: Duration::from_secs(1),
            max_retries: 5,
            reconnect_after_read_failures: Some(3),
        }
    }
}

impl OpenOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.update_interval.is_zero() {
            return Err(Error::InvalidUpdateInterval);
        }
        Ok(())
    }
}

/// Check that `path` names an existing spreadsheet and return it as an absolute path.
///
/// Existence is checked before the extension, so a missing `.csv` reports
/// [`Error::FileNotFound`].
pub fn validate_document_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(extension))
    {
        let suffix = if extension.is_empty() {
            String::new()
        } else {
            format!(".{extension}")
        };
        return Err(Error::UnsupportedFileType(suffix));
    }

    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .map_err(|_| Error::FileNotFound(path.to_path_buf()))?
            .join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_accepts_supported_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["book.xlsx", "legacy.xls", "LOUD.XLSX"] {
            let path = touch(&dir, name);
            assert_eq!(validate_document_path(&path).unwrap(), path);
        }
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(&dir, "data.csv");
        match validate_document_path(&path) {
            Err(Error::UnsupportedFileType(ext)) => assert_eq!(ext, ".csv"),
            other => panic!("expected unsupported file type, got {other:?}"),
        }

        let path = touch(&dir, "no_extension");
        assert!(matches!(
            validate_document_path(&path),
            Err(Error::UnsupportedFileType(ext)) if ext.is_empty()
        ));
    }

    #[test]
    fn test_missing_file_checked_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        assert!(matches!(
            validate_document_path(&path),
            Err(Error::FileNotFound(p)) if p == path
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let options = OpenOptions {
            update_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(Error::InvalidUpdateInterval)));
        assert!(OpenOptions::default().validate().is_ok());
    }
}
