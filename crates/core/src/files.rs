//! Uploaded file metadata and filesystem storage helpers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Metadata describing one stored upload. Persisted as JSON inside the
/// ticket's `support_file` and the job's `report_file` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_name: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub size: i64,
}

/// Save one uploaded file under the storage root.
///
/// The stored name is prefixed with a UUID so collisions between identically
/// named uploads are impossible.
pub fn save_file(
    storage_path: &Path,
    file_name: &str,
    content_type: Option<String>,
    data: &[u8],
) -> Result<FileMetadata> {
    std::fs::create_dir_all(storage_path)
        .map_err(|e| Error::Database(format!("failed to create storage dir: {e}")))?;

    let safe_name = sanitize_file_name(file_name);
    let stored_name = format!("{}_{}", uuid::Uuid::new_v4(), safe_name);
    let dest: PathBuf = storage_path.join(&stored_name);

    std::fs::write(&dest, data)
        .map_err(|e| Error::Database(format!("failed to save file {safe_name}: {e}")))?;

    Ok(FileMetadata {
        file_name: safe_name,
        file_path: dest.to_string_lossy().into_owned(),
        content_type,
        size: data.len() as i64,
    })
}

/// Best-effort removal of stored files. Failures are logged, never returned.
pub fn remove_files(paths: impl IntoIterator<Item = impl AsRef<Path>>) {
    for path in paths {
        let path = path.as_ref();
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to delete file from storage: {:?}: {}", path, e);
        }
    }
}

/// Strip path components so an upload cannot escape the storage root.
fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .to_string();
    if base.is_empty() {
        "unnamed".to_string()
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_remove_file() {
        let dir = tempfile::tempdir().unwrap();
        let meta = save_file(dir.path(), "report.pdf", Some("application/pdf".into()), b"pdf")
            .unwrap();

        assert_eq!(meta.file_name, "report.pdf");
        assert_eq!(meta.size, 3);
        assert!(Path::new(&meta.file_path).exists());

        remove_files([&meta.file_path]);
        assert!(!Path::new(&meta.file_path).exists());
    }

    #[test]
    fn test_remove_missing_file_does_not_panic() {
        remove_files(["/nonexistent/by-construction/file.bin"]);
    }

    #[test]
    fn test_sanitize_file_name_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("c:\\temp\\x.doc"), "x.doc");
        assert_eq!(sanitize_file_name(""), "unnamed");
    }

    #[test]
    fn test_metadata_round_trips_as_json() {
        let meta = FileMetadata {
            file_name: "a.txt".into(),
            file_path: "/uploads/a.txt".into(),
            content_type: None,
            size: 12,
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("content_type"));
        let back: FileMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
