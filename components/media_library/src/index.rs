//! The `library.json` sidecar.
//!
//! Size and modification time always come from the filesystem; the sidecar
//! only remembers what cannot be read back from a file: title, media id,
//! source URL and duration.

use crate::error::{LibraryError, Result};
use chrono::{DateTime, Utc};
use media_downloader::MediaId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use time_primitives::MediaDuration;

pub(crate) const INDEX_FILE: &str = "library.json";
const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IndexRecord {
    pub filename: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<MediaId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub duration_seconds: MediaDuration,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    entries: Vec<IndexRecord>,
}

/// Load the sidecar; a missing file is an empty index
pub(crate) async fn load(path: &Path) -> Result<Vec<IndexRecord>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LibraryError::io(format!("reading {}", path.display()), e)),
    };

    let file: IndexFile = serde_json::from_slice(&bytes).map_err(|source| LibraryError::Index {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.entries)
}

/// Write the sidecar through a temporary file so a crash never leaves it half-written
pub(crate) async fn save(path: &Path, entries: Vec<IndexRecord>) -> Result<()> {
    let file = IndexFile {
        version: INDEX_VERSION,
        entries,
    };
    let json = serde_json::to_vec_pretty(&file).map_err(|source| LibraryError::Index {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| LibraryError::io(format!("writing {}", tmp.display()), e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| LibraryError::io(format!("replacing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn record(filename: &str) -> IndexRecord {
        IndexRecord {
            filename: filename.to_string(),
            display_name: "Song".to_string(),
            media_id: Some(MediaId::new("youtube", "abc123")),
            source_url: Some("https://youtu.be/abc123".to_string()),
            duration_seconds: MediaDuration::from_secs(61),
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_index_is_empty() {
        let dir = TempDir::new().unwrap();
        let records = load(&dir.path().join(INDEX_FILE)).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(INDEX_FILE);
        let saved = vec![record("Song [youtube-abc123].mp3")];

        save(&path, saved.clone()).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_sidecar_uses_camel_case_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(INDEX_FILE);
        save(&path, vec![record("a.mp3")]).await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("\"displayName\""));
        assert!(text.contains("\"mediaId\": \"youtube:abc123\""));
        assert!(text.contains("\"durationSeconds\": 61"));
    }

    #[tokio::test]
    async fn test_corrupt_index_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(INDEX_FILE);
        tokio::fs::write(&path, b"{not json").await.unwrap();

        assert_matches!(load(&path).await, Err(LibraryError::Index { .. }));
    }
}
