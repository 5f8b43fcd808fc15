use media_downloader::MediaId;
use std::path::PathBuf;
use std::time::SystemTime;
use storage_primitives::ByteSize;
use time_primitives::MediaDuration;

/// One committed audio file in the library
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryEntry {
    /// On-disk name, also the identifier used by play/download/delete
    pub filename: String,
    pub display_name: String,
    /// Files adopted from disk without a recognizable tag have no id
    pub media_id: Option<MediaId>,
    pub source_url: Option<String>,
    pub duration: MediaDuration,
    pub size: ByteSize,
    pub modified_at: SystemTime,
}

/// A finished file waiting to be moved into the library
#[derive(Debug, Clone)]
pub struct NewEntry {
    /// Where the transcoder left the file
    pub staged_path: PathBuf,
    pub filename: String,
    pub display_name: String,
    pub media_id: MediaId,
    pub source_url: String,
    pub duration: MediaDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryStats {
    pub total_downloads: usize,
    pub total_size: ByteSize,
    pub history_entries: usize,
}
