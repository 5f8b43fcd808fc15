use crate::entry::{LibraryEntry, LibraryStats, NewEntry};
use crate::error::{LibraryError, Result};
use crate::index::{self, IndexRecord, INDEX_FILE};
use chrono::{DateTime, Utc};
use media_downloader::{parse_file_stem, AudioFormat, MediaId};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use storage_primitives::ByteSize;
use time_primitives::MediaDuration;
use tokio::fs::File;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Directory below the library root where jobs stage their work
const STAGING_DIR: &str = "temp";

struct Tracked {
    entry: LibraryEntry,
    registered_at: DateTime<Utc>,
}

impl Tracked {
    fn record(&self) -> IndexRecord {
        IndexRecord {
            filename: self.entry.filename.clone(),
            display_name: self.entry.display_name.clone(),
            media_id: self.entry.media_id.clone(),
            source_url: self.entry.source_url.clone(),
            duration_seconds: self.entry.duration,
            registered_at: self.registered_at,
        }
    }
}

#[derive(Default)]
struct LibraryState {
    entries: HashMap<String, Tracked>,
}

impl LibraryState {
    fn find(&self, media_id: &MediaId) -> Option<&LibraryEntry> {
        self.entries
            .values()
            .map(|t| &t.entry)
            .find(|e| e.media_id.as_ref() == Some(media_id))
    }

    fn records(&self) -> Vec<IndexRecord> {
        let mut records: Vec<_> = self.entries.values().map(Tracked::record).collect();
        records.sort_by(|a, b| a.filename.cmp(&b.filename));
        records
    }
}

/// Index over a directory of audio files.
///
/// All mutations take the write lock for their whole duration, so a
/// `register` either sees a concurrent registration of the same media id
/// and fails with [`LibraryError::Conflict`], or wins.
pub struct LibraryStore {
    root: PathBuf,
    staging_dir: PathBuf,
    index_path: PathBuf,
    state: RwLock<LibraryState>,
}

impl LibraryStore {
    /// Open the library at `root`, creating it if needed, and index what is on disk
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_owned();
        let staging_dir = root.join(STAGING_DIR);

        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| LibraryError::io(format!("creating {}", root.display()), e))?;
        tokio::fs::create_dir_all(&staging_dir)
            .await
            .map_err(|e| LibraryError::io(format!("creating {}", staging_dir.display()), e))?;

        let store = Self {
            index_path: root.join(INDEX_FILE),
            root,
            staging_dir,
            state: RwLock::new(LibraryState::default()),
        };
        store.clear_staging().await;
        store.rescan().await?;
        Ok(store)
    }

    /// Remove whatever an interrupted process left in the staging directory
    async fn clear_staging(&self) {
        let Ok(mut dir) = tokio::fs::read_dir(&self.staging_dir).await else {
            return;
        };
        while let Ok(Some(leftover)) = dir.next_entry().await {
            let path = leftover.path();
            let is_dir = leftover.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let removed = if is_dir {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match removed {
                Ok(()) => info!("Removed leftover staging entry {}", path.display()),
                Err(e) => warn!("Orphaned staging entry {}: {}", path.display(), e),
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch space for in-progress jobs; never listed
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Rebuild the index from the files on disk, keeping what the sidecar
    /// knows about files that are still present. Returns the entry count.
    pub async fn rescan(&self) -> Result<usize> {
        let mut state = self.state.write().await;

        let records = match index::load(&self.index_path).await {
            Ok(records) => records,
            Err(e @ LibraryError::Index { .. }) => {
                warn!("{}; rebuilding from disk", e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let mut known: HashMap<String, IndexRecord> = records
            .into_iter()
            .map(|r| (r.filename.clone(), r))
            .collect();

        let mut entries = HashMap::new();
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| LibraryError::io(format!("listing {}", self.root.display()), e))?;

        while let Some(dir_entry) = dir
            .next_entry()
            .await
            .map_err(|e| LibraryError::io(format!("listing {}", self.root.display()), e))?
        {
            let Ok(filename) = dir_entry.file_name().into_string() else {
                continue;
            };
            if filename.starts_with('.') || AudioFormat::from_path(Path::new(&filename)).is_none() {
                continue;
            }
            let meta = match dir_entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping {}: {}", filename, e);
                    continue;
                }
            };

            let record = known.remove(&filename).unwrap_or_else(|| adopt(&filename));
            let entry = LibraryEntry {
                filename: filename.clone(),
                display_name: record.display_name,
                media_id: record.media_id,
                source_url: record.source_url,
                duration: record.duration_seconds,
                size: ByteSize::new(meta.len()),
                modified_at: meta
                    .modified()
                    .map_err(|e| LibraryError::io(format!("reading mtime of {}", filename), e))?,
            };
            entries.insert(
                filename,
                Tracked {
                    entry,
                    registered_at: record.registered_at,
                },
            );
        }

        for stale in known.keys() {
            warn!("Index entry {} has no file on disk, dropping it", stale);
        }

        state.entries = entries;
        index::save(&self.index_path, state.records()).await?;

        let count = state.entries.len();
        info!("Library at {} holds {} files", self.root.display(), count);
        Ok(count)
    }

    pub async fn find(&self, media_id: &MediaId) -> Option<LibraryEntry> {
        self.state.read().await.find(media_id).cloned()
    }

    pub async fn get(&self, filename: &str) -> Option<LibraryEntry> {
        self.state
            .read()
            .await
            .entries
            .get(filename)
            .map(|t| t.entry.clone())
    }

    /// All entries, most recently modified first
    pub async fn list(&self) -> Vec<LibraryEntry> {
        let mut entries: Vec<_> = self
            .state
            .read()
            .await
            .entries
            .values()
            .map(|t| t.entry.clone())
            .collect();
        entries.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        entries
    }

    pub async fn stats(&self) -> LibraryStats {
        let state = self.state.read().await;
        LibraryStats {
            total_downloads: state.entries.len(),
            total_size: state.entries.values().map(|t| t.entry.size).sum(),
            history_entries: state
                .entries
                .values()
                .filter(|t| t.entry.source_url.is_some())
                .count(),
        }
    }

    /// Move a staged file into the library and index it.
    ///
    /// Fails with [`LibraryError::Conflict`] if the media id is already
    /// present and with [`LibraryError::FilenameTaken`] if another media owns
    /// the filename; the staged file is left where it was either way.
    pub async fn register(&self, new: NewEntry) -> Result<LibraryEntry> {
        validate_filename(&new.filename)?;
        let mut state = self.state.write().await;

        if let Some(existing) = state.find(&new.media_id) {
            return Err(LibraryError::Conflict {
                filename: new.filename,
                existing: existing.filename.clone(),
            });
        }
        if let Some(taken) = state.entries.get(&new.filename) {
            return Err(LibraryError::FilenameTaken {
                owner: taken.entry.media_id.clone(),
                filename: new.filename,
            });
        }

        let target = self.root.join(&new.filename);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            warn!("Replacing unindexed file {}", target.display());
        }
        move_into_place(&new.staged_path, &target).await?;

        let meta = tokio::fs::metadata(&target)
            .await
            .map_err(|e| LibraryError::io(format!("reading {}", target.display()), e))?;
        let entry = LibraryEntry {
            filename: new.filename.clone(),
            display_name: new.display_name,
            media_id: Some(new.media_id),
            source_url: Some(new.source_url),
            duration: new.duration,
            size: ByteSize::new(meta.len()),
            modified_at: meta
                .modified()
                .map_err(|e| LibraryError::io(format!("reading mtime of {}", new.filename), e))?,
        };

        state.entries.insert(
            new.filename.clone(),
            Tracked {
                entry: entry.clone(),
                registered_at: Utc::now(),
            },
        );
        if let Err(e) = index::save(&self.index_path, state.records()).await {
            state.entries.remove(&new.filename);
            if let Err(rm) = tokio::fs::remove_file(&target).await {
                error!("Could not roll back {}: {}", target.display(), rm);
            }
            return Err(e);
        }

        info!("Registered {} ({})", entry.filename, entry.size);
        Ok(entry)
    }

    /// Remove an entry and its file. `Ok(false)` means there was nothing to remove.
    pub async fn remove(&self, filename: &str) -> Result<bool> {
        validate_filename(filename)?;
        let mut state = self.state.write().await;

        let Some(tracked) = state.entries.remove(filename) else {
            return Ok(false);
        };
        if let Err(e) = index::save(&self.index_path, state.records()).await {
            state.entries.insert(filename.to_string(), tracked);
            return Err(e);
        }

        match tokio::fs::remove_file(self.root.join(filename)).await {
            Ok(()) => {
                info!("Deleted {}", filename);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} was already gone from disk", filename);
                Ok(true)
            }
            Err(source) => {
                error!("Removed {} from the index but the file remains: {}", filename, source);
                Err(LibraryError::PartialRemoval {
                    filename: filename.to_string(),
                    source,
                })
            }
        }
    }

    /// Open a library file for streaming
    pub async fn fetch(&self, filename: &str) -> Result<(LibraryEntry, File)> {
        validate_filename(filename)?;
        let entry = self
            .get(filename)
            .await
            .ok_or_else(|| LibraryError::NotFound(filename.to_string()))?;

        let file = File::open(self.root.join(filename)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LibraryError::NotFound(filename.to_string())
            } else {
                LibraryError::io(format!("opening {}", filename), e)
            }
        })?;
        Ok((entry, file))
    }
}

/// Index record for a file found on disk that the sidecar does not know
fn adopt(filename: &str) -> IndexRecord {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let (display_name, media_id) = parse_file_stem(stem);
    info!("Adopting untracked file {}", filename);

    IndexRecord {
        filename: filename.to_string(),
        display_name,
        media_id,
        source_url: None,
        duration_seconds: MediaDuration::ZERO,
        registered_at: Utc::now(),
    }
}

/// Accept only a single plain path component
pub fn validate_filename(filename: &str) -> Result<()> {
    let mut components = Path::new(filename).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();

    if single_normal && !filename.contains(['/', '\\', '\0']) {
        Ok(())
    } else {
        Err(LibraryError::InvalidFilename(filename.to_string()))
    }
}

async fn move_into_place(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }

    // Staging may live on another filesystem
    if let Err(e) = tokio::fs::copy(from, to).await {
        let _ = tokio::fs::remove_file(to).await;
        return Err(LibraryError::io(
            format!("moving {} to {}", from.display(), to.display()),
            e,
        ));
    }
    if let Err(e) = tokio::fs::remove_file(from).await {
        warn!("Could not remove staged file {}: {}", from.display(), e);
    }
    Ok(())
}
