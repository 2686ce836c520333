//! Durable accumulation of the week's articles.
//!
//! The store lives in a single JSON file (an array of [`ArticleRecord`]).
//! Every mutation rewrites the whole file through a temporary sibling that is
//! synced and then renamed over the original, so an interrupted write leaves
//! either the old or the new contents and never a torn file.
//!
//! # Lifecycle
//!
//! 1. [`ArticleStore::load`] at startup (absent or corrupt file ⇒ empty store)
//! 2. [`ArticleStore::append`] after every daily collection pass
//! 3. [`ArticleStore::clear`] after a digest has been delivered

use crate::errors::StorageError;
use crate::models::ArticleRecord;
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

#[derive(Debug)]
pub struct ArticleStore {
    path: PathBuf,
    records: Vec<ArticleRecord>,
    /// In-memory records not yet on disk after a failed write.
    dirty: bool,
}

impl ArticleStore {
    /// Open the store at `path`, reconstructing its records from disk.
    ///
    /// Never fails: a missing file yields an empty store, and an unreadable or
    /// corrupt one is logged, moved aside to `<file>.corrupt-<timestamp>` and
    /// replaced by an empty store, so the next write cannot destroy it.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let records = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<ArticleRecord>>(&bytes) {
                Ok(records) => {
                    info!(count = records.len(), "Loaded article store");
                    dedupe(records)
                }
                Err(e) => {
                    warn!(error = %e, "Store file is corrupt; starting with an empty store");
                    quarantine(&path).await;
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No store file yet; starting with an empty store");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Store file is unreadable; starting with an empty store");
                quarantine(&path).await;
                Vec::new()
            }
        };

        Self {
            path,
            records,
            dirty: false,
        }
    }

    /// Merge `records` into the store, skipping any URL already present.
    ///
    /// Returns how many records were added. Nothing is written when every
    /// record is already known and the file is up to date. On a write failure
    /// the merged records stay in memory and the next call writes them again,
    /// even if it brings nothing new.
    #[instrument(level = "info", skip_all, fields(incoming = records.len()))]
    pub async fn append(&mut self, records: Vec<ArticleRecord>) -> Result<usize, StorageError> {
        let mut known: HashSet<String> = self.records.iter().map(|r| r.url.clone()).collect();
        let before = self.records.len();

        for record in records {
            if known.insert(record.url.clone()) {
                self.records.push(record);
            } else {
                debug!(url = %record.url, "Skipping already stored article");
            }
        }

        let added = self.records.len() - before;
        if added > 0 || self.dirty {
            self.flush().await?;
        }
        info!(added, total = self.records.len(), "Appended articles to store");
        Ok(added)
    }

    /// Every stored record, ordered by category and then by collection time.
    pub fn all(&self) -> Vec<ArticleRecord> {
        let mut records = self.records.clone();
        records.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then(a.collected_at.cmp(&b.collected_at))
        });
        records
    }

    /// Replace the store with an empty collection.
    ///
    /// The in-memory records are only dropped once the empty file is in place.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn clear(&mut self) -> Result<(), StorageError> {
        persist(&self.path, &[]).await?;
        let dropped = self.records.len();
        self.records.clear();
        self.dirty = false;
        info!(dropped, "Cleared article store");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        let result = persist(&self.path, &self.records).await;
        self.dirty = result.is_err();
        if self.dirty {
            warn!(pending = self.records.len(), "Store file is behind memory; will retry on next append");
        }
        result
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Keep the first record for every URL, in file order.
fn dedupe(records: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.url.clone()))
        .collect()
}

/// Write-to-temp-then-rename.
async fn persist(path: &Path, records: &[ArticleRecord]) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(records)?;
    let tmp = temp_path(path);

    let write = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    };

    if let Err(e) = write.await {
        let _ = fs::remove_file(&tmp).await;
        return Err(StorageError::io(path, e));
    }
    debug!(path = %path.display(), bytes = json.len(), "Persisted article store");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn quarantine(path: &Path) {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%SZ")));
    let target = path.with_file_name(name);

    match fs::rename(path, &target).await {
        Ok(()) => warn!(moved_to = %target.display(), "Moved corrupt store file aside"),
        Err(e) => warn!(error = %e, "Could not move corrupt store file aside"),
    }
}
