//! Persisted mapping from (source, effect) to produced artifacts.
//!
//! The index lives next to the artifacts as `cache_index.json`. It is only
//! ever replaced atomically (write to a temp file, then rename), and it can
//! always be rebuilt from the artifact filenames because they embed the key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use backdrop_models::Effect;

use crate::error::{StorageError, StorageResult};
use crate::key::{parse_artifact_filename, CacheKey};

/// Index file name inside the output directory.
pub const INDEX_FILE: &str = "cache_index.json";
const INDEX_VERSION: u32 = 1;

/// A cached result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Source as submitted; unknown for entries recovered from disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub effect: Effect,
    /// Artifact file name inside the output directory
    pub filename: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        key: CacheKey,
        source: impl Into<String>,
        effect: Effect,
        filename: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            key,
            source: Some(source.into()),
            effect,
            filename: filename.into(),
            size_bytes,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheIndex {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<CacheKey, CacheEntry>,
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// Aggregate cache figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub count: usize,
    pub total_bytes: u64,
}

/// A video file present in the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Effect encoded in the filename, for artifacts this service produced
    pub effect: Option<Effect>,
    /// Whether the cache index points at this file
    pub cached: bool,
}

/// Output directory plus its cache index.
///
/// Reads run concurrently; every mutation holds the write lock while it
/// updates the in-memory index and persists it.
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    index_path: PathBuf,
    index: RwLock<CacheIndex>,
}

impl CacheStore {
    /// Open (creating if needed) the output directory and load its index.
    ///
    /// A missing index starts from the artifacts on disk; an unreadable one
    /// is rebuilt the same way. Entries whose files are gone are pruned.
    pub async fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        let index_path = dir.join(INDEX_FILE);

        let store = Self {
            dir,
            index_path,
            index: RwLock::new(CacheIndex::default()),
        };

        let loaded = match fs::read(&store.index_path).await {
            Ok(bytes) => match serde_json::from_slice::<CacheIndex>(&bytes) {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!(
                        path = %store.index_path.display(),
                        error = %e,
                        "Cache index is corrupt, rebuilding from artifacts"
                    );
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(
                    path = %store.index_path.display(),
                    error = %e,
                    "Cache index is unreadable, rebuilding from artifacts"
                );
                None
            }
        };

        match loaded {
            Some(index) => {
                let mut guard = store.index.write().await;
                *guard = index;
                let pruned = store.prune_missing(&mut guard).await;
                if pruned > 0 {
                    info!(pruned, "Pruned cache entries with missing artifacts");
                    store.persist(&guard).await?;
                }
            }
            None => {
                store.rebuild().await?;
            }
        }

        Ok(store)
    }

    /// Directory holding the artifacts.
    pub fn output_dir(&self) -> &Path {
        &self.dir
    }

    /// Full path for an artifact filename (no validation).
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Find a valid entry. An entry whose file vanished is dropped and
    /// reported as a miss.
    pub async fn lookup(&self, key: &CacheKey) -> StorageResult<Option<CacheEntry>> {
        let entry = {
            let index = self.index.read().await;
            match index.entries.get(key) {
                Some(entry) => entry.clone(),
                None => return Ok(None),
            }
        };

        if self.file_exists(&entry.filename).await {
            return Ok(Some(entry));
        }

        let mut index = self.index.write().await;
        if index.entries.get(key) == Some(&entry) {
            index.entries.remove(key);
            warn!(key = %key, filename = %entry.filename, "Dropping stale cache entry");
            self.persist(&index).await?;
        }
        Ok(None)
    }

    /// Register a finished artifact.
    ///
    /// If a valid entry already exists for the key it is kept and returned.
    pub async fn insert(&self, entry: CacheEntry) -> StorageResult<CacheEntry> {
        validate_filename(&entry.filename)?;
        if !self.file_exists(&entry.filename).await {
            return Err(StorageError::not_found(entry.filename));
        }

        let mut index = self.index.write().await;
        if let Some(existing) = index.entries.get(&entry.key) {
            if self.file_exists(&existing.filename).await {
                debug!(key = %entry.key, "Cache entry already present");
                return Ok(existing.clone());
            }
        }

        let previous = index.entries.insert(entry.key.clone(), entry.clone());
        if let Err(e) = self.persist(&index).await {
            match previous {
                Some(previous) => index.entries.insert(entry.key.clone(), previous),
                None => index.entries.remove(&entry.key),
            };
            return Err(e);
        }
        info!(key = %entry.key, filename = %entry.filename, "Cached artifact");
        Ok(entry)
    }

    /// Drop every entry and delete the produced artifacts.
    ///
    /// Returns the number of files removed.
    pub async fn clear(&self) -> StorageResult<usize> {
        let mut index = self.index.write().await;

        let mut names: Vec<String> = index.entries.values().map(|e| e.filename.clone()).collect();
        for artifact in self.scan_artifacts().await? {
            if artifact.effect.is_some() && !names.contains(&artifact.filename) {
                names.push(artifact.filename);
            }
        }

        let mut removed = 0;
        for name in names {
            match fs::remove_file(self.dir.join(&name)).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(filename = %name, error = %e, "Failed to delete artifact"),
            }
        }

        index.entries.clear();
        self.persist(&index).await?;
        info!(removed, "Cache cleared");
        Ok(removed)
    }

    /// Entry count and total artifact size.
    pub async fn stats(&self) -> CacheStats {
        let index = self.index.read().await;
        CacheStats {
            count: index.entries.len(),
            total_bytes: index.entries.values().map(|e| e.size_bytes).sum(),
        }
    }

    /// Snapshot of all valid entries.
    pub async fn entries(&self) -> Vec<CacheEntry> {
        self.index.read().await.entries.values().cloned().collect()
    }

    /// Video files in the output directory, newest first.
    pub async fn list_artifacts(&self) -> StorageResult<Vec<ArtifactInfo>> {
        let mut artifacts = self.scan_artifacts().await?;
        let index = self.index.read().await;
        for artifact in &mut artifacts {
            artifact.cached = index
                .entries
                .values()
                .any(|e| e.filename == artifact.filename);
        }
        artifacts.sort_by(|a, b| b.modified.cmp(&a.modified).then(a.filename.cmp(&b.filename)));
        Ok(artifacts)
    }

    /// Resolve an artifact by bare filename, refusing anything that could
    /// escape the output directory.
    pub async fn artifact_path(&self, filename: &str) -> StorageResult<PathBuf> {
        validate_filename(filename)?;
        let path = self.dir.join(filename);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(StorageError::not_found(filename)),
        }
    }

    /// Replace the index with one derived from the artifacts on disk.
    ///
    /// Returns the number of recovered entries.
    pub async fn rebuild(&self) -> StorageResult<usize> {
        let mut index = self.index.write().await;
        let mut rebuilt = CacheIndex::default();

        for artifact in self.scan_artifacts().await? {
            if let Some((effect, key)) = parse_artifact_filename(&artifact.filename) {
                rebuilt.entries.insert(
                    key.clone(),
                    CacheEntry {
                        key,
                        source: None,
                        effect,
                        filename: artifact.filename,
                        size_bytes: artifact.size_bytes,
                        created_at: artifact.modified.unwrap_or_else(Utc::now),
                    },
                );
            }
        }

        let count = rebuilt.entries.len();
        *index = rebuilt;
        self.persist(&index).await?;
        info!(entries = count, "Rebuilt cache index from artifacts");
        Ok(count)
    }

    async fn file_exists(&self, filename: &str) -> bool {
        fs::try_exists(self.dir.join(filename)).await.unwrap_or(false)
    }

    async fn prune_missing(&self, index: &mut CacheIndex) -> usize {
        let mut missing = Vec::new();
        for (key, entry) in &index.entries {
            if validate_filename(&entry.filename).is_err() || !self.file_exists(&entry.filename).await {
                missing.push(key.clone());
            }
        }
        for key in &missing {
            index.entries.remove(key);
        }
        missing.len()
    }

    async fn scan_artifacts(&self) -> StorageResult<Vec<ArtifactInfo>> {
        let mut artifacts = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().to_string();
            if !name.ends_with(".mp4") {
                continue;
            }
            let meta = match item.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            artifacts.push(ArtifactInfo {
                effect: parse_artifact_filename(&name).map(|(effect, _)| effect),
                filename: name,
                size_bytes: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
                cached: false,
            });
        }
        Ok(artifacts)
    }

    async fn persist(&self, index: &CacheIndex) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(index)?;
        let tmp = self.index_path.with_extension("json.tmp");
        fs::write(&tmp, &json).await?;
        if let Err(e) = fs::rename(&tmp, &self.index_path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Accept only a bare file name.
pub fn validate_filename(filename: &str) -> StorageResult<()> {
    let bad = filename.is_empty()
        || filename.starts_with('.')
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains('\0')
        || filename == INDEX_FILE;
    if bad {
        return Err(StorageError::invalid_filename(filename));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::artifact_filename;
    use tempfile::TempDir;

    async fn write_artifact(store: &CacheStore, source: &str, effect: Effect) -> CacheEntry {
        let key = CacheKey::new(source, effect);
        let filename = artifact_filename(effect, &key);
        fs::write(store.path_for(&filename), b"mp4 bytes").await.unwrap();
        CacheEntry::new(key, source, effect, filename, 9)
    }

    #[tokio::test]
    async fn test_insert_then_lookup() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        let entry = write_artifact(&store, "a.mp4", Effect::Sepia).await;

        store.insert(entry.clone()).await.unwrap();
        let found = store.lookup(&entry.key).await.unwrap();
        assert_eq!(found, Some(entry));
        assert_eq!(store.stats().await, CacheStats { count: 1, total_bytes: 9 });
    }

    #[tokio::test]
    async fn test_insert_keeps_existing_valid_entry() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        let first = write_artifact(&store, "a.mp4", Effect::Blur).await;
        store.insert(first.clone()).await.unwrap();

        let mut second = first.clone();
        second.size_bytes = 1234;
        let kept = store.insert(second).await.unwrap();
        assert_eq!(kept, first);
    }

    #[tokio::test]
    async fn test_insert_requires_file() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        let key = CacheKey::new("a.mp4", Effect::Blur);
        let entry = CacheEntry::new(key.clone(), "a.mp4", Effect::Blur, artifact_filename(Effect::Blur, &key), 1);
        assert!(matches!(store.insert(entry).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_index_write_leaves_no_entry() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        // The index is written through a temp file; a directory in its way
        // makes the write fail
        fs::create_dir(dir.path().join("cache_index.json.tmp")).await.unwrap();

        let entry = write_artifact(&store, "a.mp4", Effect::Sepia).await;
        assert!(store.insert(entry.clone()).await.is_err());
        assert_eq!(store.lookup(&entry.key).await.unwrap(), None);
        assert_eq!(store.stats().await.count, 0);
    }

    #[tokio::test]
    async fn test_stale_entry_invalidated_on_lookup() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        let entry = write_artifact(&store, "a.mp4", Effect::Grayscale).await;
        store.insert(entry.clone()).await.unwrap();

        fs::remove_file(store.path_for(&entry.filename)).await.unwrap();
        assert_eq!(store.lookup(&entry.key).await.unwrap(), None);
        assert_eq!(store.stats().await.count, 0);

        // A fresh artifact for the same key can be registered again
        let again = write_artifact(&store, "a.mp4", Effect::Grayscale).await;
        store.insert(again).await.unwrap();
        assert!(store.lookup(&entry.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let entry = {
            let store = CacheStore::open(dir.path()).await.unwrap();
            let entry = write_artifact(&store, "https://x.test/v.mp4", Effect::Sepia).await;
            store.insert(entry.clone()).await.unwrap();
            entry
        };

        let reopened = CacheStore::open(dir.path()).await.unwrap();
        let found = reopened.lookup(&entry.key).await.unwrap().unwrap();
        assert_eq!(found.source.as_deref(), Some("https://x.test/v.mp4"));
    }

    #[tokio::test]
    async fn test_corrupt_index_is_rebuilt_from_artifacts() {
        let dir = TempDir::new().unwrap();
        let entry = {
            let store = CacheStore::open(dir.path()).await.unwrap();
            let entry = write_artifact(&store, "clip.mp4", Effect::Blur).await;
            store.insert(entry.clone()).await.unwrap();
            entry
        };
        fs::write(dir.path().join(INDEX_FILE), b"{ not json").await.unwrap();

        let store = CacheStore::open(dir.path()).await.unwrap();
        let found = store.lookup(&entry.key).await.unwrap().unwrap();
        assert_eq!(found.filename, entry.filename);
        assert_eq!(found.effect, Effect::Blur);
        assert_eq!(found.source, None);

        // The repaired index parses again
        let bytes = fs::read(dir.path().join(INDEX_FILE)).await.unwrap();
        assert!(serde_json::from_slice::<serde_json::Value>(&bytes).is_ok());
    }

    #[tokio::test]
    async fn test_missing_files_pruned_on_open() {
        let dir = TempDir::new().unwrap();
        let entry = {
            let store = CacheStore::open(dir.path()).await.unwrap();
            let entry = write_artifact(&store, "clip.mp4", Effect::Sepia).await;
            store.insert(entry.clone()).await.unwrap();
            entry
        };
        fs::remove_file(dir.path().join(&entry.filename)).await.unwrap();

        let store = CacheStore::open(dir.path()).await.unwrap();
        assert_eq!(store.stats().await.count, 0);
    }

    #[tokio::test]
    async fn test_clear_removes_entries_and_files() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        let a = write_artifact(&store, "a.mp4", Effect::Sepia).await;
        let b = write_artifact(&store, "b.mp4", Effect::Blur).await;
        store.insert(a.clone()).await.unwrap();
        store.insert(b.clone()).await.unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.stats().await, CacheStats::default());
        assert!(!dir.path().join(&a.filename).exists());
        assert!(!dir.path().join(&b.filename).exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_list_artifacts_marks_cached() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        let entry = write_artifact(&store, "a.mp4", Effect::Sepia).await;
        store.insert(entry.clone()).await.unwrap();
        fs::write(dir.path().join("upload.mp4"), b"raw").await.unwrap();

        let artifacts = store.list_artifacts().await.unwrap();
        assert_eq!(artifacts.len(), 2);
        let cached = artifacts.iter().find(|a| a.filename == entry.filename).unwrap();
        assert!(cached.cached);
        assert_eq!(cached.effect, Some(Effect::Sepia));
        let other = artifacts.iter().find(|a| a.filename == "upload.mp4").unwrap();
        assert!(!other.cached);
        assert_eq!(other.effect, None);
    }

    #[tokio::test]
    async fn test_artifact_path_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        for bad in ["../etc/passwd", "a/b.mp4", "..", "", ".hidden.mp4", "a\\b.mp4", INDEX_FILE] {
            assert!(
                matches!(store.artifact_path(bad).await, Err(StorageError::InvalidFilename(_))),
                "{:?} should be rejected",
                bad
            );
        }
        assert!(matches!(
            store.artifact_path("missing.mp4").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
