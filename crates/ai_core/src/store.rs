//! Artifact persistence, one current pipeline per prediction task
//!
//! `FileArtifactStore` lays files out as:
//!
//! ```text
//! <root>/agreement.json                      current artifact
//! <root>/history/agreement/000007-<hash>.json last `history_limit` artifacts
//! ```
//!
//! Every write goes to a uniquely named temporary file in the target
//! directory, is fsynced and then renamed over the destination, so a reader
//! always sees either the complete previous artifact or the complete new one.
//! Writers to the same task within one process are serialized; the last one
//! to finish is the one `get` returns.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, Metadata};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::artifact::{ArtifactInfo, ModelArtifact};
use crate::errors::{AiCoreError, Result};
use crate::schema::PredictionTask;

pub const DEFAULT_HISTORY_LIMIT: usize = 3;

/// One retained artifact as reported by [`ArtifactStore::versions`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVersion {
    pub info: ArtifactInfo,
    /// Whether this is the artifact `get` currently returns
    pub current: bool,
}

/// Named persistence of fitted pipelines
pub trait ArtifactStore: Send + Sync {
    /// Replace the current artifact of `task` as a whole
    fn put(&self, task: PredictionTask, artifact: &ModelArtifact) -> Result<()>;

    /// Current artifact, or `ArtifactNotFound` before the first training run
    fn get(&self, task: PredictionTask) -> Result<Arc<ModelArtifact>>;

    /// Retained artifacts, newest first
    fn versions(&self, task: PredictionTask) -> Result<Vec<StoredVersion>>;

    /// Make a retained artifact current again
    fn rollback(&self, task: PredictionTask, hash: &str) -> Result<ArtifactInfo>;

    fn contains(&self, task: PredictionTask) -> bool {
        self.get(task).is_ok()
    }
}

fn not_found(task: PredictionTask) -> AiCoreError {
    AiCoreError::ArtifactNotFound {
        task: task.to_string(),
    }
}

fn check_task(task: PredictionTask, artifact: &ModelArtifact) -> Result<()> {
    if artifact.task() != task {
        return Err(AiCoreError::InvalidInput(format!(
            "artifact was trained for '{}', cannot store it as '{}'",
            artifact.task(),
            task
        )));
    }
    Ok(())
}

/// A hash selector matches on the full hash or an unambiguous prefix of 8+ chars
fn hash_matches(hash: &str, selector: &str) -> bool {
    selector.len() >= 8 && hash.starts_with(selector)
}

#[derive(Debug, Clone)]
struct CachedArtifact {
    artifact: Arc<ModelArtifact>,
    modified: SystemTime,
    len: u64,
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    seq: u64,
    hash: String,
    path: PathBuf,
}

/// Directory-backed store with atomic replacement and bounded history
#[derive(Debug)]
pub struct FileArtifactStore {
    root: PathBuf,
    history_limit: usize,
    cache: RwLock<HashMap<PredictionTask, CachedArtifact>>,
    writers: Mutex<HashMap<PredictionTask, Arc<Mutex<()>>>>,
}

impl FileArtifactStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_history_limit(root, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(root: impl Into<PathBuf>, history_limit: usize) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            history_limit: history_limit.max(1),
            cache: RwLock::new(HashMap::new()),
            writers: Mutex::new(HashMap::new()),
        })
    }

    /// Lock held across a task's artifact write, cache update and history append
    fn writer(&self, task: PredictionTask) -> Arc<Mutex<()>> {
        Arc::clone(self.writers.lock().entry(task).or_default())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, task: PredictionTask) -> PathBuf {
        self.root.join(format!("{}.json", task.name()))
    }

    fn history_dir(&self, task: PredictionTask) -> PathBuf {
        self.root.join("history").join(task.name())
    }

    /// History entries sorted oldest first
    fn history(&self, task: PredictionTask) -> Result<Vec<HistoryEntry>> {
        let dir = self.history_dir(task);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut history = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let parsed = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|stem| stem.split_once('-'))
                .and_then(|(seq, hash)| Some((seq.parse::<u64>().ok()?, hash.to_string())));
            match parsed {
                Some((seq, hash)) => history.push(HistoryEntry { seq, hash, path }),
                None => warn!(path = %path.display(), "ignoring unrecognised history file"),
            }
        }
        history.sort_by_key(|e| e.seq);
        Ok(history)
    }

    fn read_artifact(path: &Path) -> Result<ModelArtifact> {
        let json = fs::read_to_string(path)?;
        ModelArtifact::from_json(&json)
    }

    fn remember(&self, task: PredictionTask, artifact: Arc<ModelArtifact>, meta: &Metadata) {
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        self.cache.write().insert(
            task,
            CachedArtifact {
                artifact,
                modified,
                len: meta.len(),
            },
        );
    }

    fn append_history(&self, task: PredictionTask, artifact: &ModelArtifact, json: &str) -> Result<()> {
        let mut history = self.history(task)?;
        if history.last().map(|e| e.hash.as_str()) == Some(artifact.hash.as_str()) {
            debug!(%task, hash = %artifact.hash, "artifact already newest in history");
        } else {
            let seq = history.last().map_or(1, |e| e.seq + 1);
            let path = self
                .history_dir(task)
                .join(format!("{seq:06}-{}.json", artifact.hash));
            write_atomic(&path, json.as_bytes())?;
            history.push(HistoryEntry {
                seq,
                hash: artifact.hash.clone(),
                path,
            });
        }

        let excess = history.len().saturating_sub(self.history_limit);
        for entry in history.into_iter().take(excess) {
            debug!(%task, hash = %entry.hash, "pruning old artifact");
            if let Err(e) = fs::remove_file(&entry.path) {
                warn!(path = %entry.path.display(), error = %e, "failed to prune artifact");
            }
        }
        Ok(())
    }
}

impl ArtifactStore for FileArtifactStore {
    #[instrument(skip(self, artifact), fields(task = %task, hash = %artifact.hash))]
    fn put(&self, task: PredictionTask, artifact: &ModelArtifact) -> Result<()> {
        check_task(task, artifact)?;
        artifact.verify()?;

        let json = artifact.to_json()?;
        let writer = self.writer(task);
        let _guard = writer.lock();
        let meta = write_atomic(&self.artifact_path(task), json.as_bytes())?;
        self.remember(task, Arc::new(artifact.clone()), &meta);
        self.append_history(task, artifact, &json)?;

        info!(bytes = json.len(), "stored artifact");
        Ok(())
    }

    #[instrument(skip(self), fields(task = %task))]
    fn get(&self, task: PredictionTask) -> Result<Arc<ModelArtifact>> {
        let path = self.artifact_path(task);
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                self.cache.write().remove(&task);
                return Err(not_found(task));
            }
            Err(e) => return Err(e.into()),
        };
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        if let Some(cached) = self.cache.read().get(&task) {
            if cached.modified == modified && cached.len == meta.len() {
                debug!("artifact served from cache");
                return Ok(cached.artifact.clone());
            }
        }

        let artifact = Arc::new(Self::read_artifact(&path)?);
        if artifact.task() != task {
            return Err(AiCoreError::InvalidArtifact(format!(
                "{} holds an artifact for '{}'",
                path.display(),
                artifact.task()
            )));
        }
        self.cache.write().insert(
            task,
            CachedArtifact {
                artifact: artifact.clone(),
                modified,
                len: meta.len(),
            },
        );
        debug!(hash = %artifact.hash, "artifact loaded from disk");
        Ok(artifact)
    }

    fn versions(&self, task: PredictionTask) -> Result<Vec<StoredVersion>> {
        let current = match self.get(task) {
            Ok(artifact) => Some(artifact.hash.clone()),
            Err(AiCoreError::ArtifactNotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let mut versions = Vec::new();
        for entry in self.history(task)?.into_iter().rev() {
            match Self::read_artifact(&entry.path) {
                Ok(artifact) => versions.push(StoredVersion {
                    current: current.as_deref() == Some(artifact.hash.as_str()),
                    info: artifact.info(),
                }),
                Err(e) => warn!(path = %entry.path.display(), error = %e, "skipping unreadable history entry"),
            }
        }
        Ok(versions)
    }

    #[instrument(skip(self), fields(task = %task))]
    fn rollback(&self, task: PredictionTask, hash: &str) -> Result<ArtifactInfo> {
        let writer = self.writer(task);
        let _guard = writer.lock();
        let entry = self
            .history(task)?
            .into_iter()
            .rev()
            .find(|e| hash_matches(&e.hash, hash))
            .ok_or_else(|| {
                AiCoreError::InvalidInput(format!("no retained '{task}' artifact with hash '{hash}'"))
            })?;

        let artifact = Self::read_artifact(&entry.path)?;
        let json = artifact.to_json()?;
        let meta = write_atomic(&self.artifact_path(task), json.as_bytes())?;
        let info = artifact.info();
        self.remember(task, Arc::new(artifact), &meta);

        info!(hash = %info.hash, "rolled back artifact");
        Ok(info)
    }
}

/// Write `bytes` to `path` through a synced temporary file and a rename
///
/// Returns the metadata of the file that was persisted, taken before any
/// later writer can replace it.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<Metadata> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    let file = temp.persist(path).map_err(|e| e.error)?;
    let meta = file.metadata()?;

    // persist the rename itself; not every platform lets us open a directory
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!(dir = %dir.display(), error = %e, "directory sync skipped");
    }
    Ok(meta)
}

#[derive(Debug, Default)]
struct MemorySlot {
    /// Oldest first
    versions: Vec<Arc<ModelArtifact>>,
    current: usize,
}

/// In-process store with the same semantics, used by tests and dry runs
#[derive(Debug)]
pub struct MemoryArtifactStore {
    history_limit: usize,
    slots: RwLock<HashMap<PredictionTask, MemorySlot>>,
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl MemoryArtifactStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit: history_limit.max(1),
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, task: PredictionTask, artifact: &ModelArtifact) -> Result<()> {
        check_task(task, artifact)?;
        artifact.verify()?;

        let mut slots = self.slots.write();
        let slot = slots.entry(task).or_default();
        let newest_matches = slot
            .versions
            .last()
            .is_some_and(|a| a.hash == artifact.hash);
        if !newest_matches {
            slot.versions.push(Arc::new(artifact.clone()));
        } else if let Some(last) = slot.versions.last_mut() {
            *last = Arc::new(artifact.clone());
        }
        let excess = slot.versions.len().saturating_sub(self.history_limit);
        slot.versions.drain(..excess);
        slot.current = slot.versions.len() - 1;
        Ok(())
    }

    fn get(&self, task: PredictionTask) -> Result<Arc<ModelArtifact>> {
        self.slots
            .read()
            .get(&task)
            .and_then(|slot| slot.versions.get(slot.current).cloned())
            .ok_or_else(|| not_found(task))
    }

    fn versions(&self, task: PredictionTask) -> Result<Vec<StoredVersion>> {
        let slots = self.slots.read();
        let Some(slot) = slots.get(&task) else {
            return Ok(Vec::new());
        };
        Ok(slot
            .versions
            .iter()
            .enumerate()
            .rev()
            .map(|(idx, artifact)| StoredVersion {
                info: artifact.info(),
                current: idx == slot.current,
            })
            .collect())
    }

    fn rollback(&self, task: PredictionTask, hash: &str) -> Result<ArtifactInfo> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(&task).ok_or_else(|| not_found(task))?;
        let idx = slot
            .versions
            .iter()
            .rposition(|a| hash_matches(&a.hash, hash))
            .ok_or_else(|| {
                AiCoreError::InvalidInput(format!("no retained '{task}' artifact with hash '{hash}'"))
            })?;
        slot.current = idx;
        Ok(slot.versions[idx].info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::fixtures::{agreement_artifact, agreement_pipeline};
    use crate::artifact::TrainingSummary;
    use crate::forest::Node;
    use tempfile::tempdir;

    /// Same pipeline with a different leaf, hence a different hash
    fn variant(leaf: i64) -> ModelArtifact {
        let mut pipeline = agreement_pipeline();
        if let Node::Leaf { value, .. } = &mut pipeline.forest.trees[0].nodes[2] {
            *value = leaf;
        }
        ModelArtifact::new(
            pipeline,
            TrainingSummary {
                train_rows: 2,
                test_rows: 0,
                class_counts: [1, 1],
                metrics: None,
            },
        )
        .unwrap()
    }

    fn stores(dir: &Path) -> Vec<Box<dyn ArtifactStore>> {
        vec![
            Box::new(FileArtifactStore::with_history_limit(dir, 2).unwrap()),
            Box::new(MemoryArtifactStore::new(2)),
        ]
    }

    #[test]
    fn test_get_before_put_is_not_found() {
        let dir = tempdir().unwrap();
        for store in stores(dir.path()) {
            let err = store.get(PredictionTask::Agreement).unwrap_err();
            assert!(matches!(err, AiCoreError::ArtifactNotFound { .. }));
            assert!(!store.contains(PredictionTask::Task));
        }
    }

    #[test]
    fn test_put_replaces_whole_artifact() {
        let dir = tempdir().unwrap();
        for store in stores(dir.path()) {
            let first = variant(100_000);
            let second = variant(200_000);
            store.put(PredictionTask::Agreement, &first).unwrap();
            assert_eq!(store.get(PredictionTask::Agreement).unwrap().hash, first.hash);
            store.put(PredictionTask::Agreement, &second).unwrap();
            assert_eq!(*store.get(PredictionTask::Agreement).unwrap(), second);
        }
    }

    #[test]
    fn test_put_rejects_wrong_task() {
        let dir = tempdir().unwrap();
        for store in stores(dir.path()) {
            let err = store.put(PredictionTask::Task, &agreement_artifact()).unwrap_err();
            assert!(matches!(err, AiCoreError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_history_is_pruned_and_rollback_restores() {
        let dir = tempdir().unwrap();
        for store in stores(dir.path().join("h").as_path()) {
            let a = variant(100_000);
            let b = variant(200_000);
            let c = variant(300_000);
            for artifact in [&a, &b, &c] {
                store.put(PredictionTask::Agreement, artifact).unwrap();
            }

            let versions = store.versions(PredictionTask::Agreement).unwrap();
            let hashes: Vec<&str> = versions.iter().map(|v| v.info.hash.as_str()).collect();
            assert_eq!(hashes, vec![c.hash.as_str(), b.hash.as_str()]);
            assert!(versions[0].current);
            assert!(!versions[1].current);

            let info = store.rollback(PredictionTask::Agreement, &b.hash[..12]).unwrap();
            assert_eq!(info.hash, b.hash);
            assert_eq!(store.get(PredictionTask::Agreement).unwrap().hash, b.hash);

            let err = store.rollback(PredictionTask::Agreement, &a.hash).unwrap_err();
            assert!(matches!(err, AiCoreError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_identical_retrain_does_not_grow_history() {
        let dir = tempdir().unwrap();
        for store in stores(dir.path()) {
            store.put(PredictionTask::Agreement, &agreement_artifact()).unwrap();
            store.put(PredictionTask::Agreement, &agreement_artifact()).unwrap();
            assert_eq!(store.versions(PredictionTask::Agreement).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_file_store_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = FileArtifactStore::open(dir.path()).unwrap();
        store.put(PredictionTask::Agreement, &agreement_artifact()).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"agreement.json".to_string()));
        assert!(
            names.iter().all(|n| n == "agreement.json" || n == "history"),
            "{names:?}"
        );
    }

    #[test]
    fn test_file_store_picks_up_external_replacement() {
        let dir = tempdir().unwrap();
        let writer = FileArtifactStore::open(dir.path()).unwrap();
        let reader = FileArtifactStore::open(dir.path()).unwrap();

        writer.put(PredictionTask::Agreement, &variant(5)).unwrap();
        assert_eq!(
            reader.get(PredictionTask::Agreement).unwrap().hash,
            variant(5).hash
        );

        let newer = variant(999_999);
        writer.put(PredictionTask::Agreement, &newer).unwrap();
        // content length differs, so the cache is revalidated even on coarse mtimes
        assert_eq!(reader.get(PredictionTask::Agreement).unwrap().hash, newer.hash);
    }

    #[test]
    fn test_corrupt_file_is_invalid_artifact() {
        let dir = tempdir().unwrap();
        let store = FileArtifactStore::open(dir.path()).unwrap();
        fs::write(store.artifact_path(PredictionTask::Task), b"{not json").unwrap();
        let err = store.get(PredictionTask::Task).unwrap_err();
        assert!(matches!(err, AiCoreError::InvalidArtifact(_)));
    }
}
