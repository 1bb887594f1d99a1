//! Durable task storage.
//!
//! The store is the single source of truth for task state. The scheduler,
//! the capture path and every status report read through it.

use crate::constants::{TASK_PAYLOAD_DIR, TASK_RECORD_DIR};
use crate::error::StoreError;
use crate::task::{TaskId, UploadTask};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persists a new task together with its payload. When this returns
    /// `Ok`, both survive a process restart.
    async fn insert(&self, task: &UploadTask, payload: &[u8]) -> Result<(), StoreError>;

    /// Overwrites the stored record of an existing task.
    async fn update(&self, task: &UploadTask) -> Result<(), StoreError>;

    async fn get(&self, id: TaskId) -> Result<Option<UploadTask>, StoreError>;

    /// Payload bytes, or `StoreError::MissingPayload`.
    async fn payload(&self, id: TaskId) -> Result<Vec<u8>, StoreError>;

    /// All stored tasks, oldest first.
    async fn list(&self) -> Result<Vec<UploadTask>, StoreError>;

    /// Deletes record and payload. Removing an unknown id is not an error.
    async fn remove(&self, id: TaskId) -> Result<(), StoreError>;

    async fn contains(&self, id: TaskId) -> Result<bool, StoreError> {
        Ok(self.get(id).await?.is_some())
    }
}

/// Directory-backed store: `tasks/<id>.json` records and `payloads/<id>.bin` blobs.
///
/// Every write lands in a temp file in the target directory, is synced, and
/// is then renamed over the destination. The directory is synced after the
/// rename, so readers only ever see complete files and an acknowledged write
/// outlives a crash.
#[derive(Debug, Clone)]
pub struct FileTaskStore {
    root: PathBuf,
}

impl FileTaskStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let dirs = [root.join(TASK_RECORD_DIR), root.join(TASK_PAYLOAD_DIR)];
        blocking(move || {
            for dir in &dirs {
                fs::create_dir_all(dir)?;
            }
            Ok(())
        })
        .await?;
        log::debug!("Opened task store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: TaskId) -> PathBuf {
        self.root.join(TASK_RECORD_DIR).join(format!("{}.json", id))
    }

    fn payload_path(&self, id: TaskId) -> PathBuf {
        self.root.join(TASK_PAYLOAD_DIR).join(format!("{}.bin", id))
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn insert(&self, task: &UploadTask, payload: &[u8]) -> Result<(), StoreError> {
        let record = serde_json::to_vec_pretty(task)?;
        let payload = payload.to_vec();
        let record_path = self.record_path(task.id);
        let payload_path = self.payload_path(task.id);
        blocking(move || {
            // Payload first: a visible record always has its payload.
            write_atomic(&payload_path, &payload)?;
            write_atomic(&record_path, &record)?;
            Ok(())
        })
        .await
    }

    async fn update(&self, task: &UploadTask) -> Result<(), StoreError> {
        let record = serde_json::to_vec_pretty(task)?;
        let record_path = self.record_path(task.id);
        blocking(move || Ok(write_atomic(&record_path, &record)?)).await
    }

    async fn get(&self, id: TaskId) -> Result<Option<UploadTask>, StoreError> {
        let record_path = self.record_path(id);
        blocking(move || match fs::read(&record_path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn payload(&self, id: TaskId) -> Result<Vec<u8>, StoreError> {
        let payload_path = self.payload_path(id);
        blocking(move || match fs::read(&payload_path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::MissingPayload(id)),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn list(&self) -> Result<Vec<UploadTask>, StoreError> {
        let dir = self.root.join(TASK_RECORD_DIR);
        blocking(move || {
            let mut tasks = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match fs::read(&path)
                    .map_err(StoreError::from)
                    .and_then(|bytes| Ok(serde_json::from_slice::<UploadTask>(&bytes)?))
                {
                    Ok(task) => tasks.push(task),
                    Err(e) => log::warn!("Skipping unreadable task record {}: {}", path.display(), e),
                }
            }
            tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(tasks)
        })
        .await
    }

    async fn remove(&self, id: TaskId) -> Result<(), StoreError> {
        let record_path = self.record_path(id);
        let payload_path = self.payload_path(id);
        blocking(move || {
            remove_if_exists(&record_path)?;
            remove_if_exists(&payload_path)?;
            Ok(())
        })
        .await
    }
}

fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    sync_dir(dir)
}

/// Flushes directory entries so a completed rename survives power loss.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
}

/// Non-durable store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, UploadTask>>,
    payloads: RwLock<HashMap<TaskId, Vec<u8>>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: &UploadTask, payload: &[u8]) -> Result<(), StoreError> {
        self.payloads.write().await.insert(task.id, payload.to_vec());
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn update(&self, task: &UploadTask) -> Result<(), StoreError> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<UploadTask>, StoreError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn payload(&self, id: TaskId) -> Result<Vec<u8>, StoreError> {
        self.payloads
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::MissingPayload(id))
    }

    async fn list(&self) -> Result<Vec<UploadTask>, StoreError> {
        let mut tasks: Vec<UploadTask> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn remove(&self, id: TaskId) -> Result<(), StoreError> {
        self.tasks.write().await.remove(&id);
        self.payloads.write().await.remove(&id);
        Ok(())
    }
}
