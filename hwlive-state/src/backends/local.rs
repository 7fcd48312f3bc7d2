//! Local file backend
//!
//! State lives in a JSON file (default: `hwlive.state.json`). The lock is a
//! sibling `.lock` file created exclusively, so two processes cannot both
//! take it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};
use crate::lock::LockInfo;
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "hwlive.state.json";

    pub fn new() -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_STATE_FILE))
    }

    pub fn with_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
        }
    }

    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        match config.get_string("path") {
            Some("") => Err(BackendError::Configuration(
                "local backend path must not be empty".to_string(),
            )),
            Some(path) => Ok(Self::with_path(path)),
            None => Ok(Self::new()),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match fs::read_to_string(&self.lock_path).await {
            Ok(content) => {
                let lock = serde_json::from_str(&content).map_err(|source| {
                    BackendError::InvalidState {
                        path: self.lock_path.clone(),
                        source,
                    }
                })?;
                Ok(Some(lock))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::io(&self.lock_path, e)),
        }
    }

    async fn remove_lock_file(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| BackendError::io(&self.lock_path, e))
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::io(&self.state_path, e)),
        };
        let state = serde_json::from_str(&content).map_err(|source| BackendError::InvalidState {
            path: self.state_path.clone(),
            source,
        })?;
        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(current) = self.read_state().await?
            && current.lineage != state.lineage
        {
            return Err(BackendError::LineageMismatch {
                expected: current.lineage,
                actual: state.lineage.clone(),
            });
        }

        let content = serde_json::to_string_pretty(state)?;
        // Write to a temporary file first so a crash never leaves half a state
        let tmp_path = self.state_path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| BackendError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(|e| BackendError::io(&self.state_path, e))?;
        debug!("Wrote state serial {} to {}", state.serial, self.state_path.display());
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        if let Some(existing) = self.read_lock().await? {
            if !existing.is_expired() {
                return Err(BackendError::locked(&existing));
            }
            warn!(
                "Taking over expired lock {} held by {}",
                existing.id, existing.who
            );
            self.remove_lock_file().await?;
        }

        let lock = LockInfo::new(operation);
        let content = serde_json::to_string_pretty(&lock)?;
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Lost a race with another process
                return match self.read_lock().await? {
                    Some(other) => Err(BackendError::locked(&other)),
                    None => Err(BackendError::io(&self.lock_path, e)),
                };
            }
            Err(e) => return Err(BackendError::io(&self.lock_path, e)),
        };
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| BackendError::io(&self.lock_path, e))?;
        file.flush()
            .await
            .map_err(|e| BackendError::io(&self.lock_path, e))?;

        debug!("Acquired lock {} for {}", lock.id, operation);
        Ok(lock)
    }

    async fn renew_lock(&self, lock: &LockInfo, lease: chrono::Duration) -> BackendResult<LockInfo> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;
        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }

        let renewed = existing.renewed(lease);
        let content = serde_json::to_string_pretty(&renewed)?;
        let tmp_path = self.lock_path.with_extension("lock.tmp");
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| BackendError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.lock_path)
            .await
            .map_err(|e| BackendError::io(&self.lock_path, e))?;
        debug!("Renewed lock {} until {}", renewed.id, renewed.expires);
        Ok(renewed)
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;
        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }
        self.remove_lock_file().await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock_id.to_string()))?;
        if existing.id != lock_id {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            });
        }
        self.remove_lock_file().await
    }

    async fn init(&self) -> BackendResult<()> {
        if let Some(parent) = self.state_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::io(parent, e))?;
        }
        Ok(())
    }
}
