//! State backend trait and error types

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use hwlive_core::resource::Value;
use thiserror::Error;

use crate::lock::LockInfo;
use crate::state::StateFile;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("State is locked by {who} (lock ID: {lock_id}, operation: {operation})")]
    Locked {
        lock_id: String,
        who: String,
        operation: String,
    },

    #[error("Lock not found: {0}")]
    LockNotFound(String),

    #[error("Lock ID mismatch: expected {expected}, got {actual}")]
    LockMismatch { expected: String, actual: String },

    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    #[error("Backend configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state file {}: {source}", path.display())]
    InvalidState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("State lineage mismatch: expected {expected}, got {actual}")]
    LineageMismatch { expected: String, actual: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    pub fn locked(lock: &LockInfo) -> Self {
        Self::Locked {
            lock_id: lock.id.clone(),
            who: lock.who.clone(),
            operation: lock.operation.clone(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for the state file, with locking for exclusive access
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Read the current state; `None` when nothing has been written yet
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Write the state
    ///
    /// Fails with `LineageMismatch` when the stored state belongs to a
    /// different history.
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Take the lock for `operation`, unless someone else holds an unexpired one
    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo>;

    /// Extend a held lock so it expires `lease` from now
    ///
    /// Fails with `LockMismatch` when the lock has been taken over.
    async fn renew_lock(&self, lock: &LockInfo, lease: chrono::Duration) -> BackendResult<LockInfo>;

    /// Release a lock taken with [`acquire_lock`](Self::acquire_lock)
    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    /// Remove the lock with the given ID regardless of its owner
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;

    /// Prepare the storage location
    async fn init(&self) -> BackendResult<()>;
}

/// Configuration for a state backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend type (only "local" is supported)
    pub backend_type: String,
    pub attributes: HashMap<String, Value>,
}

impl BackendConfig {
    pub fn local() -> Self {
        Self {
            backend_type: "local".to_string(),
            attributes: HashMap::new(),
        }
    }

    /// Build from a JSON object such as `{"type": "local", "path": "..."}`
    pub fn from_json(value: &serde_json::Value) -> BackendResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| BackendError::Configuration("backend must be an object".to_string()))?;
        let backend_type = object
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| BackendError::Configuration("backend needs a 'type'".to_string()))?
            .to_string();
        let attributes = object
            .iter()
            .filter(|(k, _)| k.as_str() != "type")
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect();
        Ok(Self {
            backend_type,
            attributes,
        })
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn locked_error_names_the_owner() {
        let lock = LockInfo::new("apply");
        let error = BackendError::locked(&lock);
        assert_eq!(
            error.to_string(),
            format!(
                "State is locked by {} (lock ID: {}, operation: apply)",
                lock.who, lock.id
            )
        );
    }

    #[test]
    fn io_error_includes_path() {
        let error = BackendError::io(
            "hwlive.state.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(error.to_string(), "I/O error on hwlive.state.json: denied");
    }

    #[test]
    fn config_from_json() {
        let config = BackendConfig::from_json(&json!({"type": "local", "path": "a.json"})).unwrap();
        assert_eq!(config.backend_type, "local");
        assert_eq!(config.get_string("path"), Some("a.json"));
        assert!(config.get_string("type").is_none());

        assert!(BackendConfig::from_json(&json!({"path": "a.json"})).is_err());
        assert!(BackendConfig::from_json(&json!("local")).is_err());
    }
}
