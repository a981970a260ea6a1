// src/storage.rs

//! Cold storage collaborator.
//!
//! Persists the session record across runs under a fixed storage name. Only
//! the session store actor ever writes, so no locking discipline is required
//! beyond the implementation's own interior mutability.

use crate::error::SigilError;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

/// Key under which the session record is persisted.
pub const STORAGE_KEY: &str = "current_user";

/// Version tag field inside persisted records.
pub const VERSION_FIELD: &str = "VERSION";

/// Narrow get/put contract over the host's persistent store.
#[async_trait]
pub trait ColdStorage: Send + Sync {
  /// Reads the stored record, `None` when nothing was ever persisted.
  async fn get(&self) -> Result<Option<Value>, SigilError>;

  /// Replaces the stored record.
  async fn put(&self, record: &Value) -> Result<(), SigilError>;
}

/// Loads the stored record, falling back when the persisted version tag does
/// not match the current default's.
///
/// Returns `ConfigMismatch` on a stale tag so the caller can recover locally;
/// the stale record is discarded either way.
pub async fn load_versioned(
  storage: &dyn ColdStorage,
  current_version: &str,
) -> Result<Option<Value>, SigilError> {
  let stored = storage.get().await?;
  match stored {
    None => Ok(None),
    Some(record) => {
      let stored_version = record.get(VERSION_FIELD).and_then(Value::as_str);
      if stored_version == Some(current_version) {
        Ok(Some(record))
      } else {
        tracing::warn!(
          stored = ?stored_version,
          current = current_version,
          "Discarding persisted session record with stale version"
        );
        Err(SigilError::ConfigMismatch)
      }
    }
  }
}

/// In-memory storage, the default when the host wires nothing else in.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  record: Mutex<Option<Value>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Pre-seeds the store, useful for restoring a known record.
  pub fn seeded(record: Value) -> Self {
    Self {
      record: Mutex::new(Some(record)),
    }
  }
}

#[async_trait]
impl ColdStorage for MemoryStorage {
  async fn get(&self) -> Result<Option<Value>, SigilError> {
    Ok(self.record.lock().await.clone())
  }

  async fn put(&self, record: &Value) -> Result<(), SigilError> {
    *self.record.lock().await = Some(record.clone());
    Ok(())
  }
}
