//! Persistent flat key-value storage shared by every extension context.
//!
//! The store is the ground truth for all cached state; there is no
//! in-memory source of truth, and other concurrent contexts may write
//! between any read and write (last-write-wins).

mod sqlite;

pub use sqlite::SqliteStorage;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Key the auth session is persisted under.
pub const KEY_SESSION: &str = "session";
/// Key the local signed-in-user projection is persisted under.
pub const KEY_SIGNED_IN_USER: &str = "signedInUser";
/// Key the auxiliary usage-stats bundle is persisted under.
pub const KEY_EXTENSION_DATA: &str = "extensionData";

/// Flat key-value storage backend.
pub trait StorageBackend: Send + Sync {
  /// Read the value under `key`, if any.
  fn get(&self, key: &str) -> Result<Option<Value>>;

  /// Write `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: Value) -> Result<()>;

  /// Remove the value under `key`.
  fn remove(&self, key: &str) -> Result<()>;

  /// Remove every key in the namespace.
  fn clear(&self) -> Result<()>;
}

/// Auxiliary persisted record distinct from the collections: cumulative
/// usage stats, the last-sync timestamp, and per-template last-used
/// timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionData {
  #[serde(default)]
  pub words: u64,
  #[serde(default)]
  pub last_sync: Option<DateTime<Utc>>,
  #[serde(default)]
  pub last_used: HashMap<String, DateTime<Utc>>,
}

impl ExtensionData {
  /// Read the bundle, treating a missing or malformed value as empty.
  pub fn load<S: StorageBackend + ?Sized>(storage: &S) -> Result<Self> {
    match storage.get(KEY_EXTENSION_DATA)? {
      Some(value) => Ok(serde_json::from_value(value).unwrap_or_default()),
      None => Ok(Self::default()),
    }
  }

  pub fn save<S: StorageBackend + ?Sized>(&self, storage: &S) -> Result<()> {
    let value =
      serde_json::to_value(self).map_err(|e| eyre!("Failed to serialize extension data: {}", e))?;
    storage.set(KEY_EXTENSION_DATA, value)
  }

  /// Record the time of the latest successful collection fetch.
  pub fn stamp_last_sync<S: StorageBackend + ?Sized>(storage: &S, now: DateTime<Utc>) -> Result<()> {
    let mut data = Self::load(storage)?;
    data.last_sync = Some(now);
    data.save(storage)
  }
}

/// Clear every key while keeping the cumulative word count, so usage stats
/// survive logout and plan changes.
pub fn clear_preserving_words<S: StorageBackend + ?Sized>(storage: &S) -> Result<()> {
  let words = ExtensionData::load(storage)?.words;
  storage.clear()?;
  let data = ExtensionData {
    words,
    ..ExtensionData::default()
  };
  data.save(storage)
}

/// Purely in-memory backend, for tests and incognito-style contexts where
/// nothing may touch disk.
#[derive(Default)]
pub struct MemoryStorage {
  values: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl StorageBackend for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<Value>> {
    let values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(values.get(key).cloned())
  }

  fn set(&self, key: &str, value: Value) -> Result<()> {
    let mut values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.insert(key.to_string(), value);
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let mut values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.clear();
    Ok(())
  }
}
