//! Read-through collection cache with per-collection request coalescing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tracing::debug;

use crate::events::EventBus;
use crate::remote::{CollectionKind, CollectionQuery, RemoteStore, SignedInUser};
use crate::storage::{ExtensionData, StorageBackend};

/// Id-keyed records of one collection.
pub type CollectionMap = HashMap<String, Value>;

/// Coalesced waiters all clone the same result; errors travel as strings
/// and are rewrapped at the caller boundary.
type FetchResult = std::result::Result<CollectionMap, String>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Read-through cache over the persistent store.
///
/// A collection present in storage is authoritative until invalidated;
/// there is no TTL at this layer. Misses fall through to the remote store
/// with at most one in-flight fetch per collection name, process-wide.
pub struct CollectionCache<S> {
  storage: Arc<S>,
  remote: Arc<dyn RemoteStore>,
  events: EventBus,
  inflight: Mutex<HashMap<CollectionKind, SharedFetch>>,
}

impl<S: StorageBackend + 'static> CollectionCache<S> {
  pub fn new(storage: Arc<S>, remote: Arc<dyn RemoteStore>, events: EventBus) -> Self {
    Self {
      storage,
      remote,
      events,
      inflight: Mutex::new(HashMap::new()),
    }
  }

  /// Resolve a collection from cache or the remote store.
  ///
  /// Callers arriving while a fetch for the same collection is pending
  /// receive that fetch's eventual result instead of triggering another.
  pub async fn get(&self, kind: CollectionKind, user: &SignedInUser) -> Result<CollectionMap> {
    let (fetch, started_here) = {
      let mut inflight = self
        .inflight
        .lock()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;

      if let Some(pending) = inflight.get(&kind) {
        (pending.clone(), false)
      } else {
        if let Some(cached) = self.read_cached(kind)? {
          return Ok(cached);
        }
        let query = kind.query(user)?;
        let fetch = self.start_fetch(kind, query);
        inflight.insert(kind, fetch.clone());
        (fetch, true)
      }
    };

    let result = fetch.await;

    if started_here {
      // Clear the marker on both outcomes so a failed fetch can be retried.
      self
        .inflight
        .lock()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?
        .remove(&kind);
    }

    result.map_err(|message| eyre!(message))
  }

  /// Null out collection keys so the next read misses and refetches.
  pub fn invalidate(&self, kinds: &[CollectionKind]) -> Result<()> {
    for kind in kinds {
      self.storage.remove(kind.key())?;
    }
    Ok(())
  }

  fn read_cached(&self, kind: CollectionKind) -> Result<Option<CollectionMap>> {
    match self.storage.get(kind.key())? {
      Some(Value::Object(map)) if !map.is_empty() => Ok(Some(map.into_iter().collect())),
      _ => Ok(None),
    }
  }

  fn start_fetch(&self, kind: CollectionKind, query: CollectionQuery) -> SharedFetch {
    let storage = Arc::clone(&self.storage);
    let remote = Arc::clone(&self.remote);
    let events = self.events.clone();

    let future = async move {
      debug!(collection = kind.key(), "fetching collection from remote");
      let rows = remote.select(&query).await.map_err(|e| e.to_string())?;
      let map = normalize_rows(kind, rows)?;

      persist(&*storage, kind, &map).map_err(|e| e.to_string())?;
      events.emit(kind.update_event());

      Ok(map)
    };

    future.boxed().shared()
  }
}

/// Validate rows into an id-keyed mapping. Every row must be an object
/// carrying a non-empty string `id`.
fn normalize_rows(kind: CollectionKind, rows: Vec<Value>) -> FetchResult {
  let mut map = CollectionMap::with_capacity(rows.len());
  for row in rows {
    let id = row
      .get("id")
      .and_then(Value::as_str)
      .filter(|id| !id.is_empty())
      .ok_or_else(|| format!("{} row without an id: {}", kind.key(), row))?
      .to_string();
    map.insert(id, row);
  }
  Ok(map)
}

fn persist<S: StorageBackend + ?Sized>(
  storage: &S,
  kind: CollectionKind,
  map: &CollectionMap,
) -> Result<()> {
  let value =
    serde_json::to_value(map).map_err(|e| eyre!("Failed to serialize {}: {}", kind.key(), e))?;
  storage.set(kind.key(), value)?;
  ExtensionData::stamp_last_sync(storage, Utc::now())
}
