//! Session persistence across process restarts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::remote::{AuthClient, Session};
use crate::storage::{StorageBackend, KEY_SESSION};

/// Persists the auth session and keeps the stored copy in step with the
/// live auth client.
pub struct SessionStore<S> {
  storage: Arc<S>,
  auth: Arc<dyn AuthClient>,
  loaded: AtomicBool,
}

impl<S: StorageBackend + 'static> SessionStore<S> {
  pub fn new(storage: Arc<S>, auth: Arc<dyn AuthClient>) -> Self {
    Self {
      storage,
      auth,
      loaded: AtomicBool::new(false),
    }
  }

  /// Write the session (or null) under the session key.
  pub fn save(&self, session: Option<&Session>) -> Result<()> {
    persist_session(&*self.storage, session)
  }

  /// Restore the persisted session into the auth client.
  ///
  /// Runs at most once per process lifetime, no matter how many entry
  /// points race to call it. Expired or invalid tokens are dropped
  /// silently so cold starts never fail on a dead session.
  pub async fn load(&self) -> Result<()> {
    if self.loaded.swap(true, Ordering::SeqCst) {
      return Ok(());
    }

    let stored = self.storage.get(KEY_SESSION)?;
    let session = stored.and_then(|value| serde_json::from_value::<Session>(value).ok());

    if let Some(session) = session {
      if !session.access_token.is_empty() {
        if let Err(err) = self.auth.restore_session(&session).await {
          warn!("Could not restore persisted session: {}", err);
        }
      }
    }

    Ok(())
  }

  /// Persist every auth state change, including sign-out, keeping the
  /// stored session eventually consistent with the live one.
  pub fn watch(&self) {
    let storage = Arc::clone(&self.storage);
    let mut rx = self.auth.subscribe();

    tokio::spawn(async move {
      loop {
        match rx.recv().await {
          Ok(change) => {
            if let Err(err) = persist_session(&*storage, change.session.as_ref()) {
              warn!("Failed to persist session change: {}", err);
            }
          }
          Err(RecvError::Lagged(skipped)) => {
            warn!("Session watcher lagged, skipped {} changes", skipped);
          }
          Err(RecvError::Closed) => break,
        }
      }
    });
  }
}

fn persist_session<S: StorageBackend + ?Sized>(
  storage: &S,
  session: Option<&Session>,
) -> Result<()> {
  let value = match session {
    Some(session) => {
      serde_json::to_value(session).map_err(|e| eyre!("Failed to serialize session: {}", e))?
    }
    None => Value::Null,
  };
  storage.set(KEY_SESSION, value)
}
