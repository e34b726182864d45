//! Full and partial collection refresh, and the periodic autosync check.

use std::sync::Arc;

use chrono::{Duration, Utc};
use color_eyre::Result;
use tracing::debug;

use crate::cache::CollectionCache;
use crate::error::is_logged_out;
use crate::identity::Identity;
use crate::remote::CollectionKind;
use crate::storage::{ExtensionData, StorageBackend};

/// Default staleness threshold before autosync forces a refresh.
pub fn default_autosync_timeout() -> Duration {
  Duration::hours(3)
}

/// Orchestrates cache invalidation and plan-aware refetching.
pub struct SyncController<S> {
  storage: Arc<S>,
  cache: Arc<CollectionCache<S>>,
  identity: Arc<Identity<S>>,
}

impl<S: StorageBackend + 'static> SyncController<S> {
  pub fn new(storage: Arc<S>, cache: Arc<CollectionCache<S>>, identity: Arc<Identity<S>>) -> Self {
    Self {
      storage,
      cache,
      identity,
    }
  }

  /// Invalidate and re-fetch collections (all six by default).
  ///
  /// Free-plan users never refetch the shared/everyone template
  /// collections; those stay invalidated. A logged-out state resolves
  /// successfully with nothing fetched; any other failure aborts the
  /// whole batch.
  pub async fn refetch_collections(&self, kinds: Option<&[CollectionKind]>) -> Result<()> {
    let kinds = kinds.unwrap_or(&CollectionKind::ALL);
    self.cache.invalidate(kinds)?;

    let user = match self.identity.get_signed_in_user().await {
      Ok(user) => user,
      Err(err) if is_logged_out(&err) => return Ok(()),
      Err(err) => return Err(err),
    };
    let free_plan = self.identity.is_free_plan(&user).await?;

    for kind in kinds {
      if free_plan
        && matches!(
          kind,
          CollectionKind::TemplatesShared | CollectionKind::TemplatesEveryone
        )
      {
        continue;
      }
      self.cache.get(*kind, &user).await?;
    }
    Ok(())
  }

  /// Refresh everything when the last sync is older than `timeout`.
  /// A missing `last_sync` counts as never synced.
  pub async fn autosync(&self, timeout: Duration) -> Result<()> {
    let data = ExtensionData::load(&*self.storage)?;
    let stale = match data.last_sync {
      Some(last) => Utc::now() - last > timeout,
      None => true,
    };

    if !stale {
      debug!("autosync: cache still fresh");
      return Ok(());
    }
    self.refetch_collections(None).await
  }
}
