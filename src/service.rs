//! Composition root: one `SyncService` per running extension process.

use std::sync::Arc;

use chrono::Duration;
use color_eyre::Result;

use crate::cache::CollectionCache;
use crate::config::Config;
use crate::events::{Badge, EventBus, NoopBadge};
use crate::identity::Identity;
use crate::remote::{AuthClient, HttpAuth, HttpRemote, RemoteStore};
use crate::search::{FuzzyRanker, Ranker};
use crate::session::SessionStore;
use crate::storage::{SqliteStorage, StorageBackend};
use crate::sync::SyncController;
use crate::templates::Templates;

/// Every sync-layer service wired over one storage backend, one remote
/// store and one auth client.
///
/// Construct exactly once per process. State that would otherwise be
/// ambient (the in-flight fetch map, the session-loaded flag, the latest
/// search ticket) lives inside these services, so their lifetime is the
/// process lifetime.
pub struct SyncService<S> {
  pub events: EventBus,
  pub session: Arc<SessionStore<S>>,
  pub cache: Arc<CollectionCache<S>>,
  pub identity: Arc<Identity<S>>,
  pub sync: SyncController<S>,
  pub templates: Templates<S>,
  autosync_timeout: Duration,
}

impl<S: StorageBackend + 'static> SyncService<S> {
  pub fn new(
    storage: Arc<S>,
    remote: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthClient>,
    badge: Arc<dyn Badge>,
    ranker: Arc<dyn Ranker>,
    autosync_timeout: Duration,
  ) -> Self {
    let events = EventBus::new();
    let session = Arc::new(SessionStore::new(Arc::clone(&storage), Arc::clone(&auth)));
    let cache = Arc::new(CollectionCache::new(
      Arc::clone(&storage),
      remote,
      events.clone(),
    ));
    let identity = Arc::new(Identity::new(
      Arc::clone(&storage),
      auth,
      Arc::clone(&cache),
      events.clone(),
      badge,
    ));
    let sync = SyncController::new(
      Arc::clone(&storage),
      Arc::clone(&cache),
      Arc::clone(&identity),
    );
    let templates = Templates::new(storage, Arc::clone(&cache), Arc::clone(&identity), ranker);

    Self {
      events,
      session,
      cache,
      identity,
      sync,
      templates,
      autosync_timeout,
    }
  }

  /// Restore the persisted session and start mirroring auth changes into
  /// storage.
  pub async fn start(&self) -> Result<()> {
    self.session.watch();
    self.session.load().await
  }

  /// Refresh everything if the last sync is older than the configured
  /// window.
  pub async fn autosync(&self) -> Result<()> {
    self.sync.autosync(self.autosync_timeout).await
  }
}

/// Open the HTTP-backed service described by `config`.
pub fn open(config: &Config) -> Result<SyncService<SqliteStorage>> {
  let storage = Arc::new(match &config.storage_path {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open()?,
  });

  let auth = Arc::new(HttpAuth::new(config)?);
  let remote = Arc::new(HttpRemote::new(config, Arc::clone(&auth))?);

  Ok(SyncService::new(
    storage,
    remote as Arc<dyn RemoteStore>,
    auth as Arc<dyn AuthClient>,
    Arc::new(NoopBadge),
    Arc::new(FuzzyRanker::new()),
    Duration::minutes(config.autosync_minutes),
  ))
}
