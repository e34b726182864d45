//! Shared mock collaborators and fixtures for service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};

use crate::cache::CollectionCache;
use crate::error::{AuthError, RemoteError};
use crate::events::{Badge, EventBus};
use crate::identity::Identity;
use crate::remote::{
  AuthChange, AuthClient, AuthUser, CollectionQuery, Filter, RemoteStore, Session,
};
use crate::search::FuzzyRanker;
use crate::storage::{MemoryStorage, StorageBackend, KEY_SIGNED_IN_USER};
use crate::sync::SyncController;
use crate::templates::Templates;

/// Map a query back to the collection it came from, so canned rows can be
/// keyed by collection name.
pub fn collection_label(query: &CollectionQuery) -> &'static str {
  match query.table {
    "users" => "users",
    "customers" => "customers",
    "tags" => "tags",
    "templates" => {
      let sharing = query.filters.iter().find_map(|f| match f {
        Filter::Eq(column, value) if *column == "sharing" => Some(value.as_str()),
        _ => None,
      });
      match sharing {
        Some("custom") => "templatesShared",
        Some("everyone") => "templatesEveryone",
        _ => "templatesOwned",
      }
    }
    _ => "unknown",
  }
}

/// Remote store serving canned per-collection rows, with call counting, a
/// failure switch, and an optional gate that holds fetches open until
/// released.
pub struct MockRemote {
  rows: Mutex<HashMap<String, Vec<Value>>>,
  pub calls: AtomicUsize,
  pub fail: AtomicBool,
  open: watch::Sender<bool>,
}

impl MockRemote {
  pub fn new() -> Self {
    Self::with_gate(true)
  }

  /// Fetches block until `release` is called.
  pub fn gated() -> Self {
    Self::with_gate(false)
  }

  fn with_gate(open: bool) -> Self {
    let (tx, _rx) = watch::channel(open);
    Self {
      rows: Mutex::new(HashMap::new()),
      calls: AtomicUsize::new(0),
      fail: AtomicBool::new(false),
      open: tx,
    }
  }

  pub fn put(&self, collection: &str, rows: Vec<Value>) {
    self
      .rows
      .lock()
      .expect("mock lock")
      .insert(collection.to_string(), rows);
  }

  pub fn release(&self) {
    let _ = self.open.send(true);
  }

  pub fn call_count(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl RemoteStore for MockRemote {
  async fn select(&self, query: &CollectionQuery) -> Result<Vec<Value>, RemoteError> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    let mut rx = self.open.subscribe();
    while !*rx.borrow() {
      if rx.changed().await.is_err() {
        break;
      }
    }

    if self.fail.load(Ordering::SeqCst) {
      return Err(RemoteError::Network("mock offline".into()));
    }

    let rows = self.rows.lock().expect("mock lock");
    Ok(rows.get(collection_label(query)).cloned().unwrap_or_default())
  }
}

/// Session for a fixed user id.
pub fn test_session(user_id: &str) -> Session {
  Session {
    access_token: format!("token-{}", user_id),
    refresh_token: format!("refresh-{}", user_id),
    expires_at: None,
    user: AuthUser {
      id: user_id.to_string(),
      email: None,
    },
  }
}

/// Auth client with a scriptable session and counters for restore and
/// sign-out calls.
pub struct MockAuth {
  session: Mutex<Option<Session>>,
  signin_error: Mutex<Option<AuthError>>,
  pub restores: AtomicUsize,
  pub signouts: AtomicUsize,
  pub fail_restore: AtomicBool,
  tx: broadcast::Sender<AuthChange>,
}

impl MockAuth {
  pub fn signed_in(user_id: &str) -> Self {
    Self::with_session(Some(test_session(user_id)))
  }

  pub fn signed_out() -> Self {
    Self::with_session(None)
  }

  fn with_session(session: Option<Session>) -> Self {
    let (tx, _rx) = broadcast::channel(16);
    Self {
      session: Mutex::new(session),
      signin_error: Mutex::new(None),
      restores: AtomicUsize::new(0),
      signouts: AtomicUsize::new(0),
      fail_restore: AtomicBool::new(false),
      tx,
    }
  }

  pub fn fail_next_sign_in(&self, err: AuthError) {
    *self.signin_error.lock().expect("mock lock") = Some(err);
  }

  /// Emit an auth-state change as the live service would.
  pub fn push_change(&self, session: Option<Session>) {
    let _ = self.tx.send(AuthChange { session });
  }
}

#[async_trait]
impl AuthClient for MockAuth {
  async fn sign_in(&self, email: &str, _password: &str) -> Result<Session, AuthError> {
    if let Some(err) = self.signin_error.lock().expect("mock lock").take() {
      return Err(err);
    }
    let session = test_session(email);
    *self.session.lock().expect("mock lock") = Some(session.clone());
    let _ = self.tx.send(AuthChange {
      session: Some(session.clone()),
    });
    Ok(session)
  }

  async fn current_session(&self) -> Result<Option<Session>, AuthError> {
    Ok(self.session.lock().expect("mock lock").clone())
  }

  async fn current_user(&self) -> Result<Option<AuthUser>, AuthError> {
    Ok(
      self
        .session
        .lock()
        .expect("mock lock")
        .as_ref()
        .map(|s| s.user.clone()),
    )
  }

  async fn sign_out(&self) -> Result<(), AuthError> {
    self.signouts.fetch_add(1, Ordering::SeqCst);
    *self.session.lock().expect("mock lock") = None;
    let _ = self.tx.send(AuthChange { session: None });
    Ok(())
  }

  async fn restore_session(&self, session: &Session) -> Result<(), AuthError> {
    self.restores.fetch_add(1, Ordering::SeqCst);
    if self.fail_restore.load(Ordering::SeqCst) {
      return Err(AuthError::Remote("persisted session is no longer valid".into()));
    }
    *self.session.lock().expect("mock lock") = Some(session.clone());
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
    self.tx.subscribe()
  }
}

#[derive(Default)]
pub struct MockBadge {
  pub clears: AtomicUsize,
}

impl Badge for MockBadge {
  fn clear(&self) {
    self.clears.fetch_add(1, Ordering::SeqCst);
  }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn user_row(id: &str, customers: &[&str]) -> Value {
  json!({ "id": id, "customers": customers })
}

pub fn customer_row(id: &str, members: &[&str], plan: Option<&str>) -> Value {
  json!({ "id": id, "members": members, "plan": plan })
}

pub fn tag_row(id: &str, title: &str) -> Value {
  json!({ "id": id, "title": title })
}

pub fn template_row(id: &str, owner: &str, created: &str) -> Value {
  json!({
    "id": id,
    "title": id,
    "body": format!("<p>{} body</p>", id),
    "owner": owner,
    "tags": [],
    "created_datetime": created,
  })
}

/// Write rows under a collection key as the fetcher would.
pub fn seed_collection(storage: &MemoryStorage, key: &str, rows: &[Value]) {
  let mut map = serde_json::Map::new();
  for row in rows {
    let id = row["id"].as_str().expect("row id").to_string();
    map.insert(id, row.clone());
  }
  storage.set(key, Value::Object(map)).expect("seed collection");
}

pub fn seed_signed_in_user(storage: &MemoryStorage, id: &str, customer: Option<&str>) {
  storage
    .set(KEY_SIGNED_IN_USER, json!({ "id": id, "customer": customer }))
    .expect("seed signed-in user");
}

/// A fully wired service stack over in-memory storage and mocks.
pub struct TestStack {
  pub storage: Arc<MemoryStorage>,
  pub remote: Arc<MockRemote>,
  pub auth: Arc<MockAuth>,
  pub badge: Arc<MockBadge>,
  pub events: EventBus,
  pub cache: Arc<CollectionCache<MemoryStorage>>,
  pub identity: Arc<Identity<MemoryStorage>>,
}

impl TestStack {
  pub fn new(remote: MockRemote, auth: MockAuth) -> Self {
    let storage = Arc::new(MemoryStorage::new());
    let remote = Arc::new(remote);
    let auth = Arc::new(auth);
    let badge = Arc::new(MockBadge::default());
    let events = EventBus::new();
    let cache = Arc::new(CollectionCache::new(
      Arc::clone(&storage),
      Arc::clone(&remote) as Arc<dyn RemoteStore>,
      events.clone(),
    ));
    let identity = Arc::new(Identity::new(
      Arc::clone(&storage),
      Arc::clone(&auth) as Arc<dyn AuthClient>,
      Arc::clone(&cache),
      events.clone(),
      Arc::clone(&badge) as Arc<dyn Badge>,
    ));
    Self {
      storage,
      remote,
      auth,
      badge,
      events,
      cache,
      identity,
    }
  }

  pub fn sync(&self) -> SyncController<MemoryStorage> {
    SyncController::new(
      Arc::clone(&self.storage),
      Arc::clone(&self.cache),
      Arc::clone(&self.identity),
    )
  }

  pub fn templates(&self) -> Templates<MemoryStorage> {
    Templates::new(
      Arc::clone(&self.storage),
      Arc::clone(&self.cache),
      Arc::clone(&self.identity),
      Arc::new(FuzzyRanker::new()),
    )
  }

  /// Seed a resolved identity: signed-in user plus matching users and
  /// customers collections.
  pub fn seed_identity(&self, user_id: &str, customer_id: &str, plan: &str) {
    seed_signed_in_user(&self.storage, user_id, Some(customer_id));
    seed_collection(&self.storage, "users", &[user_row(user_id, &[customer_id])]);
    seed_collection(
      &self.storage,
      "customers",
      &[customer_row(customer_id, &[user_id], Some(plan))],
    );
  }
}
