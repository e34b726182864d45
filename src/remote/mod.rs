//! Remote collaborators: the authoritative store and the auth service.
//!
//! Both are trait boundaries so the sync layer can run against the hosted
//! HTTP backend, or against in-process fakes in tests.

mod collection;
mod http;
mod types;

pub use collection::{CollectionKind, CollectionQuery, Filter};
pub use http::{HttpAuth, HttpRemote};
pub use types::{
  AuthUser, Customer, Session, Settings, SignedInUser, Tag, TemplateView, User,
};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{AuthError, RemoteError};

/// Pushed by the auth client whenever its session state moves, including
/// to signed-out (`session: None`).
#[derive(Debug, Clone)]
pub struct AuthChange {
  pub session: Option<Session>,
}

/// Tenant-scoped relational query interface over the remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// Run a filtered select and return the matching rows.
  async fn select(&self, query: &CollectionQuery) -> Result<Vec<serde_json::Value>, RemoteError>;
}

/// Remote authentication service.
#[async_trait]
pub trait AuthClient: Send + Sync {
  async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

  /// The live session, if any.
  async fn current_session(&self) -> Result<Option<Session>, AuthError>;

  /// The live session's user, validated against the server.
  async fn current_user(&self) -> Result<Option<AuthUser>, AuthError>;

  async fn sign_out(&self) -> Result<(), AuthError>;

  /// Install a previously persisted session (process restart).
  async fn restore_session(&self, session: &Session) -> Result<(), AuthError>;

  /// Subscribe to session state changes.
  fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}
