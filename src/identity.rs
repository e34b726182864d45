//! Who is signed in, their active customer, and the logged-out transition.

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use serde_json::json;
use tracing::{debug, info};

use crate::cache::CollectionCache;
use crate::error::{LoggedOut, SigninError};
use crate::events::{Badge, Event, EventBus};
use crate::remote::{AuthClient, CollectionKind, Customer, SignedInUser, User};
use crate::storage::{self, StorageBackend, KEY_SIGNED_IN_USER};

/// Resolves the active identity against both the persisted projection and
/// the live auth session.
pub struct Identity<S> {
  storage: Arc<S>,
  auth: Arc<dyn AuthClient>,
  cache: Arc<CollectionCache<S>>,
  events: EventBus,
  badge: Arc<dyn Badge>,
}

impl<S: StorageBackend + 'static> Identity<S> {
  pub fn new(
    storage: Arc<S>,
    auth: Arc<dyn AuthClient>,
    cache: Arc<CollectionCache<S>>,
    events: EventBus,
    badge: Arc<dyn Badge>,
  ) -> Self {
    Self {
      storage,
      auth,
      cache,
      events,
      badge,
    }
  }

  /// Resolve the signed-in user and their active customer.
  ///
  /// Fails with [`LoggedOut`] whenever no usable identity exists; callers
  /// treat that as "no data available, use defaults" rather than a hard
  /// failure. A live session whose id does not match the cached user is
  /// not adopted here; adoption only happens through [`Identity::sign_in`].
  pub async fn get_signed_in_user(&self) -> Result<SignedInUser> {
    let cached = self.read_cached_user()?;
    let live = self
      .auth
      .current_user()
      .await
      .map_err(|e| eyre!("Failed to read auth state: {}", e))?;

    match (live, cached) {
      (Some(live), Some(mut user)) if live.id == user.id => {
        let customer = self.active_customer(&user).await?;
        if user.customer.as_deref() != Some(customer.as_str()) {
          user.customer = Some(customer);
          self.write_cached_user(&user)?;
        }
        Ok(user)
      }
      (None, Some(user)) => {
        // The remote session disappeared under a cached local user.
        info!(user = %user.id, "remote session gone, clearing local state");
        self.badge.clear();
        storage::clear_preserving_words(&*self.storage)?;
        self.storage.set(KEY_SIGNED_IN_USER, json!({}))?;
        self.events.emit(Event::Logout);
        Err(LoggedOut.into())
      }
      _ => Err(LoggedOut.into()),
    }
  }

  /// The user's active customer: keep the stored one while it is still a
  /// membership, otherwise fall back to the first membership.
  pub async fn active_customer(&self, user: &SignedInUser) -> Result<String> {
    let users = self.cache.get(CollectionKind::Users, user).await?;
    let record = users
      .get(&user.id)
      .ok_or_else(|| eyre!("User record missing for {}", user.id))?;
    let record: User = serde_json::from_value(record.clone())
      .map_err(|e| eyre!("Malformed user record for {}: {}", user.id, e))?;

    if let Some(current) = &user.customer {
      if record.customers.iter().any(|c| c == current) {
        return Ok(current.clone());
      }
    }

    record
      .customers
      .first()
      .cloned()
      .ok_or_else(|| eyre!("User {} has no customer memberships", user.id))
  }

  /// Whether the user's active customer is on the free plan. Unknown
  /// customers count as free, the restricted tier.
  pub async fn is_free_plan(&self, user: &SignedInUser) -> Result<bool> {
    let Some(customer_id) = &user.customer else {
      return Ok(true);
    };

    let customers = self.cache.get(CollectionKind::Customers, user).await?;
    let Some(record) = customers.get(customer_id) else {
      return Ok(true);
    };
    let customer: Customer = serde_json::from_value(record.clone())
      .map_err(|e| eyre!("Malformed customer record for {}: {}", customer_id, e))?;

    Ok(customer.is_free_plan())
  }

  /// Sign in with credentials. Failures carry a user-displayable message;
  /// the active customer is resolved lazily on the next read.
  pub async fn sign_in(
    &self,
    email: &str,
    password: &str,
  ) -> std::result::Result<SignedInUser, SigninError> {
    let session = self.auth.sign_in(email, password).await?;

    let user = SignedInUser {
      id: session.user.id.clone(),
      customer: None,
    };
    self
      .write_cached_user(&user)
      .map_err(|err| SigninError::Rejected(format!("Could not save sign-in state: {}", err)))?;

    self.events.emit(Event::Login);
    Ok(user)
  }

  /// Explicit sign-out: remote session, badge, local cache (usage stats
  /// survive), cached user.
  pub async fn logout(&self) -> Result<()> {
    if let Err(err) = self.auth.sign_out().await {
      debug!("Remote sign-out failed: {}", err);
    }
    self.badge.clear();
    storage::clear_preserving_words(&*self.storage)?;
    self.storage.set(KEY_SIGNED_IN_USER, json!({}))?;
    self.events.emit(Event::Logout);
    Ok(())
  }

  fn read_cached_user(&self) -> Result<Option<SignedInUser>> {
    let value = self.storage.get(KEY_SIGNED_IN_USER)?;
    // The key holds `{}` at install and after logout; treat that as absent.
    Ok(
      value
        .and_then(|v| serde_json::from_value::<SignedInUser>(v).ok())
        .filter(|u| !u.id.is_empty()),
    )
  }

  fn write_cached_user(&self, user: &SignedInUser) -> Result<()> {
    let value =
      serde_json::to_value(user).map_err(|e| eyre!("Failed to serialize user: {}", e))?;
    self.storage.set(KEY_SIGNED_IN_USER, value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::{is_logged_out, AuthError};
  use crate::storage::ExtensionData;
  use crate::testutil::{
    seed_collection, seed_signed_in_user, tag_row, user_row, MockAuth, MockRemote, TestStack,
  };
  use std::sync::atomic::Ordering;

  #[tokio::test]
  async fn test_matching_session_resolves_customer() {
    let stack = TestStack::new(MockRemote::new(), MockAuth::signed_in("u1"));
    stack.seed_identity("u1", "c1", "team");

    let user = stack.identity.get_signed_in_user().await.unwrap();
    assert_eq!(user.id, "u1");
    assert_eq!(user.customer.as_deref(), Some("c1"));
  }

  #[tokio::test]
  async fn test_stale_customer_falls_back_to_first_membership() {
    let stack = TestStack::new(MockRemote::new(), MockAuth::signed_in("u1"));
    seed_signed_in_user(&stack.storage, "u1", Some("c-gone"));
    seed_collection(&stack.storage, "users", &[user_row("u1", &["c-new", "c2"])]);

    let user = stack.identity.get_signed_in_user().await.unwrap();
    assert_eq!(user.customer.as_deref(), Some("c-new"));

    // The corrected customer is persisted.
    let stored: SignedInUser =
      serde_json::from_value(stack.storage.get(KEY_SIGNED_IN_USER).unwrap().unwrap()).unwrap();
    assert_eq!(stored.customer.as_deref(), Some("c-new"));
  }

  #[tokio::test]
  async fn test_unset_customer_is_resolved_and_persisted() {
    let stack = TestStack::new(MockRemote::new(), MockAuth::signed_in("u1"));
    seed_signed_in_user(&stack.storage, "u1", None);
    seed_collection(&stack.storage, "users", &[user_row("u1", &["c1"])]);

    let user = stack.identity.get_signed_in_user().await.unwrap();
    assert_eq!(user.customer.as_deref(), Some("c1"));
  }

  #[tokio::test]
  async fn test_mismatched_live_identity_is_not_adopted() {
    let stack = TestStack::new(MockRemote::new(), MockAuth::signed_in("somebody-else"));
    seed_signed_in_user(&stack.storage, "u1", Some("c1"));

    let err = stack.identity.get_signed_in_user().await.unwrap_err();
    assert!(is_logged_out(&err));
  }

  #[tokio::test]
  async fn test_no_session_and_no_cached_user_is_logged_out() {
    let stack = TestStack::new(MockRemote::new(), MockAuth::signed_out());
    let err = stack.identity.get_signed_in_user().await.unwrap_err();
    assert!(is_logged_out(&err));
  }

  #[tokio::test]
  async fn test_remote_logout_clears_local_state() {
    let stack = TestStack::new(MockRemote::new(), MockAuth::signed_out());
    stack.seed_identity("u1", "c1", "team");
    seed_collection(&stack.storage, "tags", &[tag_row("g1", "greetings")]);
    let mut data = ExtensionData::default();
    data.words = 42;
    data.save(&*stack.storage).unwrap();
    let mut rx = stack.events.subscribe();

    let err = stack.identity.get_signed_in_user().await.unwrap_err();
    assert!(is_logged_out(&err));

    assert_eq!(stack.badge.clears.load(Ordering::SeqCst), 1);
    assert_eq!(rx.recv().await.unwrap(), Event::Logout);
    assert!(stack.storage.get("tags").unwrap().is_none());
    assert_eq!(ExtensionData::load(&*stack.storage).unwrap().words, 42);
    assert_eq!(
      stack.storage.get(KEY_SIGNED_IN_USER).unwrap(),
      Some(json!({}))
    );
  }

  #[tokio::test]
  async fn test_missing_user_record_propagates_as_plain_error() {
    let stack = TestStack::new(MockRemote::new(), MockAuth::signed_in("u1"));
    seed_signed_in_user(&stack.storage, "u1", Some("c1"));
    seed_collection(&stack.storage, "users", &[user_row("other", &["c1"])]);

    let err = stack.identity.get_signed_in_user().await.unwrap_err();
    assert!(!is_logged_out(&err));
    assert!(err.to_string().contains("User record missing"));
  }

  #[tokio::test]
  async fn test_free_plan_resolution() {
    let stack = TestStack::new(MockRemote::new(), MockAuth::signed_in("u1"));
    stack.seed_identity("u1", "c1", "free");
    let user = stack.identity.get_signed_in_user().await.unwrap();
    assert!(stack.identity.is_free_plan(&user).await.unwrap());

    let stack = TestStack::new(MockRemote::new(), MockAuth::signed_in("u1"));
    stack.seed_identity("u1", "c1", "team");
    let user = stack.identity.get_signed_in_user().await.unwrap();
    assert!(!stack.identity.is_free_plan(&user).await.unwrap());
  }

  #[tokio::test]
  async fn test_sign_in_adopts_identity_and_emits_login() {
    let stack = TestStack::new(MockRemote::new(), MockAuth::signed_out());
    let mut rx = stack.events.subscribe();

    let user = stack.identity.sign_in("u7", "secret").await.unwrap();
    assert_eq!(user.id, "u7");
    assert!(user.customer.is_none());
    assert_eq!(rx.recv().await.unwrap(), Event::Login);

    let stored: SignedInUser =
      serde_json::from_value(stack.storage.get(KEY_SIGNED_IN_USER).unwrap().unwrap()).unwrap();
    assert_eq!(stored.id, "u7");
  }

  #[tokio::test]
  async fn test_sign_in_failures_become_display_strings() {
    let stack = TestStack::new(MockRemote::new(), MockAuth::signed_out());

    stack.auth.fail_next_sign_in(AuthError::RateLimited);
    let err = stack.identity.sign_in("u1", "pw").await.unwrap_err();
    assert!(matches!(err, SigninError::RateLimited));

    stack
      .auth
      .fail_next_sign_in(AuthError::Remote("Invalid login credentials".into()));
    let err = stack.identity.sign_in("u1", "pw").await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid login credentials");
  }

  #[tokio::test]
  async fn test_logout_clears_everything_but_word_stats() {
    let stack = TestStack::new(MockRemote::new(), MockAuth::signed_in("u1"));
    stack.seed_identity("u1", "c1", "team");
    seed_collection(&stack.storage, "tags", &[tag_row("g1", "greetings")]);
    let mut data = ExtensionData::default();
    data.words = 99;
    data.save(&*stack.storage).unwrap();

    stack.identity.logout().await.unwrap();

    assert_eq!(stack.auth.signouts.load(Ordering::SeqCst), 1);
    assert_eq!(stack.badge.clears.load(Ordering::SeqCst), 1);
    assert!(stack.storage.get("tags").unwrap().is_none());
    assert!(stack.storage.get("users").unwrap().is_none());
    assert_eq!(ExtensionData::load(&*stack.storage).unwrap().words, 99);

    // With the session gone and the cached user empty, resolution now
    // signals logged-out.
    let err = stack.identity.get_signed_in_user().await.unwrap_err();
    assert!(is_logged_out(&err));
  }
}
