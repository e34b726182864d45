//! HTTP implementations of the remote collaborators.
//!
//! The store speaks a PostgREST-style row filter dialect
//! (`?column=eq.value`), auth a password-grant token endpoint; both are
//! keyed with the project API key plus the live bearer token.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use url::Url;

use super::types::{AuthUser, Session};
use super::{AuthChange, AuthClient, CollectionQuery, Filter, RemoteStore};
use crate::config::Config;
use crate::error::{AuthError, RemoteError};

/// Auth client backed by the hosted token service.
///
/// Owns the live session; every change is broadcast so the session store
/// can persist it.
pub struct HttpAuth {
  http: reqwest::Client,
  base: Url,
  api_key: String,
  session: RwLock<Option<Session>>,
  tx: broadcast::Sender<AuthChange>,
}

impl HttpAuth {
  pub fn new(config: &Config) -> Result<Self> {
    let (tx, _rx) = broadcast::channel(16);
    Ok(Self {
      http: reqwest::Client::new(),
      base: parse_base(&config.remote.url)?,
      api_key: config.api_key()?,
      session: RwLock::new(None),
      tx,
    })
  }

  pub(crate) async fn bearer_token(&self) -> Option<String> {
    let session = self.session.read().await;
    session.as_ref().map(|s| s.access_token.clone())
  }

  async fn install(&self, session: Option<Session>) {
    *self.session.write().await = session.clone();
    let _ = self.tx.send(AuthChange { session });
  }

  fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
    self
      .base
      .join(path)
      .map_err(|e| AuthError::Remote(format!("invalid auth endpoint {}: {}", path, e)))
  }

  /// Validate a token against the server and return its user.
  async fn fetch_user(&self, access_token: &str) -> Result<Option<AuthUser>, AuthError> {
    let response = self
      .http
      .get(self.endpoint("auth/v1/user")?)
      .header("apikey", &self.api_key)
      .bearer_auth(access_token)
      .send()
      .await
      .map_err(|e| AuthError::Network(e.to_string()))?;

    match response.status() {
      StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
      status if status.is_success() => {
        let user = response
          .json()
          .await
          .map_err(|e| AuthError::Remote(format!("malformed user response: {}", e)))?;
        Ok(Some(user))
      }
      status => Err(AuthError::Remote(format!(
        "user lookup failed (HTTP {})",
        status.as_u16()
      ))),
    }
  }
}

#[async_trait]
impl AuthClient for HttpAuth {
  async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
    let mut url = self.endpoint("auth/v1/token")?;
    url.query_pairs_mut().append_pair("grant_type", "password");

    let response = self
      .http
      .post(url)
      .header("apikey", &self.api_key)
      .json(&json!({ "email": email, "password": password }))
      .send()
      .await
      .map_err(|e| AuthError::Network(e.to_string()))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
      return Err(AuthError::RateLimited);
    }
    if !status.is_success() {
      let body: Value = response.json().await.unwrap_or(Value::Null);
      return Err(AuthError::Remote(remote_message(&body, status)));
    }

    let token: TokenResponse = response
      .json()
      .await
      .map_err(|e| AuthError::Remote(format!("malformed token response: {}", e)))?;

    let session = Session {
      access_token: token.access_token,
      refresh_token: token.refresh_token,
      expires_at: token.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
      user: token.user,
    };
    self.install(Some(session.clone())).await;

    Ok(session)
  }

  async fn current_session(&self) -> Result<Option<Session>, AuthError> {
    Ok(self.session.read().await.clone())
  }

  async fn current_user(&self) -> Result<Option<AuthUser>, AuthError> {
    let Some(token) = self.bearer_token().await else {
      return Ok(None);
    };

    let user = self.fetch_user(&token).await?;
    if user.is_none() {
      // The server no longer honors the token; drop the dead session.
      self.install(None).await;
    }
    Ok(user)
  }

  async fn sign_out(&self) -> Result<(), AuthError> {
    let token = self.bearer_token().await;
    self.install(None).await;

    if let Some(token) = token {
      self
        .http
        .post(self.endpoint("auth/v1/logout")?)
        .header("apikey", &self.api_key)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| AuthError::Network(e.to_string()))?;
    }
    Ok(())
  }

  async fn restore_session(&self, session: &Session) -> Result<(), AuthError> {
    match self.fetch_user(&session.access_token).await? {
      Some(_) => {
        self.install(Some(session.clone())).await;
        Ok(())
      }
      None => Err(AuthError::Remote("persisted session is no longer valid".into())),
    }
  }

  fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
    self.tx.subscribe()
  }
}

#[derive(Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default)]
  refresh_token: String,
  #[serde(default)]
  expires_in: Option<i64>,
  user: AuthUser,
}

/// Best human-readable message from an auth error body.
fn remote_message(body: &Value, status: StatusCode) -> String {
  for key in ["error_description", "msg", "message", "error"] {
    if let Some(message) = body.get(key).and_then(Value::as_str) {
      return message.to_string();
    }
  }
  format!("sign-in failed (HTTP {})", status.as_u16())
}

/// Row store backed by the hosted query endpoint.
pub struct HttpRemote {
  http: reqwest::Client,
  base: Url,
  api_key: String,
  auth: Arc<HttpAuth>,
}

impl HttpRemote {
  pub fn new(config: &Config, auth: Arc<HttpAuth>) -> Result<Self> {
    Ok(Self {
      http: reqwest::Client::new(),
      base: parse_base(&config.remote.url)?,
      api_key: config.api_key()?,
      auth,
    })
  }
}

#[async_trait]
impl RemoteStore for HttpRemote {
  async fn select(&self, query: &CollectionQuery) -> Result<Vec<Value>, RemoteError> {
    let mut url = self
      .base
      .join(&format!("rest/v1/{}", query.table))
      .map_err(|e| RemoteError::Network(format!("invalid table url: {}", e)))?;
    apply_filters(&mut url, &query.filters);

    let mut request = self.http.get(url).header("apikey", &self.api_key);
    if let Some(token) = self.auth.bearer_token().await {
      request = request.bearer_auth(token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| RemoteError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(RemoteError::Status {
        status: status.as_u16(),
        body,
      });
    }

    response
      .json()
      .await
      .map_err(|e| RemoteError::Decode(e.to_string()))
  }
}

/// Render filters in the store's query-parameter dialect.
fn apply_filters(url: &mut Url, filters: &[Filter]) {
  let mut pairs = url.query_pairs_mut();
  pairs.append_pair("select", "*");
  for filter in filters {
    let (column, value) = match filter {
      Filter::Eq(column, value) => (*column, format!("eq.{}", value)),
      Filter::Neq(column, value) => (*column, format!("neq.{}", value)),
      Filter::IsNull(column) => (*column, "is.null".to_string()),
      Filter::Contains(column, value) => (*column, format!("cs.{{{}}}", value)),
    };
    pairs.append_pair(column, &value);
  }
}

/// The base URL must end with a slash so endpoint joins append instead of
/// replacing the last path segment.
fn parse_base(raw: &str) -> Result<Url> {
  let mut base = Url::parse(raw).map_err(|e| eyre!("Invalid remote url {}: {}", raw, e))?;
  if !base.path().ends_with('/') {
    base.set_path(&format!("{}/", base.path()));
  }
  Ok(base)
}
