//! Typed records for the remote store and auth collaborators.
//!
//! Rows arrive as loose JSON and are validated into these shapes at the
//! fetcher and projection boundaries, so nothing downstream deals with
//! duck-typed objects.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::text::html_to_plaintext;

/// Identity as reported by the remote auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
  pub id: String,
  #[serde(default)]
  pub email: Option<String>,
}

/// Access/refresh token pair with expiry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
  pub access_token: String,
  #[serde(default)]
  pub refresh_token: String,
  #[serde(default, with = "iso_millis")]
  pub expires_at: Option<DateTime<Utc>>,
  pub user: AuthUser,
}

/// Local projection of who is active and in which tenant.
///
/// `customer` stays unset until the first active-customer resolution after
/// sign-in completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInUser {
  pub id: String,
  #[serde(default)]
  pub customer: Option<String>,
}

/// Row of the `users` collection.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
  pub id: String,
  /// Customer ids the user is a member of
  #[serde(default)]
  pub customers: Vec<String>,
  #[serde(default)]
  pub settings: Option<Settings>,
}

/// Per-user preferences stored on the `users` row. Missing fields fall
/// back to the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub dialog_enabled: bool,
  pub expand_enabled: bool,
  /// Prefix that triggers shortcut expansion
  pub trigger: String,
  /// Sites the extension stays inactive on
  pub blacklist: Vec<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      dialog_enabled: true,
      expand_enabled: true,
      trigger: "/".to_string(),
      blacklist: Vec::new(),
    }
  }
}

/// Row of the `customers` collection.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
  pub id: String,
  #[serde(default)]
  pub members: Vec<String>,
  #[serde(default)]
  pub plan: Option<String>,
}

impl Customer {
  /// Free plan unless the customer carries a paid plan marker.
  pub fn is_free_plan(&self) -> bool {
    matches!(self.plan.as_deref(), None | Some("free"))
  }
}

/// Row of the `tags` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
  #[serde(default)]
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub color: Option<String>,
}

/// Template as projected for the UI: remote fields plus the derived
/// plaintext body and native-typed dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateView {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub body: String,
  #[serde(default, rename = "_body_plaintext")]
  pub body_plaintext: String,
  #[serde(default)]
  pub shortcut: Option<String>,
  #[serde(default)]
  pub owner: String,
  #[serde(default)]
  pub sharing: Option<String>,
  /// Tag ids attached to the template
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default, with = "iso_millis")]
  pub created_datetime: Option<DateTime<Utc>>,
  #[serde(default, with = "iso_millis")]
  pub modified_datetime: Option<DateTime<Utc>>,
  #[serde(default, with = "iso_millis")]
  pub deleted_datetime: Option<DateTime<Utc>>,
}

impl TemplateView {
  /// Build the projection element from a cached collection record,
  /// coercing string dates and deriving the plaintext body.
  pub fn from_record(id: &str, record: &Value) -> Result<Self> {
    let mut view: TemplateView = serde_json::from_value(record.clone())
      .map_err(|e| eyre!("Malformed template record {}: {}", id, e))?;
    view.id = id.to_string();
    view.body_plaintext = html_to_plaintext(&view.body);
    Ok(view)
  }
}

/// ISO-8601 dates serialized at millisecond precision, the format the
/// backend emits.
pub mod iso_millis {
  use chrono::{DateTime, SecondsFormat, Utc};
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    match value {
      Some(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
      None => serializer.serialize_none(),
    }
  }

  pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
      Some(s) => DateTime::parse_from_rfc3339(&s)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(serde::de::Error::custom),
      None => Ok(None),
    }
  }
}
