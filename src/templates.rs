//! User-facing template and tag projection, search, and usage stats.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;

use crate::cache::{CollectionCache, CollectionMap};
use crate::defaults;
use crate::error::is_logged_out;
use crate::identity::Identity;
use crate::remote::{CollectionKind, Settings, Tag, TemplateView, User};
use crate::search::{Ranker, SearchCandidate};
use crate::storage::{ExtensionData, StorageBackend};

/// Marker query returned when a search was superseded before it resolved.
pub const SEARCH_CANCELED: &str = "_SEARCH_CANCELED";

/// Free-plan users see at most this many (oldest) templates.
pub const FREE_PLAN_TEMPLATE_LIMIT: usize = 30;

/// Ranked search output.
#[derive(Debug, Clone)]
pub struct SearchResponse {
  pub query: String,
  pub results: Vec<TemplateView>,
}

impl SearchResponse {
  fn canceled() -> Self {
    Self {
      query: SEARCH_CANCELED.to_string(),
      results: Vec::new(),
    }
  }
}

/// Projects cached collections into what the UI consumes.
pub struct Templates<S> {
  storage: Arc<S>,
  cache: Arc<CollectionCache<S>>,
  identity: Arc<Identity<S>>,
  ranker: Arc<dyn Ranker>,
  /// Ticket of the most recently issued search
  latest_search: AtomicU64,
}

impl<S: StorageBackend + 'static> Templates<S> {
  pub fn new(
    storage: Arc<S>,
    cache: Arc<CollectionCache<S>>,
    identity: Arc<Identity<S>>,
    ranker: Arc<dyn Ranker>,
  ) -> Self {
    Self {
      storage,
      cache,
      identity,
      ranker,
      latest_search: AtomicU64::new(0),
    }
  }

  /// The user's visible templates; built-in defaults when signed out.
  ///
  /// Free-plan users only see their own templates, oldest first, capped at
  /// [`FREE_PLAN_TEMPLATE_LIMIT`].
  pub async fn get_templates(&self) -> Result<Vec<TemplateView>> {
    let user = match self.identity.get_signed_in_user().await {
      Ok(user) => user,
      Err(err) if is_logged_out(&err) => return Ok(defaults::templates()),
      Err(err) => return Err(err),
    };
    let free_plan = self.identity.is_free_plan(&user).await?;

    let mut merged = self.cache.get(CollectionKind::TemplatesOwned, &user).await?;
    if !free_plan {
      let (shared, everyone) = futures::join!(
        self.cache.get(CollectionKind::TemplatesShared, &user),
        self.cache.get(CollectionKind::TemplatesEveryone, &user),
      );
      // Merge precedence on duplicate ids: owned, then shared, then
      // everyone. First write wins.
      for source in [shared?, everyone?] {
        for (id, record) in source {
          merged.entry(id).or_insert(record);
        }
      }
    }

    let mut templates = project_templates(merged)?;
    if free_plan {
      templates.sort_by_key(|t| t.created_datetime);
      templates.truncate(FREE_PLAN_TEMPLATE_LIMIT);
    }
    Ok(templates)
  }

  /// The customer's tags; built-in defaults when signed out.
  pub async fn get_tags(&self) -> Result<Vec<Tag>> {
    let user = match self.identity.get_signed_in_user().await {
      Ok(user) => user,
      Err(err) if is_logged_out(&err) => return Ok(defaults::tags()),
      Err(err) => return Err(err),
    };

    let records = self.cache.get(CollectionKind::Tags, &user).await?;
    records
      .into_iter()
      .map(|(id, record)| {
        let mut tag: Tag = serde_json::from_value(record)
          .map_err(|e| eyre!("Malformed tag record {}: {}", id, e))?;
        if tag.id.is_empty() {
          tag.id = id;
        }
        Ok(tag)
      })
      .collect()
  }

  /// Per-user settings, with defaults for signed-out and missing fields.
  pub async fn get_settings(&self) -> Result<Settings> {
    let user = match self.identity.get_signed_in_user().await {
      Ok(user) => user,
      Err(err) if is_logged_out(&err) => return Ok(Settings::default()),
      Err(err) => return Err(err),
    };

    let users = self.cache.get(CollectionKind::Users, &user).await?;
    let record = users
      .get(&user.id)
      .ok_or_else(|| eyre!("User record missing for {}", user.id))?;
    let record: User = serde_json::from_value(record.clone())
      .map_err(|e| eyre!("Malformed user record for {}: {}", user.id, e))?;

    Ok(record.settings.unwrap_or_default())
  }

  /// Rank templates against `query`.
  ///
  /// Only the most recently issued query's ranking is ever returned: if a
  /// newer search starts while this one is still fetching, this one
  /// resolves to the canceled marker instead of wasting ranking work on
  /// stale input.
  pub async fn search_templates(&self, query: &str) -> Result<SearchResponse> {
    let ticket = self.latest_search.fetch_add(1, Ordering::SeqCst) + 1;

    let (templates, tags) = futures::join!(self.get_templates(), self.get_tags());
    let (templates, tags) = (templates?, tags?);

    if self.latest_search.load(Ordering::SeqCst) != ticket {
      return Ok(SearchResponse::canceled());
    }

    let tag_titles: HashMap<&str, &str> = tags
      .iter()
      .map(|tag| (tag.id.as_str(), tag.title.as_str()))
      .collect();

    let candidates: Vec<SearchCandidate> = templates
      .iter()
      .map(|template| SearchCandidate {
        title: template.title.clone(),
        shortcut: template.shortcut.clone().unwrap_or_default(),
        body: template.body_plaintext.clone(),
        tags: template
          .tags
          .iter()
          .filter_map(|id| tag_titles.get(id.as_str()).map(|title| title.to_string()))
          .collect(),
      })
      .collect();

    let hits = self.ranker.rank(query, &candidates);
    let results = hits
      .into_iter()
      .filter_map(|hit| templates.get(hit.index).cloned())
      .collect();

    Ok(SearchResponse {
      query: query.to_string(),
      results,
    })
  }

  /// Record one use of a template: last-used stamp plus cumulative word
  /// count from the plaintext body.
  pub fn update_template_stats(&self, id: &str, body_plaintext: &str) -> Result<()> {
    let mut data = ExtensionData::load(&*self.storage)?;
    data.last_used.insert(id.to_string(), Utc::now());
    data.words += body_plaintext.split_whitespace().count() as u64;
    data.save(&*self.storage)
  }
}

fn project_templates(merged: CollectionMap) -> Result<Vec<TemplateView>> {
  merged
    .into_iter()
    .map(|(id, record): (String, Value)| TemplateView::from_record(&id, &record))
    .collect()
}
