//! Collection identities and their remote query filters.

use color_eyre::{eyre::eyre, Result};

use super::types::SignedInUser;
use crate::events::Event;

/// Column filter understood by the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
  Eq(&'static str, String),
  Neq(&'static str, String),
  IsNull(&'static str),
  /// Array column contains the value
  Contains(&'static str, String),
}

/// A tenant-scoped select against one remote table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionQuery {
  pub table: &'static str,
  pub filters: Vec<Filter>,
}

/// The six locally cached collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
  Users,
  Customers,
  Tags,
  TemplatesOwned,
  TemplatesShared,
  TemplatesEveryone,
}

impl CollectionKind {
  pub const ALL: [CollectionKind; 6] = [
    CollectionKind::Users,
    CollectionKind::Customers,
    CollectionKind::Tags,
    CollectionKind::TemplatesOwned,
    CollectionKind::TemplatesShared,
    CollectionKind::TemplatesEveryone,
  ];

  /// Storage key the collection is cached under.
  pub fn key(&self) -> &'static str {
    match self {
      CollectionKind::Users => "users",
      CollectionKind::Customers => "customers",
      CollectionKind::Tags => "tags",
      CollectionKind::TemplatesOwned => "templatesOwned",
      CollectionKind::TemplatesShared => "templatesShared",
      CollectionKind::TemplatesEveryone => "templatesEveryone",
    }
  }

  /// Event emitted after the collection is re-cached. All template
  /// collections share one event.
  pub fn update_event(&self) -> Event {
    match self {
      CollectionKind::Users => Event::UsersUpdated,
      CollectionKind::Customers => Event::CustomersUpdated,
      CollectionKind::Tags => Event::TagsUpdated,
      CollectionKind::TemplatesOwned
      | CollectionKind::TemplatesShared
      | CollectionKind::TemplatesEveryone => Event::TemplatesUpdated,
    }
  }

  /// Remote filters for this collection, scoped to the given user.
  ///
  /// These mirror the backend's row-level security policy; they must never
  /// widen it.
  pub fn query(&self, user: &SignedInUser) -> Result<CollectionQuery> {
    let customer = || {
      user
        .customer
        .clone()
        .ok_or_else(|| eyre!("No active customer resolved for user {}", user.id))
    };

    let query = match self {
      CollectionKind::Users => CollectionQuery {
        table: "users",
        filters: vec![Filter::Eq("id", user.id.clone())],
      },
      CollectionKind::Customers => CollectionQuery {
        table: "customers",
        filters: vec![Filter::Contains("members", user.id.clone())],
      },
      CollectionKind::Tags => CollectionQuery {
        table: "tags",
        filters: vec![Filter::Eq("customer", customer()?)],
      },
      CollectionKind::TemplatesOwned => CollectionQuery {
        table: "templates",
        filters: vec![
          Filter::Eq("customer", customer()?),
          Filter::IsNull("deleted_datetime"),
          Filter::Eq("owner", user.id.clone()),
        ],
      },
      CollectionKind::TemplatesShared => CollectionQuery {
        table: "templates",
        filters: vec![
          Filter::Eq("customer", customer()?),
          Filter::IsNull("deleted_datetime"),
          Filter::Eq("sharing", "custom".to_string()),
          Filter::Contains("shared_with", user.id.clone()),
          Filter::Neq("owner", user.id.clone()),
        ],
      },
      CollectionKind::TemplatesEveryone => CollectionQuery {
        table: "templates",
        filters: vec![
          Filter::Eq("customer", customer()?),
          Filter::IsNull("deleted_datetime"),
          Filter::Eq("sharing", "everyone".to_string()),
          Filter::Neq("owner", user.id.clone()),
        ],
      },
    };

    Ok(query)
  }
}
