//! Client-side sync and local-cache core for a shared text-template
//! extension.
//!
//! The crate keeps a persistent key-value cache of named collections
//! (users, customers, tags, template variants) coherent against a remote
//! authoritative store, restores the auth session across process restarts,
//! applies per-plan visibility rules, and de-duplicates concurrent fetches.
//!
//! Everything is wired together once per process in
//! [`service::SyncService`]; the remote store, auth service, badge
//! indicator and fuzzy ranker are collaborator traits so embedders (and
//! tests) can swap them out.

pub mod cache;
pub mod config;
pub mod defaults;
pub mod error;
pub mod events;
pub mod identity;
pub mod remote;
pub mod search;
pub mod service;
pub mod session;
pub mod storage;
pub mod sync;
pub mod templates;
pub mod text;

#[cfg(test)]
mod testutil;

pub use error::{is_logged_out, LoggedOut, SigninError};
pub use remote::{CollectionKind, Session, SignedInUser, TemplateView};
pub use service::{open, SyncService};
pub use templates::{SearchResponse, FREE_PLAN_TEMPLATE_LIMIT, SEARCH_CANCELED};
