//! Fire-and-forget event bus consumed by the UI, plus the badge indicator
//! collaborator.

use tokio::sync::broadcast;

/// Events the UI reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  Login,
  Logout,
  TemplatesUpdated,
  UsersUpdated,
  CustomersUpdated,
  TagsUpdated,
}

impl Event {
  /// Wire name of the event as the UI sees it.
  pub fn name(&self) -> &'static str {
    match self {
      Event::Login => "login",
      Event::Logout => "logout",
      Event::TemplatesUpdated => "templates-updated",
      Event::UsersUpdated => "users-updated",
      Event::CustomersUpdated => "customers-updated",
      Event::TagsUpdated => "tags-updated",
    }
  }
}

/// Broadcast bus for UI notifications.
///
/// Emission never fails; events sent while nobody is subscribed are
/// dropped.
#[derive(Clone)]
pub struct EventBus {
  tx: broadcast::Sender<Event>,
}

impl EventBus {
  pub fn new() -> Self {
    let (tx, _rx) = broadcast::channel(64);
    Self { tx }
  }

  pub fn emit(&self, event: Event) {
    let _ = self.tx.send(event);
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Event> {
    self.tx.subscribe()
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new()
  }
}

/// Extension toolbar badge. Only the signed-out transition touches it from
/// this layer.
pub trait Badge: Send + Sync {
  fn clear(&self);
}

/// Badge that does nothing; used headless and in tests.
pub struct NoopBadge;

impl Badge for NoopBadge {
  fn clear(&self) {}
}
