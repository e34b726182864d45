//! Built-in content shown while signed out.

use crate::remote::{Tag, TemplateView};
use crate::text::html_to_plaintext;

fn builtin(id: &str, title: &str, shortcut: &str, body: &str) -> TemplateView {
  TemplateView {
    id: id.to_string(),
    title: title.to_string(),
    body: body.to_string(),
    body_plaintext: html_to_plaintext(body),
    shortcut: Some(shortcut.to_string()),
    owner: String::new(),
    sharing: None,
    tags: Vec::new(),
    created_datetime: None,
    modified_datetime: None,
    deleted_datetime: None,
  }
}

/// Starter templates used when no identity is available.
pub fn templates() -> Vec<TemplateView> {
  vec![
    builtin(
      "starter-thanks",
      "Say thanks",
      "/thanks",
      "<p>Thank you for reaching out!</p><p>We will get back to you shortly.</p>",
    ),
    builtin(
      "starter-followup",
      "Follow up",
      "/follow",
      "<p>Just following up on my previous message. Any updates on your end?</p>",
    ),
    builtin(
      "starter-signature",
      "Signature",
      "/sign",
      "<p>Kind regards,</p><p>The team</p>",
    ),
  ]
}

/// Starter tags used when no identity is available.
pub fn tags() -> Vec<Tag> {
  vec![
    Tag {
      id: "starter-greetings".to_string(),
      title: "greetings".to_string(),
      color: None,
    },
    Tag {
      id: "starter-support".to_string(),
      title: "support".to_string(),
      color: None,
    },
  ]
}
