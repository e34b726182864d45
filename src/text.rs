//! Plain-text derivation for HTML template bodies.

/// Strip tags and decode the handful of entities template bodies use.
///
/// `<br>` and closing block tags become newlines so snippets keep their
/// line structure when inserted as plain text.
pub fn html_to_plaintext(html: &str) -> String {
  let mut out = String::with_capacity(html.len());
  let mut rest = html;

  while let Some(open) = rest.find('<') {
    out.push_str(&rest[..open]);
    match rest[open..].find('>') {
      Some(close) => {
        let tag = &rest[open + 1..open + close];
        if breaks_line(tag) {
          out.push('\n');
        }
        rest = &rest[open + close + 1..];
      }
      None => {
        // Dangling '<' with no closing bracket; keep it verbatim.
        out.push_str(&rest[open..]);
        rest = "";
      }
    }
  }
  out.push_str(rest);

  decode_entities(&out)
}

fn breaks_line(tag: &str) -> bool {
  let tag = tag.trim();
  let closing = tag.starts_with('/');
  let name = tag
    .trim_start_matches('/')
    .trim_end_matches('/')
    .split_whitespace()
    .next()
    .unwrap_or("");

  match name.to_ascii_lowercase().as_str() {
    "br" => !closing,
    "p" | "div" | "li" => closing,
    _ => false,
  }
}

/// Only the entities the template editor actually emits.
fn decode_entities(text: &str) -> String {
  text
    .replace("&nbsp;", " ")
    .replace("&lt;", "<")
    .replace("&gt;", ">")
    .replace("&quot;", "\"")
    .replace("&#39;", "'")
    .replace("&amp;", "&")
}
