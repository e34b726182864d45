//! Error taxonomy of the sync layer.

use thiserror::Error;

/// Sentinel raised whenever no usable identity can be established.
///
/// Travels inside an `eyre::Report`; public reads test for it with
/// [`is_logged_out`] and substitute built-in defaults instead of failing
/// their caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("not signed in")]
pub struct LoggedOut;

/// Returns true if the error is the [`LoggedOut`] sentinel.
pub fn is_logged_out(err: &color_eyre::Report) -> bool {
  err.downcast_ref::<LoggedOut>().is_some()
}

/// Errors reported by the remote auth collaborator.
#[derive(Debug, Error)]
pub enum AuthError {
  #[error("too many requests")]
  RateLimited,
  #[error("network error: {0}")]
  Network(String),
  #[error("{0}")]
  Remote(String),
}

/// Errors reported by the remote store collaborator.
#[derive(Debug, Error)]
pub enum RemoteError {
  #[error("network error: {0}")]
  Network(String),
  #[error("remote returned {status}: {body}")]
  Status { status: u16, body: String },
  #[error("failed to decode response: {0}")]
  Decode(String),
}

/// Sign-in failure as shown to the user; `Display` is the displayable
/// string.
#[derive(Debug, Error)]
pub enum SigninError {
  #[error("Too many sign-in attempts. Wait a minute and try again.")]
  RateLimited,
  #[error("Could not reach the server. Check your connection and try again.")]
  Network,
  #[error("{0}")]
  Rejected(String),
}

impl From<AuthError> for SigninError {
  fn from(err: AuthError) -> Self {
    match err {
      AuthError::RateLimited => SigninError::RateLimited,
      AuthError::Network(_) => SigninError::Network,
      AuthError::Remote(message) => SigninError::Rejected(message),
    }
  }
}
