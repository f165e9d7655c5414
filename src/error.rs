//! Error type shared by every stage of an archiving run.
//!
//! Nothing is retried: each variant is fatal for the run, except a version
//! that is already in the catalog, which is not an error at all.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiverError {
  #[error("No accounts found in the token cache. Sign in once with --interactive.")]
  NoAccount,

  #[error("Authentication rejected: {error} ({description}), correlation id: {correlation_id}")]
  AuthRejected {
    error: String,
    description: String,
    correlation_id: String,
  },

  #[error("Malformed {stage} response: {payload}")]
  MalformedResponse { stage: &'static str, payload: String },

  #[error("Cannot parse a version out of package file name {file_name:?}")]
  MalformedFilename { file_name: String },

  #[error("Malformed catalog at {path}: {message}")]
  MalformedCatalog { path: String, message: String },

  #[error("Unreadable token cache at {path}: {message}")]
  Cache { path: String, message: String },

  #[error("{stage} request returned HTTP {status}: {body}")]
  HttpStatus {
    stage: &'static str,
    status: u16,
    body: String,
  },

  #[error("Git command failed: {command}: {stderr}")]
  Git { command: String, stderr: String },

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ArchiverError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn auth_rejected_surfaces_provider_details() {
    let err = ArchiverError::AuthRejected {
      error: "invalid_grant".to_string(),
      description: "AADSTS70000: refresh token expired".to_string(),
      correlation_id: "abc-123".to_string(),
    };
    let message = err.to_string();
    assert!(message.contains("invalid_grant"));
    assert!(message.contains("AADSTS70000"));
    assert!(message.contains("abc-123"));
  }

  #[test]
  fn io_errors_convert() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: ArchiverError = io_err.into();
    assert!(matches!(err, ArchiverError::Io(_)));
  }
}
