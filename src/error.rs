// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum SigilError {
  // --- Request Errors ---
  #[error("Missing '{0}' argument")]
  MissingArgument(&'static str),

  // --- Timeouts ---
  #[error("Operation timed out")]
  Timeout,

  // --- Provider Outcomes ---
  #[error("Declined: {reason}")]
  Declined { reason: String },

  #[error("Auto decline: unrecognized provider status {0:?}")]
  AutoDecline(String),

  #[error("Composite signature failed validation: {0}")]
  ValidationFailure(String),

  /// Persisted session state carries a stale version tag. Recovered locally
  /// by resetting to defaults; never surfaced to callers.
  #[error("Persisted state version mismatch")]
  ConfigMismatch,

  // --- Runtime Errors ---
  #[error("No process registered under name {0:?}")]
  UnknownProcess(String),

  #[error("Process mailbox closed")]
  MailboxClosed,

  /// A letter kind this process does not serve. A defined error, not a
  /// silent no-op; logged at the letter-loop boundary.
  #[error("Unexpected message {0:?} for this process")]
  UnexpectedMessage(&'static str),

  // --- Collaborator Errors ---
  #[error("HTTP transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("Cold storage error: {0}")]
  Storage(String),

  #[error("Rendering surface error: {0}")]
  Surface(String),

  #[error("Malformed provider response: {0}")]
  MalformedResponse(String),

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

impl From<serde_json::Error> for SigilError {
  fn from(e: serde_json::Error) -> Self {
    SigilError::MalformedResponse(e.to_string())
  }
}
