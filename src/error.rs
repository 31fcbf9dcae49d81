//! Error types for the generation core.
//!
//! None of these are fatal: provider errors are contained per invocation,
//! extraction and identifier errors per batch item, and `StoreError::NotFound`
//! is the ordinary "nothing generated yet" signal.

use std::path::PathBuf;

use thiserror::Error;

/// Failures talking to the batch provider (network, HTTP status, decoding).
#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("provider request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("provider HTTP {status}: {message}")]
  Status { status: u16, message: String },
  #[error("provider response could not be decoded: {0}")]
  Decode(String),
}

/// A single batch outcome did not yield a valid story.
#[derive(Debug, Error)]
pub enum ExtractionError {
  #[error("outcome was not successful ({kind}): {detail}")]
  NotSucceeded { kind: String, detail: String },
  #[error("response carries no usable payload")]
  MissingPayload,
  #[error("unexpected tool call `{0}`")]
  UnexpectedTool(String),
  #[error("payload is not valid story JSON: {0}")]
  Json(#[from] serde_json::Error),
  #[error("story violates invariants: {0}")]
  Invalid(String),
}

/// Composite batch identifier could not be parsed back into date/language/level.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid composite identifier `{0}`")]
pub struct InvalidIdentifier(pub String);

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("no story stored at {}", .0.display())]
  NotFound(PathBuf),
  #[error("store I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("stored story is not valid JSON: {0}")]
  Json(#[from] serde_json::Error),
}

impl StoreError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, StoreError::NotFound(_))
  }
}
