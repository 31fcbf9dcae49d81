//! Batch provider seam: the `GenerationClient` trait and the batch/outcome
//! types it speaks.
//!
//! Batches are owned by the provider. We only submit them, observe their
//! status, and read back one outcome per request once they have ended.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// Provider-side processing status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
  InProgress,
  Canceling,
  Ended,
  #[serde(other)]
  Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounts {
  #[serde(default)] pub processing: u32,
  #[serde(default)] pub succeeded: u32,
  #[serde(default)] pub errored: u32,
  #[serde(default)] pub canceled: u32,
  #[serde(default)] pub expired: u32,
}

/// What we know about one batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchInfo {
  pub id: String,
  pub processing_status: BatchStatus,
  #[serde(default)]
  pub request_counts: RequestCounts,
  #[serde(default)]
  pub results_url: Option<String>,
  #[serde(default)]
  pub created_at: Option<String>,
}

impl BatchInfo {
  /// Still running on the provider side (`in_progress` or `canceling`).
  pub fn is_active(&self) -> bool {
    matches!(self.processing_status, BatchStatus::InProgress | BatchStatus::Canceling)
  }

  pub fn is_ended(&self) -> bool {
    self.processing_status == BatchStatus::Ended
  }
}

/// One generation request inside a batch.
#[derive(Clone, Debug)]
pub struct BatchRequest {
  /// Composite `date-language-level` key.
  pub custom_id: String,
  pub prompt: String,
  pub schema: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
  Text {
    text: String,
  },
  ToolUse {
    #[serde(default)]
    id: String,
    name: String,
    input: Value,
  },
  #[serde(other)]
  Other,
}

/// Assistant message returned for a succeeded request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMessage {
  #[serde(default)]
  pub content: Vec<ContentBlock>,
  #[serde(default)]
  pub stop_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OutcomeResult {
  Succeeded(ProviderMessage),
  Errored(String),
  /// Canceled, expired or anything the provider adds later.
  Other(String),
}

impl OutcomeResult {
  pub fn kind(&self) -> &str {
    match self {
      OutcomeResult::Succeeded(_) => "succeeded",
      OutcomeResult::Errored(_) => "errored",
      OutcomeResult::Other(kind) => kind,
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchOutcome {
  pub custom_id: String,
  pub result: OutcomeResult,
}

#[derive(Deserialize)]
struct RawOutcome {
  custom_id: String,
  result: RawResult,
}

#[derive(Deserialize)]
struct RawResult {
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  message: Option<ProviderMessage>,
  #[serde(default)]
  error: Option<Value>,
}

impl From<RawOutcome> for BatchOutcome {
  fn from(raw: RawOutcome) -> Self {
    let result = match (raw.result.kind.as_str(), raw.result.message) {
      ("succeeded", Some(message)) => OutcomeResult::Succeeded(message),
      ("succeeded", None) => OutcomeResult::Errored("succeeded without a message".into()),
      ("errored", _) => OutcomeResult::Errored(error_detail(raw.result.error.as_ref())),
      (other, _) => OutcomeResult::Other(other.to_string()),
    };
    BatchOutcome { custom_id: raw.custom_id, result }
  }
}

/// Prefer the nested `error.message`, fall back to the raw JSON.
fn error_detail(error: Option<&Value>) -> String {
  let Some(error) = error else {
    return "no error detail".into();
  };
  error
    .pointer("/error/message")
    .or_else(|| error.get("message"))
    .and_then(Value::as_str)
    .map(str::to_string)
    .unwrap_or_else(|| error.to_string())
}

/// Per-request outcomes of an ended batch, parsed one JSONL line at a time.
pub struct BatchResults {
  lines: std::vec::IntoIter<String>,
}

impl BatchResults {
  pub fn from_jsonl(body: &str) -> Self {
    Self::from_lines(body.lines().map(str::to_string).collect())
  }

  pub fn from_lines(lines: Vec<String>) -> Self {
    Self { lines: lines.into_iter() }
  }
}

impl Iterator for BatchResults {
  type Item = Result<BatchOutcome, ProviderError>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let line = self.lines.next()?;
      if line.trim().is_empty() {
        continue;
      }
      return Some(
        serde_json::from_str::<RawOutcome>(&line)
          .map(BatchOutcome::from)
          .map_err(|e| ProviderError::Decode(format!("result line: {e}"))),
      );
    }
  }
}

/// Asynchronous batch generation provider.
///
/// Submission and result retrieval are separate calls so the serving path
/// never waits on a batch to finish.
#[async_trait]
pub trait GenerationClient: Send + Sync {
  /// Submit all requests as one batch; returns immediately with the new batch.
  async fn submit_batch(&self, requests: Vec<BatchRequest>) -> Result<BatchInfo, ProviderError>;

  /// Most recent batches first.
  async fn list_batches(&self, limit: u32) -> Result<Vec<BatchInfo>, ProviderError>;

  async fn poll_status(&self, batch_id: &str) -> Result<BatchInfo, ProviderError>;

  async fn fetch_results(&self, batch_id: &str) -> Result<BatchResults, ProviderError>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn parses_each_outcome_kind() {
    let body = [
      json!({"custom_id": "20251104-spanish-a1", "result": {"type": "succeeded", "message": {
        "content": [{"type": "tool_use", "id": "t1", "name": "record_story", "input": {"title": "x"}}],
        "stop_reason": "tool_use"
      }}}),
      json!({"custom_id": "20251104-spanish-a2", "result": {"type": "errored", "error": {
        "type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}
      }}}),
      json!({"custom_id": "20251104-spanish-b1", "result": {"type": "expired"}}),
    ]
    .iter()
    .map(|v| v.to_string())
    .collect::<Vec<_>>()
    .join("\n");

    let outcomes: Vec<BatchOutcome> = BatchResults::from_jsonl(&body).map(|r| r.unwrap()).collect();
    assert_eq!(outcomes.len(), 3);
    match &outcomes[0].result {
      OutcomeResult::Succeeded(m) => assert!(matches!(&m.content[0], ContentBlock::ToolUse { name, .. } if name == "record_story")),
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(outcomes[1].result, OutcomeResult::Errored("Overloaded".into()));
    assert_eq!(outcomes[2].result, OutcomeResult::Other("expired".into()));
  }

  #[test]
  fn malformed_line_is_a_per_item_error() {
    let body = "{not json}\n\n{\"custom_id\":\"x\",\"result\":{\"type\":\"canceled\"}}\n";
    let items: Vec<_> = BatchResults::from_jsonl(body).collect();
    assert_eq!(items.len(), 2);
    assert!(items[0].is_err());
    assert!(items[1].is_ok());
  }

  #[test]
  fn unknown_content_blocks_and_statuses_are_tolerated() {
    let msg: ProviderMessage =
      serde_json::from_value(json!({"content": [{"type": "thinking", "thinking": "..."}]})).unwrap();
    assert_eq!(msg.content, vec![ContentBlock::Other]);

    let info: BatchInfo =
      serde_json::from_value(json!({"id": "b1", "processing_status": "archived"})).unwrap();
    assert_eq!(info.processing_status, BatchStatus::Unknown);
    assert!(!info.is_active());

    let canceling: BatchInfo =
      serde_json::from_value(json!({"id": "b2", "processing_status": "canceling"})).unwrap();
    assert!(canceling.is_active());
  }
}
