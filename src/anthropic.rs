//! Minimal client for the Anthropic Message Batches API.
//!
//! We only create batches, list/retrieve them, and download the JSONL results.
//! Calls are instrumented and log batch ids, counts and latencies (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::batch::{BatchInfo, BatchRequest, BatchResults, GenerationClient};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::prompts::{build_text_instructions, STORY_TOOL_NAME};

const API_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You write graded reading material for language learners. \
Stay strictly within the requested level, keep every turn natural, and make sure exactly one option of each question is correct.";

#[derive(Clone)]
pub struct AnthropicBatches {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub max_tokens: u32,
  pub temperature: f32,
  /// Force a tool call carrying the schema; otherwise ask for plain JSON text.
  pub structured_output: bool,
}

impl AnthropicBatches {
  /// Construct the client if we find ANTHROPIC_API_KEY; otherwise return None.
  pub fn from_env(cfg: &ProviderConfig) -> Option<Self> {
    let api_key = std::env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| "https://api.anthropic.com/v1".into());
    let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| cfg.model.clone());

    let client = match reqwest::Client::builder().timeout(Duration::from_secs(60)).build() {
      Ok(c) => c,
      Err(e) => {
        error!(target: "batch", error = %e, "Failed to build HTTP client");
        return None;
      }
    };

    Some(Self {
      client,
      api_key,
      base_url: base_url.trim_end_matches('/').to_string(),
      model,
      max_tokens: cfg.max_tokens,
      temperature: cfg.temperature,
      structured_output: cfg.structured_output,
    })
  }

  /// Provider parameters for one request.
  fn build_params(&self, req: &BatchRequest) -> MessageParams {
    let (content, tools, tool_choice) = if self.structured_output {
      (
        req.prompt.clone(),
        Some(vec![ToolDef {
          name: STORY_TOOL_NAME.into(),
          description: "Record the generated dialogue and its comprehension quiz.".into(),
          input_schema: req.schema.clone(),
        }]),
        Some(ToolChoice { r#type: "tool".into(), name: STORY_TOOL_NAME.into() }),
      )
    } else {
      (format!("{}\n\n{}", req.prompt, build_text_instructions(&req.schema)), None, None)
    };

    MessageParams {
      model: self.model.clone(),
      max_tokens: self.max_tokens,
      temperature: self.temperature,
      system: SYSTEM_PROMPT.into(),
      messages: vec![MessageReq { role: "user".into(), content }],
      tools,
      tool_choice,
    }
  }

  fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
    self
      .client
      .request(method, url)
      .header(USER_AGENT, "dailyread-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
  }

  /// Send and turn non-2xx answers into `ProviderError::Status`.
  async fn send(&self, rb: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
    let res = rb.send().await?;
    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_provider_error(&body).unwrap_or(body);
      return Err(ProviderError::Status { status, message });
    }
    Ok(res)
  }
}

#[async_trait]
impl GenerationClient for AnthropicBatches {
  #[instrument(level = "info", skip(self, requests), fields(model = %self.model, requests = requests.len()))]
  async fn submit_batch(&self, requests: Vec<BatchRequest>) -> Result<BatchInfo, ProviderError> {
    let url = format!("{}/messages/batches", self.base_url);
    let body = CreateBatch {
      requests: requests
        .iter()
        .map(|r| BatchItem { custom_id: r.custom_id.clone(), params: self.build_params(r) })
        .collect(),
    };

    let start = Instant::now();
    let res = self.send(self.request(reqwest::Method::POST, &url).json(&body)).await;
    let elapsed = start.elapsed();
    let res = match res {
      Ok(r) => r,
      Err(e) => {
        error!(target: "batch", ?elapsed, error = %e, "Batch submission failed");
        return Err(e);
      }
    };
    let info: BatchInfo = res.json().await.map_err(|e| ProviderError::Decode(e.to_string()))?;
    info!(target: "batch", batch_id = %info.id, status = ?info.processing_status, ?elapsed, "Batch submitted");
    Ok(info)
  }

  #[instrument(level = "debug", skip(self))]
  async fn list_batches(&self, limit: u32) -> Result<Vec<BatchInfo>, ProviderError> {
    let url = format!("{}/messages/batches?limit={}", self.base_url, limit);
    let res = self.send(self.request(reqwest::Method::GET, &url)).await?;
    let page: BatchPage = res.json().await.map_err(|e| ProviderError::Decode(e.to_string()))?;
    Ok(page.data)
  }

  #[instrument(level = "debug", skip(self))]
  async fn poll_status(&self, batch_id: &str) -> Result<BatchInfo, ProviderError> {
    let url = format!("{}/messages/batches/{}", self.base_url, batch_id);
    let res = self.send(self.request(reqwest::Method::GET, &url)).await?;
    res.json().await.map_err(|e| ProviderError::Decode(e.to_string()))
  }

  #[instrument(level = "info", skip(self))]
  async fn fetch_results(&self, batch_id: &str) -> Result<BatchResults, ProviderError> {
    let info = self.poll_status(batch_id).await?;
    let url = info
      .results_url
      .unwrap_or_else(|| format!("{}/messages/batches/{}/results", self.base_url, batch_id));
    let res = self.send(self.request(reqwest::Method::GET, &url)).await?;
    let body = res.text().await?;
    info!(target: "batch", %batch_id, bytes = body.len(), "Batch results downloaded");
    Ok(BatchResults::from_jsonl(&body))
  }
}

// --- Wire DTOs ---

#[derive(Serialize)]
struct CreateBatch {
  requests: Vec<BatchItem>,
}
#[derive(Serialize)]
struct BatchItem {
  custom_id: String,
  params: MessageParams,
}
#[derive(Serialize)]
struct MessageParams {
  model: String,
  max_tokens: u32,
  temperature: f32,
  system: String,
  messages: Vec<MessageReq>,
  #[serde(skip_serializing_if = "Option::is_none")]
  tools: Option<Vec<ToolDef>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  tool_choice: Option<ToolChoice>,
}
#[derive(Serialize)]
struct MessageReq { role: String, content: String }
#[derive(Serialize)]
struct ToolDef { name: String, description: String, input_schema: Value }
#[derive(Serialize)]
struct ToolChoice { #[serde(rename = "type")] r#type: String, name: String }

#[derive(Deserialize)]
struct BatchPage {
  #[serde(default)]
  data: Vec<BatchInfo>,
}

/// Try to extract a clean error message from a provider error body.
fn extract_provider_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Level;
  use crate::prompts::{build_output_schema, build_prompt};

  fn client(structured_output: bool) -> AnthropicBatches {
    AnthropicBatches {
      client: reqwest::Client::new(),
      api_key: "test-key".into(),
      base_url: "http://localhost".into(),
      model: "test-model".into(),
      max_tokens: 4096,
      temperature: 0.8,
      structured_output,
    }
  }

  fn request() -> BatchRequest {
    BatchRequest {
      custom_id: "20251104-spanish-a1".into(),
      prompt: build_prompt("Spanish", Level::A1, "buying a train ticket"),
      schema: build_output_schema("Spanish", Level::A1),
    }
  }

  #[test]
  fn structured_mode_forces_the_story_tool() {
    let params = serde_json::to_value(client(true).build_params(&request())).unwrap();
    assert_eq!(params["tool_choice"]["type"], "tool");
    assert_eq!(params["tool_choice"]["name"], STORY_TOOL_NAME);
    assert_eq!(params["tools"][0]["input_schema"]["properties"]["messages"]["minItems"], 10);
    assert_eq!(params["messages"][0]["role"], "user");
  }

  #[test]
  fn text_mode_embeds_schema_in_prompt() {
    let params = serde_json::to_value(client(false).build_params(&request())).unwrap();
    assert!(params.get("tools").is_none());
    let content = params["messages"][0]["content"].as_str().unwrap();
    assert!(content.contains("Respond ONLY with a single JSON object"));
    assert!(content.contains("correctAnswer"));
  }

  #[test]
  fn provider_error_message_is_unwrapped() {
    let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"Too many requests"}}"#;
    assert_eq!(extract_provider_error(body).as_deref(), Some("Too many requests"));
    assert_eq!(extract_provider_error("<html>"), None);
  }
}
