//! Batch lifecycle: drain ended batches into the store, refuse to overlap an
//! in-progress batch, and submit one batch covering every missing date.
//!
//! Idle -> (drain ended) -> guard (in_progress/canceling?) -> submit -> Idle.
//! Nothing here waits on the provider except `wait_for_batch`, which callers
//! opt into.
//!
//! Whether a batch is in flight is always read from the provider; the local
//! `drained` set only avoids re-downloading results this process already
//! stored. Triggers are serialized so list, drain and submit run as one step.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

use crate::batch::{BatchRequest, GenerationClient};
use crate::config::ReaderConfig;
use crate::domain::CompositeId;
use crate::error::ProviderError;
use crate::extract::extract;
use crate::prompts::{build_output_schema, build_prompt};
use crate::store::StoryStore;
use crate::themes::select_themes;

/// Result of draining one ended batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
  pub batch_id: String,
  pub written: usize,
  pub skipped_existing: usize,
  pub failed: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmittedBatch {
  pub batch_id: String,
  pub dates: Vec<NaiveDate>,
  pub requests: usize,
}

/// Everything one generation trigger did. Errors are carried, not raised.
#[derive(Clone, Debug, Default, Serialize)]
pub struct GenerationReport {
  pub drained: Vec<DrainReport>,
  /// Set when a batch was already in progress and nothing was submitted.
  pub in_flight: Option<String>,
  pub submitted: Option<SubmittedBatch>,
  /// Provider failures in the order they happened (listing, draining, submitting).
  pub provider_errors: Vec<String>,
}

impl GenerationReport {
  pub fn failed(&self) -> usize {
    self.drained.iter().map(|d| d.failed).sum()
  }
}

impl fmt::Display for GenerationReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut parts = Vec::new();
    for d in &self.drained {
      parts.push(format!(
        "processed batch {}: {} written, {} already stored, {} failed",
        d.batch_id, d.written, d.skipped_existing, d.failed
      ));
    }
    if let Some(id) = &self.in_flight {
      parts.push(format!("batch {id} is still in progress, try again later"));
    }
    if let Some(s) = &self.submitted {
      let dates = s.dates.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ");
      parts.push(format!("queued batch {} with {} requests for {}", s.batch_id, s.requests, dates));
    }
    for e in &self.provider_errors {
      parts.push(format!("provider error: {e}"));
    }
    if parts.is_empty() {
      parts.push("all requested dates are already generated".into());
    }
    f.write_str(&parts.join("; "))
  }
}

pub struct Orchestrator {
  client: Arc<dyn GenerationClient>,
  store: StoryStore,
  config: ReaderConfig,
  drained: RwLock<HashSet<String>>,
  trigger: Mutex<()>,
}

impl Orchestrator {
  pub fn new(client: Arc<dyn GenerationClient>, store: StoryStore, config: ReaderConfig) -> Self {
    Self { client, store, config, drained: RwLock::new(HashSet::new()), trigger: Mutex::new(()) }
  }

  /// Today plus `days_ahead` following days.
  pub fn upcoming_dates(&self, today: NaiveDate) -> Vec<NaiveDate> {
    (0..=self.config.days_ahead)
      .filter_map(|offset| today.checked_add_days(chrono::Days::new(u64::from(offset))))
      .collect()
  }

  /// One generation trigger for `dates`. Concurrent triggers wait for each other.
  #[instrument(level = "info", skip(self, dates), fields(dates = dates.len()))]
  pub async fn generate(&self, dates: &[NaiveDate]) -> GenerationReport {
    let _guard = self.trigger.lock().await;
    let mut report = GenerationReport::default();

    let batches = match self.client.list_batches(self.config.batch_scan_limit).await {
      Ok(b) => b,
      Err(e) => {
        error!(target: "batch", error = %e, "Listing batches failed; not submitting");
        report.provider_errors.push(e.to_string());
        return report;
      }
    };

    // Ids the provider no longer lists will never be drained again.
    self.drained.write().await.retain(|id| batches.iter().any(|b| &b.id == id));

    for batch in batches.iter().filter(|b| b.is_ended()) {
      if self.drained.read().await.contains(&batch.id) {
        continue;
      }
      match self.drain_unlocked(&batch.id).await {
        Ok(d) => {
          if d.written > 0 || d.failed > 0 {
            report.drained.push(d);
          }
        }
        Err(e) => {
          error!(target: "batch", batch_id = %batch.id, error = %e, "Draining batch failed");
          report.provider_errors.push(e.to_string());
        }
      }
    }

    if let Some(active) = batches.iter().find(|b| b.is_active()) {
      info!(target: "batch", batch_id = %active.id, status = ?active.processing_status, "Batch already in flight; not submitting");
      report.in_flight = Some(active.id.clone());
      return report;
    }

    let (requests, covered) = self.build_requests(dates).await;
    if requests.is_empty() {
      info!(target: "batch", "Nothing to generate");
      return report;
    }

    let count = requests.len();
    match self.client.submit_batch(requests).await {
      Ok(info) => {
        info!(target: "batch", batch_id = %info.id, requests = count, "Generation batch queued");
        report.submitted = Some(SubmittedBatch { batch_id: info.id, dates: covered, requests: count });
      }
      Err(e) => {
        error!(target: "batch", error = %e, "Batch submission failed");
        report.provider_errors.push(e.to_string());
      }
    }
    report
  }

  /// One request per missing (language, level) pair, per date, plus the dates covered.
  async fn build_requests(&self, dates: &[NaiveDate]) -> (Vec<BatchRequest>, Vec<NaiveDate>) {
    let mut dates = dates.to_vec();
    dates.sort_unstable();
    dates.dedup();

    let pairs = self.config.pairs();
    let mut requests = Vec::new();
    let mut covered = Vec::new();
    for date in dates {
      let missing = self.store.missing_pairs(date, &pairs, self.config.full_coverage_check).await;
      if missing.is_empty() {
        continue;
      }
      let themes = select_themes(date);
      for (language, level) in missing {
        let theme = themes.get(&level).map(String::as_str).unwrap_or_default();
        requests.push(BatchRequest {
          custom_id: CompositeId::new(date, &language, level).to_string(),
          prompt: build_prompt(&language, level, theme),
          schema: build_output_schema(&language, level),
        });
      }
      covered.push(date);
    }
    (requests, covered)
  }

  /// Store every extractable outcome of an ended batch. Per-item failures
  /// are logged and counted; only fetching the results can fail the call.
  #[instrument(level = "info", skip(self))]
  pub async fn drain_batch(&self, batch_id: &str) -> Result<DrainReport, ProviderError> {
    let _guard = self.trigger.lock().await;
    self.drain_unlocked(batch_id).await
  }

  /// Caller holds `trigger`.
  async fn drain_unlocked(&self, batch_id: &str) -> Result<DrainReport, ProviderError> {
    let results = self.client.fetch_results(batch_id).await?;
    let mut report = DrainReport { batch_id: batch_id.to_string(), ..Default::default() };

    for item in results {
      let outcome = match item {
        Ok(o) => o,
        Err(e) => {
          warn!(target: "batch", %batch_id, error = %e, "Unreadable result line");
          report.failed += 1;
          continue;
        }
      };
      let id = match outcome.custom_id.parse::<CompositeId>() {
        Ok(id) => id,
        Err(e) => {
          warn!(target: "batch", %batch_id, error = %e, "Skipping result");
          report.failed += 1;
          continue;
        }
      };
      if self.store.exists_for(id.date, &id.language, id.level).await {
        report.skipped_existing += 1;
        continue;
      }
      let story = match extract(&outcome.result, id.level) {
        Ok(s) => s,
        Err(e) => {
          warn!(target: "story", %batch_id, custom_id = %outcome.custom_id, kind = outcome.result.kind(), error = %e, "Extraction failed");
          report.failed += 1;
          continue;
        }
      };
      match self.store.write(id.date, &id.language, id.level, &story).await {
        Ok(path) => {
          info!(target: "story", custom_id = %outcome.custom_id, path = %path.display(), turns = story.messages.len(), "Story stored");
          report.written += 1;
        }
        Err(e) => {
          error!(target: "story", custom_id = %outcome.custom_id, error = %e, "Writing story failed");
          report.failed += 1;
        }
      }
    }

    self.drained.write().await.insert(batch_id.to_string());
    info!(
      target: "batch",
      %batch_id,
      written = report.written,
      skipped = report.skipped_existing,
      failed = report.failed,
      "Batch drained"
    );
    Ok(report)
  }

  /// Poll until the batch ends, then drain it. No timeout: this suspends for
  /// as long as the provider keeps the batch running.
  #[instrument(level = "info", skip(self))]
  pub async fn wait_for_batch(&self, batch_id: &str) -> Result<DrainReport, ProviderError> {
    let interval = Duration::from_secs(self.config.poll_interval_secs);
    loop {
      let info = self.client.poll_status(batch_id).await?;
      if info.is_ended() {
        break;
      }
      info!(
        target: "batch",
        %batch_id,
        status = ?info.processing_status,
        processing = info.request_counts.processing,
        "Batch not finished yet"
      );
      tokio::time::sleep(interval).await;
    }
    self.drain_batch(batch_id).await
  }
}
