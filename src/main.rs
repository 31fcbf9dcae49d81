//! Daily graded reader · Backend
//!
//! - Batch generation of level-appropriate dialogues + quizzes via the
//!   Anthropic Message Batches API
//! - Date-partitioned JSON story cache on disk
//! - Axum HTTP API serving today's story per language/level
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   ANTHROPIC_API_KEY   : enables batch generation if present
//!   ANTHROPIC_BASE_URL  : default "https://api.anthropic.com/v1"
//!   ANTHROPIC_MODEL     : overrides the configured model
//!   READER_CONFIG_PATH  : path to TOML config (languages, levels, storage, provider)
//!   STORIES_DIR         : overrides the configured story directory
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod anthropic;
mod batch;
mod config;
mod domain;
mod error;
mod extract;
mod orchestrator;
mod prompts;
mod protocol;
mod routes;
mod state;
mod store;
mod telemetry;
mod themes;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Config, story store and (optional) batch client.
  let state = Arc::new(AppState::new());

  if state.config.generate_on_startup {
    spawn_startup_generation(state.clone());
  }

  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "dailyread_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "dailyread_backend", "Shutdown signal received");
    })
    .await?;
  Ok(())
}

/// Run one generation pass in the background so startup never blocks on the provider.
fn spawn_startup_generation(state: Arc<AppState>) {
  let Some(orch) = state.orchestrator.clone() else {
    error!(target: "dailyread_backend", "generate_on_startup is set but generation is disabled");
    return;
  };
  let wait = state.config.wait_for_completion;
  let today = state.today();
  tokio::spawn(async move {
    let report = orch.generate(&orch.upcoming_dates(today)).await;
    info!(target: "batch", status = %report, "Startup generation pass finished");
    if !wait {
      return;
    }
    let Some(batch_id) = report.submitted.map(|s| s.batch_id).or(report.in_flight) else {
      return;
    };
    match orch.wait_for_batch(&batch_id).await {
      Ok(d) => info!(target: "batch", %batch_id, written = d.written, failed = d.failed, "Startup batch drained"),
      Err(e) => error!(target: "batch", %batch_id, error = %e, "Waiting for startup batch failed"),
    }
  });
}
