//! HTTP endpoint handlers. These are thin wrappers around the store and the
//! orchestrator; a missing story is a 404, never a 500.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use chrono::NaiveDate;
use tracing::{error, info, instrument};

use crate::domain::Level;
use crate::protocol::*;
use crate::state::AppState;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
  (status, Json(ErrorOut { message: message.into() })).into_response()
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, generation_enabled: state.orchestrator.is_some() })
}

/// Trigger generation for today and the configured days ahead; replies with a status line.
#[instrument(level = "info", skip(state))]
pub async fn http_generate_stories(State(state): State<Arc<AppState>>) -> Response {
  let Some(orch) = &state.orchestrator else {
    return (StatusCode::SERVICE_UNAVAILABLE, "generation is disabled: ANTHROPIC_API_KEY is not set").into_response();
  };
  let dates = orch.upcoming_dates(state.today());
  let report = orch.generate(&dates).await;
  info!(
    target: "batch",
    drained = report.drained.len(),
    failed = report.failed(),
    in_flight = ?report.in_flight,
    submitted = report.submitted.is_some(),
    "Generation trigger handled"
  );
  report.to_string().into_response()
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_today_story(
  State(state): State<Arc<AppState>>,
  Path((language, level)): Path<(String, String)>,
) -> Response {
  let today = state.today();
  serve_story(&state, today, &language, &level).await
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_story_for_date(
  State(state): State<Arc<AppState>>,
  Path((date, language, level)): Path<(String, String, String)>,
) -> Response {
  let Ok(date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else {
    return error_response(StatusCode::BAD_REQUEST, format!("invalid date '{date}', expected YYYY-MM-DD"));
  };
  serve_story(&state, date, &language, &level).await
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_dates(State(state): State<Arc<AppState>>) -> Response {
  match state.store.list_dates().await {
    Ok(dates) => Json(DatesOut { dates }).into_response(),
    Err(e) => {
      error!(target: "story", error = %e, "Listing stored dates failed");
      error_response(StatusCode::INTERNAL_SERVER_ERROR, "could not list stored stories")
    }
  }
}

async fn serve_story(state: &AppState, date: NaiveDate, language: &str, level: &str) -> Response {
  let level: Level = match level.parse() {
    Ok(l) => l,
    Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
  };
  let Some(language) = state.config.find_language(language).map(str::to_string) else {
    return error_response(StatusCode::NOT_FOUND, format!("unknown language '{language}'"));
  };

  match state.store.read(date, &language, level).await {
    Ok(story) => {
      info!(target: "story", %date, %language, %level, "Story served");
      Json(StoryOut { date, language, level, story }).into_response()
    }
    Err(e) if e.is_not_found() => (
      StatusCode::NOT_FOUND,
      Json(NotGeneratedOut {
        status: "not_generated",
        date,
        message: format!("The {level} {language} story for {date} has not been generated yet."),
        language,
        level,
      }),
    )
      .into_response(),
    Err(e) => {
      error!(target: "story", %date, %language, %level, error = %e, "Reading story failed");
      error_response(StatusCode::INTERNAL_SERVER_ERROR, "stored story could not be read")
    }
  }
}
