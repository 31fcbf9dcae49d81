//! Public response structs for the HTTP endpoints (serde ready).

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{Level, StoryContent};

/// A stored story together with the slot it was read from.
#[derive(Debug, Serialize)]
pub struct StoryOut {
    pub date: NaiveDate,
    pub language: String,
    pub level: Level,
    #[serde(flatten)]
    pub story: StoryContent,
}

/// Returned with 404 when the story for a slot has not been generated yet.
#[derive(Debug, Serialize)]
pub struct NotGeneratedOut {
    pub status: &'static str,
    pub date: NaiveDate,
    pub language: String,
    pub level: Level,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DatesOut {
    pub dates: Vec<NaiveDate>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub generation_enabled: bool,
}
