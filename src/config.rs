//! Loading reader configuration (languages, levels, storage, provider) from TOML.
//!
//! Every field has a default, so a missing or partial file is fine.
//! Secrets (the API key) come from the environment only; see `anthropic`.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Level;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
  /// Target languages, display names ("Spanish").
  pub languages: Vec<String>,
  pub levels: Vec<Level>,
  /// Root of the date-partitioned story cache.
  pub stories_dir: PathBuf,
  /// Pair checked as a proxy for "this date is already generated".
  pub probe_language: String,
  pub probe_level: Level,
  /// Check every (language, level) pair instead of the probe, and only
  /// regenerate the missing ones.
  pub full_coverage_check: bool,
  /// Generation covers today plus this many following days.
  pub days_ahead: u32,
  /// How many recent provider batches to inspect for draining and the in-flight guard.
  pub batch_scan_limit: u32,
  pub poll_interval_secs: u64,
  /// Trigger a generation pass in the background at startup.
  pub generate_on_startup: bool,
  /// When generating at startup, wait for the submitted batch and drain it.
  pub wait_for_completion: bool,
  pub provider: ProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
  pub model: String,
  pub max_tokens: u32,
  pub temperature: f32,
  /// Ask for a forced tool call (structured output) rather than JSON text.
  pub structured_output: bool,
}

impl Default for ReaderConfig {
  fn default() -> Self {
    Self {
      languages: ["Spanish", "French", "German", "Italian", "Portuguese"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      levels: Level::ALL.to_vec(),
      stories_dir: PathBuf::from("stories"),
      probe_language: "Spanish".into(),
      probe_level: Level::A1,
      full_coverage_check: false,
      days_ahead: 1,
      batch_scan_limit: 10,
      poll_interval_secs: 30,
      generate_on_startup: false,
      wait_for_completion: false,
      provider: ProviderConfig::default(),
    }
  }
}

impl Default for ProviderConfig {
  fn default() -> Self {
    Self {
      model: "claude-sonnet-4-5".into(),
      max_tokens: 4096,
      temperature: 0.8,
      structured_output: true,
    }
  }
}

impl ReaderConfig {
  /// Every (language, level) pair generated per date.
  pub fn pairs(&self) -> Vec<(String, Level)> {
    self
      .languages
      .iter()
      .flat_map(|lang| self.levels.iter().map(move |&level| (lang.clone(), level)))
      .collect()
  }

  /// Configured display name for a language given in any case.
  pub fn find_language(&self, name: &str) -> Option<&str> {
    let slug = crate::domain::language_slug(name);
    self
      .languages
      .iter()
      .find(|l| crate::domain::language_slug(l) == slug)
      .map(String::as_str)
  }
}

/// Parse a TOML document into `ReaderConfig`.
pub fn parse_config(s: &str) -> Result<ReaderConfig, toml::de::Error> {
  toml::from_str::<ReaderConfig>(s)
}

/// Load from READER_CONFIG_PATH (defaults on any error), then apply env overrides.
pub fn load_config_from_env() -> ReaderConfig {
  let mut cfg = match std::env::var("READER_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match parse_config(&s) {
        Ok(cfg) => {
          info!(target: "dailyread_backend", %path, "Loaded reader config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "dailyread_backend", %path, error = %e, "Failed to parse TOML config; using defaults");
          ReaderConfig::default()
        }
      },
      Err(e) => {
        error!(target: "dailyread_backend", %path, error = %e, "Failed to read TOML config file; using defaults");
        ReaderConfig::default()
      }
    },
    Err(_) => ReaderConfig::default(),
  };

  if let Ok(dir) = std::env::var("STORIES_DIR") {
    cfg.stories_dir = PathBuf::from(dir);
  }
  cfg
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg = parse_config(
      r#"
        languages = ["Spanish", "Japanese"]
        probe_level = "a2"
        full_coverage_check = true

        [provider]
        structured_output = false
      "#,
    )
    .unwrap();
    assert_eq!(cfg.languages, vec!["Spanish", "Japanese"]);
    assert_eq!(cfg.probe_level, Level::A2);
    assert!(cfg.full_coverage_check);
    assert!(!cfg.provider.structured_output);
    assert_eq!(cfg.provider.max_tokens, 4096);
    assert_eq!(cfg.levels, Level::ALL.to_vec());
    assert_eq!(cfg.stories_dir, PathBuf::from("stories"));
  }

  #[test]
  fn pairs_cover_every_language_and_level() {
    let cfg = ReaderConfig::default();
    assert_eq!(cfg.pairs().len(), cfg.languages.len() * 4);
  }

  #[test]
  fn language_lookup_is_case_insensitive() {
    let cfg = ReaderConfig::default();
    assert_eq!(cfg.find_language("sPaNiSh"), Some("Spanish"));
    assert_eq!(cfg.find_language("klingon"), None);
  }
}
