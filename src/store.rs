//! Date-partitioned story cache on the filesystem.
//!
//! Layout: `<root>/<YYYY>/<MM>/<DD>/<language>/<level>/story.json`, pretty JSON.
//! Writes go to a temp file in the target directory and are renamed into
//! place, so readers never see a partial file.

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use tokio::fs;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::{language_slug, Level, StoryContent};
use crate::error::StoreError;

const STORY_FILE: &str = "story.json";

#[derive(Clone, Debug)]
pub struct StoryStore {
  root: PathBuf,
  probe_language: String,
  probe_level: Level,
}

impl StoryStore {
  pub fn new(root: impl Into<PathBuf>, probe_language: &str, probe_level: Level) -> Self {
    Self { root: root.into(), probe_language: probe_language.to_string(), probe_level }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn path_for(&self, date: NaiveDate, language: &str, level: Level) -> PathBuf {
    self
      .root
      .join(format!("{:04}", date.year()))
      .join(format!("{:02}", date.month()))
      .join(format!("{:02}", date.day()))
      .join(language_slug(language))
      .join(level.slug())
      .join(STORY_FILE)
  }

  /// Whether the date has been generated, judged by the probe pair only.
  pub async fn exists(&self, date: NaiveDate) -> bool {
    self.exists_for(date, &self.probe_language, self.probe_level).await
  }

  pub async fn exists_for(&self, date: NaiveDate, language: &str, level: Level) -> bool {
    fs::try_exists(self.path_for(date, language, level)).await.unwrap_or(false)
  }

  /// Pairs still to generate for `date`. With `full_check` off, either all
  /// pairs (probe missing) or none.
  pub async fn missing_pairs(
    &self,
    date: NaiveDate,
    pairs: &[(String, Level)],
    full_check: bool,
  ) -> Vec<(String, Level)> {
    if !full_check {
      return if self.exists(date).await { Vec::new() } else { pairs.to_vec() };
    }
    let mut missing = Vec::new();
    for (language, level) in pairs {
      if !self.exists_for(date, language, *level).await {
        missing.push((language.clone(), *level));
      }
    }
    missing
  }

  #[instrument(level = "debug", skip(self, content), fields(%date, %language, %level))]
  pub async fn write(
    &self,
    date: NaiveDate,
    language: &str,
    level: Level,
    content: &StoryContent,
  ) -> Result<PathBuf, StoreError> {
    let path = self.path_for(date, language, level);
    let dir = path.parent().unwrap_or(&self.root).to_path_buf();
    fs::create_dir_all(&dir).await?;

    let json = serde_json::to_string_pretty(content)?;
    let tmp = dir.join(format!(".{STORY_FILE}.{}.tmp", Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp, json.as_bytes()).await {
      let _ = fs::remove_file(&tmp).await;
      return Err(e.into());
    }
    if let Err(e) = fs::rename(&tmp, &path).await {
      let _ = fs::remove_file(&tmp).await;
      return Err(e.into());
    }
    debug!(target: "story", path = %path.display(), bytes = json.len(), "Story written");
    Ok(path)
  }

  /// `StoreError::NotFound` is the normal answer for a date not generated yet.
  pub async fn read(&self, date: NaiveDate, language: &str, level: Level) -> Result<StoryContent, StoreError> {
    let path = self.path_for(date, language, level);
    let bytes = match fs::read(&path).await {
      Ok(b) => b,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StoreError::NotFound(path)),
      Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&bytes)?)
  }

  /// Dates with at least one stored story, newest first.
  pub async fn list_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
    let mut dates = Vec::new();
    for year in numeric_children(&self.root).await? {
      let year_dir = self.root.join(format!("{year:04}"));
      for month in numeric_children(&year_dir).await? {
        let month_dir = year_dir.join(format!("{month:02}"));
        for day in numeric_children(&month_dir).await? {
          if let Some(date) = NaiveDate::from_ymd_opt(year as i32, month, day) {
            dates.push(date);
          }
        }
      }
    }
    dates.sort_unstable_by(|a, b| b.cmp(a));
    Ok(dates)
  }
}

/// Names of sub-directories that parse as numbers. A missing dir yields nothing.
async fn numeric_children(dir: &Path) -> Result<Vec<u32>, StoreError> {
  let mut rd = match fs::read_dir(dir).await {
    Ok(rd) => rd,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(e.into()),
  };
  let mut out = Vec::new();
  while let Some(entry) = rd.next_entry().await? {
    if !entry.file_type().await?.is_dir() {
      continue;
    }
    if let Some(n) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) {
      out.push(n);
    }
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::sample_story;

  fn nov4() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 4).unwrap()
  }

  #[tokio::test]
  async fn write_then_read_round_trips_at_expected_path() {
    let tmp = tempfile::tempdir().unwrap();
    let store = StoryStore::new(tmp.path().join("stories"), "Spanish", Level::A1);
    let path = store.write(nov4(), "Spanish", Level::A1, &sample_story(10)).await.unwrap();

    assert!(path.ends_with("stories/2025/11/04/spanish/a1/story.json"));
    assert!(store.exists(nov4()).await);
    assert_eq!(store.read(nov4(), "SPANISH", Level::A1).await.unwrap(), sample_story(10));

    let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
    assert_eq!(leftovers.len(), 1, "temp file left behind");
  }

  #[tokio::test]
  async fn missing_story_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let store = StoryStore::new(tmp.path(), "Spanish", Level::A1);
    let err = store.read(nov4(), "French", Level::B2).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!store.exists(nov4()).await);
  }

  #[tokio::test]
  async fn missing_pairs_uses_probe_or_full_check() {
    let tmp = tempfile::tempdir().unwrap();
    let store = StoryStore::new(tmp.path(), "Spanish", Level::A1);
    let pairs = vec![("Spanish".to_string(), Level::A1), ("French".to_string(), Level::A1)];

    assert_eq!(store.missing_pairs(nov4(), &pairs, false).await.len(), 2);
    store.write(nov4(), "Spanish", Level::A1, &sample_story(10)).await.unwrap();
    assert!(store.missing_pairs(nov4(), &pairs, false).await.is_empty());
    assert_eq!(
      store.missing_pairs(nov4(), &pairs, true).await,
      vec![("French".to_string(), Level::A1)]
    );
  }

  #[tokio::test]
  async fn lists_stored_dates_newest_first() {
    let tmp = tempfile::tempdir().unwrap();
    let store = StoryStore::new(tmp.path(), "Spanish", Level::A1);
    assert!(store.list_dates().await.unwrap().is_empty());
    let nov3 = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
    store.write(nov3, "Spanish", Level::A1, &sample_story(10)).await.unwrap();
    store.write(nov4(), "German", Level::B2, &sample_story(12)).await.unwrap();
    assert_eq!(store.list_dates().await.unwrap(), vec![nov4(), nov3]);
  }
}
