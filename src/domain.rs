//! Domain models: proficiency levels, generated story content, and the
//! composite identifier that ties a batch sub-result back to its storage slot.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::InvalidIdentifier;

/// Proficiency tier. A1/A2 are the "early" tiers, B1/B2 the "intermediate" ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
  #[serde(alias = "a1")]
  A1,
  #[serde(alias = "a2")]
  A2,
  #[serde(alias = "b1")]
  B1,
  #[serde(alias = "b2")]
  B2,
}

impl Level {
  pub const ALL: [Level; 4] = [Level::A1, Level::A2, Level::B1, Level::B2];

  /// 1-based tier number.
  pub fn tier(self) -> u32 {
    match self {
      Level::A1 => 1,
      Level::A2 => 2,
      Level::B1 => 3,
      Level::B2 => 4,
    }
  }

  /// Lowercase form used in paths and composite identifiers.
  pub fn slug(self) -> &'static str {
    match self {
      Level::A1 => "a1",
      Level::A2 => "a2",
      Level::B1 => "b1",
      Level::B2 => "b2",
    }
  }

  /// Minimum number of dialogue turns a story must carry.
  pub fn min_turns(self) -> usize {
    match self {
      Level::B2 => 12,
      _ => 10,
    }
  }

  /// Upper bound requested in the prompt (not enforced on the result).
  pub fn max_turns(self) -> usize {
    match self {
      Level::A1 => 12,
      Level::A2 => 14,
      Level::B1 => 16,
      Level::B2 => 18,
    }
  }

  /// Quiz questions are in English for the early tiers and in the target
  /// language for the intermediate ones.
  pub fn questions_in_target_language(self) -> bool {
    matches!(self, Level::B1 | Level::B2)
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Level::A1 => "A1",
      Level::A2 => "A2",
      Level::B1 => "B1",
      Level::B2 => "B2",
    };
    f.write_str(s)
  }
}

impl FromStr for Level {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "a1" => Ok(Level::A1),
      "a2" => Ok(Level::A2),
      "b1" => Ok(Level::B1),
      "b2" => Ok(Level::B2),
      other => Err(format!("unknown level '{other}'")),
    }
  }
}

/// Longest slug that keeps `<YYYYMMDD>-<slug>-<level>` within the provider's 64-char custom id.
const MAX_SLUG_LEN: usize = 52;

/// Language key used on disk and in identifiers ("Spanish" -> "spanish",
/// "Português" -> "portugues", "Serbo-Croatian" -> "serbo_croatian").
///
/// Only `[a-z0-9_]`: accents are stripped after NFD decomposition, anything
/// else becomes `_`.
pub fn language_slug(language: &str) -> String {
  let mut slug: String = language
    .trim()
    .nfd()
    .filter(|c| !is_combining_mark(*c))
    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
    .collect();
  slug.truncate(MAX_SLUG_LEN);
  slug
}

fn is_slug(s: &str) -> bool {
  !s.is_empty() && s.len() <= MAX_SLUG_LEN && s.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// One dialogue turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub text: String,
  pub sender: String,
}

/// Multiple-choice comprehension question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
  pub question: String,
  pub options: Vec<String>,
  #[serde(rename = "correctAnswer")]
  pub correct_answer: i64,
}

/// The unit of generated content, identical in shape for every tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryContent {
  pub title: String,
  pub messages: Vec<Message>,
  pub questions: Vec<Question>,
}

pub const QUESTION_COUNT: usize = 3;
pub const OPTION_COUNT: usize = 4;

impl StoryContent {
  /// Check the shape invariants for a story generated at `level`.
  pub fn validate(&self, level: Level) -> Result<(), String> {
    if self.title.trim().is_empty() {
      return Err("title is empty".into());
    }
    if self.messages.len() < level.min_turns() {
      return Err(format!(
        "expected at least {} messages for {level}, got {}",
        level.min_turns(),
        self.messages.len()
      ));
    }
    if let Some(i) = self
      .messages
      .iter()
      .position(|m| m.text.trim().is_empty() || m.sender.trim().is_empty())
    {
      return Err(format!("message {i} has an empty text or sender"));
    }
    if self.questions.len() != QUESTION_COUNT {
      return Err(format!("expected {QUESTION_COUNT} questions, got {}", self.questions.len()));
    }
    for (i, q) in self.questions.iter().enumerate() {
      if q.question.trim().is_empty() {
        return Err(format!("question {i} is empty"));
      }
      if q.options.len() != OPTION_COUNT {
        return Err(format!("question {i}: expected {OPTION_COUNT} options, got {}", q.options.len()));
      }
      if q.correct_answer < 0 || q.correct_answer as usize >= q.options.len() {
        return Err(format!("question {i}: correctAnswer {} out of range", q.correct_answer));
      }
    }
    Ok(())
  }
}

/// `<YYYYMMDD>-<language>-<level>`, the provider-facing key of one batch request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompositeId {
  pub date: NaiveDate,
  pub language: String,
  pub level: Level,
}

impl CompositeId {
  pub fn new(date: NaiveDate, language: &str, level: Level) -> Self {
    Self { date, language: language_slug(language), level }
  }
}

impl fmt::Display for CompositeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{:04}{:02}{:02}-{}-{}",
      self.date.year(),
      self.date.month(),
      self.date.day(),
      self.language,
      self.level.slug()
    )
  }
}

impl FromStr for CompositeId {
  type Err = InvalidIdentifier;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || InvalidIdentifier(s.to_string());
    let parts: Vec<&str> = s.split('-').collect();
    let [date, language, level] = parts.as_slice() else {
      return Err(invalid());
    };
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
      return Err(invalid());
    }
    if !is_slug(language) || *level != level.to_lowercase() {
      return Err(invalid());
    }
    let date = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| invalid())?;
    let level = level.parse::<Level>().map_err(|_| invalid())?;
    Ok(Self { date, language: language.to_string(), level })
  }
}

/// Valid story fixture with `turns` alternating messages.
#[cfg(test)]
pub(crate) fn sample_story(turns: usize) -> StoryContent {
  StoryContent {
    title: "En el mercado".into(),
    messages: (0..turns)
      .map(|i| Message {
        text: format!("Frase número {i}"),
        sender: if i % 2 == 0 { "Ana".into() } else { "Luis".into() },
      })
      .collect(),
    questions: (0..3)
      .map(|i| Question {
        question: format!("Question {i}?"),
        options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        correct_answer: i,
      })
      .collect(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn level_parsing_is_case_insensitive() {
    assert_eq!("a1".parse::<Level>().unwrap(), Level::A1);
    assert_eq!("B2".parse::<Level>().unwrap(), Level::B2);
    assert!("c1".parse::<Level>().is_err());
  }

  #[test]
  fn composite_id_formats_and_parses() {
    let date = NaiveDate::from_ymd_opt(2025, 11, 4).unwrap();
    let id = CompositeId::new(date, "Spanish", Level::A1);
    assert_eq!(id.to_string(), "20251104-spanish-a1");
    assert_eq!("20251104-spanish-a1".parse::<CompositeId>().unwrap(), id);
  }

  #[test]
  fn language_slug_is_ascii_and_separator_free() {
    assert_eq!(language_slug("Spanish"), "spanish");
    assert_eq!(language_slug(" Português "), "portugues");
    assert_eq!(language_slug("Serbo-Croatian"), "serbo_croatian");
    assert_eq!(language_slug("Brazilian Portuguese"), "brazilian_portuguese");
    assert_eq!(language_slug(&"x".repeat(80)).len(), 52);
  }

  #[test]
  fn composite_id_round_trips_hyphenated_and_accented_languages() {
    let date = NaiveDate::from_ymd_opt(2025, 11, 4).unwrap();
    for language in ["Serbo-Croatian", "Português", "Français", "Ελληνικά"] {
      let id = CompositeId::new(date, language, Level::A1);
      let rendered = id.to_string();
      assert!(rendered.len() <= 64, "{rendered}");
      assert!(
        rendered.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-'),
        "{rendered}"
      );
      assert_eq!(rendered.parse::<CompositeId>().unwrap(), id);
      assert_eq!(language_slug(&id.language), id.language);
    }
  }

  #[test]
  fn composite_id_rejects_malformed_shapes() {
    for bad in [
      "",
      "2025114-spanish-a1",
      "20251104-spanish",
      "20251104-spanish-a1-extra",
      "20251304-spanish-a1",
      "20251104--a1",
      "20251104-Spanish-a1",
      "20251104-spanish-A1",
      "20251104-portugués-a1",
      "20251104-spanish-c1",
      "2025ab04-spanish-a1",
    ] {
      assert!(bad.parse::<CompositeId>().is_err(), "accepted {bad:?}");
    }
  }

  #[test]
  fn validate_accepts_well_formed_story() {
    assert!(sample_story(10).validate(Level::A1).is_ok());
    assert!(sample_story(12).validate(Level::B2).is_ok());
  }

  #[test]
  fn validate_enforces_turns_questions_and_answers() {
    assert!(sample_story(9).validate(Level::A1).is_err());
    assert!(sample_story(11).validate(Level::B2).is_err());

    let mut s = sample_story(10);
    s.questions.pop();
    assert!(s.validate(Level::A1).is_err());

    let mut s = sample_story(10);
    s.questions[1].options.push("e".into());
    assert!(s.validate(Level::A1).is_err());

    let mut s = sample_story(10);
    s.questions[2].correct_answer = 4;
    assert!(s.validate(Level::A1).is_err());

    let mut s = sample_story(10);
    s.questions[0].correct_answer = -1;
    assert!(s.validate(Level::A1).is_err());
  }

  #[test]
  fn story_json_uses_correct_answer_camel_case() {
    let json = serde_json::to_value(sample_story(10)).unwrap();
    assert!(json["questions"][0].get("correctAnswer").is_some());
  }
}
