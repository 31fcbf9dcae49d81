//! Turning a batch outcome into a validated `StoryContent`.
//!
//! The strategy is picked from the shape of the response itself:
//! - a `tool_use` block means the provider already produced schema-shaped
//!   input, which is deserialized directly;
//! - otherwise the first `text` block is cleaned with `clean_json_text` and parsed.
//!
//! Both paths end in `StoryContent::validate`.

use serde_json::Value;
use tracing::debug;

use crate::batch::{ContentBlock, OutcomeResult, ProviderMessage};
use crate::domain::{Level, StoryContent};
use crate::error::ExtractionError;
use crate::prompts::STORY_TOOL_NAME;
use crate::util::trunc_for_log;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionStrategy {
  StructuredCall,
  FreeText,
}

impl ExtractionStrategy {
  /// Decide from the message content; `None` when nothing usable is present.
  pub fn detect(message: &ProviderMessage) -> Option<Self> {
    let has_tool = message.content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }));
    if has_tool {
      return Some(ExtractionStrategy::StructuredCall);
    }
    let has_text = message
      .content
      .iter()
      .any(|b| matches!(b, ContentBlock::Text { text } if !text.trim().is_empty()));
    has_text.then_some(ExtractionStrategy::FreeText)
  }

  fn parse(self, message: &ProviderMessage) -> Result<StoryContent, ExtractionError> {
    match self {
      ExtractionStrategy::StructuredCall => {
        let (name, input) = message
          .content
          .iter()
          .find_map(|b| match b {
            ContentBlock::ToolUse { name, input, .. } => Some((name, input)),
            _ => None,
          })
          .ok_or(ExtractionError::MissingPayload)?;
        if name != STORY_TOOL_NAME {
          return Err(ExtractionError::UnexpectedTool(name.clone()));
        }
        if !input.is_object() {
          return Err(ExtractionError::MissingPayload);
        }
        Ok(serde_json::from_value::<StoryContent>(input.clone())?)
      }
      ExtractionStrategy::FreeText => {
        let text: String = message
          .content
          .iter()
          .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
          })
          .collect::<Vec<_>>()
          .join("\n");
        let cleaned = clean_json_text(&text);
        debug!(target: "story", preview = %trunc_for_log(&cleaned, 200), "Parsing cleaned free-text payload");
        let value: Value = serde_json::from_str(&cleaned)?;
        Ok(serde_json::from_value::<StoryContent>(value)?)
      }
    }
  }
}

/// Extract and validate the story carried by one outcome.
pub fn extract(result: &OutcomeResult, level: Level) -> Result<StoryContent, ExtractionError> {
  let message = match result {
    OutcomeResult::Succeeded(message) => message,
    OutcomeResult::Errored(detail) => {
      return Err(ExtractionError::NotSucceeded { kind: "errored".into(), detail: detail.clone() })
    }
    OutcomeResult::Other(kind) => {
      return Err(ExtractionError::NotSucceeded { kind: kind.clone(), detail: String::new() })
    }
  };
  let strategy = ExtractionStrategy::detect(message).ok_or(ExtractionError::MissingPayload)?;
  let story = strategy.parse(message)?;
  story.validate(level).map_err(ExtractionError::Invalid)?;
  Ok(story)
}

const DOUBLE_QUOTES: &[char] = &['\u{201C}', '\u{201D}', '\u{201E}', '\u{201F}', '\u{00AB}', '\u{00BB}', '\u{301D}', '\u{301E}', '\u{FF02}'];
const SINGLE_QUOTES: &[char] = &['\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}'];

/// Defensive textual cleanup of model-written JSON. Idempotent.
///
/// Steps: drop code-fence lines, keep the outermost `{ ... }`, normalize
/// typographic quotes, escape stray quotes inside strings (line by line),
/// drop commas right before `}` / `]`.
pub fn clean_json_text(raw: &str) -> String {
  let unfenced = strip_code_fences(raw);
  let sliced = outer_object(&unfenced);
  let normalized = normalize_quotes(sliced);
  let escaped = normalized.split('\n').map(escape_inner_quotes).collect::<Vec<_>>().join("\n");
  strip_trailing_commas(&escaped).trim().to_string()
}

fn strip_code_fences(s: &str) -> String {
  s.split('\n')
    .filter(|line| !line.trim().starts_with("```"))
    .collect::<Vec<_>>()
    .join("\n")
    .trim()
    .to_string()
}

fn outer_object(s: &str) -> &str {
  match (s.find('{'), s.rfind('}')) {
    (Some(start), Some(end)) if end > start => &s[start..=end],
    _ => s,
  }
}

fn normalize_quotes(s: &str) -> String {
  s.chars()
    .map(|c| {
      if DOUBLE_QUOTES.contains(&c) {
        '"'
      } else if SINGLE_QUOTES.contains(&c) {
        '\''
      } else {
        c
      }
    })
    .collect()
}

fn starts_with_literal(s: &str) -> bool {
  ["true", "false", "null"].iter().any(|lit| {
    s.strip_prefix(lit)
      .map(|rest| !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
      .unwrap_or(false)
  })
}

/// Does a quote followed by `rest` close the current string?
fn closes_string(rest: &str) -> bool {
  let r = rest.trim_start();
  let Some(first) = r.chars().next() else {
    return true;
  };
  match first {
    ':' | '}' | ']' => true,
    ',' => {
      let after = r[1..].trim_start();
      match after.chars().next() {
        None => true,
        Some(c) => matches!(c, '"' | '{' | '[' | ']' | '}' | '-') || c.is_ascii_digit() || starts_with_literal(after),
      }
    }
    _ => false,
  }
}

fn escape_inner_quotes(line: &str) -> String {
  let mut out = String::with_capacity(line.len() + 8);
  let mut in_string = false;
  let mut chars = line.char_indices().peekable();
  while let Some((i, c)) = chars.next() {
    if !in_string {
      if c == '"' {
        in_string = true;
      }
      out.push(c);
      continue;
    }
    match c {
      '\\' => {
        out.push(c);
        if let Some((_, escaped)) = chars.next() {
          out.push(escaped);
        }
      }
      '"' => {
        if closes_string(&line[i + 1..]) {
          in_string = false;
          out.push('"');
        } else {
          out.push_str("\\\"");
        }
      }
      _ => out.push(c),
    }
  }
  out
}

/// Remove every comma whose next non-space, non-comma character is `}` or `]`.
fn strip_trailing_commas(s: &str) -> String {
  let chars: Vec<char> = s.chars().collect();
  let mut out = String::with_capacity(s.len());
  for (i, &c) in chars.iter().enumerate() {
    if c == ',' {
      let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace() && **ch != ',');
      if matches!(next, Some('}') | Some(']')) {
        continue;
      }
    }
    out.push(c);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::sample_story;
  use proptest::prelude::*;
  use serde_json::json;

  fn tool_message(input: Value) -> OutcomeResult {
    OutcomeResult::Succeeded(ProviderMessage {
      content: vec![ContentBlock::ToolUse { id: "t".into(), name: STORY_TOOL_NAME.into(), input }],
      stop_reason: Some("tool_use".into()),
    })
  }

  fn text_message(text: &str) -> OutcomeResult {
    OutcomeResult::Succeeded(ProviderMessage {
      content: vec![ContentBlock::Text { text: text.into() }],
      stop_reason: Some("end_turn".into()),
    })
  }

  const MESSY: &str = "Here you go:\n```json\n{\n  \u{201C}title\u{201D}: \u{201C}El mercado\u{201D},\n  \"messages\": [\n    {\"text\": \"Ella dijo \"hola\" y se fue\", \"sender\": \"Ana\"},\n    {\"text\": \"\u{00AB}Vale\u{00BB}, dijo.\", \"sender\": \"Luis\"},\n  ],\n  \"questions\": [],\n}\n```";

  #[test]
  fn cleans_fenced_smart_quoted_json_with_trailing_commas() {
    let cleaned = clean_json_text(MESSY);
    let v: Value = serde_json::from_str(&cleaned).expect("parseable");
    assert_eq!(v["title"], "El mercado");
    assert_eq!(v["messages"][0]["text"], "Ella dijo \"hola\" y se fue");
    assert_eq!(v["messages"][1]["text"], "\"Vale\", dijo.");
    assert_eq!(clean_json_text(&cleaned), cleaned);
  }

  #[test]
  fn clean_json_is_a_no_op() {
    let s = serde_json::to_string_pretty(&sample_story(10)).unwrap();
    assert_eq!(clean_json_text(&s), s);
  }

  #[test]
  fn structured_call_is_preferred_and_validated() {
    let input = serde_json::to_value(sample_story(10)).unwrap();
    let story = extract(&tool_message(input), Level::A1).unwrap();
    assert_eq!(story.messages.len(), 10);
  }

  #[test]
  fn detect_picks_strategy_from_shape() {
    let OutcomeResult::Succeeded(m) = text_message("{}") else { unreachable!() };
    assert_eq!(ExtractionStrategy::detect(&m), Some(ExtractionStrategy::FreeText));
    let OutcomeResult::Succeeded(m) = tool_message(json!({})) else { unreachable!() };
    assert_eq!(ExtractionStrategy::detect(&m), Some(ExtractionStrategy::StructuredCall));
    assert_eq!(ExtractionStrategy::detect(&ProviderMessage::default()), None);
  }

  #[test]
  fn free_text_story_is_extracted() {
    let body = serde_json::to_string_pretty(&sample_story(12)).unwrap();
    let fenced = format!("```json\n{}\n```", body.replace("\"Question 0?\"", "\u{201C}Question 0?\u{201D}"));
    let story = extract(&text_message(&fenced), Level::B2).unwrap();
    assert_eq!(story.questions[0].question, "Question 0?");
  }

  #[test]
  fn wrong_tool_and_failed_outcomes_are_rejected() {
    let wrong = OutcomeResult::Succeeded(ProviderMessage {
      content: vec![ContentBlock::ToolUse { id: "t".into(), name: "other".into(), input: json!({}) }],
      stop_reason: None,
    });
    assert!(matches!(extract(&wrong, Level::A1), Err(ExtractionError::UnexpectedTool(_))));
    assert!(matches!(
      extract(&OutcomeResult::Errored("boom".into()), Level::A1),
      Err(ExtractionError::NotSucceeded { .. })
    ));
    assert!(matches!(
      extract(&OutcomeResult::Other("expired".into()), Level::A1),
      Err(ExtractionError::NotSucceeded { .. })
    ));
    assert!(matches!(
      extract(&text_message("no json here"), Level::A1),
      Err(ExtractionError::Json(_))
    ));
  }

  /// Ways of breaking an otherwise valid story.
  fn malformed_story() -> impl Strategy<Value = Value> {
    let base = serde_json::to_value(sample_story(10)).unwrap();
    (0usize..8, 0usize..3, 4i64..100).prop_map(move |(kind, qi, n)| {
      let mut v = base.clone();
      match kind {
        0 => { v["questions"].as_array_mut().unwrap().truncate(qi); }
        1 => {
          let first = v["questions"][0].clone();
          v["questions"].as_array_mut().unwrap().push(first);
        }
        2 => { v["questions"][qi]["options"].as_array_mut().unwrap().truncate((n % 4) as usize); }
        3 => { v["questions"][qi]["options"].as_array_mut().unwrap().push(json!("extra")); }
        4 => { v["questions"][qi]["correctAnswer"] = json!(n); }
        5 => { v["questions"][qi]["correctAnswer"] = json!(-n); }
        6 => { v["messages"].as_array_mut().unwrap().truncate((n % 10) as usize); }
        _ => { v.as_object_mut().unwrap().remove("questions"); }
      }
      v
    })
  }

  proptest! {
    #[test]
    fn malformed_payloads_are_rejected(v in malformed_story()) {
      prop_assert!(extract(&tool_message(v.clone()), Level::A1).is_err());
      let text = serde_json::to_string(&v).unwrap();
      prop_assert!(extract(&text_message(&text), Level::A1).is_err());
    }

    #[test]
    fn cleaning_is_idempotent(x in proptest::collection::vec(
      prop_oneof![
        Just("{"), Just("}"), Just("["), Just("]"), Just("\""), Just(","), Just(":"),
        Just("\\"), Just(" "), Just("\n"), Just("\t"), Just("a"), Just("b"), Just("1"),
        Just("-"), Just("`"), Just("true"), Just("null"), Just("```json\n"), Just("```"),
        Just("\u{201C}"), Just("\u{201D}"), Just("\u{00AB}"), Just("\u{2019}"),
      ],
      0..40,
    )) {
      let x: String = x.concat();
      let once = clean_json_text(&x);
      prop_assert_eq!(clean_json_text(&once), once);
    }
  }
}
