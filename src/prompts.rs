//! Prompt and output-schema construction, one template per tier.
//!
//! Templates are filled with `util::fill_template`; placeholders are
//! `{language}`, `{theme_line}`, `{question_language}`, `{min_turns}` and
//! `{max_turns}`.

use serde_json::{json, Value};

use crate::domain::{Level, OPTION_COUNT, QUESTION_COUNT};
use crate::util::fill_template;

/// Name of the single tool the provider is forced to call in structured mode.
pub const STORY_TOOL_NAME: &str = "record_story";

const A1_TEMPLATE: &str = r#"
Write a short dialogue in {language} for absolute beginners (CEFR A1).
{theme_line}
Rules:
- Between {min_turns} and {max_turns} short, alternating turns between two named speakers.
- Present tense only, very common everyday vocabulary, sentences of at most 8 words.
- No idioms, no slang, no subordinate clauses.
- Give the dialogue a simple title in {language}.
Then write exactly 3 multiple-choice comprehension questions in {question_language}, each with exactly 4 options and exactly one correct answer (index 0-3).
"#;

const A2_TEMPLATE: &str = r#"
Write a dialogue in {language} for elementary learners (CEFR A2).
{theme_line}
Rules:
- Between {min_turns} and {max_turns} alternating turns between two or three named speakers.
- Present, simple past and near future; everyday vocabulary with a few new words a learner can guess from context.
- Sentences of at most 12 words; simple connectors (and, but, because, then).
- Give the dialogue a title in {language}.
Then write exactly 3 multiple-choice comprehension questions in {question_language}, each with exactly 4 options and exactly one correct answer (index 0-3).
"#;

const B1_TEMPLATE: &str = r#"
Write a natural conversation in {language} for intermediate learners (CEFR B1).
{theme_line}
Rules:
- Between {min_turns} and {max_turns} turns between two or three named speakers with distinct opinions.
- Mix of tenses, including conditionals; speakers explain reasons and react to each other.
- Use a few common expressions, but keep the meaning clear from context.
- Give the conversation a title in {language}.
Then write exactly 3 multiple-choice comprehension questions in {question_language}, each with exactly 4 options and exactly one correct answer (index 0-3). Questions should test understanding of opinions and reasons, not just facts.
"#;

const B2_TEMPLATE: &str = r#"
Write a rich, idiomatic conversation in {language} for upper-intermediate learners (CEFR B2).
{theme_line}
Rules:
- Between {min_turns} and {max_turns} turns between two to four named speakers.
- Natural register with idioms, nuance, hedging, irony and complex sentence structures (subjunctive, passive, reported speech where the language has them).
- Speakers should disagree, concede points and reach some conclusion.
- Give the conversation a title in {language}.
Then write exactly 3 multiple-choice comprehension questions in {question_language}, each with exactly 4 options and exactly one correct answer (index 0-3). Questions should require inference, not only literal recall.
"#;

fn template_for(level: Level) -> &'static str {
  match level {
    Level::A1 => A1_TEMPLATE,
    Level::A2 => A2_TEMPLATE,
    Level::B1 => B1_TEMPLATE,
    Level::B2 => B2_TEMPLATE,
  }
}

/// Language used for the quiz: English for A1/A2, the target language for B1/B2.
pub fn question_language(language: &str, level: Level) -> String {
  if level.questions_in_target_language() {
    language.to_string()
  } else {
    "English".to_string()
  }
}

/// Generation instructions for one (language, level, theme). An empty theme omits the topic line.
pub fn build_prompt(language: &str, level: Level, theme: &str) -> String {
  let theme_line = if theme.trim().is_empty() {
    String::new()
  } else {
    format!("Topic: {}.", theme.trim())
  };
  let min_turns = level.min_turns().to_string();
  let max_turns = level.max_turns().to_string();
  let qlang = question_language(language, level);
  let filled = fill_template(
    template_for(level),
    &[
      ("language", language),
      ("theme_line", &theme_line),
      ("question_language", &qlang),
      ("min_turns", &min_turns),
      ("max_turns", &max_turns),
    ],
  );
  filled
    .lines()
    .filter(|l| !l.trim().is_empty())
    .collect::<Vec<_>>()
    .join("\n")
}

/// JSON Schema the provider output must satisfy.
pub fn build_output_schema(language: &str, level: Level) -> Value {
  let qlang = question_language(language, level);
  json!({
    "type": "object",
    "properties": {
      "title": {
        "type": "string",
        "description": format!("Title of the dialogue in {language}")
      },
      "messages": {
        "type": "array",
        "minItems": level.min_turns(),
        "description": "Dialogue turns in order",
        "items": {
          "type": "object",
          "properties": {
            "text": { "type": "string", "description": format!("What the speaker says, in {language}") },
            "sender": { "type": "string", "description": "Name of the speaker" }
          },
          "required": ["text", "sender"]
        }
      },
      "questions": {
        "type": "array",
        "minItems": QUESTION_COUNT,
        "maxItems": QUESTION_COUNT,
        "items": {
          "type": "object",
          "properties": {
            "question": { "type": "string", "description": format!("Question text in {qlang}") },
            "options": {
              "type": "array",
              "minItems": OPTION_COUNT,
              "maxItems": OPTION_COUNT,
              "items": { "type": "string" }
            },
            "correctAnswer": {
              "type": "integer",
              "minimum": 0,
              "maximum": OPTION_COUNT - 1,
              "description": "Index of the correct option"
            }
          },
          "required": ["question", "options", "correctAnswer"]
        }
      }
    },
    "required": ["title", "messages", "questions"]
  })
}

/// Instructions appended to the prompt when the provider answers in plain text.
pub fn build_text_instructions(schema: &Value) -> String {
  let schema_json = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
  format!(
    "Respond ONLY with a single JSON object (no markdown, no commentary) that matches this JSON Schema:\n{schema_json}"
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn question_language_policy_is_fixed_per_tier() {
    assert_eq!(question_language("French", Level::A1), "English");
    assert_eq!(question_language("French", Level::A2), "English");
    assert_eq!(question_language("French", Level::B1), "French");
    assert_eq!(question_language("French", Level::B2), "French");
  }

  #[test]
  fn prompt_mentions_language_theme_and_turns() {
    let p = build_prompt("Spanish", Level::A1, "buying a train ticket");
    assert!(p.contains("Spanish"));
    assert!(p.contains("Topic: buying a train ticket."));
    assert!(p.contains("Between 10 and 12"));
    assert!(p.contains("questions in English"));
    assert!(!p.contains('{'));
  }

  #[test]
  fn each_tier_has_a_distinct_template() {
    let prompts: Vec<String> = Level::ALL.iter().map(|&l| build_prompt("German", l, "x")).collect();
    for i in 0..prompts.len() {
      for j in (i + 1)..prompts.len() {
        assert_ne!(prompts[i], prompts[j]);
      }
    }
    assert!(prompts[3].contains("questions in German"));
  }

  #[test]
  fn empty_theme_drops_topic_line() {
    let p = build_prompt("Italian", Level::B1, "");
    assert!(!p.contains("Topic:"));
  }

  #[test]
  fn schema_pins_question_and_option_counts() {
    let s = build_output_schema("Spanish", Level::B2);
    assert_eq!(s["properties"]["messages"]["minItems"], 12);
    let q = &s["properties"]["questions"];
    assert_eq!(q["minItems"], 3);
    assert_eq!(q["maxItems"], 3);
    let item = &q["items"]["properties"];
    assert_eq!(item["options"]["minItems"], 4);
    assert_eq!(item["options"]["maxItems"], 4);
    assert_eq!(item["correctAnswer"]["minimum"], 0);
    assert_eq!(item["correctAnswer"]["maximum"], 3);
    assert_eq!(build_output_schema("Spanish", Level::A1)["properties"]["messages"]["minItems"], 10);
  }
}
