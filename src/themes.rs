//! Deterministic daily theme selection.
//!
//! The seed is `year*10000 + month*100 + day`; each tier adds its tier number
//! and runs the sub-seed through `frac(sin(x) * 10000)`. Every language
//! generated for a date therefore shares the same topic per tier, and the
//! choice survives restarts.
//!
//! The lists and the formula must stay stable once deployed: editing either
//! reshuffles every future assignment.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::domain::Level;

const A1_THEMES: &[&str] = &[
  "ordering food at a café",
  "meeting a new neighbour",
  "buying fruit at the market",
  "asking for directions in town",
  "talking about family members",
  "describing the weather today",
  "shopping for clothes",
  "planning a weekend picnic",
  "a first day at a new school",
  "talking about favourite animals",
  "buying a train ticket",
  "choosing a birthday present",
  "cooking dinner together",
  "visiting the doctor with a cold",
  "describing a daily routine",
  "at the library",
  "a phone call with a friend",
  "looking for a lost cat",
  "at the post office",
  "talking about hobbies",
];

const A2_THEMES: &[&str] = &[
  "planning a birthday party",
  "booking a hotel room",
  "a problem with a restaurant order",
  "talking about last summer's holiday",
  "moving to a new apartment",
  "a visit to the dentist",
  "renting a bicycle in a new city",
  "organising a family dinner",
  "a job interview for a summer job",
  "returning a broken item to a shop",
  "making plans for a rainy day",
  "learning to cook a traditional dish",
  "a delayed flight at the airport",
  "joining a sports club",
  "choosing a film to watch",
  "helping a friend study for an exam",
  "a trip to the countryside",
  "buying a second-hand car",
  "celebrating a local festival",
  "talking about childhood memories",
];

const B1_THEMES: &[&str] = &[
  "deciding whether to change careers",
  "a disagreement between flatmates",
  "volunteering at an animal shelter",
  "planning a trip on a tight budget",
  "the pros and cons of working from home",
  "a misunderstanding at a family gathering",
  "starting a small online business",
  "reducing plastic waste at home",
  "preparing for a marathon",
  "living abroad for the first time",
  "a neighbourhood noise complaint",
  "choosing between two university offers",
  "organising a community clean-up",
  "a surprise visit from an old friend",
  "negotiating a rent increase",
  "the influence of social media on friendships",
  "learning a musical instrument as an adult",
  "a lost passport on holiday",
  "debating a new city bike lane",
  "caring for an elderly relative",
];

const B2_THEMES: &[&str] = &[
  "the ethics of artificial intelligence in hiring",
  "gentrification in a historic neighbourhood",
  "balancing ambition and personal wellbeing",
  "a heated debate about remote education",
  "the future of local journalism",
  "negotiating a business partnership",
  "tourism and its impact on small towns",
  "a dilemma about reporting a colleague",
  "the value of learning dead languages",
  "urban farming and food security",
  "generational differences in attitudes to work",
  "a documentary that changed someone's mind",
  "privacy in the age of smart devices",
  "the role of art in public spaces",
  "climate anxiety among young people",
  "a controversial decision at a town council meeting",
  "the four-day working week",
  "preserving regional dialects",
  "fast fashion and consumer responsibility",
  "a startup pitch that goes wrong",
];

/// Theme list for a tier.
pub fn themes_for(level: Level) -> &'static [&'static str] {
  match level {
    Level::A1 => A1_THEMES,
    Level::A2 => A2_THEMES,
    Level::B1 => B1_THEMES,
    Level::B2 => B2_THEMES,
  }
}

/// `year*10000 + month*100 + day`.
pub fn date_seed(date: NaiveDate) -> i64 {
  i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day())
}

/// Fractional part of `sin(seed) * 10000`, in [0, 1] (1.0 only through rounding).
fn pseudo_random(seed: i64) -> f64 {
  let x = (seed as f64).sin() * 10_000.0;
  x - x.floor()
}

/// Pick an index into a list of `len` items. `None` if the float lands on the edge.
fn pick_index(seed: i64, len: usize) -> Option<usize> {
  if len == 0 {
    return None;
  }
  let r = pseudo_random(seed);
  let idx = (r * len as f64).floor();
  if !(0.0..len as f64).contains(&idx) {
    return None;
  }
  Some(idx as usize)
}

/// Theme for one tier on `date`; empty string when no theme could be chosen.
pub fn theme_for(date: NaiveDate, level: Level) -> String {
  let list = themes_for(level);
  pick_index(date_seed(date) + i64::from(level.tier()), list.len())
    .and_then(|i| list.get(i))
    .map(|t| t.to_string())
    .unwrap_or_default()
}

/// Themes for every tier on `date`.
pub fn select_themes(date: NaiveDate) -> BTreeMap<Level, String> {
  Level::ALL.iter().map(|&level| (level, theme_for(date, level))).collect()
}
