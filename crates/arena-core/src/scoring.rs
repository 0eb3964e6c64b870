//! Rubric-based text scorer.
//!
//! Scoring is pure marker counting over the lower-cased response:
//! single-token markers match on word boundaries, multi-word markers match
//! as substrings. Each criterion maps its match count onto `1..=10`, the
//! weighted mean is taken, round bonuses are added and the result is
//! rounded to one decimal and capped at 10.

use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::{ArenaError, Result};
use crate::domain::round::{CriterionScore, RoundResult};
use crate::domain::rubric::{Rubric, MAX_SCORE};

/// Bonus per round after the first.
pub const PROGRESSION_STEP: f64 = 0.2;
/// Bonus for a detected kill-off.
pub const KILL_OFF_BONUS: f64 = 0.5;
/// Word threshold for [`ProgressionPolicy::LengthGated`] when none is configured.
pub const DEFAULT_PROGRESSION_MIN_WORDS: usize = 50;

/// When the round-progression bonus applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ProgressionPolicy {
    /// Every round after the first earns the bonus.
    #[default]
    Unconditional,
    /// Only responses longer than `min_words` earn the bonus.
    LengthGated { min_words: usize },
}

impl ProgressionPolicy {
    /// Bonus for a 1-based round given the response's word count.
    pub fn bonus(&self, round: u32, word_count: usize) -> f64 {
        if round <= 1 {
            return 0.0;
        }
        let eligible = match self {
            ProgressionPolicy::Unconditional => true,
            ProgressionPolicy::LengthGated { min_words } => word_count > *min_words,
        };
        if eligible {
            PROGRESSION_STEP * f64::from(round - 1)
        } else {
            0.0
        }
    }
}

impl FromStr for ProgressionPolicy {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unconditional" => Ok(ProgressionPolicy::Unconditional),
            "length_gated" => Ok(ProgressionPolicy::LengthGated {
                min_words: DEFAULT_PROGRESSION_MIN_WORDS,
            }),
            other => Err(ArenaError::InvalidConfig(format!(
                "unknown progression policy: {other}"
            ))),
        }
    }
}

enum MarkerMatcher {
    Word { marker: String, pattern: Regex },
    Phrase { marker: String },
}

impl MarkerMatcher {
    fn compile(marker: &str) -> Result<Self> {
        if marker.contains(' ') {
            return Ok(MarkerMatcher::Phrase {
                marker: marker.to_string(),
            });
        }
        // \b only makes sense next to a word character.
        let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
        let lead = if is_word(marker.chars().next()) { r"\b" } else { "" };
        let trail = if is_word(marker.chars().last()) { r"\b" } else { "" };
        let pattern = Regex::new(&format!("{lead}{}{trail}", regex::escape(marker)))
            .map_err(|e| ArenaError::InvalidRubric(format!("marker {marker:?}: {e}")))?;
        Ok(MarkerMatcher::Word {
            marker: marker.to_string(),
            pattern,
        })
    }

    fn marker(&self) -> &str {
        match self {
            MarkerMatcher::Word { marker, .. } | MarkerMatcher::Phrase { marker } => marker,
        }
    }

    fn count(&self, lowered: &str) -> u32 {
        let n = match self {
            MarkerMatcher::Word { pattern, .. } => pattern.find_iter(lowered).count(),
            MarkerMatcher::Phrase { marker } => lowered.matches(marker.as_str()).count(),
        };
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

struct CriterionMatcher {
    name: String,
    weight: f64,
    expected: u32,
    markers: Vec<MarkerMatcher>,
}

/// Map a raw match count onto `1..=10`.
pub fn normalize_score(raw_match_count: u32, expected_markers: u32) -> u8 {
    let expected = f64::from(expected_markers.max(1));
    let scaled = (f64::from(raw_match_count) / expected * 9.0).round() + 1.0;
    scaled.clamp(1.0, MAX_SCORE) as u8
}

fn round_tenth(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Scores single responses against a fixed rubric.
pub struct TextScorer {
    rubric: Rubric,
    criteria: Vec<CriterionMatcher>,
    total_weight: f64,
    progression: ProgressionPolicy,
}

impl TextScorer {
    /// Compile the rubric's markers once.
    pub fn new(rubric: Rubric, progression: ProgressionPolicy) -> Result<Self> {
        let criteria = rubric
            .criteria
            .iter()
            .map(|c| {
                Ok(CriterionMatcher {
                    name: c.name.clone(),
                    weight: c.weight,
                    expected: c.expected_markers(),
                    markers: c
                        .markers
                        .iter()
                        .map(|m| MarkerMatcher::compile(m))
                        .collect::<Result<Vec<_>>>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let total_weight = rubric.total_weight();
        if total_weight.is_nan() || total_weight <= 0.0 {
            return Err(ArenaError::InvalidRubric(
                "total weight must be positive".to_string(),
            ));
        }

        Ok(Self {
            rubric,
            criteria,
            total_weight,
            progression,
        })
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    pub fn progression(&self) -> ProgressionPolicy {
        self.progression
    }

    /// Score one response for a 1-based round. Never fails; empty text
    /// scores the floor on every criterion.
    pub fn score(&self, text: &str, round: u32, total_rounds: u32) -> RoundResult {
        let round = round.max(1);
        let lowered = text.to_lowercase();

        let mut weighted_sum = 0.0;
        let criteria: Vec<CriterionScore> = self
            .criteria
            .iter()
            .map(|criterion| {
                let mut raw = 0u32;
                let mut matched = Vec::new();
                for matcher in &criterion.markers {
                    let n = matcher.count(&lowered);
                    if n > 0 {
                        raw = raw.saturating_add(n);
                        if !matched.iter().any(|m: &String| m == matcher.marker()) {
                            matched.push(matcher.marker().to_string());
                        }
                    }
                }
                let normalized = normalize_score(raw, criterion.expected);
                weighted_sum += f64::from(normalized) * criterion.weight;
                CriterionScore {
                    criterion: criterion.name.clone(),
                    normalized_score: normalized,
                    raw_match_count: raw,
                    matched_markers: matched,
                }
            })
            .collect();

        let weighted_score = weighted_sum / self.total_weight;
        let word_count = text.split_whitespace().count();
        let progression_bonus = self.progression.bonus(round, word_count);
        let has_kill_off = self
            .rubric
            .kill_off_phrases
            .iter()
            .any(|p| lowered.contains(p.as_str()));
        let kill_off_bonus = if has_kill_off { KILL_OFF_BONUS } else { 0.0 };

        let uncapped_score = round_tenth(weighted_score + progression_bonus + kill_off_bonus);

        RoundResult {
            round,
            total_rounds,
            criteria,
            weighted_score,
            progression_bonus,
            kill_off_bonus,
            uncapped_score,
            total_score: uncapped_score.min(MAX_SCORE),
            word_count,
            char_count: text.chars().count(),
            has_kill_off,
        }
    }
}

impl std::fmt::Debug for TextScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextScorer")
            .field("criteria", &self.criteria.len())
            .field("progression", &self.progression)
            .finish()
    }
}
