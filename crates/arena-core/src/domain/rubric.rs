//! Scoring rubric: weighted criteria built from marker sets.
//!
//! A [`Rubric`] is an immutable value. It is built once (the built-in
//! default or a JSON file), validated, and then handed to the scorer.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::error::{ArenaError, Result};

/// Upper bound of every per-criterion score and of a round total.
pub const MAX_SCORE: f64 = 10.0;

/// Phrases that signal a decisive, round-ending moment.
pub const KILL_OFF_PHRASES: &[&str] = &[
    "kill-off",
    "kill off",
    "killoff",
    "unbeatable",
    "round over",
    "game over",
    "no comeback",
];

/// One weighted scoring dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Relative weight, strictly positive.
    pub weight: f64,
    /// Single tokens (whole-word match) and multi-word phrases (substring match).
    pub markers: Vec<String>,
}

impl Criterion {
    pub fn new(name: &str, description: &str, weight: f64, markers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            weight,
            markers: markers.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// `floor(0.4 × markers)`, never below 1.
    pub fn expected_markers(&self) -> u32 {
        ((self.markers.len() as f64 * 0.4).floor() as u32).max(1)
    }
}

/// The full set of criteria plus the kill-off phrase list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub criteria: Vec<Criterion>,
    #[serde(default = "default_kill_off_phrases")]
    pub kill_off_phrases: Vec<String>,
}

fn default_kill_off_phrases() -> Vec<String> {
    KILL_OFF_PHRASES.iter().map(|p| p.to_string()).collect()
}

impl Rubric {
    /// Build and validate a rubric. Markers and phrases are trimmed and lower-cased.
    pub fn new(criteria: Vec<Criterion>, kill_off_phrases: Vec<String>) -> Result<Self> {
        let rubric = Self {
            criteria,
            kill_off_phrases,
        }
        .normalized();
        rubric.validate()?;
        Ok(rubric)
    }

    /// Built-in rubric used when no rubric file is supplied.
    pub fn default_rubric() -> Self {
        let criteria = vec![
            Criterion::new(
                "technique",
                "Command of named moves and execution vocabulary",
                0.3,
                &[
                    "stomp",
                    "jab",
                    "chest pop",
                    "arm swing",
                    "buck",
                    "footwork",
                    "rhythm",
                    "combo",
                    "precision",
                    "freeze",
                ],
            ),
            Criterion::new(
                "creativity",
                "Original imagery, wordplay and surprising turns",
                0.25,
                &[
                    "original",
                    "metaphor",
                    "unexpected",
                    "twist",
                    "imagery",
                    "remix",
                    "wordplay",
                    "invent",
                    "fresh take",
                    "never seen",
                ],
            ),
            Criterion::new(
                "impact",
                "Energy and presence projected at the opponent and crowd",
                0.25,
                &[
                    "crowd",
                    "energy",
                    "hype",
                    "power",
                    "intensity",
                    "presence",
                    "dominate",
                    "fire",
                    "raw",
                    "all in",
                ],
            ),
            Criterion::new(
                "narrative",
                "Story arc, callbacks and direct responses to the opponent",
                0.2,
                &[
                    "story",
                    "journey",
                    "callback",
                    "respond",
                    "counter",
                    "answer",
                    "character",
                    "arc",
                    "earlier",
                    "you said",
                ],
            ),
        ];

        Self {
            criteria,
            kill_off_phrases: default_kill_off_phrases(),
        }
    }

    /// Load a rubric from a JSON file and validate it.
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let rubric: Rubric = serde_json::from_str(&raw)?;
        let rubric = rubric.normalized();
        rubric.validate()?;
        Ok(rubric)
    }

    /// Sum of all criterion weights. Positive for any validated rubric.
    pub fn total_weight(&self) -> f64 {
        self.criteria.iter().map(|c| c.weight).sum()
    }

    pub fn criterion(&self, name: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.name == name)
    }

    fn normalized(mut self) -> Self {
        for criterion in &mut self.criteria {
            for marker in &mut criterion.markers {
                *marker = marker.trim().to_lowercase();
            }
        }
        for phrase in &mut self.kill_off_phrases {
            *phrase = phrase.trim().to_lowercase();
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.criteria.is_empty() {
            return Err(ArenaError::InvalidRubric(
                "rubric must have at least one criterion".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for criterion in &self.criteria {
            if criterion.name.trim().is_empty() {
                return Err(ArenaError::InvalidRubric(
                    "criterion name must not be empty".to_string(),
                ));
            }
            if !names.insert(criterion.name.as_str()) {
                return Err(ArenaError::InvalidRubric(format!(
                    "duplicate criterion: {}",
                    criterion.name
                )));
            }
            if !criterion.weight.is_finite() || criterion.weight <= 0.0 {
                return Err(ArenaError::InvalidRubric(format!(
                    "criterion {} has non-positive weight {}",
                    criterion.name, criterion.weight
                )));
            }
            if criterion.markers.is_empty() {
                return Err(ArenaError::InvalidRubric(format!(
                    "criterion {} has no markers",
                    criterion.name
                )));
            }
            if criterion.markers.iter().any(|m| m.is_empty()) {
                return Err(ArenaError::InvalidRubric(format!(
                    "criterion {} has an empty marker",
                    criterion.name
                )));
            }
        }

        if self.kill_off_phrases.iter().any(|p| p.is_empty()) {
            return Err(ArenaError::InvalidRubric(
                "kill-off phrases must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Rubric {
    fn default() -> Self {
        Self::default_rubric()
    }
}
