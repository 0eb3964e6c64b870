//! Battle formats and the format registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::{ArenaError, Result};

/// A battle format: how many rounds and what each round asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleFormat {
    pub id: String,
    pub name: String,
    pub round_count: u32,
    /// Prompt templates, one per round. Reused cyclically when shorter than `round_count`.
    #[serde(default)]
    pub prompts: Vec<String>,
}

impl BattleFormat {
    pub fn new(id: &str, name: &str, round_count: u32, prompts: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            round_count,
            prompts: prompts.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Prompt for a 1-based round, if the format has any prompts.
    pub fn prompt_for(&self, round: u32) -> Option<&str> {
        if self.prompts.is_empty() || round == 0 {
            return None;
        }
        let idx = (round as usize - 1) % self.prompts.len();
        Some(self.prompts[idx].as_str())
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ArenaError::InvalidFormat("format id must not be empty".to_string()));
        }
        if self.round_count == 0 {
            return Err(ArenaError::InvalidFormat(format!(
                "format {} must have at least one round",
                self.id
            )));
        }
        Ok(())
    }
}

/// Format id → format lookup.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: BTreeMap<String, BattleFormat>,
}

impl FormatRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            formats: BTreeMap::new(),
        }
    }

    /// Add or replace a format.
    pub fn register(&mut self, format: BattleFormat) -> Result<()> {
        format.validate()?;
        self.formats.insert(format.id.clone(), format);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&BattleFormat> {
        self.formats
            .get(id)
            .ok_or_else(|| ArenaError::UnknownFormat(id.to_string()))
    }

    /// All formats ordered by id.
    pub fn list(&self) -> impl Iterator<Item = &BattleFormat> {
        self.formats.values()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let builtin = [
            BattleFormat::new(
                "freestyle",
                "Freestyle",
                2,
                &["Open with your signature style.", "Answer what you just saw."],
            ),
            BattleFormat::new(
                "debate",
                "Debate",
                3,
                &[
                    "State your position.",
                    "Rebut your opponent.",
                    "Close the argument.",
                ],
            ),
            BattleFormat::new(
                "storytelling",
                "Storytelling",
                3,
                &[
                    "Set the scene.",
                    "Raise the stakes.",
                    "Land the ending.",
                ],
            ),
            BattleFormat::new(
                "call_response",
                "Call & Response",
                4,
                &["Make the call.", "Respond to the call."],
            ),
        ];

        let formats = builtin
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();
        Self { formats }
    }
}
