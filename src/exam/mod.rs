#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::types::QUESTION_COUNT;

/// Built-in question sets, by name.
const BUILTIN_SETS: [(&str, &str); 2] = [
    ("el-nino", include_str!("sets/el_nino.json")),
    ("gas-kinetics", include_str!("sets/gas_kinetics.json")),
];

/// Name of the question set used when none is configured.
pub const DEFAULT_SET: &str = "el-nino";

/// One fixed short-answer question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    /// Ordinal, 1-based.
    pub index:     usize,
    /// Text shown to the student.
    pub prompt:    String,
    /// Teacher-authored grading criterion.
    pub guideline: String,
}

/// A three-question exercise with its grading persona and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    /// Short identifier, e.g. `el-nino`.
    pub name:                  String,
    /// Title shown above the form.
    pub title:                 String,
    /// Topic line embedded into every grading prompt.
    pub topic:                 String,
    /// System message establishing the teacher persona.
    pub system_message:        String,
    /// Model used unless overridden through the environment.
    pub model:                 String,
    /// Optional bound on completion length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    /// The questions, in order.
    pub questions:             [Question; QUESTION_COUNT],
}

impl QuestionSet {
    /// Parses and validates a question set from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let set: QuestionSet =
            serde_json::from_str(json).context("Could not parse question set JSON")?;
        set.validate()?;
        Ok(set)
    }

    /// Returns one of the sets compiled into the binary.
    pub fn builtin(name: &str) -> Result<Self> {
        let (_, json) = BUILTIN_SETS
            .iter()
            .find(|(n, _)| *n == name)
            .with_context(|| {
                format!(
                    "Unknown question set `{name}` (available: {})",
                    BUILTIN_SETS.map(|(n, _)| n).join(", ")
                )
            })?;
        Self::from_json(json)
    }

    /// Resolves a built-in set name, or failing that, a path to a JSON file.
    pub fn load(name_or_path: &str) -> Result<Self> {
        if BUILTIN_SETS.iter().any(|(n, _)| *n == name_or_path) {
            return Self::builtin(name_or_path);
        }

        let path = Path::new(name_or_path);
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read question set {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid question set {}", path.display()))
    }

    /// Names of the built-in sets.
    pub fn builtin_names() -> Vec<&'static str> {
        BUILTIN_SETS.iter().map(|(n, _)| *n).collect()
    }

    /// Guideline texts in question order.
    pub fn guidelines(&self) -> [String; QUESTION_COUNT] {
        self.questions.clone().map(|q| q.guideline)
    }

    /// Checks that questions are numbered 1..=3 in order and carry text.
    fn validate(&self) -> Result<()> {
        for (i, q) in self.questions.iter().enumerate() {
            ensure!(
                q.index == i + 1,
                "Question set `{}`: question at position {} has index {}",
                self.name,
                i + 1,
                q.index
            );
            ensure!(
                !q.prompt.trim().is_empty() && !q.guideline.trim().is_empty(),
                "Question set `{}`: question {} needs a prompt and a guideline",
                self.name,
                q.index
            );
        }
        ensure!(!self.model.trim().is_empty(), "Question set `{}` has no model", self.name);
        Ok(())
    }
}
