#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Display;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::feedback::normalize;

/// Number of questions in every exercise. Record width depends on it.
pub const QUESTION_COUNT: usize = 3;

/// Pass/fail tag carried by a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    /// `O:` verdicts.
    Pass,
    /// `X:` verdicts.
    Fail,
}

impl Tag {
    /// Returns the single-letter head used in the canonical line.
    pub fn letter(self) -> char {
        match self {
            Tag::Pass => 'O',
            Tag::Fail => 'X',
        }
    }
}

/// The Pass/Fail tag plus explanation produced for one student answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the answer passed.
    pub tag:         Tag,
    /// Model-generated explanation, at most 200 characters plus an ellipsis.
    pub explanation: String,
}

impl Verdict {
    /// Normalizes an arbitrary model response and parses it into a verdict.
    pub fn from_raw(raw: Option<&str>) -> Self {
        Self::parse(&normalize(raw))
    }

    /// Parses a verdict line. The line goes through the normalizer first
    /// (idempotent on canonical lines), so the result is always well formed.
    pub fn parse(line: &str) -> Self {
        let line = normalize(Some(line));
        let (head, body) = line.split_once(':').unwrap_or(("X", ""));
        let tag = if head.trim() == "O" { Tag::Pass } else { Tag::Fail };
        Self {
            tag,
            explanation: body.trim().to_string(),
        }
    }

    /// Returns true for `O:` verdicts.
    pub fn passed(&self) -> bool {
        self.tag == Tag::Pass
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.tag.letter(), self.explanation)
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let line = String::deserialize(deserializer)?;
        Ok(Verdict::parse(&line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_tag_and_explanation() {
        let verdict = Verdict::parse("O: 잘했어요");
        assert!(verdict.passed());
        assert_eq!(verdict.explanation, "잘했어요");
        assert_eq!(verdict.to_string(), "O: 잘했어요");
    }

    #[test]
    fn absent_response_is_a_failure() {
        let verdict = Verdict::from_raw(None);
        assert_eq!(verdict.tag, Tag::Fail);
        assert_eq!(verdict.to_string(), crate::feedback::FEEDBACK_FAILED);
    }

    #[test]
    fn serializes_as_canonical_line() {
        let verdict = Verdict::from_raw(Some("O 좋아요"));
        let json = serde_json::to_string(&verdict).unwrap();
        assert_eq!(json, "\"O: 좋아요\"");
        let back: Verdict = serde_json::from_str(&json).unwrap();
        assert_eq!(back, verdict);
    }
}
