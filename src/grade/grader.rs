#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use super::{
    completion::{CompletionError, CompletionService},
    request::GradingRequest,
};
use crate::{
    exam::{Question, QuestionSet},
    types::{QUESTION_COUNT, Verdict},
};

/// How the three completion calls of one submission are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradingStrategy {
    /// One call after another.
    #[default]
    Sequential,
    /// All calls in flight together, joined in question order.
    Concurrent,
}

impl FromStr for GradingStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(GradingStrategy::Sequential),
            "concurrent" => Ok(GradingStrategy::Concurrent),
            other => anyhow::bail!("Unknown grading strategy `{other}` (sequential|concurrent)"),
        }
    }
}

/// Knobs applied to every completion request.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(doc)]
pub struct GradingOptions {
    /// Model identifier sent with each request and stored with the record.
    #[builder(setter(into))]
    pub model:                 String,
    /// Call scheduling.
    #[builder(default)]
    pub strategy:              GradingStrategy,
    /// Per-call timeout; expiry counts as a service failure.
    #[builder(default = Duration::from_secs(60))]
    pub timeout:               Duration,
    /// Optional bound on completion length.
    #[builder(default, setter(into))]
    pub max_completion_tokens: Option<u32>,
    /// Optional sampling temperature.
    #[builder(default, setter(into))]
    pub temperature:           Option<f32>,
    /// Optional nucleus sampling bound.
    #[builder(default, setter(into))]
    pub top_p:                 Option<f32>,
}

/// One graded submission, handed to the store as a single unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionPayload {
    /// Trimmed student identifier.
    pub student_id: String,
    /// Answers as submitted.
    pub answers:    [String; QUESTION_COUNT],
    /// One verdict per answer, in question order.
    pub verdicts:   [Verdict; QUESTION_COUNT],
    /// Guideline snapshot, kept for auditing.
    pub guidelines: [String; QUESTION_COUNT],
    /// Model used for grading.
    pub model:      String,
    /// When grading finished.
    pub created_at: DateTime<Utc>,
}

/// Grades all answers of a submission against a question set.
#[derive(Clone)]
pub struct Grader {
    /// Where completions come from.
    service:   Arc<dyn CompletionService>,
    /// Questions and guidelines.
    questions: QuestionSet,
    /// Request knobs.
    options:   GradingOptions,
}

impl Grader {
    /// Creates a grader.
    pub fn new(
        service: Arc<dyn CompletionService>,
        questions: QuestionSet,
        options: GradingOptions,
    ) -> Self {
        Self {
            service,
            questions,
            options,
        }
    }

    /// Returns the question set being graded against.
    pub fn questions(&self) -> &QuestionSet {
        &self.questions
    }

    /// Grades a single answer. Never fails: service errors and timeouts turn
    /// into a fail verdict carrying the error detail.
    async fn grade_one(&self, question: &Question, answer: &str) -> Verdict {
        let request = GradingRequest::new(&self.questions, question, answer, &self.options);
        tracing::info!("Grading question {}...", question.index);

        let outcome =
            match tokio::time::timeout(self.options.timeout, self.service.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(CompletionError::Timeout(self.options.timeout)),
            };

        let raw = match outcome {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Completion for question {} failed: {}", question.index, e);
                format!("X: 오류 발생 ({e})")
            }
        };

        Verdict::from_raw(Some(&raw))
    }

    /// Grades the three answers and assembles the payload.
    ///
    /// Every answer yields exactly one verdict regardless of service health;
    /// a failing call only affects its own question.
    pub async fn grade(
        &self,
        student_id: &str,
        answers: &[String; QUESTION_COUNT],
    ) -> SubmissionPayload {
        let [q1, q2, q3] = &self.questions.questions;
        let [a1, a2, a3] = answers;

        let verdicts = match self.options.strategy {
            GradingStrategy::Sequential => {
                let v1 = self.grade_one(q1, a1).await;
                let v2 = self.grade_one(q2, a2).await;
                let v3 = self.grade_one(q3, a3).await;
                [v1, v2, v3]
            }
            GradingStrategy::Concurrent => {
                let (v1, v2, v3) = tokio::join!(
                    self.grade_one(q1, a1),
                    self.grade_one(q2, a2),
                    self.grade_one(q3, a3)
                );
                [v1, v2, v3]
            }
        };

        let passed = verdicts.iter().filter(|v| v.passed()).count();
        tracing::info!(
            "Graded submission for {}: {}/{} passed",
            student_id.trim(),
            passed,
            QUESTION_COUNT
        );

        SubmissionPayload {
            student_id: student_id.trim().to_string(),
            answers: answers.clone(),
            verdicts,
            guidelines: self.questions.guidelines(),
            model: self.options.model.clone(),
            created_at: Utc::now(),
        }
    }
}
