#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    grade::{Grader, SubmissionPayload},
    store::{SubmissionRecord, SubmissionStore},
    types::{QUESTION_COUNT, Verdict},
};

/// Where a student session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No valid form yet.
    NotSubmitted,
    /// A valid form is held and may be graded.
    SubmittedOk,
    /// Verdicts exist for the held form.
    Graded,
}

/// The student-facing form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionForm {
    /// Student identifier, e.g. `20101`.
    pub student_id: String,
    /// One free-text answer per question.
    pub answers:    [String; QUESTION_COUNT],
}

/// A form field that was left empty.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Student identifier is empty after trimming.
    #[error("학번을 입력해 주세요.")]
    MissingStudentId,
    /// The answer to question `n` is empty after trimming.
    #[error("문항 {0}에 대한 답안을 작성해 주세요.")]
    MissingAnswer(usize),
}

impl SubmissionForm {
    /// Checks presence of the identifier, then of each answer in order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.student_id.trim().is_empty() {
            return Err(ValidationError::MissingStudentId);
        }
        if let Some(i) = self.answers.iter().position(|a| a.trim().is_empty()) {
            return Err(ValidationError::MissingAnswer(i + 1));
        }
        Ok(())
    }
}

/// Feedback was requested when the session could not provide it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The form has not been submitted successfully yet.
    #[error("답안을 먼저 제출해 주세요.")]
    NotSubmitted,
}

/// Result of a feedback request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackOutcome {
    /// Verdicts, in question order.
    pub verdicts:   [Verdict; QUESTION_COUNT],
    /// Error text from the store, if saving failed.
    pub save_error: Option<String>,
    /// False when the cached result was returned without grading again.
    pub fresh:      bool,
}

/// Session-scoped state for one student. Each user action is a method call.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier.
    id:         Uuid,
    /// Current phase.
    phase:      Phase,
    /// Last valid form.
    form:       Option<SubmissionForm>,
    /// Payload of the last grading pass.
    payload:    Option<SubmissionPayload>,
    /// Error text from the last save attempt.
    save_error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Starts a fresh session.
    pub fn new() -> Self {
        Self {
            id:         Uuid::new_v4(),
            phase:      Phase::NotSubmitted,
            form:       None,
            payload:    None,
            save_error: None,
        }
    }

    /// Returns the session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the cached verdicts, if graded.
    pub fn verdicts(&self) -> Option<&[Verdict; QUESTION_COUNT]> {
        self.payload.as_ref().map(|p| &p.verdicts)
    }

    /// Returns the error from the last save attempt.
    pub fn save_error(&self) -> Option<&str> {
        self.save_error.as_deref()
    }

    /// Whether the feedback action is currently available.
    pub fn can_request_feedback(&self, allow_regrade: bool) -> bool {
        match self.phase {
            Phase::NotSubmitted => false,
            Phase::SubmittedOk => true,
            Phase::Graded => allow_regrade,
        }
    }

    /// Handles the submit action.
    ///
    /// An invalid form leaves the session untouched. A valid one moves it to
    /// [`Phase::SubmittedOk`] and drops any earlier verdicts, so edited
    /// answers can be graded again.
    pub fn submit(&mut self, form: SubmissionForm) -> Result<(), ValidationError> {
        form.validate()?;

        tracing::info!("Accepted submission form for {}", form.student_id.trim());
        self.form = Some(form);
        self.payload = None;
        self.save_error = None;
        self.phase = Phase::SubmittedOk;
        Ok(())
    }

    /// Handles the feedback action: grade, then attempt to store.
    ///
    /// In [`Phase::Graded`] this returns the cached result unless
    /// `allow_regrade` is set. A failed save is reported in the outcome but
    /// does not discard the verdicts.
    pub async fn request_feedback(
        &mut self,
        grader: &Grader,
        store: &dyn SubmissionStore,
        allow_regrade: bool,
    ) -> Result<FeedbackOutcome, SessionError> {
        if self.phase == Phase::Graded
            && !allow_regrade
            && let Some(payload) = self.payload.as_ref()
        {
            return Ok(FeedbackOutcome {
                verdicts:   payload.verdicts.clone(),
                save_error: self.save_error.clone(),
                fresh:      false,
            });
        }

        let form = match (self.phase, self.form.as_ref()) {
            (Phase::SubmittedOk | Phase::Graded, Some(form)) => form,
            _ => return Err(SessionError::NotSubmitted),
        };

        let payload = grader.grade(&form.student_id, &form.answers).await;

        let save_error = match store.insert(SubmissionRecord::from(&payload)).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Could not store submission for {}: {:#}", payload.student_id, e);
                Some(format!("{e:#}"))
            }
        };

        let outcome = FeedbackOutcome {
            verdicts:   payload.verdicts.clone(),
            save_error: save_error.clone(),
            fresh:      true,
        };

        self.payload = Some(payload);
        self.save_error = save_error;
        self.phase = Phase::Graded;
        Ok(outcome)
    }
}
