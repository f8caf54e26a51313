#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Completion service seam and the OpenAI-backed implementation.
pub mod completion;
/// Per-submission grading loop.
pub mod grader;
/// Prompt assembly for a single answer.
pub mod request;

pub use completion::{CompletionError, CompletionService, OpenAiCompletion};
pub use grader::{Grader, GradingOptions, GradingStrategy, SubmissionPayload};
pub use request::GradingRequest;
