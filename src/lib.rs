//! # oxgrade
//!
//! Grades short-answer classroom exercises with a language model and keeps
//! the results in a hosted table for a teacher dashboard.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Environment-driven configuration
pub mod config;
/// Metrics, filtering and CSV export over stored submissions
pub mod dashboard;
/// Question sets and prompt assets
pub mod exam;
/// Coercion of raw model output into one-line verdicts
pub mod feedback;
/// For all things related to grading
pub mod grade;
/// HTTP controller for the student form and the dashboard
pub mod server;
/// Per-student session state machine
pub mod session;
/// Persistence of graded submissions
pub mod store;
/// Shared verdict types
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use config::ConfigHandle;
use grade::{Grader, OpenAiCompletion};
use store::{PostgrestStore, SubmissionStore};

/// Builds a grader backed by the configured OpenAI endpoint.
pub fn openai_grader(config: &ConfigHandle) -> Result<Grader> {
    let openai = config.require_openai()?;
    Ok(Grader::new(
        Arc::new(OpenAiCompletion::new(openai)),
        config.questions().clone(),
        config.grading_options(),
    ))
}

/// Builds the Supabase-backed store.
pub fn supabase_store(config: &ConfigHandle) -> Result<Arc<dyn SubmissionStore>> {
    Ok(Arc::new(PostgrestStore::new(config.require_postgrest()?)))
}
