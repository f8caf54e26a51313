#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use postgrest::Postgrest;
use serde::{Deserialize, Serialize};

use crate::{
    config::SUBMISSIONS_TABLE,
    grade::SubmissionPayload,
    types::{QUESTION_COUNT, Verdict},
};

/// Number of columns in a stored record.
pub const COLUMN_COUNT: usize = 12;

/// Column names of the `student_submissions` table, in export order.
pub const COLUMNS: [&str; COLUMN_COUNT] = [
    "student_id",
    "answer_1",
    "answer_2",
    "answer_3",
    "feedback_1",
    "feedback_2",
    "feedback_3",
    "guideline_1",
    "guideline_2",
    "guideline_3",
    "model",
    "created_at",
];

/// Flat row stored in `student_submissions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Student identifier.
    pub student_id:  String,
    /// Answer to question 1.
    pub answer_1:    String,
    /// Answer to question 2.
    pub answer_2:    String,
    /// Answer to question 3.
    pub answer_3:    String,
    /// Canonical verdict line for question 1.
    pub feedback_1:  String,
    /// Canonical verdict line for question 2.
    pub feedback_2:  String,
    /// Canonical verdict line for question 3.
    pub feedback_3:  String,
    /// Guideline snapshot for question 1.
    pub guideline_1: String,
    /// Guideline snapshot for question 2.
    pub guideline_2: String,
    /// Guideline snapshot for question 3.
    pub guideline_3: String,
    /// Model used for grading.
    pub model:       String,
    /// Creation time.
    pub created_at:  DateTime<Utc>,
}

impl SubmissionRecord {
    /// Answers in question order.
    pub fn answers(&self) -> [&str; QUESTION_COUNT] {
        [&self.answer_1, &self.answer_2, &self.answer_3]
    }

    /// Stored verdict lines in question order.
    pub fn feedbacks(&self) -> [&str; QUESTION_COUNT] {
        [&self.feedback_1, &self.feedback_2, &self.feedback_3]
    }

    /// Parsed verdicts in question order.
    pub fn verdicts(&self) -> [Verdict; QUESTION_COUNT] {
        self.feedbacks().map(Verdict::parse)
    }

    /// Guideline snapshots in question order.
    pub fn guidelines(&self) -> [&str; QUESTION_COUNT] {
        [&self.guideline_1, &self.guideline_2, &self.guideline_3]
    }

    /// Values in [`COLUMNS`] order.
    pub fn values(&self) -> [String; COLUMN_COUNT] {
        [
            self.student_id.clone(),
            self.answer_1.clone(),
            self.answer_2.clone(),
            self.answer_3.clone(),
            self.feedback_1.clone(),
            self.feedback_2.clone(),
            self.feedback_3.clone(),
            self.guideline_1.clone(),
            self.guideline_2.clone(),
            self.guideline_3.clone(),
            self.model.clone(),
            self.created_at.to_rfc3339(),
        ]
    }
}

impl From<&SubmissionPayload> for SubmissionRecord {
    fn from(payload: &SubmissionPayload) -> Self {
        let [answer_1, answer_2, answer_3] = payload.answers.clone();
        let [feedback_1, feedback_2, feedback_3] = payload.verdicts.clone().map(|v| v.to_string());
        let [guideline_1, guideline_2, guideline_3] = payload.guidelines.clone();

        Self {
            student_id: payload.student_id.clone(),
            answer_1,
            answer_2,
            answer_3,
            feedback_1,
            feedback_2,
            feedback_3,
            guideline_1,
            guideline_2,
            guideline_3,
            model: payload.model.clone(),
            created_at: payload.created_at,
        }
    }
}

/// Append-only storage for graded submissions. No update or delete.
pub trait SubmissionStore: Send + Sync {
    /// Inserts one record. Errors propagate; nothing is retried.
    fn insert(&self, record: SubmissionRecord) -> BoxFuture<'_, Result<()>>;

    /// Returns every record, newest first.
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<SubmissionRecord>>>;
}

/// [`SubmissionStore`] backed by a Supabase PostgREST endpoint.
pub struct PostgrestStore {
    /// Configured client.
    client: Postgrest,
}

impl PostgrestStore {
    /// Wraps an authenticated client.
    pub fn new(client: Postgrest) -> Self {
        Self { client }
    }
}

impl SubmissionStore for PostgrestStore {
    fn insert(&self, record: SubmissionRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let body = serde_json::to_string(&record)?;
            let response = self
                .client
                .from(SUBMISSIONS_TABLE)
                .insert(body)
                .execute()
                .await
                .context("Failed to write submission row to Supabase")?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                bail!("Supabase rejected the submission row ({status}): {detail}");
            }

            tracing::info!("Stored submission for {}", record.student_id);
            Ok(())
        })
    }

    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<SubmissionRecord>>> {
        Box::pin(async move {
            let response = self
                .client
                .from(SUBMISSIONS_TABLE)
                .select(COLUMNS.join(","))
                .order("created_at.desc")
                .execute()
                .await
                .context("Could not fetch submissions from Supabase")?;

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Could not read the Supabase response")?;
            if !status.is_success() {
                bail!("Supabase refused to list submissions ({status}): {body}");
            }

            serde_json::from_str(&body).context("Unexpected submission row shape from Supabase")
        })
    }
}

/// In-process [`SubmissionStore`], for tests and offline runs.
#[derive(Default)]
pub struct MemoryStore {
    /// Rows in insertion order.
    rows: Mutex<Vec<SubmissionRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubmissionStore for MemoryStore {
    fn insert(&self, record: SubmissionRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.rows
                .lock()
                .map_err(|_| anyhow::anyhow!("memory store poisoned"))?
                .push(record);
            Ok(())
        })
    }

    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<SubmissionRecord>>> {
        Box::pin(async move {
            let mut rows = self
                .rows
                .lock()
                .map_err(|_| anyhow::anyhow!("memory store poisoned"))?
                .clone();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(rows)
        })
    }
}
