#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Display;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use colored::Colorize;
use itertools::Itertools;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};

use crate::{
    store::{COLUMNS, SubmissionRecord},
    types::{QUESTION_COUNT, Tag, Verdict},
};

/// UTF-8 byte order mark, so spreadsheet software picks the right encoding.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Message returned by the delete action.
pub const DELETE_NOT_PERMITTED: &str =
    "삭제는 허용되지 않습니다. 데이터베이스에서 직접 처리해 주세요.";

/// Formats a timestamp the way the dashboard shows it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Share of passing verdicts for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassRate {
    /// Number of `O:` verdicts.
    pub passed: usize,
    /// Number of records considered.
    pub total:  usize,
}

impl PassRate {
    /// Percentage rounded to one decimal; 0.0 when there are no records.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let raw = self.passed as f64 * 100.0 / self.total as f64;
        (raw * 10.0).round() / 10.0
    }
}

impl Display for PassRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}%", self.percent())
    }
}

/// Aggregate numbers shown at the top of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    /// Number of records.
    pub total:       usize,
    /// Pass rate per question, in question order.
    pub pass_rates:  [PassRate; QUESTION_COUNT],
    /// Newest submission time, formatted.
    pub most_recent: Option<String>,
}

impl Metrics {
    /// Computes metrics over `records`.
    pub fn compute(records: &[SubmissionRecord]) -> Self {
        let total = records.len();
        let pass_rates = std::array::from_fn(|i| PassRate {
            passed: records
                .iter()
                .filter(|r| r.verdicts()[i].passed())
                .count(),
            total,
        });
        let most_recent = records
            .iter()
            .map(|r| r.created_at)
            .max()
            .map(|ts| format_timestamp(&ts));

        Self {
            total,
            pass_rates,
            most_recent,
        }
    }
}

/// Keeps records whose student identifier contains `query`, case-sensitive,
/// in their original order. An empty query keeps everything.
pub fn filter_by_student<'a>(
    records: &'a [SubmissionRecord],
    query: &str,
) -> Vec<&'a SubmissionRecord> {
    records
        .iter()
        .filter(|r| r.student_id.contains(query))
        .collect()
}

/// One question inside a student panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelEntry {
    /// Question ordinal.
    pub question: usize,
    /// The student's answer.
    pub answer:   String,
    /// The verdict for it.
    pub verdict:  Verdict,
    /// Pass/fail tag, for styling.
    pub tag:      Tag,
}

/// Expandable per-submission detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentPanel {
    /// Student identifier.
    pub student_id: String,
    /// Formatted submission time.
    pub submitted:  String,
    /// Model used for grading.
    pub model:      String,
    /// Answers and verdicts.
    pub entries:    Vec<PanelEntry>,
}

impl From<&SubmissionRecord> for StudentPanel {
    fn from(record: &SubmissionRecord) -> Self {
        let entries = record
            .answers()
            .into_iter()
            .zip(record.verdicts())
            .enumerate()
            .map(|(i, (answer, verdict))| PanelEntry {
                question: i + 1,
                answer: answer.to_string(),
                tag: verdict.tag,
                verdict,
            })
            .collect();

        Self {
            student_id: record.student_id.clone(),
            submitted: format_timestamp(&record.created_at),
            model: record.model.clone(),
            entries,
        }
    }
}

/// What the dashboard shows for one load and one search term.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    /// Metrics over the full loaded set.
    pub metrics: Metrics,
    /// Search term applied to the panels.
    pub query:   String,
    /// Panels for the filtered records.
    pub panels:  Vec<StudentPanel>,
}

impl DashboardView {
    /// Builds the view from the full record set and a search term.
    pub fn build(records: &[SubmissionRecord], query: &str) -> Self {
        Self {
            metrics: Metrics::compute(records),
            query:   query.to_string(),
            panels:  filter_by_student(records, query)
                .into_iter()
                .map(StudentPanel::from)
                .collect(),
        }
    }
}

/// Which records the CSV export contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportScope {
    /// Every loaded record, regardless of the search term.
    #[default]
    All,
    /// Only the records matching the search term.
    Filtered,
}

/// Encodes records as CSV: BOM, header of store column names, one row each.
pub fn export_csv<'a, I>(records: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a SubmissionRecord>,
{
    let mut writer = csv::Writer::from_writer(UTF8_BOM.to_vec());
    writer
        .write_record(COLUMNS)
        .context("Could not write CSV header")?;
    for record in records {
        writer
            .write_record(record.values())
            .with_context(|| format!("Could not write CSV row for {}", record.student_id))?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Could not finish CSV export: {}", e.error()))
}

/// Exports according to `scope`, using `query` only for
/// [`ExportScope::Filtered`].
pub fn export_scoped(
    records: &[SubmissionRecord],
    query: &str,
    scope: ExportScope,
) -> Result<Vec<u8>> {
    match scope {
        ExportScope::All => export_csv(records),
        ExportScope::Filtered => export_csv(filter_by_student(records, query)),
    }
}

/// File name for an export made on `date`.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("student_submissions_{}.csv", date.format("%Y%m%d"))
}

/// The delete action. Always refused; rows are removed only through direct
/// database access.
pub fn delete_submission(student_id: &str) -> Result<(), &'static str> {
    tracing::warn!("Refused delete request for {}", student_id);
    Err(DELETE_NOT_PERMITTED)
}

/// Row of the terminal table.
#[derive(Tabled)]
struct RecordRow {
    /// Student identifier.
    #[tabled(rename = "Student")]
    student:   String,
    /// Submission time.
    #[tabled(rename = "Submitted")]
    submitted: String,
    /// Verdict for question 1.
    #[tabled(rename = "Q1")]
    q1:        String,
    /// Verdict for question 2.
    #[tabled(rename = "Q2")]
    q2:        String,
    /// Verdict for question 3.
    #[tabled(rename = "Q3")]
    q3:        String,
}

/// Colors a verdict line by its tag.
fn paint(verdict: &Verdict) -> String {
    match verdict.tag {
        Tag::Pass => verdict.to_string().green().to_string(),
        Tag::Fail => verdict.to_string().red().to_string(),
    }
}

/// Renders the filtered records as a table, with the metrics in the footer.
pub fn render_table(records: &[SubmissionRecord], query: &str) -> String {
    let metrics = Metrics::compute(records);
    let rows: Vec<RecordRow> = filter_by_student(records, query)
        .into_iter()
        .map(|r| {
            let [q1, q2, q3] = r.verdicts();
            RecordRow {
                student:   r.student_id.clone(),
                submitted: format_timestamp(&r.created_at),
                q1:        paint(&q1),
                q2:        paint(&q2),
                q3:        paint(&q3),
            }
        })
        .collect();

    let rates = metrics
        .pass_rates
        .iter()
        .enumerate()
        .map(|(i, rate)| format!("Q{} {}", i + 1, rate))
        .join(" | ");
    let footer = format!(
        "Total: {} | {} | Latest: {}",
        metrics.total,
        rates,
        metrics.most_recent.as_deref().unwrap_or("-")
    );

    Table::new(&rows)
        .with(Panel::header("Submissions Overview"))
        .with(Panel::footer(footer))
        .with(Modify::new(Rows::new(1..)).with(Width::wrap(40).keep_words(true)))
        .with(
            Modify::new(Rows::first())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(Style::modern())
        .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(id: &str, feedback_1: &str) -> SubmissionRecord {
        SubmissionRecord {
            student_id:  id.to_string(),
            answer_1:    "a, with comma".to_string(),
            answer_2:    "b".to_string(),
            answer_3:    "c".to_string(),
            feedback_1:  feedback_1.to_string(),
            feedback_2:  "X: 아쉬워요".to_string(),
            feedback_3:  "O: 좋아요".to_string(),
            guideline_1: "g1".to_string(),
            guideline_2: "g2".to_string(),
            guideline_3: "g3".to_string(),
            model:       "gpt-4o".to_string(),
            created_at:  Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn csv_starts_with_bom_and_header() {
        let bytes = export_csv(&[record("20101", "O: 잘했어요")]).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), COLUMNS.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("20101,\"a, with comma\",b,c,O: 잘했어요"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn pass_rate_rounds_to_one_decimal() {
        let rate = PassRate {
            passed: 1,
            total:  3,
        };
        assert_eq!(rate.percent(), 33.3);
        assert_eq!(rate.to_string(), "33.3%");
        assert_eq!(
            PassRate {
                passed: 0,
                total:  0,
            }
            .to_string(),
            "0.0%"
        );
    }

    #[test]
    fn pass_rate_agrees_with_repaired_verdicts() {
        let records = [record("20101", "O 좋아요"), record("20102", "X: 다시")];
        let metrics = Metrics::compute(&records);
        assert_eq!(metrics.pass_rates[0].passed, 1);
        assert_eq!(metrics.pass_rates[0].to_string(), "50.0%");

        let view = DashboardView::build(&records, "");
        let panel_passes = view
            .panels
            .iter()
            .filter(|p| p.entries[0].verdict.passed())
            .count();
        assert_eq!(panel_passes, metrics.pass_rates[0].passed);
    }

    #[test]
    fn export_file_name_carries_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(export_file_name(date), "student_submissions_20250301.csv");
    }

    #[test]
    fn delete_is_refused() {
        assert_eq!(delete_submission("20101"), Err(DELETE_NOT_PERMITTED));
    }

    #[test]
    fn table_lists_filtered_rows() {
        colored::control::set_override(false);
        let records = [record("20101", "O: 잘했어요"), record("30402", "X: 다시")];
        let table = render_table(&records, "201");
        assert!(table.contains("20101"));
        assert!(!table.contains("30402"));
        assert!(table.contains("Total: 2"));
    }
}
