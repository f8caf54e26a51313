#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # oxgrade
//!
//! Students answer three short questions, a language model marks each answer
//! `O` or `X` with a one-line explanation, and teachers browse the results.
//!
//! Secrets come from the environment (or a `.env` file): `SUPABASE_URL`,
//! `SUPABASE_SERVICE_ROLE_KEY` and `OPENAI_API_KEY`.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use bpaf::*;
use colored::Colorize;
use dotenvy::dotenv;
use oxgrade::{
    config,
    dashboard::{self, ExportScope},
    openai_grader,
    server::{self, AppState},
    session::{Session, SubmissionForm},
    store::{MemoryStore, SubmissionStore},
    supabase_store,
    types::{QUESTION_COUNT, Tag},
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Run the HTTP controller
    Serve {
        /// Keep submissions in memory instead of Supabase
        memory: bool,
    },
    /// Grade and store one submission
    Grade {
        /// Student identifier
        student_id: String,
        /// Answers in question order
        answers:    Vec<String>,
    },
    /// Print dashboard metrics and verdicts
    Dashboard {
        /// Student identifier substring
        filter: String,
    },
    /// Write the CSV export
    Export {
        /// Student identifier substring
        filter:   String,
        /// Export only rows matching the filter
        filtered: bool,
        /// Output directory
        out:      PathBuf,
    },
    /// Print the active question set
    Questions,
}

/// Parsed command line.
#[derive(Debug, Clone)]
struct Options {
    /// Question set name or path, overriding `OXGRADE_QUESTION_SET`
    questions: Option<String>,
    /// Command to run
    cmd:       Cmd,
}

/// Parse the command line arguments and return the options
fn options() -> Options {
    /// parses the student id filter
    fn filter_parser() -> impl Parser<String> {
        long("filter")
            .short('f')
            .help("Only show student ids containing this text (case-sensitive)")
            .argument::<String>("TEXT")
            .fallback(String::new())
    }

    let memory = long("memory")
        .help("Keep submissions in memory instead of Supabase")
        .switch();
    let serve = construct!(Cmd::Serve { memory })
        .to_options()
        .command("serve")
        .help("Serve the student form and teacher dashboard API");

    let student_id = positional::<String>("STUDENT_ID").help("Student identifier");
    let answers = positional::<String>("ANSWER")
        .help("Answer text, one per question")
        .many();
    let grade = construct!(Cmd::Grade {
        student_id,
        answers
    })
    .to_options()
    .command("grade")
    .help("Grade one submission and store it");

    let dashboard = {
        let filter = filter_parser();
        construct!(Cmd::Dashboard { filter })
            .to_options()
            .command("dashboard")
            .help("Print pass rates and verdicts")
    };

    let filter = filter_parser();
    let filtered = long("filtered")
        .help("Export only the rows matching --filter")
        .switch();
    let out = long("out")
        .short('o')
        .help("Directory to write the CSV file to")
        .argument::<PathBuf>("DIR")
        .fallback(PathBuf::from("."));
    let export = construct!(Cmd::Export {
        filter,
        filtered,
        out
    })
    .to_options()
    .command("export")
    .help("Write submissions as CSV (UTF-8 with BOM)");

    let questions_cmd = pure(Cmd::Questions)
        .to_options()
        .command("questions")
        .help("Print the active question set as JSON");

    let cmd = construct!([serve, grade, dashboard, export, questions_cmd]);

    let questions = long("questions")
        .help("Built-in question set name or path to a question set JSON file")
        .argument::<String>("NAME/PATH")
        .optional();

    construct!(Options { questions, cmd })
        .to_options()
        .descr("Short-answer grading with LLM feedback")
        .run()
}

/// Reads the log level from `OXGRADE_LOG`, defaulting to INFO.
fn log_level() -> Level {
    std::env::var("OXGRADE_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(log_level());
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let opts = options();
    let config = config::ensure_initialized(opts.questions.as_deref())?;

    match opts.cmd {
        Cmd::Serve { memory } => {
            let grader = openai_grader(&config)?;
            let store: Arc<dyn SubmissionStore> = if memory {
                tracing::warn!("Submissions are kept in memory and lost on exit");
                Arc::new(MemoryStore::new())
            } else {
                supabase_store(&config)?
            };
            let state = AppState::new(grader, store, config.allow_regrade());
            server::serve(state, config.bind()).await?;
        }
        Cmd::Grade {
            student_id,
            answers,
        } => {
            let count = answers.len();
            let answers: [String; QUESTION_COUNT] = answers.try_into().map_err(|_| {
                anyhow::anyhow!("Expected exactly {QUESTION_COUNT} answers, got {count}")
            })?;

            let mut session = Session::new();
            session.submit(SubmissionForm {
                student_id,
                answers,
            })?;

            let grader = openai_grader(&config)?;
            let store = supabase_store(&config)?;

            let outcome = session
                .request_feedback(&grader, store.as_ref(), config.allow_regrade())
                .await?;

            for (i, verdict) in outcome.verdicts.iter().enumerate() {
                let line = format!("문항 {} | {}", i + 1, verdict);
                match verdict.tag {
                    Tag::Pass => println!("{}", line.green()),
                    Tag::Fail => println!("{}", line.red()),
                }
            }
            if let Some(err) = outcome.save_error {
                eprintln!("{}", format!("DB 저장 오류: {err}").red());
            }
        }
        Cmd::Dashboard { filter } => {
            let records = supabase_store(&config)?.fetch_all().await?;
            println!("{}", dashboard::render_table(&records, &filter));
        }
        Cmd::Export {
            filter,
            filtered,
            out,
        } => {
            let records = supabase_store(&config)?.fetch_all().await?;
            let scope = if filtered { ExportScope::Filtered } else { ExportScope::All };
            let bytes = dashboard::export_scoped(&records, &filter, scope)?;

            let path = out.join(dashboard::export_file_name(chrono::Utc::now().date_naive()));
            tokio::fs::write(&path, bytes)
                .await
                .with_context(|| format!("Could not write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        Cmd::Questions => {
            println!("{}", serde_json::to_string_pretty(config.questions())?);
        }
    };

    Ok(())
}
