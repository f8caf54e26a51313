#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    dashboard::{self, DashboardView, ExportScope},
    exam::Question,
    grade::Grader,
    session::{FeedbackOutcome, Phase, Session, SessionError, SubmissionForm, ValidationError},
    store::SubmissionStore,
    types::{QUESTION_COUNT, Verdict},
};

/// Errors surfaced by the HTTP layer.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Unknown session id.
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),
    /// A form field is missing.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Action not available in the current phase.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Refused on purpose.
    #[error("{0}")]
    Forbidden(&'static str),
    /// Anything else, such as a store failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Session(_) => StatusCode::CONFLICT,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            ApiError::Internal(e) => format!("{e:#}"),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Default number of live sessions kept before the oldest is evicted.
pub const DEFAULT_SESSION_LIMIT: usize = 10_000;

/// A live session and its creation order.
struct SessionSlot {
    /// Creation order, used to pick eviction victims.
    seq:     u64,
    /// Per-session async lock, so grading one session does not block others.
    session: Arc<tokio::sync::Mutex<Session>>,
}

/// Live sessions by id.
type Sessions = Mutex<HashMap<Uuid, SessionSlot>>;

/// Shared state for all handlers.
///
/// Sessions are kept in memory only. Session creation is unauthenticated, so
/// the table is bounded: once it holds `session_limit` entries, creating a
/// session evicts the oldest one.
#[derive(Clone)]
pub struct AppState {
    /// Grades submissions.
    grader:        Arc<Grader>,
    /// Persists and lists records.
    store:         Arc<dyn SubmissionStore>,
    /// Live student sessions.
    sessions:      Arc<Sessions>,
    /// Whether graded sessions may be graded again.
    allow_regrade: bool,
    /// Maximum number of live sessions.
    session_limit: usize,
}

impl AppState {
    /// Creates the handler state.
    pub fn new(grader: Grader, store: Arc<dyn SubmissionStore>, allow_regrade: bool) -> Self {
        Self {
            grader: Arc::new(grader),
            store,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            allow_regrade,
            session_limit: DEFAULT_SESSION_LIMIT,
        }
    }

    /// Caps the number of live sessions; at least one is always kept.
    pub fn with_session_limit(mut self, limit: usize) -> Self {
        self.session_limit = limit.max(1);
        self
    }

    /// Looks up a session.
    fn session(&self, id: Uuid) -> Result<Arc<tokio::sync::Mutex<Session>>, ApiError> {
        self.sessions
            .lock()
            .map_err(|_| anyhow::anyhow!("session table poisoned"))?
            .get(&id)
            .map(|slot| Arc::clone(&slot.session))
            .ok_or(ApiError::SessionNotFound(id))
    }

    /// Registers `session`, evicting the oldest sessions beyond the limit.
    fn register(&self, session: Session) -> Result<(), ApiError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow::anyhow!("session table poisoned"))?;

        while sessions.len() >= self.session_limit {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, slot)| slot.seq)
                .map(|(id, _)| *id)
            else {
                break;
            };
            sessions.remove(&oldest);
            tracing::info!("Evicted session {} (limit {})", oldest, self.session_limit);
        }

        let seq = sessions
            .values()
            .map(|slot| slot.seq)
            .max()
            .map_or(0, |last| last + 1);
        sessions.insert(
            session.id(),
            SessionSlot {
                seq,
                session: Arc::new(tokio::sync::Mutex::new(session)),
            },
        );
        Ok(())
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/questions", get(questions))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(session_status))
        .route("/api/sessions/{id}/submit", post(submit))
        .route("/api/sessions/{id}/feedback", post(feedback))
        .route("/api/dashboard", get(dashboard_view))
        .route("/api/dashboard/export.csv", get(export))
        .route("/api/submissions/{student_id}", delete(delete_submission))
        .with_state(state)
}

/// Binds `addr` and serves until the process ends.
pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not bind {addr}"))?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, router(state))
        .await
        .context("HTTP server stopped unexpectedly")
}

/// Question list shown above the form.
#[derive(Serialize)]
struct QuestionsResponse {
    /// Exercise title.
    title:     String,
    /// Topic line.
    topic:     String,
    /// Questions; guidelines are not shown to students.
    questions: Vec<QuestionView>,
}

/// Student-facing part of a question.
#[derive(Serialize)]
struct QuestionView {
    /// Ordinal.
    index:  usize,
    /// Question text.
    prompt: String,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            index:  q.index,
            prompt: q.prompt.clone(),
        }
    }
}

/// `GET /api/questions`
async fn questions(State(state): State<AppState>) -> Json<QuestionsResponse> {
    let set = state.grader.questions();
    Json(QuestionsResponse {
        title:     set.title.clone(),
        topic:     set.topic.clone(),
        questions: set.questions.iter().map(QuestionView::from).collect(),
    })
}

/// Session snapshot returned by most session routes.
#[derive(Serialize)]
struct SessionResponse {
    /// Session id.
    session_id:   Uuid,
    /// Current phase.
    phase:        Phase,
    /// Whether the feedback action is enabled.
    can_feedback: bool,
    /// Cached verdicts, if graded.
    verdicts:     Option<[Verdict; QUESTION_COUNT]>,
    /// Error from the last save attempt.
    save_error:   Option<String>,
}

impl SessionResponse {
    /// Snapshot of `session`.
    fn of(session: &Session, allow_regrade: bool) -> Self {
        Self {
            session_id:   session.id(),
            phase:        session.phase(),
            can_feedback: session.can_request_feedback(allow_regrade),
            verdicts:     session.verdicts().cloned(),
            save_error:   session.save_error().map(str::to_owned),
        }
    }
}

/// `POST /api/sessions`
async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let session = Session::new();
    let response = SessionResponse::of(&session, state.allow_regrade);
    state.register(session)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /api/sessions/{id}`
async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.session(id)?;
    let session = session.lock().await;
    Ok(Json(SessionResponse::of(&session, state.allow_regrade)))
}

/// `POST /api/sessions/{id}/submit`
async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(form): Json<SubmissionForm>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.session(id)?;
    let mut session = session.lock().await;
    session.submit(form)?;
    Ok(Json(SessionResponse::of(&session, state.allow_regrade)))
}

/// `POST /api/sessions/{id}/feedback`
async fn feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FeedbackOutcome>, ApiError> {
    let session = state.session(id)?;
    let mut session = session.lock().await;
    let outcome = session
        .request_feedback(&state.grader, state.store.as_ref(), state.allow_regrade)
        .await?;
    Ok(Json(outcome))
}

/// Dashboard query string.
#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    /// Student identifier substring.
    #[serde(default)]
    q:        String,
    /// Export only the filtered view.
    #[serde(default)]
    filtered: bool,
}

/// `GET /api/dashboard`
async fn dashboard_view(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardView>, ApiError> {
    let records = state.store.fetch_all().await?;
    Ok(Json(DashboardView::build(&records, &query.q)))
}

/// `GET /api/dashboard/export.csv`
async fn export(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Response, ApiError> {
    let records = state.store.fetch_all().await?;
    let scope = if query.filtered { ExportScope::Filtered } else { ExportScope::All };
    let body = dashboard::export_scoped(&records, &query.q, scope)?;

    let file_name = dashboard::export_file_name(chrono::Utc::now().date_naive());
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .context("Invalid export file name")?;

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8")),
            (CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// `DELETE /api/submissions/{student_id}`
async fn delete_submission(Path(student_id): Path<String>) -> Result<StatusCode, ApiError> {
    dashboard::delete_submission(&student_id).map_err(ApiError::Forbidden)?;
    Ok(StatusCode::NO_CONTENT)
}
