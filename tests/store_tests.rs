use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, TimeZone, Utc};
use oxgrade::{
    config::{SUBMISSIONS_TABLE, supabase_client},
    dashboard::DashboardView,
    store::{COLUMNS, MemoryStore, PostgrestStore, SubmissionRecord, SubmissionStore},
};
use serde_json::{Value, json};

const SERVICE_KEY: &str = "service-role-key";

/// One request as the fake PostgREST endpoint saw it.
#[derive(Debug, Clone)]
struct Seen {
    method:        &'static str,
    query:         HashMap<String, String>,
    apikey:        Option<String>,
    authorization: Option<String>,
    body:          Option<Value>,
}

/// Minimal stand-in for a Supabase PostgREST table.
#[derive(Clone, Default)]
struct FakeRest {
    rows: Arc<Mutex<Vec<Value>>>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn authorized(headers: &HeaderMap) -> bool {
    header(headers, "apikey").as_deref() == Some(SERVICE_KEY)
        && header(headers, "authorization") == Some(format!("Bearer {SERVICE_KEY}"))
}

fn rejected() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Invalid API key" })),
    )
        .into_response()
}

async fn list(
    State(fake): State<FakeRest>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    fake.seen.lock().unwrap().push(Seen {
        method: "GET",
        query,
        apikey: header(&headers, "apikey"),
        authorization: header(&headers, "authorization"),
        body: None,
    });
    if !authorized(&headers) {
        return rejected();
    }
    Json(fake.rows.lock().unwrap().clone()).into_response()
}

async fn insert(State(fake): State<FakeRest>, headers: HeaderMap, body: String) -> Response {
    let row: Value = serde_json::from_str(&body).unwrap();
    fake.seen.lock().unwrap().push(Seen {
        method: "POST",
        query: HashMap::new(),
        apikey: header(&headers, "apikey"),
        authorization: header(&headers, "authorization"),
        body: Some(row.clone()),
    });
    if !authorized(&headers) {
        return rejected();
    }
    fake.rows.lock().unwrap().push(row.clone());
    (StatusCode::CREATED, Json(json!([row]))).into_response()
}

/// Serves the fake on an ephemeral port and returns its REST endpoint.
async fn spawn_rest(fake: FakeRest) -> String {
    let app = Router::new()
        .route(&format!("/rest/v1/{SUBMISSIONS_TABLE}"), get(list).post(insert))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/rest/v1")
}

fn stored_row(student_id: &str, created_at: &str) -> Value {
    json!({
        "id": 17,
        "student_id": student_id,
        "answer_1": "무역풍 약화",
        "answer_2": "b",
        "answer_3": "c",
        "feedback_1": "O: 잘했어요",
        "feedback_2": "X: 아쉬워요",
        "feedback_3": "O: 좋아요",
        "guideline_1": "g1",
        "guideline_2": "g2",
        "guideline_3": "g3",
        "model": "gpt-4o",
        "created_at": created_at,
    })
}

fn record(student_id: &str, created_at: DateTime<Utc>) -> SubmissionRecord {
    SubmissionRecord {
        student_id: student_id.to_string(),
        answer_1: "a".to_string(),
        answer_2: "b".to_string(),
        answer_3: "c".to_string(),
        feedback_1: "O: 좋아요".to_string(),
        feedback_2: "X: 아쉬워요".to_string(),
        feedback_3: "O: 좋아요".to_string(),
        guideline_1: "g1".to_string(),
        guideline_2: "g2".to_string(),
        guideline_3: "g3".to_string(),
        model: "gpt-4o".to_string(),
        created_at,
    }
}

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, minute, 0).unwrap()
}

#[tokio::test]
async fn fetch_all_selects_columns_newest_first_with_auth() {
    let fake = FakeRest::default();
    fake.rows
        .lock()
        .unwrap()
        .push(stored_row("20101", "2025-03-01T09:30:00.123456+00:00"));
    let endpoint = spawn_rest(fake.clone()).await;
    let store = PostgrestStore::new(supabase_client(&endpoint, SERVICE_KEY));

    let rows = store.fetch_all().await.unwrap();

    let seen = fake.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "GET");
    let columns = COLUMNS.join(",");
    assert_eq!(seen[0].query.get("select"), Some(&columns));
    assert_eq!(
        seen[0].query.get("order").map(String::as_str),
        Some("created_at.desc")
    );
    assert_eq!(seen[0].apikey.as_deref(), Some(SERVICE_KEY));
    assert_eq!(
        seen[0].authorization.as_deref(),
        Some(format!("Bearer {SERVICE_KEY}").as_str())
    );

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].student_id, "20101");
    assert_eq!(rows[0].answer_1, "무역풍 약화");
    assert!(rows[0].verdicts()[0].passed());
    let expected = DateTime::parse_from_rfc3339("2025-03-01T09:30:00.123456Z")
        .unwrap()
        .with_timezone(&Utc);
    assert_eq!(rows[0].created_at, expected);
}

#[tokio::test]
async fn insert_posts_one_flat_row() {
    let fake = FakeRest::default();
    let endpoint = spawn_rest(fake.clone()).await;
    let store = PostgrestStore::new(supabase_client(&endpoint, SERVICE_KEY));

    store.insert(record("20101", at(30))).await.unwrap();

    let seen = fake.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].apikey.as_deref(), Some(SERVICE_KEY));

    let body = seen[0].body.clone().unwrap();
    let fields = body.as_object().unwrap();
    let mut keys: Vec<&str> = fields.keys().map(String::as_str).collect();
    keys.sort_unstable();
    let mut expected = COLUMNS.to_vec();
    expected.sort_unstable();
    assert_eq!(keys, expected);
    assert_eq!(fields["student_id"], "20101");
    assert_eq!(fields["feedback_1"], "O: 좋아요");

    let created_at: DateTime<Utc> = serde_json::from_value(fields["created_at"].clone()).unwrap();
    assert_eq!(created_at, at(30));
}

#[tokio::test]
async fn rejected_requests_are_errors() {
    let fake = FakeRest::default();
    let endpoint = spawn_rest(fake.clone()).await;
    let store = PostgrestStore::new(supabase_client(&endpoint, "wrong-key"));

    let fetch = store.fetch_all().await.unwrap_err();
    assert!(format!("{fetch:#}").contains("401"), "{fetch:#}");

    let insert = store.insert(record("20101", at(30))).await.unwrap_err();
    assert!(format!("{insert:#}").contains("401"), "{insert:#}");

    assert!(fake.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn memory_store_lists_newest_first() {
    let store = MemoryStore::new();
    for (id, minute) in [("20101", 10), ("30402", 40), ("20102", 5), ("A2010", 25)] {
        store.insert(record(id, at(minute))).await.unwrap();
    }

    let records = store.fetch_all().await.unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.student_id.as_str()).collect();
    assert_eq!(ids, vec!["30402", "A2010", "20101", "20102"]);

    let view = DashboardView::build(&records, "201");
    let panel_ids: Vec<&str> = view.panels.iter().map(|p| p.student_id.as_str()).collect();
    assert_eq!(panel_ids, vec!["A2010", "20101", "20102"]);
    assert_eq!(view.metrics.most_recent.as_deref(), Some("2025-03-01 09:40:00 UTC"));
}
