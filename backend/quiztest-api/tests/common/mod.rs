#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use quiztest_api::{
    config::{Config, StoreBackend},
    create_router,
    repositories::{memory::Fixtures, MemoryStore},
    services::AppState,
};

pub const MIXED_UNIT: &str = "unit-mixed";
pub const CHOICE_UNIT: &str = "unit-choice";

pub async fn create_test_app() -> Router {
    create_test_app_with(|_| {}).await
}

/// Test app whose state can be adjusted before the router is built, e.g. to
/// swap in a failing collaborator.
pub async fn create_test_app_with<F>(adjust: F) -> Router
where
    F: FnOnce(&mut AppState),
{
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let config = Config {
        store_backend: StoreBackend::Memory,
        ..Config::default()
    };

    let mut state = AppState::in_memory(config, fixture_store().await);
    adjust(&mut state);
    create_router(Arc::new(state))
}

pub async fn fixture_store() -> MemoryStore {
    let fixtures: Fixtures =
        serde_json::from_value(fixtures()).expect("Failed to parse test fixtures");
    MemoryStore::with_fixtures(fixtures).await
}

/// Two units: a mixed-kind set (q1..q5, q2 and q3 grouped) and a
/// two-question choice set that can be fully mastered.
///
/// Correct option keys start with `right`; ordering items are solved in
/// `key-1, key-2, key-3` order.
fn fixtures() -> Value {
    json!({
        "canonical_sets": [
            {
                "_id": "set-mixed",
                "unit_id": MIXED_UNIT,
                "hierarchy": [
                    { "type": "question", "id": "q1" },
                    { "type": "question_group", "id": "g1", "children_ids": ["q2", "q3"] },
                    { "type": "question", "id": "q4" },
                    { "type": "question", "id": "q5" }
                ],
                "questions": [
                    {
                        "external_id": "q1",
                        "kind": "multiple_choice",
                        "stem": "Capital of France?",
                        "point": 2,
                        "options": [
                            { "key": "right", "text": "Paris", "correctness": true },
                            { "key": "wrong-1", "text": "Rome" },
                            { "key": "wrong-2", "text": "Madrid" }
                        ]
                    },
                    {
                        "external_id": "q2",
                        "kind": "multiple_answer",
                        "stem": "Pick the prime numbers",
                        "point": 1,
                        "group_id": "g1",
                        "options": [
                            { "key": "right-1", "text": "2", "correctness": true },
                            { "key": "right-2", "text": "3", "correctness": true },
                            { "key": "wrong-1", "text": "4" }
                        ]
                    },
                    {
                        "external_id": "q3",
                        "kind": "fill_in_blank",
                        "stem": "___ is the capital of France, ___ of Germany",
                        "point": 1,
                        "group_id": "g1",
                        "options": [
                            { "key": "b1", "text": "Paris", "correctness": true },
                            { "key": "b2", "text": "Berlin", "correctness": true }
                        ]
                    },
                    {
                        "external_id": "q4",
                        "kind": "ordering",
                        "stem": "Order from smallest to largest",
                        "point": 1,
                        "options": [
                            { "key": "key-1", "text": "one" },
                            { "key": "key-2", "text": "two" },
                            { "key": "key-3", "text": "three" }
                        ]
                    },
                    {
                        "external_id": "q5",
                        "kind": "essay",
                        "stem": "Describe your favourite city",
                        "point": 3
                    }
                ]
            },
            {
                "_id": "set-choice",
                "unit_id": CHOICE_UNIT,
                "hierarchy": [
                    { "type": "question", "id": "c1" },
                    { "type": "question", "id": "c2" }
                ],
                "questions": [
                    {
                        "external_id": "c1",
                        "kind": "multiple_choice",
                        "point": 1,
                        "options": [
                            { "key": "right", "text": "yes", "correctness": true },
                            { "key": "wrong-1", "text": "no" }
                        ]
                    },
                    {
                        "external_id": "c2",
                        "kind": "multiple_choice",
                        "point": 1,
                        "options": [
                            { "key": "wrong-1", "text": "no" },
                            { "key": "right", "text": "yes", "correctness": true },
                            { "key": "wrong-2", "text": "maybe" }
                        ]
                    }
                ]
            }
        ],
        "question_groups": [
            { "_id": "g1", "name": "Geography and numbers", "description": "Shared passage" }
        ]
    })
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(body) => Body::from(body.to_string()),
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, json)
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(body)).await
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, None).await
}

pub fn new_session() -> String {
    Uuid::new_v4().to_string()
}

/// Creates an attempt and returns its whole ordering as one page.
pub async fn create_attempt(app: &Router, unit_id: &str, student_id: &str) -> Value {
    let (status, page) = create_attempt_in_session(app, unit_id, student_id, &new_session()).await;
    assert_eq!(status, StatusCode::OK, "create attempt failed: {}", page);
    page
}

pub async fn create_attempt_in_session(
    app: &Router,
    unit_id: &str,
    student_id: &str,
    session_id: &str,
) -> (StatusCode, Value) {
    post_json(
        app,
        &format!("/api/v1/units/{}/attempts", unit_id),
        json!({
            "student_id": student_id,
            "session_id": session_id,
            "paging": { "offset": 1, "limit": 50 }
        }),
    )
    .await
}

pub async fn create_retry(
    app: &Router,
    unit_id: &str,
    student_id: &str,
    prior_attempt_id: &str,
) -> (StatusCode, Value) {
    post_json(
        app,
        &format!("/api/v1/units/{}/retry-attempts", unit_id),
        json!({
            "student_id": student_id,
            "session_id": new_session(),
            "prior_attempt_id": prior_attempt_id,
            "paging": { "offset": 1, "limit": 50 }
        }),
    )
    .await
}

pub async fn grade(app: &Router, attempt_id: &str, question_id: &str, answer: Value) -> (StatusCode, Value) {
    post_json(
        app,
        &format!("/api/v1/attempts/{}/answers", attempt_id),
        json!({ "question_id": question_id, "answer": answer }),
    )
    .await
}

pub fn item<'a>(page: &'a Value, question_id: &str) -> &'a Value {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["external_id"] == question_id)
        .unwrap_or_else(|| panic!("question {} not on page", question_id))
}

pub fn item_ids(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["external_id"].as_str().unwrap().to_string())
        .collect()
}

fn positions(item: &Value, prefix: &str) -> Vec<u32> {
    item["options"]
        .as_array()
        .unwrap()
        .iter()
        .enumerate()
        .filter(|(_, option)| option["key"].as_str().unwrap().starts_with(prefix))
        .map(|(d, _)| d as u32 + 1)
        .collect()
}

/// A fully correct answer for a displayed item of the fixtures.
pub fn correct_answer(item: &Value) -> Value {
    match item["kind"].as_str().unwrap() {
        "multiple_choice" | "multiple_answer" => {
            json!({ "format": "selected_index", "values": positions(item, "right") })
        }
        "fill_in_blank" => json!({ "format": "filled_text", "values": ["Paris", "Berlin"] }),
        "ordering" => json!({ "format": "submitted_key", "values": ["key-1", "key-2", "key-3"] }),
        "essay" => json!({ "format": "free_text", "values": "Lisbon, for the light." }),
        other => panic!("no fixture answer for kind {}", other),
    }
}

/// An answer that is graded but not accepted.
pub fn wrong_answer(item: &Value) -> Value {
    match item["kind"].as_str().unwrap() {
        "multiple_choice" | "multiple_answer" => {
            json!({ "format": "selected_index", "values": [positions(item, "wrong")[0]] })
        }
        "fill_in_blank" => json!({ "format": "filled_text", "values": ["Lyon", "Berlin"] }),
        "ordering" => json!({ "format": "submitted_key", "values": ["key-3", "key-2", "key-1"] }),
        "essay" => json!({ "format": "free_text", "values": "No idea." }),
        other => panic!("no fixture answer for kind {}", other),
    }
}
