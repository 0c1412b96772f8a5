// tests/http_api_test.rs
// Router-level smoke tests through tower's oneshot, no socket needed.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use showroom::api::http_router;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_and_status() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    let router = http_router(state);

    let response = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");

    let response = router
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["config"]["k"], 3);
    assert_eq!(body["ready"]["cache"], false);
}

#[tokio::test]
async fn test_chat_endpoint_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_catalog(&state).await;
    let router = http_router(state);

    let response = router
        .clone()
        .oneshot(post("/api/chat", json!({"message": "I want a laptop"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["response_type"], "question");
    assert_eq!(body["question_count"], 1);
    let session_id = body["session_id"].as_str().unwrap().to_string();

    // Session snapshot reflects the turn
    let response = router
        .clone()
        .oneshot(
            Request::get(format!("/api/session/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["question_count"], 1);
    assert_eq!(body["active_domain"], "laptops");

    // Reset brings the session back to a clean interview
    let response = router
        .clone()
        .oneshot(post("/api/session/reset", json!({"session_id": session_id})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::get(format!("/api/session/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["question_count"], 0);
    assert_eq!(body["stage"], "INTERVIEW");
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    let router = http_router(state);

    let response = router
        .oneshot(post("/chat", json!({"message": "  "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_product_not_found_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    let router = http_router(state);

    let response = router
        .oneshot(Request::get("/api/product/ghost").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_endpoint_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_catalog(&state).await;
    let router = http_router(state);

    let response = router
        .oneshot(post(
            "/api/search",
            json!({"query": "", "filters": {"category": "Books"}, "limit": 12}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "OK");
    assert!(body["data"]["total_count"].as_i64().unwrap() > 0);
    assert!(body["trace"]["request_id"].is_string());
    assert_eq!(body["trace"]["chosen_category"], "Books");
}
