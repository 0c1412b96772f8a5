// tests/search_pipeline_test.rs
// Hybrid search behaviour: the interview gate ordering, category guardrail,
// relaxation ladder, validation outcomes, and pagination.

mod common;

use serde_json::json;
use showroom::api::types::{ResponseStatus, SearchRequest};

fn search(query: &str, filters: showroom::data::product::FilterMap, session: Option<&str>) -> SearchRequest {
    SearchRequest {
        query: query.to_string(),
        filters,
        limit: 12,
        cursor: None,
        session_id: session.map(String::from),
        skip_interview: false,
    }
}

#[tokio::test]
async fn test_gate_asks_use_case_then_price_then_brand() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_catalog(&state).await;

    // Turn 1: bare "laptops" -> follow-up question on use_case
    let response = state
        .hybrid
        .search_products(&search("laptops", Default::default(), Some("gate-1")))
        .await
        .unwrap();
    assert_eq!(response.status, ResponseStatus::Invalid);
    let constraint = &response.constraints[0];
    assert_eq!(constraint.code, "FOLLOWUP_QUESTION_REQUIRED");
    let details = constraint.details.as_ref().unwrap();
    assert_eq!(details["topic"], "use_case");
    assert_eq!(details["domain"], "laptops");

    // Turn 2: quick reply set use_case -> price question, fixed phrasing
    let response = state
        .hybrid
        .search_products(&search(
            "laptops",
            common::filters(&[("category", json!("Electronics")), ("use_case", json!("Gaming"))]),
            Some("gate-1"),
        ))
        .await
        .unwrap();
    let details = response.constraints[0].details.as_ref().unwrap();
    assert_eq!(details["topic"], "price");
    assert_eq!(details["question"], "What's your budget?");

    // Turn 3: budget quick reply (whole dollars) -> brand question
    let response = state
        .hybrid
        .search_products(&search(
            "laptops",
            common::filters(&[
                ("category", json!("Electronics")),
                ("use_case", json!("Gaming")),
                ("price_max_cents", json!(1500)),
            ]),
            Some("gate-1"),
        ))
        .await
        .unwrap();
    let details = response.constraints[0].details.as_ref().unwrap();
    assert_eq!(details["topic"], "brand");

    // Turn 4: everything known -> real results, dollars scaled to cents
    let response = state
        .hybrid
        .search_products(&search(
            "laptops",
            common::filters(&[
                ("category", json!("Electronics")),
                ("use_case", json!("Gaming")),
                ("price_max_cents", json!(1500)),
                ("brand", json!("Dell")),
            ]),
            Some("gate-1"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status, ResponseStatus::Ok);
    assert!(response.data.total_count > 0);
    assert!(response.data.products.iter().all(|p| p.brand.as_deref() == Some("Dell")));
}

#[tokio::test]
async fn test_multi_constraint_query_bypasses_interview() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_catalog(&state).await;

    // Brand + price + use-case in one query: no follow-up question
    let response = state
        .hybrid
        .search_products(&search("dell gaming laptop under $1500", Default::default(), Some("s2")))
        .await
        .unwrap();
    assert!(response
        .constraints
        .iter()
        .all(|c| c.code != "FOLLOWUP_QUESTION_REQUIRED"));
}

#[tokio::test]
async fn test_category_guardrail_no_cross_domain_leak() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_catalog(&state).await;

    let response = state
        .hybrid
        .search_products(&search(
            "",
            common::filters(&[("category", json!("Books"))]),
            None,
        ))
        .await
        .unwrap();
    assert!(response.data.total_count > 0);
    for product in &response.data.products {
        assert_eq!(product.category.as_deref(), Some("Books"));
    }
}

#[tokio::test]
async fn test_relaxation_ladder_drops_color() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_catalog(&state).await;

    // A colour mentioned in THIS query is a hard constraint: zero results
    // come back with the colour-family message, not silently relaxed rows
    let response = state
        .hybrid
        .search_products(&search("pink mac laptop", Default::default(), None))
        .await
        .unwrap();
    assert_eq!(response.data.total_count, 0);
    let constraint = &response.constraints[0];
    assert_eq!(constraint.code, "NO_MATCHING_PRODUCTS");
    assert!(constraint.message.contains("Pink"));
    assert!(constraint
        .suggested_actions
        .iter()
        .any(|a| a.contains("Any color")));
}

#[tokio::test]
async fn test_relaxed_search_recovers_from_dead_keyword() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_catalog(&state).await;

    // Exhaust the interview budget so the gate steps aside
    for topic in ["use_case", "price", "brand"] {
        state.sessions.add_question_asked("relax-1", topic).await;
    }

    // Keyword text that matches nothing, inside a real category: the ladder
    // drops the text constraint and returns category results, flagged as
    // relaxed in the trace
    let response = state
        .hybrid
        .search_products(&search(
            "quantum flux capacitor",
            common::filters(&[
                ("category", json!("Electronics")),
                ("use_case", json!("Gaming")),
                ("price_max_cents", json!(200_000)),
            ]),
            Some("relax-1"),
        ))
        .await
        .unwrap();
    assert!(response.data.total_count > 0);
    assert_eq!(response.trace.metadata["relaxed"], json!(true));
    assert!(response
        .data
        .products
        .iter()
        .all(|p| p.category.as_deref() == Some("Electronics")));
}

#[tokio::test]
async fn test_invalid_short_query() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_catalog(&state).await;

    let response = state
        .hybrid
        .search_products(&search("xy", Default::default(), None))
        .await
        .unwrap();
    assert_eq!(response.status, ResponseStatus::Invalid);
    assert_eq!(response.constraints[0].code, "INVALID_QUERY");
}

#[tokio::test]
async fn test_pagination_cursor_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_catalog(&state).await;

    let mut request = search("", common::filters(&[("category", json!("Electronics"))]), None);
    request.limit = 2;
    let page1 = state.hybrid.search_products(&request).await.unwrap();
    assert_eq!(page1.data.products.len(), 2);
    assert_eq!(page1.data.next_cursor.as_deref(), Some("2"));

    request.cursor = page1.data.next_cursor.clone();
    let page2 = state.hybrid.search_products(&request).await.unwrap();
    assert!(!page2.data.products.is_empty());
    // No overlap across pages
    for p in &page2.data.products {
        assert!(page1.data.products.iter().all(|q| q.id != p.id));
    }
    // Window past the end has no cursor
    if page2.data.next_cursor.is_none() {
        assert!(page1.data.total_count <= 4);
    }
}

#[tokio::test]
async fn test_greeting_returns_category_pick() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;

    let response = state
        .hybrid
        .search_products(&search("hello", Default::default(), None))
        .await
        .unwrap();
    let constraint = &response.constraints[0];
    assert_eq!(constraint.code, "FOLLOWUP_QUESTION_REQUIRED");
    assert_eq!(constraint.details.as_ref().unwrap()["question_id"], "category");
    assert!(constraint.suggested_actions.contains(&"Laptops".to_string()));
}
