// tests/interview_flow_test.rs
// End-to-end interview behaviour through the chat orchestrator: question
// ordering, the question budget, impatience, and the session invariants.

mod common;

use showroom::api::types::{ChatRequest, ResponseType};
use showroom::session::Stage;

fn chat(message: &str, session_id: Option<String>) -> ChatRequest {
    ChatRequest {
        message: message.to_string(),
        session_id,
        k: Some(3),
        n_rows: Some(3),
        n_per_row: Some(3),
        method: None,
    }
}

#[tokio::test]
async fn test_laptop_interview_use_case_then_budget_then_brand() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_catalog(&state).await;

    // Turn 1: generic ask -> use_case question
    let reply = state.orchestrator.chat(&chat("I want a laptop", None)).await.unwrap();
    assert_eq!(reply.response_type, ResponseType::Question);
    assert_eq!(reply.question_count, 1);
    let session_id = Some(reply.session_id.clone());
    let session = state.sessions.get(reply.session_id.as_str()).await;
    assert_eq!(session.questions_asked, vec!["use_case"]);

    // Turn 2: answer -> budget question
    let reply = state.orchestrator.chat(&chat("gaming", session_id.clone())).await.unwrap();
    assert_eq!(reply.response_type, ResponseType::Question);
    assert_eq!(reply.question_count, 2);
    let session = state.sessions.get(reply.session_id.as_str()).await;
    assert_eq!(session.questions_asked.last().unwrap(), "budget");

    // Turn 3: budget answer -> brand question (k=3 not yet spent)
    let reply = state.orchestrator.chat(&chat("under 1500", session_id.clone())).await.unwrap();
    assert_eq!(reply.response_type, ResponseType::Question);
    assert_eq!(reply.question_count, 3);
    let session = state.sessions.get(reply.session_id.as_str()).await;
    assert_eq!(session.questions_asked.last().unwrap(), "brand");

    // Turn 4: brand answer -> recommendations with accumulated filters
    let reply = state.orchestrator.chat(&chat("Dell", session_id.clone())).await.unwrap();
    assert_eq!(reply.response_type, ResponseType::Recommendations);
    assert_eq!(reply.filters.get("brand").and_then(|v| v.as_str()), Some("Dell"));
    assert_eq!(
        reply.filters.get("price_max_cents").and_then(|v| v.as_i64()),
        Some(150_000)
    );
    assert_eq!(
        reply.filters.get("subcategory").and_then(|v| v.as_str()),
        Some("Gaming")
    );

    // Grid shape invariant: n_rows rows, each row at most n_per_row, no dupes
    let grid = reply.recommendations.as_ref().unwrap();
    assert!(grid.len() <= 3);
    let mut seen = std::collections::HashSet::new();
    for row in grid {
        assert!(row.len() <= 3);
        for product in row {
            assert!(seen.insert(product.id.clone()), "duplicate {}", product.id);
        }
    }

    // Session invariants after the cycle
    let session = state.sessions.get(reply.session_id.as_str()).await;
    assert!(session.question_count <= 3);
    assert_eq!(session.question_count, session.questions_asked.len());
    assert_eq!(session.stage, Stage::Recommendations);
}

#[tokio::test]
async fn test_impatience_short_circuits_interview() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_catalog(&state).await;

    let reply = state.orchestrator.chat(&chat("I want a laptop", None)).await.unwrap();
    let session_id = Some(reply.session_id.clone());
    assert_eq!(reply.response_type, ResponseType::Question);

    // Impatient answer skips the remaining questions entirely
    let reply = state
        .orchestrator
        .chat(&chat("just show me options", session_id))
        .await
        .unwrap();
    assert_eq!(reply.response_type, ResponseType::Recommendations);
}

#[tokio::test]
async fn test_unrecognised_intent_asks_for_category() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;

    let reply = state
        .orchestrator
        .chat(&chat("surprise me with something", None))
        .await
        .unwrap();
    assert_eq!(reply.response_type, ResponseType::Question);
    let replies = reply.quick_replies.unwrap();
    assert!(replies.contains(&"Laptops".to_string()));
    assert!(replies.contains(&"Books".to_string()));
}

#[tokio::test]
async fn test_question_count_never_exceeds_k() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_catalog(&state).await;

    let mut session_id: Option<String> = None;
    // Keep giving non-answers; the interview must cap at k questions
    for turn in ["I want a laptop", "hmm not sure really", "maybe something nice", "you pick"] {
        let reply = state.orchestrator.chat(&chat(turn, session_id.clone())).await.unwrap();
        session_id = Some(reply.session_id.clone());
        let session = state.sessions.get(reply.session_id.as_str()).await;
        assert!(session.question_count <= 3);
        assert_eq!(session.question_count, session.questions_asked.len());
    }
}
