// tests/recommend_grid_test.rs
// Vehicle recommendation pipeline end-to-end: relaxation, coverage-risk
// ranking over primed phrase embeddings, and the bucketed output grid.

mod common;

use serde_json::json;
use showroom::api::types::RecommendRequest;
use showroom::data::product::ImplicitPreferences;

fn request(filters: showroom::data::product::FilterMap, preferences: ImplicitPreferences) -> RecommendRequest {
    RecommendRequest {
        session_id: None,
        filters,
        preferences,
        method: Some("coverage_risk".into()),
        n_rows: Some(3),
        n_per_row: Some(3),
    }
}

#[tokio::test]
async fn test_coverage_risk_ranks_best_aligned_vehicle_first() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_vehicles(&state).await;
    common::seed_phrase_alignment(&state).await;

    let preferences = ImplicitPreferences {
        use_case: None,
        liked_features: vec!["spacious".into(), "fuel efficient".into()],
        disliked_features: vec!["poor reliability".into()],
    };
    let response = state
        .orchestrator
        .recommend(&request(
            common::filters(&[("body_style", json!("SUV")), ("price", json!("0-35000"))]),
            preferences,
        ))
        .await
        .unwrap();

    assert_eq!(response.method_used, "coverage_risk");
    assert!(response.total_candidates >= 3);

    let flat: Vec<_> = response.recommendations.iter().flatten().collect();
    assert!(!flat.is_empty());

    // Greedy rank 1 must be the CR-V: it covers both liked features with no
    // reliability complaints
    let top = flat
        .iter()
        .find(|p| p.ranking.rank == Some(1))
        .expect("rank 1 present");
    assert_eq!(top.id, "VIN-CRV");
    assert!(top.ranking.pos_score.unwrap() > 0.0);

    // Only SUVs in budget, and every VIN appears once
    let mut seen = std::collections::HashSet::new();
    for p in &flat {
        let v = p.vehicle.as_ref().unwrap();
        assert_eq!(v.body_style.as_deref(), Some("SUV"));
        assert!(v.price.unwrap() <= 35_000);
        assert!(seen.insert(p.id.clone()));
    }

    // Grid shape
    assert_eq!(response.recommendations.len(), response.bucket_labels.len());
    for row in &response.recommendations {
        assert!(row.len() <= 3);
    }
}

#[tokio::test]
async fn test_impossible_filters_relax_before_failing() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_vehicles(&state).await;

    // No pink SUVs exist: the cosmetic filter relaxes away and real SUVs
    // come back
    let response = state
        .orchestrator
        .recommend(&request(
            common::filters(&[
                ("body_style", json!("SUV")),
                ("exterior_color", json!("Pink")),
            ]),
            ImplicitPreferences::default(),
        ))
        .await
        .unwrap();
    assert!(response.total_candidates > 0);
    let flat: Vec<_> = response.recommendations.iter().flatten().collect();
    assert!(flat
        .iter()
        .all(|p| p.vehicle.as_ref().unwrap().body_style.as_deref() == Some("SUV")));
}

#[tokio::test]
async fn test_diversification_dimension_not_user_constrained() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_vehicles(&state).await;

    let response = state
        .orchestrator
        .recommend(&request(
            common::filters(&[("body_style", json!("SUV"))]),
            ImplicitPreferences::default(),
        ))
        .await
        .unwrap();
    let dimension = response.diversification_dimension.unwrap();
    assert_ne!(dimension, "body_style");
}

#[tokio::test]
async fn test_method_comparison_runs_both_engines() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path()).await;
    common::seed_vehicles(&state).await;
    common::seed_phrase_alignment(&state).await;

    let base = request(
        common::filters(&[("body_style", json!("SUV"))]),
        ImplicitPreferences {
            liked_features: vec!["spacious".into()],
            ..Default::default()
        },
    );

    let mut coverage = base.clone();
    coverage.method = Some("coverage_risk".into());
    let cr = state.orchestrator.recommend(&coverage).await.unwrap();
    assert_eq!(cr.method_used, "coverage_risk");

    let mut embedding = base.clone();
    embedding.method = Some("embedding_similarity".into());
    let es = state.orchestrator.recommend(&embedding).await.unwrap();
    assert_eq!(es.method_used, "embedding_similarity");
    // Dense index isn't loaded in tests: the engine degrades to SQL order
    // but still produces a grid
    assert!(es.recommendations.iter().flatten().count() > 0);
}
