// src/rank/embedding_sim.rs
// Dense-embedding similarity ranking with clustered-MMR diversification.

use tracing::{info, warn};

use crate::data::product::{FilterMap, ImplicitPreferences, Product};
use crate::embedding::dense_store::{DenseEmbeddingStore, QueryMethod};
use crate::error::Result;

use super::mmr::diversify_with_clustered_mmr;

#[derive(Debug, Clone)]
pub struct EmbeddingSimilarityParams {
    pub top_k: usize,
    pub lambda: f64,
    pub cluster_size: usize,
    pub use_mmr: bool,
    pub method: QueryMethod,
}

impl Default for EmbeddingSimilarityParams {
    fn default() -> Self {
        Self {
            top_k: 100,
            lambda: 0.85,
            cluster_size: 3,
            use_mmr: true,
            method: QueryMethod::Sum,
        }
    }
}

/// Individual feature strings for the sum-of-features query embedding.
pub fn extract_query_features(
    explicit_filters: &FilterMap,
    preferences: &ImplicitPreferences,
) -> Vec<String> {
    let get = |key: &str| {
        explicit_filters
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    };

    let mut features = Vec::new();

    let identity: Vec<String> = ["make", "model", "trim", "brand"]
        .iter()
        .filter_map(|k| get(k))
        .collect();
    if !identity.is_empty() {
        features.push(identity.join(" "));
    }

    if let Some(body) = get("body_style") {
        features.push(format!("{body} body style"));
    }
    if let Some(fuel) = get("fuel_type") {
        features.push(format!("{fuel} fuel"));
    }
    if let Some(drive) = get("drivetrain") {
        features.push(format!("{drive} drivetrain"));
    }
    if let Some(sub) = get("subcategory") {
        features.push(format!("for {sub}"));
    }
    if let Some(genre) = get("genre") {
        features.push(format!("{genre} genre"));
    }
    match explicit_filters.get("is_used").and_then(|v| v.as_bool()) {
        Some(true) => features.push("used vehicle".into()),
        Some(false) => features.push("new vehicle".into()),
        None => {}
    }

    if let Some(use_case) = &preferences.use_case {
        features.push(use_case.clone());
    }
    for liked in &preferences.liked_features {
        if !liked.is_empty() {
            features.push(liked.clone());
        }
    }

    features
}

/// Rank SQL-narrowed candidates by dense similarity, then diversify with
/// clustered MMR when the pool is larger than the cut.
pub async fn rank_with_embedding_similarity(
    products: Vec<Product>,
    dense_store: &DenseEmbeddingStore,
    explicit_filters: &FilterMap,
    preferences: &ImplicitPreferences,
    params: &EmbeddingSimilarityParams,
) -> Result<Vec<Product>> {
    if products.is_empty() {
        warn!("No products to rank");
        return Ok(products);
    }

    let features = extract_query_features(explicit_filters, preferences);
    if features.is_empty() {
        warn!("No query features; returning products in SQL order");
        return Ok(products.into_iter().take(params.top_k).collect());
    }
    info!(
        "Embedding similarity: {} candidates, {} query features",
        products.len(),
        features.len()
    );

    let ids: Vec<String> = products.iter().map(|p| p.id.clone()).collect();
    let (ranked_ids, scores) = dense_store
        .search_by_ids(&ids, &features, None, params.method)
        .await?;

    let mut by_id: std::collections::HashMap<String, Product> =
        products.into_iter().map(|p| (p.id.clone(), p)).collect();

    let mut ranked: Vec<(f64, Product)> = Vec::with_capacity(ranked_ids.len());
    for (id, score) in ranked_ids.iter().zip(scores) {
        if let Some(mut product) = by_id.remove(id) {
            product.ranking.dense_score = Some(score as f64);
            ranked.push((score as f64, product));
        }
    }

    let mut out = if params.use_mmr && ranked.len() > params.top_k {
        diversify_with_clustered_mmr(ranked, params.top_k, params.cluster_size, params.lambda)
    } else {
        ranked
            .into_iter()
            .take(params.top_k)
            .map(|(_, p)| p)
            .collect()
    };

    for (i, product) in out.iter_mut().enumerate() {
        product.ranking.rank = Some(i as u32 + 1);
        product.ranking.similarity_score = product.ranking.dense_score;
    }

    info!("Embedding similarity: returning {} ranked products", out.len());
    Ok(out)
}
