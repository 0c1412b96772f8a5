// src/api/handlers.rs
// HTTP handlers: thin adapters between the wire and the orchestrator.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{
    ChatReply, ChatRequest, CompareMethodsResponse, RecommendRequest, ResetRequest, ResetResponse,
    SearchProductsResponse, SearchRequest,
};
use crate::config::RankingMethod;
use crate::error::ServiceError;
use crate::session::SessionState;
use crate::state::AppState;

/// POST /chat
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }
    let reply = state.orchestrator.chat(&request).await?;
    Ok(Json(reply))
}

#[derive(Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub active_domain: Option<String>,
    pub stage: crate::session::Stage,
    pub filters: crate::data::product::FilterMap,
    pub agent_filters: crate::data::product::FilterMap,
    pub questions_asked: Vec<String>,
    pub question_count: usize,
    pub conversation_length: usize,
    pub last_recommendation_ids: Vec<String>,
    pub favorite_product_ids: Vec<String>,
    pub session_intent: Option<crate::session::SessionIntent>,
    pub step_intent: Option<crate::session::StepIntent>,
}

impl SessionSnapshot {
    fn from_state(session_id: String, state: SessionState) -> Self {
        Self {
            session_id,
            active_domain: state.active_domain,
            stage: state.stage,
            filters: state.explicit_filters,
            agent_filters: state.agent_filters,
            questions_asked: state.questions_asked,
            question_count: state.question_count,
            conversation_length: state.conversation_history.len(),
            last_recommendation_ids: state.last_recommendation_ids,
            favorite_product_ids: state.favorite_product_ids,
            session_intent: state.session_intent,
            step_intent: state.step_intent,
        }
    }
}

/// GET /session/{id}
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    let session = state.sessions.get(&session_id).await;
    Ok(Json(SessionSnapshot::from_state(session_id, session)))
}

/// POST /session/reset
pub async fn reset_session_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetRequest>,
) -> ApiResult<Json<ResetResponse>> {
    let session_id = request.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    state.sessions.reset(&session_id).await;
    Ok(Json(ResetResponse {
        session_id,
        status: "reset".into(),
    }))
}

/// POST /search — the raw hybrid-search envelope.
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SearchProductsResponse>> {
    let response = state.hybrid.search_products(&request).await?;
    Ok(Json(response))
}

/// GET /product/{id}
pub async fn get_product_handler(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> ApiResult<Json<crate::data::product::Product>> {
    let key = crate::cache::product_key(&product_id);
    if let Some(product) = state.cache.get_json(&key).await {
        return Ok(Json(product));
    }
    let product = crate::error::retry_once(|| state.products.get(&product_id))
        .await?
        .ok_or(ServiceError::ProductNotFound(product_id.clone()))?;
    state.cache.set_json(&key, &product, None).await;
    Ok(Json(product))
}

/// POST /recommend — direct vehicle recommendation, interview bypassed.
pub async fn recommend_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecommendRequest>,
) -> ApiResult<Json<crate::api::types::RecommendResponse>> {
    let response = state.orchestrator.recommend(&request).await?;
    Ok(Json(response))
}

/// POST /recommend/compare — run both ranking methods on one request.
pub async fn recommend_compare_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecommendRequest>,
) -> ApiResult<Json<CompareMethodsResponse>> {
    let mut coverage = request.clone();
    coverage.method = Some(RankingMethod::CoverageRisk.as_str().to_string());
    let mut embedding = request.clone();
    embedding.method = Some(RankingMethod::EmbeddingSimilarity.as_str().to_string());

    let coverage_risk = state.orchestrator.recommend(&coverage).await?;
    let embedding_similarity = state.orchestrator.recommend(&embedding).await?;
    info!(
        "Method comparison: coverage_risk={} rows, embedding_similarity={} rows",
        coverage_risk.recommendations.len(),
        embedding_similarity.recommendations.len()
    );
    Ok(Json(CompareMethodsResponse {
        coverage_risk,
        embedding_similarity,
    }))
}

/// GET /status — config snapshot, ready flags, preload timings.
pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let preload = state.preload_report.read().await.clone();
    Json(json!({
        "config": {
            "k": state.config.interview.k,
            "method": state.config.recommendation.method.as_str(),
            "n_rows": state.config.diversification.n_rows,
            "n_per_row": state.config.diversification.n_per_row,
            "latency_target_ms": state.config.server.latency_target_ms,
            "use_mmr_diversification": state.config.recommendation.use_mmr_diversification,
            "use_entropy_bucketing": state.config.diversification.use_entropy_bucketing,
            "use_progressive_relaxation": state.config.recommendation.use_progressive_relaxation,
            "use_entropy_questions": state.config.interview.use_entropy_questions,
        },
        "ready": {
            "phrase_store": state.phrase_store.is_ready(),
            "dense_index": state.dense.is_ready(),
            "cache": state.cache.is_available(),
            "graph_store": state.graph.is_available(),
            "llm": state.provider.is_available(),
        },
        "preload_timings_s": preload,
    }))
}

/// GET /health — liveness for load balancers: db ping plus core ready flags.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = state.products.ping().await.is_ok();
    let body = json!({
        "status": if db_ok { "healthy" } else { "unhealthy" },
        "db": if db_ok { "ok" } else { "error" },
        "phrase_store": if state.phrase_store.is_ready() { "ok" } else { "loading" },
    });
    if db_ok {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}
