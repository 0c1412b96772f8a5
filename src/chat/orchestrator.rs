// src/chat/orchestrator.rs
// End-to-end glue for one conversational turn: session load, interview vs
// post-recommendation dispatch, the search->rank->diversify pipeline, and a
// uniform reply envelope. State is persisted before every return.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::types::{
    ChatReply, ChatRequest, RecommendRequest, RecommendResponse, ResponseType, SearchRequest,
};
use crate::config::{Config, RankingMethod};
use crate::data::product::{FilterMap, ImplicitPreferences, Product};
use crate::data::vehicle_store::VehicleStore;
use crate::diversify::{bucket_products, select_diversification_dimension, BucketedGrid};
use crate::embedding::{DenseEmbeddingStore, PhraseStore};
use crate::error::Result;
use crate::interview::agent::{build_search_filters, AgentOutcome, UniversalAgent};
use crate::interview::question::{generate_dimension_question, recommendation_intro};
use crate::interview::entropy_select::select_question_dimension;
use crate::llm::ChatProvider;
use crate::rank::{
    rank_with_coverage_risk, rank_with_embedding_similarity, AggregationMode, CoverageRiskParams,
    EmbeddingSimilarityParams, RelaxationState,
};
use crate::search::{progressive_filter_relaxation, HybridSearch};
use crate::session::{ChatMessage, SessionManager, SessionState, Stage};

use super::intent::{classify_post_rec, PostRecIntent};
use super::narrator::generate_comparison;

/// Per-turn knobs resolved from the request with config defaults.
struct TurnParams {
    k: usize,
    n_rows: usize,
    n_per_row: usize,
    method: RankingMethod,
}

pub struct ChatOrchestrator {
    sessions: Arc<SessionManager>,
    provider: Arc<ChatProvider>,
    hybrid: Arc<HybridSearch>,
    vehicles: Arc<VehicleStore>,
    phrase_store: Arc<PhraseStore>,
    dense: Arc<DenseEmbeddingStore>,
    config: Arc<Config>,
}

impl ChatOrchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        provider: Arc<ChatProvider>,
        hybrid: Arc<HybridSearch>,
        vehicles: Arc<VehicleStore>,
        phrase_store: Arc<PhraseStore>,
        dense: Arc<DenseEmbeddingStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            sessions,
            provider,
            hybrid,
            vehicles,
            phrase_store,
            dense,
            config,
        }
    }

    fn turn_params(&self, request: &ChatRequest) -> TurnParams {
        TurnParams {
            k: request.k.unwrap_or(self.config.interview.k),
            n_rows: request.n_rows.unwrap_or(self.config.diversification.n_rows),
            n_per_row: request.n_per_row.unwrap_or(self.config.diversification.n_per_row),
            method: request
                .method
                .as_deref()
                .map(RankingMethod::parse)
                .unwrap_or(self.config.recommendation.method),
        }
    }

    /// One chat turn. Never errors out to the transport for business
    /// outcomes; only infrastructure failures propagate.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let params = self.turn_params(request);

        let state = self.sessions.get(&session_id).await;
        info!(
            "Chat turn: session={}, stage={:?}, domain={:?}",
            session_id, state.stage, state.active_domain
        );

        let reply = match state.stage {
            Stage::Recommendations | Stage::Checkout => {
                self.post_recommendation_turn(&session_id, state, request, &params)
                    .await?
            }
            Stage::Interview => {
                self.interview_turn(&session_id, state, &request.message, &params)
                    .await?
            }
        };

        Ok(reply)
    }

    async fn interview_turn(
        &self,
        session_id: &str,
        mut state: SessionState,
        message: &str,
        params: &TurnParams,
    ) -> Result<ChatReply> {
        let agent = UniversalAgent::new(self.provider.clone(), params.k);
        let outcome = agent.process_message(&mut state, message).await;
        self.save_state(session_id, &state).await;

        match outcome {
            AgentOutcome::CategoryPick { message, quick_replies } => {
                let mut reply = ChatReply::new(ResponseType::Question, message, session_id);
                reply.quick_replies = Some(quick_replies);
                reply.filters = state.agent_filters.clone();
                reply.question_count = state.question_count;
                Ok(reply)
            }
            AgentOutcome::Question(question) => {
                // Vehicle MEDIUM phase may swap in an entropy-chosen question,
                // except the budget slot which is always asked as generated
                let question = self.maybe_entropy_question(&mut state, question).await;
                self.save_state(session_id, &state).await;

                let mut reply =
                    ChatReply::new(ResponseType::Question, question.question.clone(), session_id);
                reply.quick_replies = Some(question.quick_replies);
                reply.filters = state.agent_filters.clone();
                reply.question_count = state.question_count;
                reply.domain = state.active_domain.clone();
                Ok(reply)
            }
            AgentOutcome::Ready => self.run_search(session_id, state, message, params).await,
        }
    }

    /// Entropy-based question substitution for the vehicle MEDIUM phase:
    /// when all HIGH slots are filled and the proposed question is not the
    /// budget slot, ask about the highest-entropy unconstrained dimension
    /// instead. The budget override keeps scenario ordering deterministic.
    async fn maybe_entropy_question(
        &self,
        state: &mut SessionState,
        proposed: crate::llm::schemas::GeneratedQuestion,
    ) -> crate::llm::schemas::GeneratedQuestion {
        if !self.config.interview.use_entropy_questions
            || state.active_domain.as_deref() != Some("vehicles")
            || proposed.topic == "budget"
        {
            return proposed;
        }
        let schema = match crate::interview::slots::domain_schema("vehicles") {
            Some(schema) => schema,
            None => return proposed,
        };
        let high_filled = schema
            .slots_with_priority(crate::interview::slots::SlotPriority::High)
            .all(|slot| {
                state.agent_filters.get(slot.name).is_some_and(|v| !v.is_null())
                    || state.questions_asked.iter().any(|q| q == slot.name)
            });
        if !high_filled {
            return proposed;
        }

        let (filters, _) = build_search_filters(&state.agent_filters, "vehicles");
        let candidates = match self.vehicles.search_listings(&filters, 200).await {
            Ok(candidates) if candidates.len() >= 10 => candidates,
            _ => return proposed,
        };
        let dimension = match select_question_dimension(
            &candidates,
            &filters,
            &state.asked_dimensions,
            self.config.interview.min_entropy_threshold,
        ) {
            Some(dimension) => dimension,
            None => return proposed,
        };

        state.asked_dimensions.insert(dimension.clone());
        // The recorded topic must name what was actually asked so the next
        // turn's answer lands on the right key
        if let Some(last) = state.questions_asked.last_mut() {
            *last = dimension.clone();
        }
        let question = generate_dimension_question(&self.provider, &dimension, &candidates).await;
        info!("Entropy question replaced '{}' with dimension '{}'", proposed.topic, dimension);
        question
    }

    async fn post_recommendation_turn(
        &self,
        session_id: &str,
        mut state: SessionState,
        request: &ChatRequest,
        params: &TurnParams,
    ) -> Result<ChatReply> {
        let filters_text = state
            .agent_filters
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(", ");
        let decision = classify_post_rec(
            &self.provider,
            &request.message,
            state.active_domain.as_deref(),
            &filters_text,
        )
        .await;
        info!("Post-rec intent: {:?}", decision.intent);

        match decision.intent {
            PostRecIntent::Compare => {
                state.push_message(ChatMessage::user(&request.message));
                state.step_intent = Some(crate::session::StepIntent::Compare);
                let domain = state.active_domain.clone().unwrap_or_else(|| "laptops".into());
                let (narrative, _ids) = generate_comparison(
                    &self.provider,
                    &state.last_recommendation_data,
                    &request.message,
                    &domain,
                )
                .await;
                state.push_message(ChatMessage::assistant(&narrative));
                self.save_state(session_id, &state).await;

                let mut reply = ChatReply::new(ResponseType::Comparison, narrative, session_id);
                reply.filters = state.agent_filters.clone();
                reply.question_count = state.question_count;
                reply.domain = state.active_domain.clone();
                Ok(reply)
            }
            PostRecIntent::RefineFilters => {
                state.push_message(ChatMessage::user(&request.message));
                for item in &decision.updated_criteria {
                    state
                        .agent_filters
                        .insert(item.slot_name.clone(), json!(item.value));
                }
                // With no structured criteria from the router, let the agent
                // re-extract from the raw message
                if decision.updated_criteria.is_empty() {
                    let agent = UniversalAgent::new(self.provider.clone(), 0);
                    let _ = agent.process_message(&mut state, &request.message).await;
                }
                self.run_search(session_id, state, &request.message, params).await
            }
            PostRecIntent::NewSearch => {
                state.agent_filters.clear();
                state.explicit_filters.clear();
                state.questions_asked.clear();
                state.question_count = 0;
                state.asked_dimensions.clear();
                for item in &decision.updated_criteria {
                    state
                        .agent_filters
                        .insert(item.slot_name.clone(), json!(item.value));
                }
                state.push_message(ChatMessage::user(&request.message));
                self.run_search(session_id, state, &request.message, params).await
            }
            PostRecIntent::DomainSwitch => {
                info!(
                    "Domain switch to {:?}; resetting session {}",
                    decision.new_domain, session_id
                );
                self.sessions.reset(session_id).await;
                let mut fresh = SessionState::default();
                if let Some(domain) = &decision.new_domain {
                    fresh.active_domain = Some(domain.clone());
                }
                self.interview_turn(session_id, fresh, &request.message, params).await
            }
            PostRecIntent::Action => {
                state.push_message(ChatMessage::user(&request.message));
                self.save_state(session_id, &state).await;
                let mut reply = ChatReply::new(
                    ResponseType::Error,
                    "Checkout isn't wired up in this demo yet - but I can keep refining the list.",
                    session_id,
                );
                reply.filters = state.agent_filters.clone();
                reply.question_count = state.question_count;
                Ok(reply)
            }
            PostRecIntent::Other => {
                state.push_message(ChatMessage::user(&request.message));
                self.save_state(session_id, &state).await;
                let mut reply = ChatReply::new(
                    ResponseType::Question,
                    "Happy to help - you can ask me to compare the options, refine the search, or start over.",
                    session_id,
                );
                reply.quick_replies = Some(vec![
                    "Compare these".into(),
                    "Show cheaper options".into(),
                    "New search".into(),
                ]);
                reply.filters = state.agent_filters.clone();
                reply.question_count = state.question_count;
                Ok(reply)
            }
        }
    }

    /// The search pipeline: candidates -> ranking -> entropy dimension ->
    /// bucketed grid -> intro message.
    async fn run_search(
        &self,
        session_id: &str,
        mut state: SessionState,
        message: &str,
        params: &TurnParams,
    ) -> Result<ChatReply> {
        let domain = state.active_domain.clone().unwrap_or_else(|| "vehicles".into());
        let (mut filters, preferences) = build_search_filters(&state.agent_filters, &domain);
        // Quick-reply filters accumulated on the session still apply
        for (k, v) in &state.explicit_filters {
            filters.entry(k.clone()).or_insert(v.clone());
        }

        info!("Search handoff: domain={}, filters={:?}", domain, filters);

        let (grid, total) = if domain == "vehicles" {
            self.vehicle_pipeline(&filters, &preferences, params).await?
        } else {
            self.catalog_pipeline(session_id, &domain, &mut filters, &preferences, params)
                .await?
        };

        let flat: Vec<Product> = grid.buckets.iter().flatten().cloned().collect();
        if flat.is_empty() {
            state.stage = Stage::Recommendations;
            self.save_state(session_id, &state).await;
            let mut reply = ChatReply::new(
                ResponseType::Recommendations,
                no_results_message(&domain),
                session_id,
            );
            reply.recommendations = Some(Vec::new());
            reply.bucket_labels = Some(Vec::new());
            reply.filters = filters;
            reply.question_count = state.question_count;
            reply.domain = Some(domain);
            return Ok(reply);
        }

        let intro = recommendation_intro(
            &self.provider,
            &domain,
            &filters,
            &grid.buckets,
            Some(grid.dimension.as_str()),
        )
        .await;

        self.sessions.set_last_recommendations(session_id, &flat).await;
        state.last_recommendation_data = flat.iter().take(12).map(Product::slim).collect();
        state.last_recommendation_ids = flat.iter().map(|p| p.id.clone()).collect();
        state.stage = Stage::Recommendations;
        state.push_message(ChatMessage::assistant(&intro));
        self.save_state(session_id, &state).await;

        info!(
            "Recommendations: {} products in {} buckets (of {} candidates)",
            flat.len(),
            grid.buckets.len(),
            total
        );

        let mut reply = ChatReply::new(ResponseType::Recommendations, intro, session_id);
        reply.recommendations = Some(grid.buckets);
        reply.bucket_labels = Some(grid.labels);
        reply.diversification_dimension = Some(grid.dimension);
        reply.filters = filters;
        reply.question_count = state.question_count;
        reply.domain = Some(domain);
        Ok(reply)
    }

    async fn vehicle_pipeline(
        &self,
        filters: &FilterMap,
        preferences: &ImplicitPreferences,
        params: &TurnParams,
    ) -> Result<(BucketedGrid, usize)> {
        let (candidates, relaxation) = if self.config.recommendation.use_progressive_relaxation {
            progressive_filter_relaxation(&self.vehicles, filters, 500).await?
        } else {
            let candidates = self.vehicles.search_listings(filters, 500).await?;
            (candidates, RelaxationState { all_criteria_met: true, ..Default::default() })
        };
        let total = candidates.len();

        let ranked = match params.method {
            RankingMethod::CoverageRisk => {
                let cr_params = CoverageRiskParams {
                    k: 100,
                    lambda_risk: self.config.recommendation.coverage_risk_lambda_risk,
                    mode: AggregationMode::parse(&self.config.recommendation.coverage_risk_mode),
                    tau: self.config.recommendation.coverage_risk_tau,
                    alpha: self.config.recommendation.coverage_risk_alpha,
                    ..Default::default()
                };
                match rank_with_coverage_risk(
                    candidates.clone(),
                    &self.phrase_store,
                    preferences,
                    &cr_params,
                    Some(&relaxation),
                )
                .await
                {
                    Ok(ranked) => ranked,
                    Err(e) => {
                        warn!("Coverage-risk ranking failed ({}); using SQL order", e);
                        candidates
                    }
                }
            }
            RankingMethod::EmbeddingSimilarity => {
                let es_params = EmbeddingSimilarityParams {
                    top_k: 100,
                    lambda: self.config.recommendation.embedding_similarity_lambda_param,
                    cluster_size: self.config.recommendation.embedding_similarity_cluster_size,
                    use_mmr: self.config.recommendation.use_mmr_diversification,
                    ..Default::default()
                };
                match rank_with_embedding_similarity(
                    candidates.clone(),
                    &self.dense,
                    filters,
                    preferences,
                    &es_params,
                )
                .await
                {
                    Ok(ranked) => ranked,
                    Err(e) => {
                        warn!("Embedding ranking failed ({}); using SQL order", e);
                        candidates
                    }
                }
            }
        };

        Ok((self.diversify(&ranked, filters, params), total))
    }

    async fn catalog_pipeline(
        &self,
        session_id: &str,
        domain: &str,
        filters: &mut FilterMap,
        preferences: &ImplicitPreferences,
        params: &TurnParams,
    ) -> Result<(BucketedGrid, usize)> {
        filters
            .entry("category".to_string())
            .or_insert(json!(if domain == "books" { "Books" } else { "Electronics" }));

        let request = SearchRequest {
            query: String::new(),
            filters: filters.clone(),
            limit: 60,
            cursor: None,
            session_id: Some(session_id.to_string()),
            skip_interview: true,
        };
        let response = self.hybrid.search_products(&request).await?;
        let candidates = response.data.products;
        let total = response.data.total_count as usize;

        let ranked = if self.dense.is_ready() && !candidates.is_empty() {
            let es_params = EmbeddingSimilarityParams {
                top_k: 100,
                lambda: self.config.recommendation.embedding_similarity_lambda_param,
                cluster_size: self.config.recommendation.embedding_similarity_cluster_size,
                use_mmr: self.config.recommendation.use_mmr_diversification,
                ..Default::default()
            };
            match rank_with_embedding_similarity(
                candidates.clone(),
                &self.dense,
                filters,
                preferences,
                &es_params,
            )
            .await
            {
                Ok(ranked) => ranked,
                Err(e) => {
                    warn!("Catalog embedding ranking failed ({}); keeping SQL order", e);
                    candidates
                }
            }
        } else {
            candidates
        };

        Ok((self.diversify(&ranked, filters, params), total))
    }

    fn diversify(&self, ranked: &[Product], filters: &FilterMap, params: &TurnParams) -> BucketedGrid {
        if !self.config.diversification.use_entropy_bucketing {
            // Ablation: plain row-major split of the top items
            let per_page = params.n_rows * params.n_per_row;
            let top: Vec<Product> = ranked.iter().take(per_page).cloned().collect();
            let buckets: Vec<Vec<Product>> = top
                .chunks(params.n_per_row)
                .map(|chunk| chunk.to_vec())
                .collect();
            let labels = (1..=buckets.len()).map(|i| format!("Row {i}")).collect();
            return BucketedGrid {
                buckets,
                labels,
                dimension: "none".into(),
            };
        }

        let dimension = select_diversification_dimension(ranked, filters, &[]);
        bucket_products(ranked, &dimension, params.n_rows, params.n_per_row)
    }

    async fn save_state(&self, session_id: &str, state: &SessionState) {
        // Write back through the manager so both tiers stay current
        self.sessions.overwrite(session_id, state.clone()).await;
    }

    /// Direct recommendation endpoint (vehicles): filters + preferences in,
    /// grid out, no interview.
    pub async fn recommend(&self, request: &RecommendRequest) -> Result<RecommendResponse> {
        let method = request
            .method
            .as_deref()
            .map(RankingMethod::parse)
            .unwrap_or(self.config.recommendation.method);
        let params = TurnParams {
            k: 0,
            n_rows: request.n_rows.unwrap_or(self.config.diversification.n_rows),
            n_per_row: request.n_per_row.unwrap_or(self.config.diversification.n_per_row),
            method,
        };
        let (grid, total) = self
            .vehicle_pipeline(&request.filters, &request.preferences, &params)
            .await?;
        Ok(RecommendResponse {
            recommendations: grid.buckets,
            bucket_labels: grid.labels,
            diversification_dimension: Some(grid.dimension),
            total_candidates: total,
            method_used: method.as_str().to_string(),
        })
    }
}

fn no_results_message(domain: &str) -> String {
    format!(
        "I couldn't find any {domain} matching your criteria. Try broadening your search - \
         for example a wider budget or fewer must-haves."
    )
}
