// src/search/hybrid.rs
// Hybrid catalog search: normalisation, parsing, deterministic routing, the
// interview gate, hard SQL filtering with KG/vector/keyword candidate
// fusion, a bounded relaxation ladder, pagination, and the category
// guardrail. One request flows top to bottom; every outcome is an envelope.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::types::{
    ConstraintDetail, ResponseStatus, SearchProductsResponse, SearchRequest, SearchResultsData,
    Trace, VersionInfo,
};
use crate::cache::{search_key, RedisCache};
use crate::config::Config;
use crate::data::product::{FilterMap, Product};
use crate::data::store::{ProductQuery, ProductStore};
use crate::embedding::DenseEmbeddingStore;
use crate::error::Result;
use crate::graph::GraphStore;
use crate::interview::question::{followup_question, missing_gate_info};
use crate::llm::ChatProvider;
use crate::session::SessionManager;

use super::controller::{
    detect_domain, is_domain_switch, is_greeting_or_ambiguous, is_short_domain_intent, Domain,
};
use super::normalize::normalize_query;
use super::parse::{color_family, extract_info, is_specific_query, ExtractedInfo, COLOR_TERMS};

const CATEGORY_ONLY_TERMS: &[&str] = &[
    "laptop", "laptops", "book", "books", "computer", "computers", "pc", "pcs", "desktop",
    "desktops", "electronics", "notebook", "notebooks",
];

pub struct HybridSearch {
    products: Arc<ProductStore>,
    dense: Arc<DenseEmbeddingStore>,
    graph: Arc<GraphStore>,
    cache: RedisCache,
    sessions: Arc<SessionManager>,
    provider: Arc<ChatProvider>,
    config: Arc<Config>,
}

impl HybridSearch {
    pub fn new(
        products: Arc<ProductStore>,
        dense: Arc<DenseEmbeddingStore>,
        graph: Arc<GraphStore>,
        cache: RedisCache,
        sessions: Arc<SessionManager>,
        provider: Arc<ChatProvider>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            products,
            dense,
            graph,
            cache,
            sessions,
            provider,
            config,
        }
    }

    /// Entry point: (free text, filters, limit, session?) -> envelope.
    pub async fn search_products(&self, request: &SearchRequest) -> Result<SearchProductsResponse> {
        let request_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut trace = Trace::new(&request_id);
        trace.source("sqlite");

        // 1. Normalise: typo correction + synonym expansion
        let parse_started = Instant::now();
        let (normalized, expanded_terms) = normalize_query(&request.query);
        let mut filters = request.filters.clone();

        // 2. Parse structured constraints out of the text
        let info = extract_info(&normalized);
        apply_extracted_info(&mut filters, &info, &normalized);
        trace.timing("parse_ms", ms_since(parse_started));

        // 3. Deterministic routing
        let active_domain_before = match &request.session_id {
            Some(id) => self.sessions.get(id).await.active_domain,
            None => None,
        };
        let (detected, route_reason) =
            detect_domain(&normalized, active_domain_before.as_deref(), &filters);
        info!(
            "Router: input='{}', detected={}, before={:?}, reason={}",
            truncate(&normalized, 60),
            detected.as_str(),
            active_domain_before,
            route_reason
        );

        if let Some(session_id) = &request.session_id {
            if is_domain_switch(active_domain_before.as_deref(), detected) {
                info!(
                    "Domain switch {:?} -> {}; resetting session {}",
                    active_domain_before,
                    detected.as_str(),
                    session_id
                );
                self.sessions.reset(session_id).await;
            }
        }

        if is_greeting_or_ambiguous(&normalized) && detected == Domain::None {
            trace.timing("total", ms_since(started));
            trace.source("conversation_controller");
            return Ok(followup_envelope(
                "What are you looking for?",
                vec!["Laptops".into(), "Books".into(), "Vehicles".into()],
                json!({
                    "question": "What are you looking for?",
                    "quick_replies": ["Laptops", "Books", "Vehicles"],
                    "question_id": "category",
                    "topic": "category",
                    "domain": "none",
                    "response_type": "question",
                }),
                trace,
            ));
        }

        if is_short_domain_intent(&normalized) {
            match detected {
                Domain::Books => {
                    filters.entry("category".to_string()).or_insert(json!("Books"));
                }
                Domain::Laptops => {
                    filters.entry("category".to_string()).or_insert(json!("Electronics"));
                    filters
                        .entry("_product_type_hint".to_string())
                        .or_insert(json!("laptop"));
                }
                _ => {}
            }
        }

        if let Some(session_id) = &request.session_id {
            if detected != Domain::None {
                self.sessions.set_domain(session_id, detected.as_str()).await;
            }
            let snapshot = self.sessions.get(session_id).await;
            info!(
                "Session snapshot: id={}, stage={:?}, questions={}, filter_keys={:?}",
                session_id,
                snapshot.stage,
                snapshot.question_count,
                snapshot.explicit_filters.keys().collect::<Vec<_>>()
            );
        }

        // 4. Domain-dependent price units (Books send cents; Electronics
        //    quick replies send whole dollars)
        normalize_price_units(&mut filters);

        // 5. Interview gate for under-specified laptop/book queries
        let is_specific = is_specific_query(&normalized, &info)
            || info.constraint_count() >= 2
            || all_gate_slots_satisfied(&filters, &info);
        if let Some(envelope) = self
            .interview_gate(request, &normalized, &filters, detected, is_specific, &mut trace, started)
            .await
        {
            return Ok(envelope);
        }

        // Persist quick-reply filters into the session
        if let Some(session_id) = &request.session_id {
            if !filters.is_empty() {
                self.sessions.update_filters(session_id, &filters).await;
            }
        }

        // 6. Stale colour clearing: only the current turn may constrain colour
        clear_carried_color(&mut filters, &request.query);

        let has_category = filters.contains_key("category");
        let has_structured = ["color", "brand", "product_type", "_product_type_hint"]
            .iter()
            .any(|k| filters.contains_key(*k));
        let effective_query = if has_category && has_structured {
            String::new()
        } else {
            normalized.clone()
        };

        // 7. Validation for short/meaningless queries without a category
        if !request.query.trim().is_empty() && !has_category {
            if let Some(envelope) = validate_query(&request.query, &mut trace, started) {
                return Ok(envelope);
            }
        }

        // 8. Cache-aside for pure filter browses (no free text in play)
        let page = request.cursor.clone().unwrap_or_else(|| "0".to_string());
        let category = filters
            .get("category")
            .and_then(|v| v.as_str())
            .map(String::from);
        let cache_key = search_key(&filters, category.as_deref(), &page, request.limit);
        let cacheable = effective_query.is_empty();
        if cacheable {
            if let Some(mut cached) = self.cache.get_json::<SearchProductsResponse>(&cache_key).await {
                cached.trace.cache_hit = true;
                cached.trace.request_id = request_id;
                return Ok(cached);
            }
        }

        // 9. Candidate priority: KG > vector > keyword
        let mut kg_candidates: Option<Vec<String>> = None;
        if !effective_query.is_empty() {
            let kg_started = Instant::now();
            if let Some((ids, explanation)) = self
                .graph
                .search_candidates(&normalized, &filters, (request.limit * 2) as usize)
                .await
            {
                trace.timing("kg_ms", ms_since(kg_started));
                trace.source("graph_store");
                trace.set("kg_explanation", explanation);
                kg_candidates = Some(ids);
            }
        }

        let mut vector_hits: Option<(Vec<String>, Vec<f32>)> = None;
        if kg_candidates.is_none() && !effective_query.is_empty() && self.dense.is_ready() {
            let vector_started = Instant::now();
            match self
                .dense
                .search(&normalized, (request.limit * 2) as usize)
                .await
            {
                Ok((ids, scores)) if !ids.is_empty() => {
                    trace.timing("vector_ms", ms_since(vector_started));
                    trace.source("vector_index");
                    vector_hits = Some((ids, scores));
                }
                Ok(_) => {}
                Err(e) => warn!("Vector search failed; falling back to keyword: {}", e),
            }
        }

        // 10. Hard-constraint SQL with the single chosen narrowing path
        let mut query = build_product_query(&filters, request.limit, parse_cursor(&request.cursor));
        if let Some(ids) = &kg_candidates {
            query.candidate_ids = Some(ids.clone());
        } else if let Some((ids, _)) = &vector_hits {
            query.candidate_ids = Some(ids.clone());
        } else if !effective_query.is_empty() {
            query.keyword_terms = keyword_terms(&normalized, &expanded_terms, has_category);
        }

        let db_started = Instant::now();
        let (mut products, mut total_count) = self.products.search(&query).await?;
        trace.timing("db_ms", ms_since(db_started));

        // 11. Relaxation ladder, only when no hard constraint pins the result
        let mut relaxed = false;
        let mut dropped_filters: Vec<String> = Vec::new();
        let has_hard_constraint = filters.contains_key("color")
            || filters.contains_key("gpu_vendor")
            || filters.get("_product_type_hint").and_then(|v| v.as_str()) == Some("desktop");
        if total_count == 0
            && has_category
            && !effective_query.is_empty()
            && query.candidate_ids.is_none()
            && !has_hard_constraint
        {
            let relax_started = Instant::now();
            (products, total_count, relaxed, dropped_filters) = self
                .relaxation_ladder(&filters, request.limit, parse_cursor(&request.cursor))
                .await?;
            trace.timing("relaxation_ms", ms_since(relax_started));
        }

        // Re-rank the page: KG order first, else vector scores
        if let Some(ids) = &kg_candidates {
            let order: std::collections::HashMap<&str, usize> =
                ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
            products.sort_by_key(|p| order.get(p.id.as_str()).copied().unwrap_or(usize::MAX));
        } else if let Some((ids, scores)) = &vector_hits {
            let score_of: std::collections::HashMap<&str, f32> = ids
                .iter()
                .zip(scores.iter())
                .map(|(id, s)| (id.as_str(), *s))
                .collect();
            products.sort_by(|a, b| {
                let sa = score_of.get(a.id.as_str()).copied().unwrap_or(0.0);
                let sb = score_of.get(b.id.as_str()).copied().unwrap_or(0.0);
                sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        products.truncate(request.limit as usize);

        // 12. Category guardrail: nothing outside the requested category may
        //     leak into the page, whatever path produced it
        let raw_count = products.len();
        if let Some(requested) = &category {
            let before = products.len();
            products.retain(|p| p.category.as_deref().map(str::trim) == Some(requested.trim()));
            let dropped = before - products.len();
            if dropped > 0 {
                error!(
                    "Category guardrail dropped {} rows (requested={})",
                    dropped, requested
                );
                total_count = (total_count - dropped as i64).max(0);
            }
        }

        // 13. Pagination cursor
        let offset = parse_cursor(&request.cursor);
        let next_cursor = if offset + request.limit < total_count {
            Some((offset + request.limit).to_string())
        } else {
            None
        };

        let total_ms = ms_since(started);
        trace.timing("total", total_ms);
        trace.set("chosen_category", category.clone().map(Value::from).unwrap_or(Value::Null));
        trace.set("raw_count", json!(raw_count));
        trace.set("post_validation_count", json!(products.len()));
        trace.set("total_count", json!(total_count));
        trace.set("applied_filters", Value::Object(public_filters(&filters)));
        trace.set("used_kg", json!(kg_candidates.is_some()));
        trace.set("used_vector", json!(vector_hits.is_some()));
        trace.set(
            "used_keyword",
            json!(kg_candidates.is_none() && vector_hits.is_none() && !effective_query.is_empty()),
        );
        trace.set("latency_target_ms", json!(self.config.server.latency_target_ms));
        trace.set(
            "within_latency_target",
            json!(total_ms <= self.config.server.latency_target_ms as f64),
        );
        if relaxed {
            trace.set("relaxed", json!(true));
            trace.set("dropped_filters", json!(dropped_filters));
        }
        if let Some(session_id) = &request.session_id {
            trace.set("session_id", json!(session_id));
        }

        let constraints = if total_count == 0 {
            vec![no_match_constraint(&filters, &request.query, category.as_deref())]
        } else {
            Vec::new()
        };

        let response = SearchProductsResponse {
            status: ResponseStatus::Ok,
            data: SearchResultsData {
                products,
                total_count,
                next_cursor,
            },
            constraints,
            trace,
            version: VersionInfo::current(),
        };

        if cacheable && total_count > 0 {
            self.cache.set_json(&cache_key, &response, None).await;
        }
        Ok(response)
    }

    /// E-commerce relaxation ladder: drop colour first, then everything but
    /// category and price. At most two extra counts.
    async fn relaxation_ladder(
        &self,
        filters: &FilterMap,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Product>, i64, bool, Vec<String>)> {
        // Step 1: drop colour, keep brand/hint/price/category
        let mut step1 = build_product_query(filters, limit, offset);
        step1.color_terms.clear();
        step1.candidate_ids = None;
        let count1 = self.products.count(&step1).await?;
        if count1 > 0 {
            info!("Relaxation step 1 (drop colour): {} results", count1);
            let (products, total) = self.products.search(&step1).await?;
            let dropped = if filters.contains_key("color") {
                vec!["color".to_string()]
            } else {
                Vec::new()
            };
            return Ok((products, total, true, dropped));
        }

        // Step 2 (last): category + price only
        let mut step2 = ProductQuery {
            category: filters.get("category").and_then(|v| v.as_str()).map(String::from),
            limit,
            offset,
            ..Default::default()
        };
        step2.price_min_cents = filters.get("price_min_cents").and_then(|v| v.as_i64());
        step2.price_max_cents = filters.get("price_max_cents").and_then(|v| v.as_i64());
        let (products, total) = self.products.search(&step2).await?;
        let relaxed = total > 0;
        let dropped: Vec<String> = filters
            .keys()
            .filter(|k| {
                !matches!(
                    k.as_str(),
                    "category" | "price_min_cents" | "price_max_cents"
                ) && !k.starts_with('_')
            })
            .cloned()
            .collect();
        if relaxed {
            info!("Relaxation step 2 (category-only): {} results", total);
        }
        Ok((products, total, relaxed, dropped))
    }

    /// The laptop/books interview gate. Returns a follow-up envelope when
    /// the query is under-specified and the question budget remains.
    #[allow(clippy::too_many_arguments)]
    async fn interview_gate(
        &self,
        request: &SearchRequest,
        normalized: &str,
        filters: &FilterMap,
        detected: Domain,
        is_specific: bool,
        trace: &mut Trace,
        started: Instant,
    ) -> Option<SearchProductsResponse> {
        // Filter-only browses (empty text) are direct catalog reads; only a
        // conversational turn can owe the user a question
        if is_specific || request.skip_interview || normalized.trim().is_empty() {
            return None;
        }
        let category = filters.get("category").and_then(|v| v.as_str());
        let is_laptopish = category == Some("Electronics")
            || detected == Domain::Laptops
            || CATEGORY_ONLY_TERMS.contains(&normalized.trim().to_lowercase().as_str());
        let is_bookish = category == Some("Books") || detected == Domain::Books;
        if !is_laptopish && !is_bookish {
            return None;
        }

        // Create a server-side session on the first under-specified turn so
        // quick replies land somewhere
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let domain = if is_bookish { "books" } else { "laptops" };
        let product_type = if is_bookish { "book" } else { "laptop" };

        self.sessions.set_domain(&session_id, domain).await;
        if !filters.is_empty() {
            self.sessions.update_filters(&session_id, filters).await;
        }
        self.sessions
            .add_message(&session_id, crate::session::ChatMessage::user(normalized))
            .await;

        let state = self.sessions.get(&session_id).await;

        // A topic already asked never repeats, even if the answer couldn't
        // fill the corresponding filter
        let asked = |topic: &str| -> bool {
            let aliases: &[&str] = match topic {
                "use_case" => &["use_case", "genre"],
                "brand" => &["brand", "author"],
                other => return state.questions_asked.iter().any(|q| q == other),
            };
            state.questions_asked.iter().any(|q| aliases.contains(&q.as_str()))
        };
        let missing: Vec<String> = missing_gate_info(filters)
            .into_iter()
            .filter(|topic| !asked(topic))
            .collect();
        if missing.is_empty() {
            return None;
        }

        if state.question_count >= self.config.interview.k {
            info!(
                "Session {}: question budget exhausted; proceeding to search",
                session_id
            );
            return None;
        }

        // The price question is always the canned one for determinism;
        // other topics get LLM phrasing when the provider is up
        let (question, quick_replies, topic) = self
            .gate_question(product_type, domain, &missing, &state)
            .await;
        self.sessions.add_question_asked(&session_id, &topic).await;
        self.sessions
            .add_message(&session_id, crate::session::ChatMessage::assistant(&question))
            .await;

        trace.timing("total", ms_since(started));
        trace.source("interview_gate");
        let details = json!({
            "question": question,
            "quick_replies": quick_replies.clone(),
            "missing_info": missing,
            "product_type": product_type,
            "topic": topic,
            "question_id": topic,
            "response_type": "question",
            "session_id": session_id,
            "domain": domain,
        });
        Some(followup_envelope(&question, quick_replies, details, trace.clone()))
    }

    async fn gate_question(
        &self,
        product_type: &str,
        domain: &str,
        missing: &[String],
        state: &crate::session::SessionState,
    ) -> (String, Vec<String>, String) {
        let next_topic = missing.first().map(String::as_str).unwrap_or("use_case");
        if next_topic != "price" && self.provider.is_available() {
            let slot_name = match (next_topic, domain) {
                ("use_case", "books") => "genre",
                ("use_case", _) => "use_case",
                ("brand", _) => "brand",
                (other, _) => other,
            };
            if let Some(schema) = crate::interview::slots::domain_schema(domain) {
                if let Some(slot) = schema.slot(slot_name) {
                    let generated = crate::interview::question::generate_slot_question(
                        &self.provider,
                        schema,
                        slot,
                        &state.explicit_filters,
                        &state.questions_asked,
                        &state.conversation_history,
                    )
                    .await;
                    return (generated.question, generated.quick_replies, slot_name.to_string());
                }
            }
        }
        followup_question(product_type, missing)
    }
}

fn ms_since(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn parse_cursor(cursor: &Option<String>) -> i64 {
    cursor
        .as_deref()
        .and_then(|c| c.parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .unwrap_or(0)
}

/// Fold parsed constraints into the filter map. Component vendors go to
/// vendor columns, never to `brand`.
fn apply_extracted_info(filters: &mut FilterMap, info: &ExtractedInfo, normalized: &str) {
    if let Some(gpu) = &info.gpu_vendor {
        filters.insert("gpu_vendor".into(), json!(gpu));
    }
    if let Some(cpu) = &info.cpu_vendor {
        filters.insert("cpu_vendor".into(), json!(cpu));
    }
    if let Some(brand) = &info.brand {
        filters.insert("brand".into(), json!(brand));
    }
    if let Some(color) = &info.color {
        filters.insert("color".into(), json!(color));
    }
    if let Some((min, max)) = info.price_range {
        if let Some(min) = min {
            filters.insert("price_min_cents".into(), json!(min * 100));
        }
        if let Some(max) = max {
            let mut cents = max * 100;
            // Desktop asks with unrealistic budgets get doubled headroom
            if info.product_type.as_deref() == Some("desktop") && cents < 50_000 {
                info!("Lenient desktop price filter: {} -> {}", cents, cents * 2);
                cents *= 2;
            }
            filters.insert("price_max_cents".into(), json!(cents));
        }
    }
    if let Some(first) = info.attributes.first() {
        filters.insert("subcategory".into(), json!(first));
        filters.insert("use_case".into(), json!(first));
    }
    match info.product_type.as_deref() {
        Some("desktop") => {
            filters.insert("_product_type_hint".into(), json!("desktop"));
            filters.entry("category".to_string()).or_insert(json!("Electronics"));
        }
        Some("laptop") if !normalized.trim().is_empty() => {
            filters.insert("_product_type_hint".into(), json!("laptop"));
            filters.entry("category".to_string()).or_insert(json!("Electronics"));
        }
        _ => {}
    }
}

/// Books send cents straight through; Electronics quick replies send whole
/// dollars as round hundreds, which must be scaled up.
fn normalize_price_units(filters: &mut FilterMap) {
    let is_books = filters.get("category").and_then(|v| v.as_str()) == Some("Books");
    for key in ["price_min_cents", "price_max_cents"] {
        if let Some(v) = filters.get(key).and_then(|v| v.as_i64()) {
            if !is_books && (500..=5000).contains(&v) && v % 100 == 0 {
                filters.insert(key.into(), json!(v * 100));
            }
        }
    }
}

/// Gate satisfaction check also counting signals parsed from this turn.
fn all_gate_slots_satisfied(filters: &FilterMap, info: &ExtractedInfo) -> bool {
    let has = |key: &str| filters.get(key).is_some_and(|v| !v.is_null());
    let has_use_case =
        has("use_case") || has("subcategory") || has("genre") || !info.attributes.is_empty();
    let has_brand = has("brand")
        || info.brand.is_some()
        || info.gpu_vendor.is_some()
        || info.cpu_vendor.is_some();
    let has_budget = has("price_min_cents") || has("price_max_cents") || info.price_range.is_some();
    has_use_case && has_brand && has_budget
}

fn clear_carried_color(filters: &mut FilterMap, raw_query: &str) {
    if !filters.contains_key("color") {
        return;
    }
    let lower = raw_query.to_lowercase();
    let mentioned = COLOR_TERMS.iter().any(|term| {
        lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| w == *term)
            || (term.contains(' ') && lower.contains(term))
    });
    if !mentioned {
        debug!("Clearing carried-over colour filter; current turn names no colour");
        filters.remove("color");
    }
}

fn validate_query(
    raw_query: &str,
    trace: &mut Trace,
    started: Instant,
) -> Option<SearchProductsResponse> {
    let query = raw_query.trim();
    let invalid = |message: &str, details: Value, actions: Vec<String>, trace: &mut Trace| {
        trace.timing("total", ms_since(started));
        trace.source("validation");
        SearchProductsResponse {
            status: ResponseStatus::Invalid,
            data: SearchResultsData {
                products: Vec::new(),
                total_count: 0,
                next_cursor: None,
            },
            constraints: vec![ConstraintDetail {
                code: "INVALID_QUERY".into(),
                message: message.into(),
                details: Some(details),
                suggested_actions: actions,
            }],
            trace: trace.clone(),
            version: VersionInfo::current(),
        }
    };

    if query.len() < 3 {
        return Some(invalid(
            "Query is too short. Please provide at least 3 characters.",
            json!({"query": query, "min_length": 3}),
            vec!["Try a specific term like 'laptops', 'headphones', or 'books'".into()],
            trace,
        ));
    }
    let meaningful = query.split_whitespace().any(|w| w.len() >= 3);
    if !meaningful && query.len() <= 4 {
        return Some(invalid(
            "Query is not meaningful. Please provide a valid product search term.",
            json!({"query": query}),
            vec!["Try searching for specific products like 'laptops' or 'books'".into()],
            trace,
        ));
    }
    None
}

fn build_product_query(filters: &FilterMap, limit: i64, offset: i64) -> ProductQuery {
    let get_str = |key: &str| filters.get(key).and_then(|v| v.as_str()).map(String::from);
    let get_list = |key: &str| -> Vec<String> {
        match filters.get(key) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(a)) => a
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    };

    let brand = get_str("brand");
    let brand_lenient = brand
        .as_deref()
        .map(|b| {
            let lower = b.to_lowercase();
            ["nvidia", "amd", "intel", "geforce", "radeon", "rtx", "gtx"]
                .iter()
                .any(|c| lower.contains(c))
        })
        .unwrap_or(false);

    ProductQuery {
        category: get_str("category"),
        product_types: get_list("product_type"),
        gpu_vendors: get_list("gpu_vendor"),
        cpu_vendor: get_str("cpu_vendor"),
        brand,
        brand_lenient,
        subcategory: get_str("subcategory").or_else(|| get_str("use_case")),
        genre: get_str("genre"),
        format: get_str("format"),
        color_terms: get_str("color").map(|c| color_family(&c)).unwrap_or_default(),
        price_min_cents: filters.get("price_min_cents").and_then(|v| v.as_i64()),
        price_max_cents: filters.get("price_max_cents").and_then(|v| v.as_i64()),
        product_type_hint: get_str("_product_type_hint"),
        candidate_ids: None,
        keyword_terms: Vec::new(),
        limit,
        offset,
    }
}

fn keyword_terms(normalized: &str, expanded: &[String], has_category: bool) -> Vec<String> {
    let query = normalized.trim().to_lowercase();
    // Category-only queries ("laptops") must not require a keyword match
    if has_category && CATEGORY_ONLY_TERMS.contains(&query.as_str()) {
        return Vec::new();
    }
    let mut terms = vec![normalized.to_string()];
    for synonym in expanded.iter().take(5) {
        if !terms.iter().any(|t| t.eq_ignore_ascii_case(synonym)) {
            terms.push(synonym.clone());
        }
    }
    terms.retain(|t| t.len() >= 2);
    terms
}

fn public_filters(filters: &FilterMap) -> FilterMap {
    filters
        .iter()
        .filter(|(k, _)| !k.starts_with('_'))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn followup_envelope(
    message: &str,
    quick_replies: Vec<String>,
    details: Value,
    trace: Trace,
) -> SearchProductsResponse {
    SearchProductsResponse {
        status: ResponseStatus::Invalid,
        data: SearchResultsData {
            products: Vec::new(),
            total_count: 0,
            next_cursor: None,
        },
        constraints: vec![ConstraintDetail {
            code: "FOLLOWUP_QUESTION_REQUIRED".into(),
            message: message.into(),
            details: Some(details),
            suggested_actions: quick_replies,
        }],
        trace,
        version: VersionInfo::current(),
    }
}

/// Domain-aware no-match messaging with actionable suggestions.
fn no_match_constraint(filters: &FilterMap, raw_query: &str, category: Option<&str>) -> ConstraintDetail {
    let lower = raw_query.to_lowercase();
    let color_in_query = filters.get("color").and_then(|v| v.as_str()).filter(|_| {
        COLOR_TERMS.iter().any(|term| {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|w| w == *term)
                || (term.contains(' ') && lower.contains(term))
        })
    });

    let mut explanations = Vec::new();
    if let Some(gpu) = filters.get("gpu_vendor").and_then(|v| v.as_str()) {
        explanations.push(format!("gpu_vendor={gpu}"));
    }
    if let Some(max) = filters.get("price_max_cents").and_then(|v| v.as_i64()) {
        explanations.push(format!("price<=${}", max / 100));
    }
    if let Some(min) = filters.get("price_min_cents").and_then(|v| v.as_i64()) {
        explanations.push(format!("price>=${}", min / 100));
    }

    let (message, suggested_actions) = if let Some(color) = color_in_query {
        let family = if matches!(color.to_lowercase().as_str(), "gray" | "grey" | "silver") {
            "Gray/Silver".to_string()
        } else {
            let mut chars = color.chars();
            chars
                .next()
                .map(|f| f.to_uppercase().collect::<String>() + chars.as_str())
                .unwrap_or_else(|| color.to_string())
        };
        (
            format!("I don't see any {family} laptops in the catalog."),
            vec![
                "Any color".to_string(),
                "Rose Gold / Starlight".to_string(),
                "Show me laptops (any color)".to_string(),
                "Show me books".to_string(),
            ],
        )
    } else if filters.contains_key("gpu_vendor")
        || filters.get("_product_type_hint").and_then(|v| v.as_str()) == Some("desktop")
    {
        (
            "I don't see any gaming PCs with NVIDIA in that price range.".to_string(),
            vec![
                "Show me laptops".to_string(),
                "Increase budget".to_string(),
                "Show me all Electronics".to_string(),
                "Show me books".to_string(),
            ],
        )
    } else {
        let actions = match category {
            Some("Books") => vec![
                "Broaden within Books (try a different genre or price)".to_string(),
                "Try Mystery or Fiction".to_string(),
                "Switch to laptops".to_string(),
                "Switch to vehicles".to_string(),
            ],
            Some("Electronics") => vec![
                "Broaden within Electronics (try a different brand or price)".to_string(),
                "Show me laptops".to_string(),
                "Show me desktops".to_string(),
                "Switch to books".to_string(),
            ],
            _ => vec![
                "Show me laptops".to_string(),
                "Show me books".to_string(),
                "Show me vehicles".to_string(),
                "Increase budget".to_string(),
            ],
        };
        let message = if explanations.is_empty() {
            "No products matched your criteria. Want to broaden within this category or switch category?".to_string()
        } else {
            format!(
                "No products matched your criteria. Applied filters: {}. Want to broaden or switch category?",
                explanations.join(", ")
            )
        };
        (message, actions)
    };

    ConstraintDetail {
        code: "NO_MATCHING_PRODUCTS".into(),
        message,
        details: Some(json!({
            "total_count": 0,
            "category": category,
            "explanations": explanations,
        })),
        suggested_actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_unit_switch() {
        // Electronics: 1000 is a dollar amount from a quick reply
        let mut filters = FilterMap::new();
        filters.insert("category".into(), json!("Electronics"));
        filters.insert("price_max_cents".into(), json!(1000));
        normalize_price_units(&mut filters);
        assert_eq!(filters.get("price_max_cents"), Some(&json!(100_000)));

        // Books: 1500 is already cents ($15)
        let mut filters = FilterMap::new();
        filters.insert("category".into(), json!("Books"));
        filters.insert("price_max_cents".into(), json!(1500));
        normalize_price_units(&mut filters);
        assert_eq!(filters.get("price_max_cents"), Some(&json!(1500)));

        // Already-cents values above the heuristic window pass through
        let mut filters = FilterMap::new();
        filters.insert("category".into(), json!("Electronics"));
        filters.insert("price_max_cents".into(), json!(150_000));
        normalize_price_units(&mut filters);
        assert_eq!(filters.get("price_max_cents"), Some(&json!(150_000)));
    }

    #[test]
    fn test_carried_color_cleared_when_not_mentioned() {
        let mut filters = FilterMap::new();
        filters.insert("color".into(), json!("gray"));
        clear_carried_color(&mut filters, "mac laptop");
        assert!(!filters.contains_key("color"));

        let mut filters = FilterMap::new();
        filters.insert("color".into(), json!("pink"));
        clear_carried_color(&mut filters, "pink mac laptop");
        assert!(filters.contains_key("color"));
    }

    #[test]
    fn test_component_brand_is_lenient() {
        let mut filters = FilterMap::new();
        filters.insert("brand".into(), json!("NVIDIA"));
        let query = build_product_query(&filters, 10, 0);
        assert!(query.brand_lenient);

        let mut filters = FilterMap::new();
        filters.insert("brand".into(), json!("Dell"));
        let query = build_product_query(&filters, 10, 0);
        assert!(!query.brand_lenient);
    }

    #[test]
    fn test_keyword_terms_skip_category_only() {
        assert!(keyword_terms("laptops", &["notebooks".into()], true).is_empty());
        let terms = keyword_terms("gaming laptop", &["gamer".into()], true);
        assert_eq!(terms[0], "gaming laptop");
        assert!(terms.contains(&"gamer".to_string()));
    }

    #[test]
    fn test_desktop_lenient_pricing() {
        let mut filters = FilterMap::new();
        let info = ExtractedInfo {
            product_type: Some("desktop".into()),
            price_range: Some((None, Some(200))),
            ..Default::default()
        };
        apply_extracted_info(&mut filters, &info, "gaming pc under $200");
        // $200 is unrealistic for a desktop: ceiling doubled
        assert_eq!(filters.get("price_max_cents"), Some(&json!(40_000)));
        assert_eq!(filters.get("_product_type_hint"), Some(&json!("desktop")));
    }

    #[test]
    fn test_gate_slots_satisfied_counts_parsed_signals() {
        let filters = FilterMap::new();
        let info = ExtractedInfo {
            gpu_vendor: Some("NVIDIA".into()),
            price_range: Some((None, Some(2000))),
            attributes: vec!["Gaming".into()],
            ..Default::default()
        };
        assert!(all_gate_slots_satisfied(&filters, &info));
    }
}
