// src/session/manager.rs
// Two-tier session persistence: hot Redis, warm graph-store memory.
//
// The in-process map is a read-through cache; Redis is the system of record,
// so process loss is tolerated. The warm tier hydrates returning users whose
// Redis entry has expired, and is written at most once per 30 s per session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::{session_key, RedisCache};
use crate::data::product::{FilterMap, Product};
use crate::graph::{GraphStore, SessionMemory};

use super::{
    ChatMessage, SessionIntent, SessionState, Stage, StepIntent, LAST_RECOMMENDATION_DATA_LIMIT,
    LAST_RECOMMENDATION_IDS_LIMIT,
};

const WARM_PERSIST_INTERVAL: Duration = Duration::from_secs(30);

pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionState>>,
    cache: RedisCache,
    graph: Arc<GraphStore>,
    last_warm_persist: RwLock<HashMap<String, Instant>>,
}

impl SessionManager {
    pub fn new(cache: RedisCache, graph: Arc<GraphStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            cache,
            graph,
            last_warm_persist: RwLock::new(HashMap::new()),
        }
    }

    /// Get or lazily create a session. Load order: process map, Redis, then
    /// a fresh state hydrated from warm session memory when one exists.
    pub async fn get(&self, session_id: &str) -> SessionState {
        if let Some(state) = self.sessions.read().await.get(session_id) {
            return state.clone();
        }

        if let Some(state) = self.cache.get_json::<SessionState>(&session_key(session_id)).await {
            debug!("Session {} loaded from Redis", session_id);
            self.sessions
                .write()
                .await
                .insert(session_id.to_string(), state.clone());
            return state;
        }

        let mut state = SessionState::default();
        if let Some(memory) = self.graph.load_session_memory(session_id).await {
            hydrate_from_memory(&mut state, &memory);
            info!("Session {} hydrated from warm session memory", session_id);
        } else {
            debug!("Created new session {}", session_id);
        }
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), state.clone());
        state
    }

    async fn mutate<F>(&self, session_id: &str, f: F) -> SessionState
    where
        F: FnOnce(&mut SessionState),
    {
        let state = {
            let mut sessions = self.sessions.write().await;
            let state = sessions.entry(session_id.to_string()).or_default();
            f(state);
            state.clone()
        };
        self.persist(session_id, &state).await;
        state
    }

    async fn persist(&self, session_id: &str, state: &SessionState) {
        self.cache
            .set_json(&session_key(session_id), state, None)
            .await;
        self.persist_warm(session_id, state).await;
    }

    /// Throttled warm-tier write: at most one per session per 30 s.
    async fn persist_warm(&self, session_id: &str, state: &SessionState) {
        if !self.graph.is_available() {
            return;
        }
        {
            let recent = self.last_warm_persist.read().await;
            if let Some(last) = recent.get(session_id) {
                if last.elapsed() < WARM_PERSIST_INTERVAL {
                    return;
                }
            }
        }
        self.last_warm_persist
            .write()
            .await
            .insert(session_id.to_string(), Instant::now());

        let memory = SessionMemory {
            session_id: session_id.to_string(),
            active_domain: state.active_domain.clone(),
            stage: Some(format!("{:?}", state.stage).to_uppercase()),
            session_intent: state.session_intent.map(|i| format!("{i:?}")),
            step_intent: state.step_intent.map(|i| format!("{i:?}")),
            filters: state.explicit_filters.clone(),
            favorite_product_ids: state.favorite_product_ids.clone(),
        };
        self.graph.save_session_memory(&memory).await;
    }

    pub async fn set_domain(&self, session_id: &str, domain: &str) -> SessionState {
        self.mutate(session_id, |s| s.active_domain = Some(domain.to_string()))
            .await
    }

    pub async fn set_stage(&self, session_id: &str, stage: Stage) -> SessionState {
        self.mutate(session_id, |s| s.stage = stage).await
    }

    /// Merge filters, last-write-wins. An empty update is a no-op.
    pub async fn update_filters(&self, session_id: &str, updates: &FilterMap) -> SessionState {
        if updates.is_empty() {
            return self.get(session_id).await;
        }
        self.mutate(session_id, |s| s.merge_filters(updates)).await
    }

    pub async fn update_agent_filters(&self, session_id: &str, updates: &FilterMap) -> SessionState {
        self.mutate(session_id, |s| {
            for (k, v) in updates {
                if !v.is_null() {
                    s.agent_filters.insert(k.clone(), v.clone());
                }
            }
        })
        .await
    }

    pub async fn add_message(&self, session_id: &str, message: ChatMessage) -> SessionState {
        self.mutate(session_id, |s| s.push_message(message)).await
    }

    /// Record a question topic. The count tracks the list so
    /// `question_count == questions_asked.len()` always holds.
    pub async fn add_question_asked(&self, session_id: &str, topic: &str) -> SessionState {
        let topic = topic.to_string();
        self.mutate(session_id, move |s| {
            if !s.questions_asked.contains(&topic) {
                s.questions_asked.push(topic);
                s.question_count = s.questions_asked.len();
            }
        })
        .await
    }

    /// Store slim copies of the latest recommendations so compare/refine
    /// turns never re-fetch the catalog.
    pub async fn set_last_recommendations(&self, session_id: &str, products: &[Product]) -> SessionState {
        let slim: Vec<Product> = products
            .iter()
            .take(LAST_RECOMMENDATION_DATA_LIMIT)
            .map(Product::slim)
            .collect();
        let ids: Vec<String> = products.iter().map(|p| p.id.clone()).collect();
        self.mutate(session_id, move |s| {
            for id in ids {
                if !s.last_recommendation_ids.contains(&id) {
                    s.last_recommendation_ids.push(id);
                }
            }
            if s.last_recommendation_ids.len() > LAST_RECOMMENDATION_IDS_LIMIT {
                let excess = s.last_recommendation_ids.len() - LAST_RECOMMENDATION_IDS_LIMIT;
                s.last_recommendation_ids.drain(..excess);
            }
            s.last_recommendation_data = slim;
        })
        .await
    }

    pub async fn add_favorite(&self, session_id: &str, product_id: &str) -> SessionState {
        let product_id = product_id.to_string();
        self.mutate(session_id, move |s| {
            if !s.favorite_product_ids.contains(&product_id) {
                s.favorite_product_ids.push(product_id);
            }
        })
        .await
    }

    pub async fn add_click(&self, session_id: &str, product_id: &str) -> SessionState {
        let product_id = product_id.to_string();
        self.mutate(session_id, move |s| {
            if !s.clicked_product_ids.contains(&product_id) {
                s.clicked_product_ids.push(product_id);
            }
        })
        .await
    }

    pub async fn set_session_intent(&self, session_id: &str, intent: SessionIntent) -> SessionState {
        self.mutate(session_id, move |s| s.session_intent = Some(intent)).await
    }

    pub async fn set_step_intent(&self, session_id: &str, intent: StepIntent) -> SessionState {
        self.mutate(session_id, move |s| s.step_intent = Some(intent)).await
    }

    pub async fn mark_dimension_asked(&self, session_id: &str, dimension: &str) -> SessionState {
        let dimension = dimension.to_string();
        self.mutate(session_id, move |s| {
            s.asked_dimensions.insert(dimension);
        })
        .await
    }

    /// Replace a session wholesale with state mutated elsewhere (the
    /// orchestrator edits a loaded copy across several await points).
    pub async fn overwrite(&self, session_id: &str, state: SessionState) {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), state.clone());
        self.persist(session_id, &state).await;
    }

    /// Drop all state for a session. Domain switches call this.
    pub async fn reset(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
        self.cache.delete(&session_key(session_id)).await;
        info!("Session {} reset", session_id);
    }

    pub async fn active_session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

fn hydrate_from_memory(state: &mut SessionState, memory: &SessionMemory) {
    state.active_domain = memory.active_domain.clone();
    if !memory.filters.is_empty() {
        state.explicit_filters = memory.filters.clone();
    }
    state.favorite_product_ids = memory.favorite_product_ids.clone();
    state.session_intent = match memory.session_intent.as_deref() {
        Some("Explore") => Some(SessionIntent::Explore),
        Some("DecideToday") => Some(SessionIntent::DecideToday),
        Some("ExecutePurchase") => Some(SessionIntent::ExecutePurchase),
        _ => None,
    };
    state.step_intent = match memory.step_intent.as_deref() {
        Some("Research") => Some(StepIntent::Research),
        Some("Compare") => Some(StepIntent::Compare),
        Some("Negotiate") => Some(StepIntent::Negotiate),
        Some("Schedule") => Some(StepIntent::Schedule),
        Some("Return") => Some(StepIntent::Return),
        _ => None,
    };
    if let Some(stage) = memory.stage.as_deref() {
        state.stage = match stage {
            "RECOMMENDATIONS" => Stage::Recommendations,
            "CHECKOUT" => Stage::Checkout,
            _ => Stage::Interview,
        };
    }
}
