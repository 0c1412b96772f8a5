// src/graph/mod.rs
// Optional graph-store collaborator (Neo4j HTTP transaction endpoint).
//
// Two duties: warm "session memory" nodes for returning users, and
// knowledge-graph candidate retrieval for hybrid search. The store is
// optional by construction — when unconfigured or unreachable every call
// quietly reports absence and the caller proceeds without it.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::GraphConfig;
use crate::data::product::FilterMap;

/// Fields of a persisted session-memory node.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SessionMemory {
    pub session_id: String,
    pub active_domain: Option<String>,
    pub stage: Option<String>,
    pub session_intent: Option<String>,
    pub step_intent: Option<String>,
    pub filters: FilterMap,
    pub favorite_product_ids: Vec<String>,
}

pub struct GraphStore {
    client: Client,
    url: Option<String>,
    user: String,
    password: String,
}

impl GraphStore {
    pub fn new(config: &GraphConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        if config.url.is_some() {
            info!("Graph store configured at {}", config.url.as_deref().unwrap_or(""));
        }
        Self {
            client,
            url: config.url.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.url.is_some()
    }

    async fn run_cypher(&self, statement: &str, parameters: Value) -> Option<Vec<Value>> {
        let url = self.url.as_ref()?;
        let body = json!({
            "statements": [{"statement": statement, "parameters": parameters}]
        });
        let response = self
            .client
            .post(format!("{url}/db/neo4j/tx/commit"))
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("Graph store returned {}", r.status());
                return None;
            }
            Err(e) => {
                debug!("Graph store unreachable: {}", e);
                return None;
            }
        };

        let raw: Value = response.json().await.ok()?;
        let rows = raw
            .get("results")?
            .get(0)?
            .get("data")?
            .as_array()?
            .iter()
            .filter_map(|d| d.get("row").cloned())
            .collect();
        Some(rows)
    }

    /// Upsert the session-memory node. Failures are silent; persistence is
    /// throttled by the session manager, not here.
    pub async fn save_session_memory(&self, memory: &SessionMemory) {
        if !self.is_available() {
            return;
        }
        let filters_json = serde_json::to_string(&memory.filters).unwrap_or_else(|_| "{}".into());
        let _ = self
            .run_cypher(
                "MERGE (m:SessionMemory {session_id: $session_id})
                 SET m.active_domain = $active_domain,
                     m.stage = $stage,
                     m.session_intent = $session_intent,
                     m.step_intent = $step_intent,
                     m.filters = $filters,
                     m.favorites = $favorites,
                     m.updated_at = timestamp()",
                json!({
                    "session_id": memory.session_id,
                    "active_domain": memory.active_domain,
                    "stage": memory.stage,
                    "session_intent": memory.session_intent,
                    "step_intent": memory.step_intent,
                    "filters": filters_json,
                    "favorites": memory.favorite_product_ids,
                }),
            )
            .await;
    }

    /// Fetch the session-memory node for a returning session, if any.
    pub async fn load_session_memory(&self, session_id: &str) -> Option<SessionMemory> {
        let rows = self
            .run_cypher(
                "MATCH (m:SessionMemory {session_id: $session_id})
                 RETURN m.active_domain, m.stage, m.session_intent, m.step_intent,
                        m.filters, m.favorites",
                json!({"session_id": session_id}),
            )
            .await?;
        let row = rows.first()?.as_array()?.clone();

        let as_string = |v: Option<&Value>| v.and_then(|x| x.as_str()).map(String::from);
        let filters: FilterMap = as_string(row.get(4))
            .and_then(|raw| serde_json::from_str::<Map<String, Value>>(&raw).ok())
            .unwrap_or_default();
        let favorites = row
            .get(5)
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
            .unwrap_or_default();

        Some(SessionMemory {
            session_id: session_id.to_string(),
            active_domain: as_string(row.first()),
            stage: as_string(row.get(1)),
            session_intent: as_string(row.get(2)),
            step_intent: as_string(row.get(3)),
            filters,
            favorite_product_ids: favorites,
        })
    }

    /// Knowledge-graph candidate retrieval: product ids related to the query
    /// terms through use-case and attribute edges, best first. Returns the
    /// ids plus a small explanation blob for the trace.
    pub async fn search_candidates(
        &self,
        query: &str,
        filters: &FilterMap,
        limit: usize,
    ) -> Option<(Vec<String>, Value)> {
        if !self.is_available() || query.trim().len() < 3 {
            return None;
        }
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() >= 3)
            .map(String::from)
            .collect();
        if terms.is_empty() {
            return None;
        }

        let category = filters.get("category").and_then(|v| v.as_str());
        let rows = self
            .run_cypher(
                "MATCH (p:Product)-[:SUITED_FOR|HAS_ATTRIBUTE]->(t)
                 WHERE ANY(term IN $terms WHERE toLower(t.name) CONTAINS term)
                   AND ($category IS NULL OR p.category = $category)
                 WITH p, COUNT(t) AS hits
                 ORDER BY hits DESC
                 RETURN p.product_id LIMIT $limit",
                json!({"terms": terms, "category": category, "limit": limit as i64}),
            )
            .await?;

        let ids: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get(0).and_then(|v| v.as_str()).map(String::from))
            .collect();
        if ids.is_empty() {
            return None;
        }

        debug!("KG matched {} candidates for '{}'", ids.len(), query);
        let explanation = json!({
            "query": query,
            "terms": terms,
            "candidate_count": ids.len(),
        });
        Some((ids, explanation))
    }
}
