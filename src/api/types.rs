// src/api/types.rs
// Wire types: the generic search envelope and the chat envelope. The chat
// reply is a tagged union on response_type; readers pattern-match instead of
// probing for absent keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::product::{FilterMap, ImplicitPreferences, Product};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Ok,
    Invalid,
    NotFound,
    OutOfStock,
}

/// A business constraint attached to an otherwise-valid response:
/// follow-up questions, no-match outcomes, validation notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub request_id: String,
    pub cache_hit: bool,
    pub timings_ms: Map<String, Value>,
    pub sources: Vec<String>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Trace {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            cache_hit: false,
            timings_ms: Map::new(),
            sources: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn timing(&mut self, name: &str, ms: f64) {
        self.timings_ms
            .insert(name.to_string(), Value::from((ms * 10.0).round() / 10.0));
    }

    pub fn source(&mut self, name: &str) {
        if !self.sources.iter().any(|s| s == name) {
            self.sources.push(name.to_string());
        }
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub catalog_version: String,
    pub updated_at: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            catalog_version: env!("CARGO_PKG_VERSION").to_string(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultsData {
    pub products: Vec<Product>,
    pub total_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Generic response envelope for /search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProductsResponse {
    pub status: ResponseStatus,
    pub data: SearchResultsData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ConstraintDetail>,
    pub trace: Trace,
    pub version: VersionInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub filters: FilterMap,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Internal: the orchestrator sets this after its own interview so the
    /// gate never re-asks. Not part of the wire contract.
    #[serde(skip)]
    pub skip_interview: bool,
}

fn default_limit() -> i64 {
    12
}

// --- chat envelope ---

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub n_rows: Option<usize>,
    #[serde(default)]
    pub n_per_row: Option<usize>,
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Question,
    RecommendationsReady,
    Recommendations,
    Comparison,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub response_type: ResponseType,
    pub message: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick_replies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<Vec<Product>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diversification_dimension: Option<String>,
    pub filters: FilterMap,
    pub question_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl ChatReply {
    pub fn new(response_type: ResponseType, message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            response_type,
            message: message.into(),
            session_id: session_id.into(),
            quick_replies: None,
            recommendations: None,
            bucket_labels: None,
            diversification_dimension: None,
            filters: FilterMap::new(),
            question_count: 0,
            domain: None,
        }
    }
}

// --- direct recommendation endpoints ---

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub filters: FilterMap,
    #[serde(default)]
    pub preferences: ImplicitPreferences,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub n_rows: Option<usize>,
    #[serde(default)]
    pub n_per_row: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<Vec<Product>>,
    pub bucket_labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diversification_dimension: Option<String>,
    pub total_candidates: usize,
    pub method_used: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareMethodsResponse {
    pub coverage_risk: RecommendResponse,
    pub embedding_similarity: RecommendResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub session_id: String,
    pub status: String,
}
