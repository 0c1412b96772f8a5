// src/llm/schemas.rs
// Declared response shapes for every structured LLM call. The provider runs
// in JSON mode and each call site parses into one of these, falling back to
// its rule-based path when parsing fails.

use serde::{Deserialize, Serialize};

/// Output of the domain classifier (closed set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainClassification {
    /// One of: vehicles, laptops, books, unknown
    pub domain: String,
    #[serde(default)]
    pub confidence: f64,
}

/// A single extracted slot value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotValue {
    pub slot_name: String,
    pub value: String,
}

/// Criteria extraction result, including the interview control signals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedCriteria {
    #[serde(default)]
    pub criteria: Vec<SlotValue>,
    #[serde(default)]
    pub reasoning: String,
    /// User wants to skip questions ("just show me options").
    #[serde(default)]
    pub is_impatient: bool,
    /// User explicitly asked for recommendations.
    #[serde(default)]
    pub wants_recommendations: bool,
}

/// Generated interview question with quick replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub question: String,
    #[serde(default)]
    pub quick_replies: Vec<String>,
    pub topic: String,
}

/// Post-recommendation refinement classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementClassification {
    /// One of: compare, refine_filters, new_search, domain_switch, action, other
    pub intent: String,
    #[serde(default)]
    pub new_domain: Option<String>,
    #[serde(default)]
    pub updated_criteria: Vec<SlotValue>,
    #[serde(default)]
    pub reasoning: String,
}

/// Comparison narrator output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonNarrative {
    pub narrative: String,
    #[serde(default)]
    pub selected_ids: Vec<String>,
}
