// src/interview/agent.rs
// The universal interview agent: domain detection, schema-driven criteria
// extraction, the ask-vs-recommend decision, and slot-to-filter conversion.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::data::product::{FilterMap, ImplicitPreferences};
use crate::llm::schemas::{DomainClassification, ExtractedCriteria, GeneratedQuestion, SlotValue};
use crate::llm::ChatProvider;
use crate::search::controller::{detect_domain as route_domain, Domain};
use crate::search::parse::{expand_nationality, extract_info, parse_budget};
use crate::session::{ChatMessage, SessionState};

use super::question::{generate_slot_question, is_no_preference};
use super::slots::{domain_schema, registered_domains, DomainSchema};

const DOMAIN_DETECTION_PROMPT: &str = r#"Classify the user's shopping intent into exactly one domain.
Domains: vehicles (cars, trucks, SUVs), laptops (laptops, desktops, electronics), books, unknown.
Output JSON: {"domain": "<vehicles|laptops|books|unknown>", "confidence": <0..1>}"#;

const EXTRACTION_PROMPT: &str = r#"You extract shopping criteria for the "{domain}" domain.

Slots you may fill:
{schema_text}

Rules:
- Only extract values that are CLEARLY stated; never guess.
- When a slot lists ALLOWED VALUES, the value must be exactly one of them.
- {price_context}
- Set is_impatient=true when the user wants to skip questions ("just show me options", "whatever", terse frustration).
- Set wants_recommendations=true when the user explicitly asks to see results.

Output JSON: {"criteria": [{"slot_name": "...", "value": "..."}], "reasoning": "...", "is_impatient": false, "wants_recommendations": false}"#;

fn price_context(domain: &str) -> &'static str {
    if domain == "vehicles" {
        "Budgets are whole dollars; keep ranges like '20k-35k' as stated."
    } else {
        "Budgets are whole dollars (the system converts to cents downstream)."
    }
}

/// What the agent decided to do with one message.
#[derive(Debug, Clone)]
pub enum AgentOutcome {
    /// No domain yet and the message didn't reveal one.
    CategoryPick {
        message: String,
        quick_replies: Vec<String>,
    },
    /// Ask this clarifying question next.
    Question(GeneratedQuestion),
    /// Enough signal: hand off to search.
    Ready,
}

pub struct UniversalAgent {
    provider: Arc<ChatProvider>,
    max_questions: usize,
}

impl UniversalAgent {
    pub fn new(provider: Arc<ChatProvider>, max_questions: usize) -> Self {
        Self {
            provider,
            max_questions,
        }
    }

    pub fn max_questions(&self) -> usize {
        self.max_questions
    }

    /// One interview turn. Mutates the session state in place; the caller
    /// persists it.
    pub async fn process_message(&self, state: &mut SessionState, message: &str) -> AgentOutcome {
        state.push_message(ChatMessage::user(message));

        if state.active_domain.is_none() {
            match self.detect_domain(message, state).await {
                Some(domain) => {
                    info!("Domain detected: {}", domain);
                    state.active_domain = Some(domain);
                }
                None => {
                    let prompt =
                        "I can help with Cars, Laptops, or Books. What are you looking for today?";
                    state.push_message(ChatMessage::assistant(prompt));
                    return AgentOutcome::CategoryPick {
                        message: prompt.to_string(),
                        quick_replies: vec!["Cars".into(), "Laptops".into(), "Books".into()],
                    };
                }
            }
        }

        let domain = state.active_domain.clone().unwrap_or_default();
        let Some(schema) = domain_schema(&domain) else {
            warn!("No schema registered for domain {}", domain);
            return AgentOutcome::Ready;
        };

        let extraction = self.extract_criteria(message, schema, state).await;
        for item in &extraction.criteria {
            // Non-slot keys (entropy-dimension answers like drivetrain) are
            // kept too; they pass straight through to the search filters
            if !is_no_preference(&item.value) {
                state
                    .agent_filters
                    .insert(item.slot_name.clone(), Value::String(item.value.clone()));
            }
        }
        debug!("Agent filters now: {:?}", state.agent_filters);

        if self.should_recommend(&extraction, state) {
            info!(
                "Handing off to search (impatient={}, wants_recs={}, questions={}/{})",
                extraction.is_impatient,
                extraction.wants_recommendations,
                state.question_count,
                self.max_questions
            );
            return AgentOutcome::Ready;
        }

        match schema.next_missing_slot(&state.agent_filters, &state.questions_asked) {
            Some(slot) => {
                let question = generate_slot_question(
                    &self.provider,
                    schema,
                    slot,
                    &state.agent_filters,
                    &state.questions_asked,
                    &state.conversation_history,
                )
                .await;
                if !state.questions_asked.iter().any(|q| q == slot.name) {
                    state.questions_asked.push(slot.name.to_string());
                    state.question_count = state.questions_asked.len();
                }
                state.push_message(ChatMessage::assistant(&question.question));
                AgentOutcome::Question(question)
            }
            None => AgentOutcome::Ready,
        }
    }

    /// Domain detection: deterministic keyword routing first, then the LLM
    /// classifier with a closed output set.
    pub async fn detect_domain(&self, message: &str, state: &SessionState) -> Option<String> {
        let (domain, reason) = route_domain(message, state.active_domain.as_deref(), &FilterMap::new());
        if domain != Domain::None {
            debug!("Domain fast path: {} ({})", domain.as_str(), reason);
            return Some(domain.as_str().to_string());
        }

        if !self.provider.is_available() {
            return None;
        }
        match self
            .provider
            .complete_structured::<DomainClassification>(
                DOMAIN_DETECTION_PROMPT,
                &[ChatMessage::user(message)],
            )
            .await
        {
            Ok(classified) => {
                let known = registered_domains();
                if known.contains(&classified.domain.as_str()) {
                    Some(classified.domain)
                } else {
                    None
                }
            }
            Err(e) => {
                warn!("Domain classification failed: {}", e);
                None
            }
        }
    }

    async fn extract_criteria(
        &self,
        message: &str,
        schema: &DomainSchema,
        state: &SessionState,
    ) -> ExtractedCriteria {
        if self.provider.is_available() {
            let system = EXTRACTION_PROMPT
                .replace("{domain}", schema.domain)
                .replace("{schema_text}", &schema.prompt_text())
                .replace("{price_context}", price_context(schema.domain));
            match self
                .provider
                .complete_structured::<ExtractedCriteria>(&system, &[ChatMessage::user(message)])
                .await
            {
                Ok(extracted) => return extracted,
                Err(e) => warn!("Criteria extraction failed ({}); using rule-based parse", e),
            }
        }
        rule_based_extract(message, schema, state)
    }

    /// Show recommendations only when the user signals it or the question
    /// budget is spent. Filled HIGH slots alone never end the interview:
    /// MEDIUM questions continue until k.
    fn should_recommend(&self, extraction: &ExtractedCriteria, state: &SessionState) -> bool {
        if self.max_questions == 0 {
            return true;
        }
        if extraction.is_impatient {
            info!("Recommend reason: user is impatient");
            return true;
        }
        if extraction.wants_recommendations {
            info!("Recommend reason: user asked for recommendations");
            return true;
        }
        if state.question_count >= self.max_questions {
            info!("Recommend reason: question limit ({}) reached", self.max_questions);
            return true;
        }
        false
    }
}

/// Deterministic extraction used when the model is down: budget grammar,
/// brand tables, allowed-value matching, and the answer-follows-question
/// convention for quick replies.
fn rule_based_extract(message: &str, schema: &DomainSchema, state: &SessionState) -> ExtractedCriteria {
    let lower = message.to_lowercase();
    let mut out = ExtractedCriteria::default();

    let impatient = [
        "just show me",
        "show me options",
        "enough questions",
        "whatever",
        "don't care",
        "dont care",
        "skip",
        "anything",
    ];
    if impatient.iter().any(|kw| lower.contains(kw)) {
        out.is_impatient = true;
    }
    if lower.contains("recommend") || lower.contains("show me what") || lower.contains("see results") {
        out.wants_recommendations = true;
    }

    if schema.slot("budget").is_some() && parse_budget(&lower).is_some() && looks_like_budget(&lower) {
        push_slot(&mut out.criteria, "budget", message.trim().to_string());
    }

    let info = extract_info(message);
    if let Some(brand) = info.brand {
        if schema.slot("brand").is_some() {
            push_slot(&mut out.criteria, "brand", brand);
        }
    }
    if schema.domain == "vehicles" {
        for token in lower.split_whitespace() {
            if let Some(makes) = expand_nationality(token) {
                push_slot(&mut out.criteria, "brand", makes.to_string());
            }
        }
    }

    // Closed-set slots match anywhere in the message
    for slot in schema.slots {
        if let Some(allowed) = slot.allowed_values {
            for value in allowed {
                if lower.contains(&value.to_lowercase()) {
                    push_slot(&mut out.criteria, slot.name, value.to_string());
                    break;
                }
            }
        }
    }

    // A short answer right after a question is that question's answer
    if out.criteria.is_empty() && !out.is_impatient && !out.wants_recommendations {
        if let Some(last_topic) = state.questions_asked.last() {
            let unanswered = !state
                .agent_filters
                .get(last_topic)
                .is_some_and(|v| !v.is_null());
            let short = message.split_whitespace().count() <= 4;
            if unanswered && short && !is_no_preference(message) {
                push_slot(&mut out.criteria, last_topic, message.trim().to_string());
            }
        }
    }

    out
}

fn push_slot(criteria: &mut Vec<SlotValue>, slot: &str, value: String) {
    if !criteria.iter().any(|c| c.slot_name == slot) {
        criteria.push(SlotValue {
            slot_name: slot.to_string(),
            value,
        });
    }
}

fn looks_like_budget(lower: &str) -> bool {
    if lower.contains('$')
        || lower.contains("budget")
        || lower.contains("under")
        || lower.contains("over")
        || lower.contains("spend")
        || lower.contains("between")
    {
        return true;
    }
    // "20k" / "35k" style amounts
    let bytes = lower.as_bytes();
    bytes
        .windows(2)
        .any(|w| w[0].is_ascii_digit() && (w[1] == b'k'))
        // a bare number is a budget only when the whole message is the number
        || lower.trim().chars().all(|c| c.is_ascii_digit() || c == '-' || c == '.')
}

/// Convert gathered slot values into search filters and soft preferences.
/// Price units are domain-dependent: vehicles use raw-dollar range strings,
/// e-commerce uses integer cents.
pub fn build_search_filters(
    agent_filters: &FilterMap,
    domain: &str,
) -> (FilterMap, ImplicitPreferences) {
    let mut filters = FilterMap::new();
    let mut preferences = ImplicitPreferences::default();

    for (slot_name, value) in agent_filters {
        let raw = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if is_no_preference(&raw) {
            continue;
        }

        match slot_name.as_str() {
            "budget" => {
                if let Some((min, max)) = parse_budget(&raw) {
                    if domain == "vehicles" {
                        let lo = min.unwrap_or(0);
                        let hi = max.unwrap_or(999_999);
                        filters.insert("price".into(), json!(format!("{lo}-{hi}")));
                    } else {
                        if let Some(min) = min {
                            filters.insert("price_min_cents".into(), json!(min * 100));
                        }
                        if let Some(max) = max {
                            filters.insert("price_max_cents".into(), json!(max * 100));
                        }
                    }
                }
            }
            "brand" => {
                let expanded = expand_nationality(&raw)
                    .map(String::from)
                    .unwrap_or_else(|| raw.clone());
                if domain == "vehicles" {
                    filters.insert("make".into(), json!(expanded));
                } else {
                    filters.insert("brand".into(), json!(expanded));
                }
            }
            "use_case" => {
                preferences.use_case = Some(raw.clone());
                if domain == "vehicles" {
                    filters.insert("use_case".into(), json!(raw));
                } else {
                    filters.insert("subcategory".into(), json!(normalize_use_case(&raw)));
                    filters.insert("use_case".into(), json!(normalize_use_case(&raw)));
                }
            }
            "features" => {
                preferences.liked_features.push(raw);
            }
            "genre" => {
                filters.insert("genre".into(), json!(raw.clone()));
                filters.insert("subcategory".into(), json!(raw));
            }
            "body_style" => {
                filters.insert("body_style".into(), json!(raw));
            }
            "new_vs_used" => {
                let used = raw.to_lowercase().contains("used");
                let new = raw.to_lowercase().contains("new");
                if used != new {
                    filters.insert("is_used".into(), json!(used));
                }
            }
            "fuel_type" | "os" | "format" | "author" | "color" | "condition" => {
                filters.insert(slot_name.clone(), json!(raw));
            }
            other => {
                filters.insert(other.to_string(), json!(raw));
            }
        }
    }

    (filters, preferences)
}

fn normalize_use_case(raw: &str) -> String {
    let lower = raw.to_lowercase();
    for canon in ["Gaming", "Work", "School", "Creative", "Entertainment", "Education"] {
        if lower.contains(&canon.to_lowercase()) {
            return canon.to_string();
        }
    }
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;

    fn offline_agent() -> UniversalAgent {
        let provider = Arc::new(ChatProvider::new(LlmConfig {
            api_key: String::new(),
            base_url: String::new(),
            semantic_parser_model: "m".into(),
            question_generator_model: "m".into(),
            temperature: 0.0,
            timeout_secs: 1,
        }));
        UniversalAgent::new(provider, 3)
    }

    #[tokio::test]
    async fn test_interview_reaches_brand_then_recommends() {
        let agent = offline_agent();
        let mut state = SessionState::default();

        // Turn 1: "I want a laptop" -> use_case question
        let outcome = agent.process_message(&mut state, "I want a laptop").await;
        match outcome {
            AgentOutcome::Question(q) => assert_eq!(q.topic, "use_case"),
            other => panic!("expected question, got {other:?}"),
        }
        assert_eq!(state.question_count, 1);

        // Turn 2: "gaming" answers use_case -> budget question
        let outcome = agent.process_message(&mut state, "gaming").await;
        match outcome {
            AgentOutcome::Question(q) => assert_eq!(q.topic, "budget"),
            other => panic!("expected question, got {other:?}"),
        }
        assert_eq!(state.question_count, 2);

        // Turn 3: "under 1500" answers budget -> brand question (k=3)
        let outcome = agent.process_message(&mut state, "under 1500").await;
        match outcome {
            AgentOutcome::Question(q) => assert_eq!(q.topic, "brand"),
            other => panic!("expected question, got {other:?}"),
        }
        assert_eq!(state.question_count, 3);

        // Turn 4: "Dell" -> question budget exhausted, hand off
        let outcome = agent.process_message(&mut state, "Dell").await;
        assert!(matches!(outcome, AgentOutcome::Ready));

        let (filters, _) = build_search_filters(&state.agent_filters, "laptops");
        assert_eq!(filters.get("subcategory"), Some(&json!("Gaming")));
        assert_eq!(filters.get("price_max_cents"), Some(&json!(150_000)));
        assert_eq!(filters.get("brand"), Some(&json!("Dell")));
    }

    #[tokio::test]
    async fn test_impatience_short_circuits() {
        let agent = offline_agent();
        let mut state = SessionState {
            active_domain: Some("laptops".into()),
            ..Default::default()
        };
        state.agent_filters.insert("use_case".into(), json!("work"));

        let outcome = agent.process_message(&mut state, "just show me options").await;
        assert!(matches!(outcome, AgentOutcome::Ready));
        assert_eq!(state.question_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_domain_asks_category() {
        let agent = offline_agent();
        let mut state = SessionState::default();
        let outcome = agent.process_message(&mut state, "something nice please").await;
        match outcome {
            AgentOutcome::CategoryPick { quick_replies, .. } => {
                assert_eq!(quick_replies.len(), 3);
            }
            other => panic!("expected category pick, got {other:?}"),
        }
        assert!(state.active_domain.is_none());
    }

    #[test]
    fn test_vehicle_budget_becomes_dollar_range() {
        let mut agent_filters = FilterMap::new();
        agent_filters.insert("budget".into(), json!("20k-35k"));
        agent_filters.insert("brand".into(), json!("german"));
        let (filters, _) = build_search_filters(&agent_filters, "vehicles");
        assert_eq!(filters.get("price"), Some(&json!("20000-35000")));
        let makes = filters.get("make").unwrap().as_str().unwrap();
        assert!(makes.contains("BMW"));
    }

    #[test]
    fn test_features_become_soft_preferences() {
        let mut agent_filters = FilterMap::new();
        agent_filters.insert("features".into(), json!("fuel efficiency"));
        let (filters, preferences) = build_search_filters(&agent_filters, "vehicles");
        assert!(!filters.contains_key("features"));
        assert_eq!(preferences.liked_features, vec!["fuel efficiency"]);
    }

    #[test]
    fn test_no_preference_dropped() {
        let mut agent_filters = FilterMap::new();
        agent_filters.insert("brand".into(), json!("No preference"));
        let (filters, _) = build_search_filters(&agent_filters, "laptops");
        assert!(filters.is_empty());
    }
}
