// src/session/mod.rs
// Dialogue session state.

pub mod manager;

pub use manager::SessionManager;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::data::product::{FilterMap, Product};

pub const HISTORY_LIMIT: usize = 10;
pub const LAST_RECOMMENDATION_DATA_LIMIT: usize = 12;
pub const LAST_RECOMMENDATION_IDS_LIMIT: usize = 24;

/// Conversation stage. Transitions are monotonic within one search cycle and
/// reset to Interview on domain switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    Interview,
    Recommendations,
    Checkout,
}

/// Overall mode for this shopping session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionIntent {
    Explore,
    DecideToday,
    ExecutePurchase,
}

/// The user's next move right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepIntent {
    Research,
    Compare,
    Negotiate,
    Schedule,
    Return,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

/// Per-session dialogue state. A value type: the manager owns concurrency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub active_domain: Option<String>,
    pub stage: Stage,
    /// Filters accumulated from search requests and quick replies.
    pub explicit_filters: FilterMap,
    /// Slot values gathered by the interview agent.
    pub agent_filters: FilterMap,
    pub questions_asked: Vec<String>,
    pub question_count: usize,
    /// Dimensions the entropy selector has already asked about.
    pub asked_dimensions: HashSet<String>,
    pub conversation_history: Vec<ChatMessage>,
    pub last_recommendation_ids: Vec<String>,
    pub last_recommendation_data: Vec<Product>,
    pub favorite_product_ids: Vec<String>,
    pub clicked_product_ids: Vec<String>,
    pub session_intent: Option<SessionIntent>,
    pub step_intent: Option<StepIntent>,
}

impl SessionState {
    /// Append a message, keeping only the trailing window.
    pub fn push_message(&mut self, message: ChatMessage) {
        self.conversation_history.push(message);
        if self.conversation_history.len() > HISTORY_LIMIT {
            let excess = self.conversation_history.len() - HISTORY_LIMIT;
            self.conversation_history.drain(..excess);
        }
    }

    /// Merge filters; internal `_`-prefixed keys and nulls are skipped so
    /// user input can never plant reserved hints.
    pub fn merge_filters(&mut self, updates: &FilterMap) {
        for (key, value) in updates {
            if key.starts_with('_') || value.is_null() {
                continue;
            }
            self.explicit_filters.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_history_trimmed_to_window() {
        let mut state = SessionState::default();
        for i in 0..15 {
            state.push_message(ChatMessage::user(format!("m{i}")));
        }
        assert_eq!(state.conversation_history.len(), HISTORY_LIMIT);
        assert_eq!(state.conversation_history.last().unwrap().content, "m14");
        assert_eq!(state.conversation_history.first().unwrap().content, "m5");
    }

    #[test]
    fn test_merge_filters_rejects_reserved_keys() {
        let mut state = SessionState::default();
        let mut updates = FilterMap::new();
        updates.insert("brand".into(), json!("Dell"));
        updates.insert("_product_type_hint".into(), json!("laptop"));
        updates.insert("color".into(), json!(null));
        state.merge_filters(&updates);

        assert_eq!(state.explicit_filters.get("brand"), Some(&json!("Dell")));
        assert!(!state.explicit_filters.contains_key("_product_type_hint"));
        assert!(!state.explicit_filters.contains_key("color"));
    }
}
