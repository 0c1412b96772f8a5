// src/chat/intent.rs
// Post-recommendation intent routing: compare vs refine vs domain switch vs
// new search. A closed-vocabulary fast path answers the easy cases; the LLM
// classifier handles the rest and also extracts updated criteria.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::llm::schemas::{RefinementClassification, SlotValue};
use crate::llm::ChatProvider;
use crate::search::controller::{detect_domain, Domain};
use crate::session::ChatMessage;

const ROUTER_PROMPT: &str = r#"The user is looking at product recommendations in the "{domain}" domain. Current filters: {filters}.
Classify their follow-up message:
- "compare": asking about, comparing, or questioning the CURRENT recommendations ("which has better battery?", "why is Lenovo better?")
- "refine_filters": wants to CHANGE or add a specification and re-search ("cheaper ones", "at least 16GB RAM", "a different brand")
- "new_search": wants to start over in the same domain ("forget that, show me tablets")
- "domain_switch": wants a different product domain entirely ("actually I want books"); set new_domain
- "action": purchase-flow request (add to cart, buy, checkout)
- "other": anything else

Default to "compare" unless there is an explicit request to add, change, or relax a specification.
For refine_filters/new_search, put the changed values into updated_criteria.

Output JSON: {"intent": "...", "new_domain": null, "updated_criteria": [{"slot_name": "...", "value": "..."}], "reasoning": "..."}"#;

#[derive(Debug, Clone, PartialEq)]
pub enum PostRecIntent {
    Compare,
    RefineFilters,
    NewSearch,
    DomainSwitch,
    Action,
    Other,
}

#[derive(Debug, Clone)]
pub struct IntentDecision {
    pub intent: PostRecIntent,
    pub new_domain: Option<String>,
    pub updated_criteria: Vec<SlotValue>,
}

const COMPARE_KEYWORDS: &[&str] = &[
    "compare", "comparison", "versus", " vs ", "vs.", "which is better", "which one",
    "difference", "differences", "pros and cons", "trade-off", "tradeoff", "side by side",
    "side-by-side", "compared to", "which has", "why is", "are you sure",
];

const REFINE_KEYWORDS: &[&str] = &[
    "cheaper", "less expensive", "more expensive", "bigger screen", "smaller screen",
    "more ram", "more storage", "different brand", "under $", "below $", "lower budget",
    "more options", "show me more", "show me similar", "similar items", "other options",
    "broaden", "refine", "at least",
];

const NEW_SEARCH_KEYWORDS: &[&str] = &[
    "start over", "new search", "start again", "forget that", "something else",
    "different kind", "scratch that",
];

const ACTION_KEYWORDS: &[&str] = &[
    "add to cart", "buy", "purchase", "checkout", "check out", "order it",
];

/// Keyword fast path. None means no confident guess.
fn fast_classify(message: &str, active_domain: Option<&str>) -> Option<IntentDecision> {
    let lower = message.to_lowercase();

    // A message naming a different domain is a switch regardless of phrasing
    let (detected, _) = detect_domain(message, None, &Default::default());
    if detected != Domain::None {
        if let Some(active) = active_domain {
            if Domain::parse(active) != Domain::None && Domain::parse(active) != detected {
                return Some(IntentDecision {
                    intent: PostRecIntent::DomainSwitch,
                    new_domain: Some(detected.as_str().to_string()),
                    updated_criteria: Vec::new(),
                });
            }
        }
    }

    if ACTION_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Some(IntentDecision {
            intent: PostRecIntent::Action,
            new_domain: None,
            updated_criteria: Vec::new(),
        });
    }
    if NEW_SEARCH_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Some(IntentDecision {
            intent: PostRecIntent::NewSearch,
            new_domain: None,
            updated_criteria: Vec::new(),
        });
    }
    if COMPARE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Some(IntentDecision {
            intent: PostRecIntent::Compare,
            new_domain: None,
            updated_criteria: Vec::new(),
        });
    }
    if REFINE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Some(IntentDecision {
            intent: PostRecIntent::RefineFilters,
            new_domain: None,
            updated_criteria: Vec::new(),
        });
    }
    None
}

/// Classify a post-recommendation message. LLM when available, with the
/// fast path as both pre-filter and failure fallback.
pub async fn classify_post_rec(
    provider: &Arc<ChatProvider>,
    message: &str,
    active_domain: Option<&str>,
    filters_text: &str,
) -> IntentDecision {
    if let Some(decision) = fast_classify(message, active_domain) {
        debug!("Intent fast path: {:?}", decision.intent);
        return decision;
    }

    if provider.is_available() {
        let system = ROUTER_PROMPT
            .replace("{domain}", active_domain.unwrap_or("unknown"))
            .replace("{filters}", if filters_text.is_empty() { "none" } else { filters_text });
        match provider
            .complete_structured::<RefinementClassification>(&system, &[ChatMessage::user(message)])
            .await
        {
            Ok(classified) => {
                info!(
                    "Intent classified: {} ({})",
                    classified.intent, classified.reasoning
                );
                let intent = match classified.intent.as_str() {
                    "refine_filters" => PostRecIntent::RefineFilters,
                    "new_search" => PostRecIntent::NewSearch,
                    "domain_switch" => PostRecIntent::DomainSwitch,
                    "action" => PostRecIntent::Action,
                    "compare" => PostRecIntent::Compare,
                    _ => PostRecIntent::Other,
                };
                return IntentDecision {
                    intent,
                    new_domain: classified.new_domain,
                    updated_criteria: classified.updated_criteria,
                };
            }
            Err(e) => warn!("Intent classification failed ({}); defaulting to compare", e),
        }
    }

    // Discussion is the safe default after recommendations
    IntentDecision {
        intent: PostRecIntent::Compare,
        new_domain: None,
        updated_criteria: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_switch_fast_path() {
        let decision = fast_classify("actually I want books", Some("laptops")).unwrap();
        assert_eq!(decision.intent, PostRecIntent::DomainSwitch);
        assert_eq!(decision.new_domain.as_deref(), Some("books"));
    }

    #[test]
    fn test_compare_fast_path() {
        let decision = fast_classify("which has better battery?", Some("laptops")).unwrap();
        assert_eq!(decision.intent, PostRecIntent::Compare);
    }

    #[test]
    fn test_refine_fast_path() {
        let decision = fast_classify("show me cheaper ones", Some("laptops")).unwrap();
        assert_eq!(decision.intent, PostRecIntent::RefineFilters);
    }

    #[test]
    fn test_action_fast_path() {
        let decision = fast_classify("add to cart please", Some("books")).unwrap();
        assert_eq!(decision.intent, PostRecIntent::Action);
    }

    #[test]
    fn test_ambiguous_has_no_fast_guess() {
        assert!(fast_classify("hmm interesting", Some("laptops")).is_none());
    }
}
