// src/interview/question.rs
// Question generation: LLM-phrased questions with quick replies and the
// "invite topics" tail, plus the deterministic fallbacks used when the
// model is unavailable (and by the e-commerce interview gate).

use std::sync::Arc;

use tracing::{info, warn};

use crate::data::product::{FilterMap, Product};
use crate::llm::schemas::GeneratedQuestion;
use crate::llm::ChatProvider;
use crate::session::ChatMessage;

use super::entropy_select::{dimension_context, dimension_topic};
use super::slots::{DomainSchema, PreferenceSlot};

const QUESTION_PROMPT: &str = r#"You are a helpful {assistant} shopping assistant gathering preferences to make great recommendations.

## Current knowledge
{slot_context}

## CRITICAL RULE
Your question MUST end with an invitation to share the topics listed under "Invite input on". This is required, not optional.

## Question format
1. Main question about "{slot_display}" only
2. quick_replies: 2-4 short clickable options for that topic (2-5 words each)
3. ALWAYS end with: "Feel free to also share ..." naming the invite topics
4. topic MUST be "{slot_name}"

Output JSON: {"question": "...", "quick_replies": ["..."], "topic": "{slot_name}"}"#;

const DIMENSION_PROMPT: &str = r#"You are a helpful car shopping assistant. Generate one natural clarifying question about the dimension below, framed by the actual inventory distribution.

## Dimension: {dimension} (topic: {topic})
## Inventory: {distribution}

Give 2-4 clickable quick replies reflecting values that actually exist. Keep the question to 1-2 sentences.

Output JSON: {"question": "...", "quick_replies": ["..."], "topic": "{topic}"}"#;

/// Format the "what we know / what to invite" context block for the prompt.
fn slot_context(
    schema: &DomainSchema,
    main_slot: &PreferenceSlot,
    filters: &FilterMap,
    questions_asked: &[String],
) -> String {
    let known = if filters.is_empty() {
        "- Nothing yet".to_string()
    } else {
        filters
            .iter()
            .map(|(k, v)| format!("- {k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let invite = schema.invite_topics(main_slot, filters, questions_asked);
    let invite_line = if invite.is_empty() {
        "No other topics to invite input on".to_string()
    } else {
        format!("Invite input on: {}", invite.join(", "))
    };

    format!(
        "**What we know:**\n{known}\n\n**Main question topic:** {}\n\n**{invite_line}**",
        main_slot.display_name
    )
}

/// Static fallback built from the slot definition, invitation included.
pub fn fallback_question(
    schema: &DomainSchema,
    slot: &PreferenceSlot,
    filters: &FilterMap,
    questions_asked: &[String],
) -> GeneratedQuestion {
    let invite = schema.invite_topics(slot, filters, questions_asked);
    let mut question = slot.example_question.to_string();
    if !invite.is_empty() {
        question.push_str(&format!(
            " Feel free to also share your preferences for {}.",
            invite.join(", ").to_lowercase()
        ));
    }
    GeneratedQuestion {
        question,
        quick_replies: slot.example_replies.iter().map(|r| r.to_string()).collect(),
        topic: slot.name.to_string(),
    }
}

/// Generate the next interview question for a slot. LLM-phrased when the
/// provider is up, schema fallback otherwise.
pub async fn generate_slot_question(
    provider: &Arc<ChatProvider>,
    schema: &DomainSchema,
    slot: &PreferenceSlot,
    filters: &FilterMap,
    questions_asked: &[String],
    history: &[ChatMessage],
) -> GeneratedQuestion {
    if !provider.is_available() {
        return fallback_question(schema, slot, filters, questions_asked);
    }

    let system = QUESTION_PROMPT
        .replace("{assistant}", schema.domain)
        .replace("{slot_context}", &slot_context(schema, slot, filters, questions_asked))
        .replace("{slot_display}", slot.display_name)
        .replace("{slot_name}", slot.name);

    let tail: Vec<ChatMessage> = history.iter().rev().take(3).rev().cloned().collect();
    match provider
        .complete_structured_creative::<GeneratedQuestion>(&system, &tail)
        .await
    {
        Ok(mut generated) => {
            if generated.quick_replies.is_empty() {
                generated.quick_replies =
                    slot.example_replies.iter().map(|r| r.to_string()).collect();
            }
            generated.topic = slot.name.to_string();
            info!("Generated question for slot {}: {}", slot.name, generated.question);
            generated
        }
        Err(e) => {
            warn!("Question generation failed ({}); using schema fallback", e);
            fallback_question(schema, slot, filters, questions_asked)
        }
    }
}

/// Generate a question about a high-entropy dimension (vehicle MEDIUM phase).
pub async fn generate_dimension_question(
    provider: &Arc<ChatProvider>,
    dimension: &str,
    candidates: &[Product],
) -> GeneratedQuestion {
    let topic = dimension_topic(dimension).to_string();
    let fallback = || GeneratedQuestion {
        question: match dimension {
            "price" => "What budget range are you working with?".to_string(),
            "fuel_type" => "Do you have a fuel type preference?".to_string(),
            "drivetrain" => "Any drivetrain preference, like AWD?".to_string(),
            "mileage" => "How many miles are you comfortable with?".to_string(),
            "year" => "How new should the vehicle be?".to_string(),
            "is_used" => "Are you open to used vehicles?".to_string(),
            _ => format!("Do you have a {topic} preference?"),
        },
        quick_replies: default_dimension_replies(dimension),
        topic: topic.clone(),
    };

    if !provider.is_available() {
        return fallback();
    }

    let system = DIMENSION_PROMPT
        .replace("{dimension}", dimension)
        .replace("{topic}", &topic)
        .replace("{distribution}", &dimension_context(dimension, candidates));

    match provider
        .complete_structured_creative::<GeneratedQuestion>(&system, &[])
        .await
    {
        Ok(mut generated) => {
            generated.topic = topic;
            generated
        }
        Err(e) => {
            warn!("Dimension question generation failed ({}); using fallback", e);
            fallback()
        }
    }
}

fn default_dimension_replies(dimension: &str) -> Vec<String> {
    let replies: &[&str] = match dimension {
        "price" => &["Under $20k", "$20k-$35k", "$35k-$50k", "Over $50k"],
        "fuel_type" => &["No preference", "Hybrid/Electric", "Gas only"],
        "drivetrain" => &["AWD/4WD", "FWD", "No preference"],
        "mileage" => &["Under 30k miles", "Under 60k miles", "Any mileage"],
        "year" => &["2022 or newer", "2019 or newer", "Any year"],
        "is_used" => &["New only", "Used only", "Either"],
        "make" => &["No preference", "Toyota/Honda", "Ford/Chevy", "BMW/Audi"],
        "body_style" => &["SUV", "Sedan", "Truck", "Crossover"],
        "transmission" => &["Automatic", "Manual", "No preference"],
        _ => &["No preference"],
    };
    replies.iter().map(|r| r.to_string()).collect()
}

/// Rule-based follow-up for the e-commerce interview gate. Question order is
/// fixed use_case → price → brand; the price slot is always phrased the same
/// way for determinism.
pub fn followup_question(product_type: &str, missing: &[String]) -> (String, Vec<String>, String) {
    let topic = missing.first().map(String::as_str).unwrap_or("use_case");
    let is_book = product_type == "book";

    match topic {
        "use_case" if is_book => (
            "What genre are you in the mood for?".to_string(),
            vec!["Fiction".into(), "Mystery".into(), "Sci-Fi".into(), "Biography".into()],
            "genre".to_string(),
        ),
        "use_case" => (
            "What will you mainly use it for?".to_string(),
            vec!["Gaming".into(), "Work".into(), "School".into(), "Creative".into()],
            "use_case".to_string(),
        ),
        "price" if is_book => (
            "How much would you like to spend?".to_string(),
            vec!["Under $15".into(), "$15-$30".into(), "Over $30".into()],
            "price".to_string(),
        ),
        "price" => (
            "What's your budget?".to_string(),
            vec!["Under $500".into(), "$500-$1000".into(), "$1000-$2000".into(), "Over $2000".into()],
            "price".to_string(),
        ),
        "brand" if is_book => (
            "Any favourite authors?".to_string(),
            vec!["No preference".into(), "Surprise me".into()],
            "author".to_string(),
        ),
        "brand" => (
            "Any brand preference?".to_string(),
            vec!["Apple".into(), "Dell".into(), "Lenovo".into(), "No preference".into()],
            "brand".to_string(),
        ),
        other => (
            format!("Any {other} preference?"),
            vec!["No preference".into()],
            other.to_string(),
        ),
    }
}

/// Which of {use_case, price, brand} the gate still needs, in asking order.
pub fn missing_gate_info(filters: &FilterMap) -> Vec<String> {
    let has = |key: &str| filters.get(key).is_some_and(|v| !v.is_null());
    let mut missing = Vec::new();
    if !has("use_case") && !has("subcategory") && !has("genre") {
        missing.push("use_case".to_string());
    }
    if !has("price_min_cents") && !has("price_max_cents") {
        missing.push("price".to_string());
    }
    if !has("brand") {
        missing.push("brand".to_string());
    }
    missing
}

/// One-line intro over a finished recommendation grid. LLM when available,
/// deterministic summary otherwise.
pub async fn recommendation_intro(
    provider: &Arc<ChatProvider>,
    domain: &str,
    filters: &FilterMap,
    grid: &[Vec<Product>],
    dimension: Option<&str>,
) -> String {
    let fallback = || {
        let total: usize = grid.iter().map(Vec::len).sum();
        match dimension {
            Some(dim) => format!(
                "Here are {total} {domain} picks matching your criteria, grouped by {dim}. \
                 Ask me to compare any of them or refine the search."
            ),
            None => format!(
                "Here are {total} {domain} picks matching your criteria. \
                 Ask me to compare any of them or refine the search."
            ),
        }
    };

    if !provider.is_available() {
        return fallback();
    }

    let mut summaries = Vec::new();
    for row in grid {
        for product in row {
            let price = product.display_price().unwrap_or_default();
            summaries.push(format!("{} {}", product.name, price));
            if summaries.len() >= 6 {
                break;
            }
        }
        if summaries.len() >= 6 {
            break;
        }
    }
    let criteria = filters
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ");

    let system = format!(
        "You are a {domain} shopping assistant. Write a 1-2 sentence intro for the \
         recommendations below, naming ONE standout product and why it fits the user's \
         criteria. No lists, no ids, friendly tone."
    );
    let user = ChatMessage::user(format!(
        "Criteria: {}\nProducts:\n{}",
        if criteria.is_empty() { "general browsing".into() } else { criteria },
        summaries.join("\n")
    ));

    match provider.complete(&system, &[user]).await {
        Ok(intro) if !intro.trim().is_empty() => intro.trim().to_string(),
        _ => fallback(),
    }
}

/// Quick-reply value normalisation: strip the "No preference"-style answers
/// down to nothing so they never become filters.
pub fn is_no_preference(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "no preference" | "any" | "either" | "any price" | "whatever" | "no"
    )
}
