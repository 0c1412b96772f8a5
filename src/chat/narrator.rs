// src/chat/narrator.rs
// Comparison narrator: turn the session's remembered recommendations into a
// short narrative for 2-3 standout items. The LLM writes the prose from a
// plain-text spec sheet; a deterministic table stands in when it can't.

use std::sync::Arc;

use tracing::warn;

use crate::data::product::Product;
use crate::llm::schemas::ComparisonNarrative;
use crate::llm::ChatProvider;
use crate::session::ChatMessage;

const NARRATOR_PROMPT: &str = r#"You are a helpful product advisor. Compare the recommended products based strictly on what the user asked.

OUTPUT: valid JSON with exactly two keys:
  "narrative": the formatted comparison string (rules below)
  "selected_ids": array of ID strings for the 2-3 products you compared

NARRATIVE FORMAT, one block per product:
  "• **[Product Name]**\n[Spec]: [value] | [Spec]: [value]\n[1-2 sentence insight tied to the user's question]"
Separate blocks with a blank line. After the last block, on its own line: "Best pick: [one-sentence recommendation]."

RULES:
- Start IMMEDIATELY with the first "•". No intro sentence.
- Pull spec values only from the spec sheet; mention only specs relevant to the question.
- NEVER include UUIDs or internal ids in the narrative; names and brands only.
{focus}"#;

fn domain_focus(domain: &str) -> &'static str {
    match domain {
        "laptops" => {
            "Focus on: performance vs price, processor fit for the stated use case, RAM for \
             multitasking, storage, display, battery life, GPU for graphics workloads."
        }
        "vehicles" => {
            "Focus on: reliability, fuel efficiency, total cost of ownership, comfort for the \
             stated use case, cargo space, safety."
        }
        "books" => "Focus on: writing style, genre fit, page count, author reputation.",
        _ => "Focus on the most important differentiating attributes.",
    }
}

/// Plain-text spec sheet for the prompt: only populated fields, ids included
/// for selection but excluded from the narrative by instruction.
pub fn build_spec_sheet(products: &[Product], domain: &str) -> String {
    let mut lines = Vec::new();
    for (i, p) in products.iter().enumerate() {
        let brand = p.brand.as_deref().unwrap_or("");
        lines.push(format!("[{}] {} ({})", i + 1, p.name, brand));
        lines.push(format!("    ID: {}", p.id));
        lines.push(format!(
            "    Price: {}",
            p.display_price().unwrap_or_else(|| "N/A".into())
        ));

        match domain {
            "laptops" => {
                if let Some(laptop) = &p.laptop {
                    let mut spec = |label: &str, value: Option<String>| {
                        if let Some(v) = value {
                            lines.push(format!("    {label}: {v}"));
                        }
                    };
                    spec("Processor", laptop.processor.clone());
                    spec("RAM", laptop.ram_gb.map(|r| format!("{r} GB")));
                    spec("Storage", laptop.storage_gb.map(|s| format!("{s} GB")));
                    spec("Screen", laptop.screen_size.map(|s| format!("{s}\"")));
                    spec("Refresh Rate", laptop.refresh_rate_hz.map(|r| format!("{r} Hz")));
                    spec("GPU", laptop.gpu.clone());
                    spec("Battery", laptop.battery.clone());
                    spec("OS", laptop.os.clone());
                    spec("Weight", laptop.weight.clone());
                }
            }
            "vehicles" => {
                if let Some(v) = &p.vehicle {
                    let mut spec = |label: &str, value: Option<String>| {
                        if let Some(v) = value {
                            lines.push(format!("    {label}: {v}"));
                        }
                    };
                    spec("Year", v.year.map(|y| y.to_string()));
                    spec("Trim", v.trim.clone());
                    spec("Mileage", v.mileage.map(|m| format!("{m} mi")));
                    spec("Fuel Type", v.fuel_type.clone());
                    spec("Drivetrain", v.drivetrain.clone());
                    if let (Some(city), Some(hwy)) = (v.mpg_city, v.mpg_hwy) {
                        lines.push(format!("    MPG: {city}/{hwy}"));
                    }
                }
            }
            "books" => {
                if let Some(book) = &p.book {
                    let mut spec = |label: &str, value: Option<String>| {
                        if let Some(v) = value {
                            lines.push(format!("    {label}: {v}"));
                        }
                    };
                    spec("Author", book.author.clone());
                    spec("Genre", book.genre.clone());
                    spec("Pages", book.pages.map(|p| p.to_string()));
                    spec("Format", book.format.clone());
                }
            }
            _ => {}
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Deterministic plain-text comparison used when the LLM is unavailable.
fn fallback_comparison(products: &[Product], domain: &str) -> String {
    let mut lines = vec!["Here's a quick comparison of your recommendations:".to_string(), String::new()];
    for p in products.iter().take(3) {
        lines.push(format!("**{}**", p.name));
        if let Some(price) = p.display_price() {
            lines.push(format!("  Price: {price}"));
        }
        if domain == "laptops" {
            if let Some(laptop) = &p.laptop {
                if let Some(cpu) = &laptop.processor {
                    lines.push(format!("  CPU: {cpu}"));
                }
                if let Some(ram) = laptop.ram_gb {
                    lines.push(format!("  RAM: {ram} GB"));
                }
                if let Some(battery) = &laptop.battery {
                    lines.push(format!("  Battery: {battery}"));
                }
            }
        }
        if domain == "vehicles" {
            if let Some(v) = &p.vehicle {
                if let Some(mileage) = v.mileage {
                    lines.push(format!("  Mileage: {mileage} mi"));
                }
                if let Some(fuel) = &v.fuel_type {
                    lines.push(format!("  Fuel: {fuel}"));
                }
            }
        }
        if domain == "books" {
            if let Some(book) = &p.book {
                if let Some(author) = &book.author {
                    lines.push(format!("  Author: {author}"));
                }
                if let Some(genre) = &book.genre {
                    lines.push(format!("  Genre: {genre}"));
                }
            }
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Generate the comparison narrative. Returns the display text plus the ids
/// of the products that were actually compared.
pub async fn generate_comparison(
    provider: &Arc<ChatProvider>,
    products: &[Product],
    user_message: &str,
    domain: &str,
) -> (String, Vec<String>) {
    if products.is_empty() {
        return (
            "I don't have any recommendations to compare yet. Let me search for some first!".into(),
            Vec::new(),
        );
    }

    let default_ids = || products.iter().take(3).map(|p| p.id.clone()).collect::<Vec<_>>();

    if !provider.is_available() {
        return (fallback_comparison(products, domain), default_ids());
    }

    let system = NARRATOR_PROMPT.replace("{focus}", domain_focus(domain));
    let user = ChatMessage::user(format!(
        "User context/question: \"{user_message}\"\n\nAvailable recommendations:\n{}\n\nOutput the JSON response now.",
        build_spec_sheet(products, domain)
    ));

    match provider
        .complete_structured::<ComparisonNarrative>(&system, &[user])
        .await
    {
        Ok(result) => {
            let ids = if result.selected_ids.is_empty() {
                default_ids()
            } else {
                result.selected_ids
            };
            (result.narrative, ids)
        }
        Err(e) => {
            warn!("Comparison narrative failed ({}); using table fallback", e);
            (fallback_comparison(products, domain), default_ids())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::product::LaptopFields;

    fn laptop(id: &str, name: &str, ram: i64) -> Product {
        Product {
            id: id.into(),
            name: name.into(),
            brand: Some("Dell".into()),
            price_cents: Some(149_900),
            laptop: Some(LaptopFields {
                processor: Some("Core i7".into()),
                ram_gb: Some(ram),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_spec_sheet_contains_specs_and_ids() {
        let products = vec![laptop("id-1", "XPS 15", 16), laptop("id-2", "XPS 13", 8)];
        let sheet = build_spec_sheet(&products, "laptops");
        assert!(sheet.contains("[1] XPS 15 (Dell)"));
        assert!(sheet.contains("ID: id-1"));
        assert!(sheet.contains("RAM: 16 GB"));
        assert!(sheet.contains("Price: $1,499"));
    }

    #[tokio::test]
    async fn test_offline_fallback_never_leaks_ids() {
        let provider = Arc::new(ChatProvider::new(crate::config::LlmConfig {
            api_key: String::new(),
            base_url: String::new(),
            semantic_parser_model: "m".into(),
            question_generator_model: "m".into(),
            temperature: 0.0,
            timeout_secs: 1,
        }));
        let products = vec![laptop("uuid-abc-123", "XPS 15", 16)];
        let (narrative, ids) = generate_comparison(&provider, &products, "which is best?", "laptops").await;
        assert!(!narrative.contains("uuid-abc-123"));
        assert!(narrative.contains("XPS 15"));
        assert_eq!(ids, vec!["uuid-abc-123"]);
    }

    #[tokio::test]
    async fn test_empty_products_message() {
        let provider = Arc::new(ChatProvider::new(crate::config::LlmConfig {
            api_key: String::new(),
            base_url: String::new(),
            semantic_parser_model: "m".into(),
            question_generator_model: "m".into(),
            temperature: 0.0,
            timeout_secs: 1,
        }));
        let (narrative, ids) = generate_comparison(&provider, &[], "compare", "laptops").await;
        assert!(narrative.contains("don't have any recommendations"));
        assert!(ids.is_empty());
    }
}
