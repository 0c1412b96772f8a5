// src/interview/slots.rs
// Domain schema registry: preference slots with priorities that drive the
// interview. Immutable after startup.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::data::product::FilterMap;

/// Priority level for preference slots. HIGH slots are asked first, MEDIUM
/// fill the remaining question budget, LOW slots are never asked directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SlotPriority {
    High,
    Medium,
    Low,
}

/// Definition of a single preference slot (one criterion to ask about).
#[derive(Debug, Clone, Serialize)]
pub struct PreferenceSlot {
    /// Internal key, e.g. "budget"
    pub name: &'static str,
    pub display_name: &'static str,
    pub priority: SlotPriority,
    /// What this slot means, serialised into the extraction prompt.
    pub description: &'static str,
    pub example_question: &'static str,
    pub example_replies: &'static [&'static str],
    /// Direct mapping into search filters, when one exists.
    pub filter_key: Option<&'static str>,
    /// Closed value set; extraction must use one of these exactly.
    pub allowed_values: Option<&'static [&'static str]>,
}

/// Complete schema for one product domain.
#[derive(Debug, Clone, Serialize)]
pub struct DomainSchema {
    pub domain: &'static str,
    pub description: &'static str,
    pub slots: &'static [PreferenceSlot],
}

impl DomainSchema {
    pub fn slots_with_priority(&self, priority: SlotPriority) -> impl Iterator<Item = &PreferenceSlot> {
        self.slots.iter().filter(move |s| s.priority == priority)
    }

    pub fn slot(&self, name: &str) -> Option<&PreferenceSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// The next unfilled, unasked slot in priority order. LOW slots are
    /// strictly optional and never proposed.
    pub fn next_missing_slot(
        &self,
        filters: &FilterMap,
        questions_asked: &[String],
    ) -> Option<&PreferenceSlot> {
        for priority in [SlotPriority::High, SlotPriority::Medium] {
            for slot in self.slots_with_priority(priority) {
                let filled = filters.get(slot.name).is_some_and(|v| !v.is_null());
                let asked = questions_asked.iter().any(|q| q == slot.name);
                if !filled && !asked {
                    return Some(slot);
                }
            }
        }
        None
    }

    /// Topics to invite alongside a main question: the other missing slots
    /// at the main slot's priority level, or the next level down when the
    /// main slot is the last one at its level.
    pub fn invite_topics(
        &self,
        main_slot: &PreferenceSlot,
        filters: &FilterMap,
        questions_asked: &[String],
    ) -> Vec<&'static str> {
        let missing = |priority: SlotPriority| -> Vec<&PreferenceSlot> {
            self.slots_with_priority(priority)
                .filter(|s| {
                    s.name != main_slot.name
                        && !filters.get(s.name).is_some_and(|v| !v.is_null())
                        && !questions_asked.iter().any(|q| q == s.name)
                })
                .collect()
        };

        let same_level = missing(main_slot.priority);
        if !same_level.is_empty() {
            return same_level.iter().map(|s| s.display_name).collect();
        }
        let next = match main_slot.priority {
            SlotPriority::High => Some(SlotPriority::Medium),
            SlotPriority::Medium => Some(SlotPriority::Low),
            SlotPriority::Low => None,
        };
        next.map(|p| missing(p).iter().map(|s| s.display_name).collect())
            .unwrap_or_default()
    }

    /// Bullet-list serialisation of the slots for the extraction prompt,
    /// including closed value sets where declared.
    pub fn prompt_text(&self) -> String {
        let mut out = String::new();
        for slot in self.slots {
            out.push_str(&format!("- {} ({})\n", slot.name, slot.description));
            if let Some(values) = slot.allowed_values {
                out.push_str(&format!(
                    "  ALLOWED VALUES (use exactly one of these): {}\n",
                    values.join(", ")
                ));
            }
        }
        out
    }
}

static VEHICLE_SLOTS: &[PreferenceSlot] = &[
    PreferenceSlot {
        name: "budget",
        display_name: "Budget",
        priority: SlotPriority::High,
        description: "Price range the user can spend, e.g. 'under 30k' or '20k-35k'",
        example_question: "What's your budget?",
        example_replies: &["Under $20k", "$20k-$35k", "$35k-$50k", "Over $50k"],
        filter_key: Some("price"),
        allowed_values: None,
    },
    PreferenceSlot {
        name: "use_case",
        display_name: "Primary Use",
        priority: SlotPriority::High,
        description: "What the vehicle is mainly for (commuting, family, off-road, work)",
        example_question: "What will you use this vehicle for?",
        example_replies: &["Daily commute", "Family trips", "Off-road", "Work"],
        filter_key: None,
        allowed_values: None,
    },
    PreferenceSlot {
        name: "body_style",
        display_name: "Body Style",
        priority: SlotPriority::High,
        description: "Vehicle body type",
        example_question: "What type of vehicle?",
        example_replies: &["SUV", "Sedan", "Truck", "Crossover"],
        filter_key: Some("body_style"),
        allowed_values: Some(&["SUV", "Sedan", "Truck", "Coupe", "Hatchback", "Convertible", "Van", "Wagon"]),
    },
    PreferenceSlot {
        name: "features",
        display_name: "Key Features",
        priority: SlotPriority::Medium,
        description: "Features or qualities that matter (fuel efficiency, safety, tech)",
        example_question: "What features matter most?",
        example_replies: &["Fuel efficiency", "Safety", "Tech", "Performance"],
        filter_key: None,
        allowed_values: None,
    },
    PreferenceSlot {
        name: "brand",
        display_name: "Brand",
        priority: SlotPriority::Medium,
        description: "Preferred make(s), e.g. 'Toyota' or 'Honda or Ford'",
        example_question: "Any brand preference?",
        example_replies: &["No preference", "Toyota/Honda", "Ford/Chevy", "BMW/Audi"],
        filter_key: Some("make"),
        allowed_values: None,
    },
    PreferenceSlot {
        name: "fuel_type",
        display_name: "Fuel Type",
        priority: SlotPriority::Low,
        description: "Fuel preference",
        example_question: "Fuel preference?",
        example_replies: &["No preference", "Hybrid/Electric", "Gas only"],
        filter_key: Some("fuel_type"),
        allowed_values: Some(&["Gasoline", "Hybrid", "Electric", "Diesel"]),
    },
    PreferenceSlot {
        name: "new_vs_used",
        display_name: "New vs Used",
        priority: SlotPriority::Low,
        description: "Whether the user wants a new or used vehicle",
        example_question: "New or used?",
        example_replies: &["New only", "Used only", "Either"],
        filter_key: Some("is_used"),
        allowed_values: None,
    },
];

static LAPTOP_SLOTS: &[PreferenceSlot] = &[
    PreferenceSlot {
        name: "use_case",
        display_name: "Primary Use",
        priority: SlotPriority::High,
        description: "What the laptop is mainly for",
        example_question: "What will you mainly use the laptop for?",
        example_replies: &["Gaming", "Work", "School", "Creative"],
        filter_key: Some("subcategory"),
        allowed_values: Some(&["Gaming", "Work", "School", "Creative", "Entertainment", "Education"]),
    },
    PreferenceSlot {
        name: "budget",
        display_name: "Budget",
        priority: SlotPriority::High,
        description: "Price range in dollars, e.g. 'under 1500'",
        example_question: "What's your budget?",
        example_replies: &["Under $500", "$500-$1000", "$1000-$2000", "Over $2000"],
        filter_key: Some("price_max_cents"),
        allowed_values: None,
    },
    PreferenceSlot {
        name: "brand",
        display_name: "Brand",
        priority: SlotPriority::High,
        description: "Preferred manufacturer",
        example_question: "Any brand preference?",
        example_replies: &["Apple", "Dell", "Lenovo", "No preference"],
        filter_key: Some("brand"),
        allowed_values: None,
    },
    PreferenceSlot {
        name: "features",
        display_name: "Key Features",
        priority: SlotPriority::Medium,
        description: "Specs or qualities that matter (battery life, screen, RAM)",
        example_question: "Which specs matter most?",
        example_replies: &["Long battery", "Big screen", "Lots of RAM", "Lightweight"],
        filter_key: None,
        allowed_values: None,
    },
    PreferenceSlot {
        name: "os",
        display_name: "Operating System",
        priority: SlotPriority::Low,
        description: "OS preference",
        example_question: "Any OS preference?",
        example_replies: &["Windows", "macOS", "ChromeOS", "No preference"],
        filter_key: Some("os"),
        allowed_values: Some(&["Windows", "macOS", "ChromeOS", "Linux"]),
    },
];

static BOOK_SLOTS: &[PreferenceSlot] = &[
    PreferenceSlot {
        name: "genre",
        display_name: "Genre",
        priority: SlotPriority::High,
        description: "Book genre the user enjoys",
        example_question: "What genre are you in the mood for?",
        example_replies: &["Fiction", "Mystery", "Sci-Fi", "Biography"],
        filter_key: Some("genre"),
        allowed_values: None,
    },
    PreferenceSlot {
        name: "budget",
        display_name: "Budget",
        priority: SlotPriority::High,
        description: "Price range in dollars",
        example_question: "How much would you like to spend?",
        example_replies: &["Under $15", "$15-$30", "Over $30"],
        filter_key: Some("price_max_cents"),
        allowed_values: None,
    },
    PreferenceSlot {
        name: "format",
        display_name: "Format",
        priority: SlotPriority::Medium,
        description: "Preferred format",
        example_question: "Paperback, hardcover, or ebook?",
        example_replies: &["Paperback", "Hardcover", "Ebook", "No preference"],
        filter_key: Some("format"),
        allowed_values: Some(&["Paperback", "Hardcover", "Ebook", "Audiobook"]),
    },
    PreferenceSlot {
        name: "author",
        display_name: "Author",
        priority: SlotPriority::Low,
        description: "A favourite author, if any",
        example_question: "Any favourite authors?",
        example_replies: &["No preference"],
        filter_key: Some("author"),
        allowed_values: None,
    },
];

static REGISTRY: Lazy<Vec<DomainSchema>> = Lazy::new(|| {
    vec![
        DomainSchema {
            domain: "vehicles",
            description: "Cars, trucks, and SUVs ranked by preference alignment",
            slots: VEHICLE_SLOTS,
        },
        DomainSchema {
            domain: "laptops",
            description: "Laptops and desktop electronics",
            slots: LAPTOP_SLOTS,
        },
        DomainSchema {
            domain: "books",
            description: "Books across genres and formats",
            slots: BOOK_SLOTS,
        },
    ]
});

pub fn domain_schema(domain: &str) -> Option<&'static DomainSchema> {
    REGISTRY.iter().find(|s| s.domain == domain)
}

pub fn registered_domains() -> Vec<&'static str> {
    REGISTRY.iter().map(|s| s.domain).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_next_missing_slot_priority_walk() {
        let schema = domain_schema("laptops").unwrap();
        let mut filters = FilterMap::new();

        // Nothing known: the first HIGH slot
        assert_eq!(schema.next_missing_slot(&filters, &[]).unwrap().name, "use_case");

        // use_case filled: budget is next
        filters.insert("use_case".into(), json!("Gaming"));
        assert_eq!(schema.next_missing_slot(&filters, &[]).unwrap().name, "budget");

        // budget asked but unanswered: brand is next
        let asked = vec!["budget".to_string()];
        assert_eq!(schema.next_missing_slot(&filters, &asked).unwrap().name, "brand");
    }

    #[test]
    fn test_low_priority_never_proposed() {
        let schema = domain_schema("laptops").unwrap();
        let mut filters = FilterMap::new();
        for slot in ["use_case", "budget", "brand", "features"] {
            filters.insert(slot.into(), json!("x"));
        }
        // Only the LOW "os" slot is left — no question
        assert!(schema.next_missing_slot(&filters, &[]).is_none());
    }

    #[test]
    fn test_invite_topics_same_then_next_level() {
        let schema = domain_schema("vehicles").unwrap();
        let filters = FilterMap::new();
        let budget = schema.slot("budget").unwrap();

        // Other HIGH slots are invited first
        let topics = schema.invite_topics(budget, &filters, &[]);
        assert_eq!(topics, vec!["Primary Use", "Body Style"]);

        // When budget is the last HIGH slot, MEDIUM topics are invited
        let mut filled = FilterMap::new();
        filled.insert("use_case".into(), json!("commuting"));
        filled.insert("body_style".into(), json!("SUV"));
        let topics = schema.invite_topics(budget, &filled, &[]);
        assert_eq!(topics, vec!["Key Features", "Brand"]);
    }

    #[test]
    fn test_prompt_text_carries_allowed_values() {
        let schema = domain_schema("vehicles").unwrap();
        let text = schema.prompt_text();
        assert!(text.contains("- budget"));
        assert!(text.contains("ALLOWED VALUES"));
        assert!(text.contains("Hatchback"));
    }
}
