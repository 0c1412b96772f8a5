// src/search/parse.rs
// Rule-based constraint extraction from free text: brands, component
// vendors, colours, price ranges, use-case attributes, product-type hints.
// Also the budget grammar shared with the interview agent.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Device/OEM brand canonicalisation ("mac" counts as Apple).
static BRAND_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("apple", "Apple"),
        ("mac", "Apple"),
        ("macbook", "Apple"),
        ("dell", "Dell"),
        ("hp", "HP"),
        ("lenovo", "Lenovo"),
        ("thinkpad", "Lenovo"),
        ("asus", "ASUS"),
        ("microsoft", "Microsoft"),
        ("samsung", "Samsung"),
        ("acer", "Acer"),
        ("msi", "MSI"),
    ])
});

/// Component vendors are not device brands: they constrain gpu/cpu columns.
static GPU_VENDORS: &[(&str, &str)] = &[
    ("nvidia", "NVIDIA"),
    ("geforce", "NVIDIA"),
    ("rtx", "NVIDIA"),
    ("gtx", "NVIDIA"),
    ("radeon", "AMD"),
];

static CPU_VENDORS: &[(&str, &str)] = &[("intel", "Intel"), ("ryzen", "AMD"), ("snapdragon", "Qualcomm")];

pub static COLOR_TERMS: &[&str] = &[
    "pink", "red", "blue", "black", "white", "silver", "gold", "gray", "grey", "midnight",
    "rose", "starlight", "green", "yellow", "purple", "orange", "blush", "space gray",
    "space grey", "rose gold",
];

/// Colour families: a requested colour matches its close cousins too.
static COLOR_FAMILIES: &[(&str, &[&str])] = &[
    ("pink", &["pink", "rose", "rose gold", "blush"]),
    ("red", &["red", "crimson", "scarlet", "burgundy"]),
    ("blue", &["blue", "navy", "sapphire", "midnight"]),
    ("black", &["black", "space black", "midnight"]),
    ("silver", &["silver", "space gray", "space grey", "grey", "gray", "starlight"]),
    ("gray", &["silver", "space gray", "space grey", "grey", "gray", "starlight"]),
    ("grey", &["silver", "space gray", "space grey", "grey", "gray", "starlight"]),
    ("gold", &["gold", "rose gold", "yellow gold"]),
];

static USE_CASE_ATTRIBUTES: &[(&str, &str)] = &[
    ("gaming", "Gaming"),
    ("gamer", "Gaming"),
    ("work", "Work"),
    ("office", "Work"),
    ("business", "Work"),
    ("school", "School"),
    ("student", "School"),
    ("creative", "Creative"),
    ("video editing", "Creative"),
    ("photo editing", "Creative"),
    ("entertainment", "Entertainment"),
    ("education", "Education"),
];

/// Car-brand nationality expansion for the rule-based vehicle parser.
static NATIONALITY_MAKES: &[(&str, &str)] = &[
    ("german", "BMW,Mercedes-Benz,Audi,Porsche,Volkswagen"),
    ("japanese", "Toyota,Honda,Nissan,Mazda,Subaru,Lexus,Acura,Infiniti,Mitsubishi"),
    ("american", "Ford,Chevrolet,GMC,Dodge,Jeep,Ram,Cadillac,Lincoln,Buick,Chrysler,Tesla"),
    ("korean", "Hyundai,Kia,Genesis"),
    ("italian", "Alfa Romeo,Fiat,Maserati,Ferrari,Lamborghini"),
    ("swedish", "Volvo,Polestar"),
    ("british", "Land Rover,Jaguar,Bentley,Rolls-Royce,Aston Martin,Lotus,McLaren,MINI"),
    ("english", "Land Rover,Jaguar,Bentley,Rolls-Royce,Aston Martin,Lotus,McLaren,MINI"),
];

/// Everything the rule-based parser can pull out of one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedInfo {
    pub brand: Option<String>,
    pub gpu_vendor: Option<String>,
    pub cpu_vendor: Option<String>,
    pub color: Option<String>,
    /// (min, max) in whole dollars.
    pub price_range: Option<(Option<i64>, Option<i64>)>,
    pub attributes: Vec<String>,
    /// "laptop" or "desktop"
    pub product_type: Option<String>,
}

impl ExtractedInfo {
    /// Signals counted toward the multi-constraint interview bypass.
    pub fn constraint_count(&self) -> usize {
        [
            self.brand.is_some(),
            self.gpu_vendor.is_some() || self.cpu_vendor.is_some(),
            self.color.is_some(),
            self.price_range.is_some(),
            !self.attributes.is_empty(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.split(|c: char| !c.is_alphanumeric()).any(|w| w == needle)
        || (needle.contains(' ') && haystack.contains(needle))
}

/// Parse structured constraints out of a (normalised) query.
pub fn extract_info(query: &str) -> ExtractedInfo {
    let lower = query.to_lowercase();
    let mut info = ExtractedInfo::default();

    for (term, brand) in BRAND_MAP.iter() {
        if contains_word(&lower, term) {
            info.brand = Some(brand.to_string());
            break;
        }
    }
    for (term, vendor) in GPU_VENDORS {
        if contains_word(&lower, term) {
            info.gpu_vendor = Some(vendor.to_string());
            break;
        }
    }
    // Bare "amd" is ambiguous between CPU and GPU; treat as GPU vendor when
    // paired with graphics words, else CPU.
    if contains_word(&lower, "amd") && info.gpu_vendor.is_none() {
        if lower.contains("gpu") || lower.contains("graphics") {
            info.gpu_vendor = Some("AMD".into());
        } else {
            info.cpu_vendor = Some("AMD".into());
        }
    }
    for (term, vendor) in CPU_VENDORS {
        if contains_word(&lower, term) && info.cpu_vendor.is_none() {
            info.cpu_vendor = Some(vendor.to_string());
            break;
        }
    }

    for color in COLOR_TERMS {
        if contains_word(&lower, color) {
            info.color = Some(color.to_string());
            break;
        }
    }

    info.price_range = parse_price_phrase(&lower, false);

    for (term, attribute) in USE_CASE_ATTRIBUTES {
        if contains_word(&lower, term) && !info.attributes.contains(&attribute.to_string()) {
            info.attributes.push(attribute.to_string());
        }
    }

    if contains_word(&lower, "desktop")
        || lower.contains("gaming pc")
        || lower.contains("gaming computer")
        || contains_word(&lower, "tower")
        || contains_word(&lower, "workstation")
    {
        info.product_type = Some("desktop".into());
    } else if contains_word(&lower, "laptop")
        || contains_word(&lower, "laptops")
        || contains_word(&lower, "notebook")
        || contains_word(&lower, "macbook")
    {
        info.product_type = Some("laptop".into());
    }

    info
}

/// Expand the colour a user asked for into its family of close shades.
pub fn color_family(color: &str) -> Vec<String> {
    let lower = color.to_lowercase();
    for (family, terms) in COLOR_FAMILIES {
        if lower == *family || terms.iter().any(|t| *t == lower) {
            return terms.iter().map(|t| t.to_string()).collect();
        }
    }
    vec![lower]
}

/// Expand a car-brand nationality into concrete makes, if it is one.
pub fn expand_nationality(term: &str) -> Option<&'static str> {
    let lower = term.to_lowercase();
    NATIONALITY_MAKES
        .iter()
        .find(|(nat, _)| *nat == lower)
        .map(|(_, makes)| *makes)
}

/// Budget grammar: "under 1500", "over 30k", "20k-35k", "$1,000-$2,000",
/// "1500". The "k" suffix multiplies by 1000. Returns dollars.
pub fn parse_budget(raw: &str) -> Option<(Option<i64>, Option<i64>)> {
    parse_price_phrase(&raw.to_lowercase(), true)
}

fn expand_k_suffix(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut number = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            number.push(c);
            if matches!(chars.peek(), Some(&'k') | Some(&'K')) {
                chars.next();
                if let Ok(n) = number.parse::<i64>() {
                    out.push_str(&(n * 1000).to_string());
                    number.clear();
                    continue;
                }
            }
        } else {
            out.push_str(&number);
            number.clear();
            out.push(c);
        }
    }
    out.push_str(&number);
    out
}

fn parse_price_phrase(lower: &str, assume_budget_context: bool) -> Option<(Option<i64>, Option<i64>)> {
    let has_price_context = assume_budget_context
        || lower.contains('$')
        || lower.contains("budget")
        || lower.contains("price")
        || lower.contains("dollar");
    let text = expand_k_suffix(&lower.replace(['$', ','], ""));
    let numbers: Vec<i64> = extract_numbers(&text);

    if let Some(pos) = find_any(&text, &["under ", "below ", "less than ", "at most ", "up to "]) {
        if let Some(n) = first_number_after(&text, pos) {
            return Some((None, Some(n)));
        }
    }
    if let Some(pos) = find_any(&text, &["over ", "above ", "more than ", "at least "]) {
        if let Some(n) = first_number_after(&text, pos) {
            return Some((Some(n), None));
        }
    }
    // "N-M" range
    if let Some(dash) = text.find('-') {
        let before: String = text[..dash]
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
            .chars()
            .rev()
            .collect();
        let after: String = text[dash + 1..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let (Ok(lo), Ok(hi)) = (before.parse::<i64>(), after.parse::<i64>()) {
            return Some((Some(lo), Some(hi)));
        }
    }
    // A lone amount is a ceiling only in a budget context: "rtx 4090" must
    // not become a price cap
    if has_price_context && numbers.len() == 1 && numbers[0] >= 5 {
        return Some((None, Some(numbers[0])));
    }
    None
}

fn extract_numbers(text: &str) -> Vec<i64> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if !current.is_empty() {
            if let Ok(n) = current.parse() {
                numbers.push(n);
            }
            current.clear();
        }
    }
    if let Ok(n) = current.parse() {
        numbers.push(n);
    }
    numbers
}

fn find_any(text: &str, needles: &[&str]) -> Option<usize> {
    needles.iter().filter_map(|n| text.find(n).map(|p| p + n.len())).min()
}

fn first_number_after(text: &str, pos: usize) -> Option<i64> {
    extract_numbers(&text[pos..]).first().copied()
}

/// Whether a query is specific enough to skip the interview: either ≥2
/// structured signals, or an explicit model-level ask.
pub fn is_specific_query(query: &str, info: &ExtractedInfo) -> bool {
    if info.constraint_count() >= 2 {
        return true;
    }
    // A long descriptive query with a price is actionable on its own
    info.price_range.is_some() && query.split_whitespace().count() >= 4
}
