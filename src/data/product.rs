// src/data/product.rs
// Normalised product record shared by all three domains.
//
// One flat record plus per-domain optional field groups; formatters and
// rankers consume the record directly instead of downcasting adapters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Loose filter mapping as accumulated from extraction, quick replies, and
/// request bodies. Keys beginning with `_` are internal hints and must never
/// be written from user input.
pub type FilterMap = Map<String, Value>;

/// Soft preferences inferred from free text, consumed by the rankers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImplicitPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_case: Option<String>,
    #[serde(default)]
    pub liked_features: Vec<String>,
    #[serde(default)]
    pub disliked_features: Vec<String>,
}

impl ImplicitPreferences {
    pub fn is_empty(&self) -> bool {
        self.liked_features.is_empty() && self.disliked_features.is_empty()
    }

    /// Merge newer preferences in: use_case is last-write-wins, feature
    /// lists append without duplicates.
    pub fn merge(&mut self, other: &ImplicitPreferences) {
        if other.use_case.is_some() {
            self.use_case = other.use_case.clone();
        }
        for feature in &other.liked_features {
            if !self.liked_features.contains(feature) {
                self.liked_features.push(feature.clone());
            }
        }
        for feature in &other.disliked_features {
            if !self.disliked_features.contains(feature) {
                self.disliked_features.push(feature.clone());
            }
        }
    }
}

/// Vehicle-specific fields (keyed by VIN at the store level).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VehicleFields {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i64>,
    pub trim: Option<String>,
    pub mileage: Option<i64>,
    pub body_style: Option<String>,
    pub fuel_type: Option<String>,
    pub drivetrain: Option<String>,
    pub transmission: Option<String>,
    /// Listing price in whole dollars (vehicle listings are not in cents).
    pub price: Option<i64>,
    pub mpg_city: Option<i64>,
    pub mpg_hwy: Option<i64>,
    pub exterior_color: Option<String>,
    pub interior_color: Option<String>,
    pub seating_capacity: Option<i64>,
    pub is_used: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LaptopFields {
    pub processor: Option<String>,
    pub ram_gb: Option<i64>,
    pub storage_gb: Option<i64>,
    pub screen_size: Option<f64>,
    pub gpu: Option<String>,
    pub gpu_vendor: Option<String>,
    pub battery: Option<String>,
    pub os: Option<String>,
    pub weight: Option<String>,
    pub refresh_rate_hz: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookFields {
    pub author: Option<String>,
    pub genre: Option<String>,
    pub pages: Option<i64>,
    pub format: Option<String>,
}

/// Method-specific scores stamped onto ranked candidates. Serialised with the
/// underscore names the clients expect.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RankingAnnotations {
    #[serde(rename = "_rank", skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(rename = "_score", skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(rename = "_dense_score", skip_serializing_if = "Option::is_none")]
    pub dense_score: Option<f64>,
    #[serde(rename = "_similarity_score", skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    #[serde(rename = "_pos_score", skip_serializing_if = "Option::is_none")]
    pub pos_score: Option<f64>,
    #[serde(rename = "_neg_score", skip_serializing_if = "Option::is_none")]
    pub neg_score: Option<f64>,
}

/// Normalised product record. Product ids are globally unique across domains
/// (VINs for vehicles, catalog ids otherwise).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    /// Price in integer minor units (cents) for catalog products.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_qty: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scraped_from_url: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub laptop: Option<LaptopFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book: Option<BookFields>,

    #[serde(flatten)]
    pub ranking: RankingAnnotations,
}

impl Product {
    /// Numeric view of a dimension for entropy/bucketing. Vehicle prices are
    /// dollars; catalog prices are converted from cents to dollars so one
    /// "price" axis works across domains.
    pub fn numeric_value(&self, dimension: &str) -> Option<f64> {
        match dimension {
            "price" => {
                if let Some(v) = self.vehicle.as_ref().and_then(|v| v.price) {
                    Some(v as f64)
                } else {
                    self.price_cents.map(|c| c as f64 / 100.0)
                }
            }
            "mileage" => self.vehicle.as_ref().and_then(|v| v.mileage).map(|m| m as f64),
            "year" => self.vehicle.as_ref().and_then(|v| v.year).map(|y| y as f64),
            "pages" => self.book.as_ref().and_then(|b| b.pages).map(|p| p as f64),
            "ram_gb" => self.laptop.as_ref().and_then(|l| l.ram_gb).map(|r| r as f64),
            "screen_size" => self.laptop.as_ref().and_then(|l| l.screen_size),
            _ => None,
        }
    }

    /// Categorical view of a dimension.
    pub fn string_value(&self, dimension: &str) -> Option<String> {
        let vehicle = self.vehicle.as_ref();
        match dimension {
            "make" => vehicle.and_then(|v| v.make.clone()),
            "model" => vehicle.and_then(|v| v.model.clone()),
            "body_style" => vehicle.and_then(|v| v.body_style.clone()),
            "fuel_type" => vehicle.and_then(|v| v.fuel_type.clone()),
            "drivetrain" => vehicle.and_then(|v| v.drivetrain.clone()),
            "transmission" => vehicle.and_then(|v| v.transmission.clone()),
            "is_used" => vehicle
                .and_then(|v| v.is_used)
                .map(|u| if u { "used".to_string() } else { "new".to_string() }),
            "brand" => self.brand.clone(),
            "category" => self.category.clone(),
            "subcategory" => self.subcategory.clone(),
            "genre" => self.book.as_ref().and_then(|b| b.genre.clone()),
            "format" => self.book.as_ref().and_then(|b| b.format.clone()),
            "author" => self.book.as_ref().and_then(|b| b.author.clone()),
            "os" => self.laptop.as_ref().and_then(|l| l.os.clone()),
            "gpu_vendor" => self
                .laptop
                .as_ref()
                .and_then(|l| l.gpu_vendor.clone())
                .or_else(|| self.attributes.get("gpu_vendor").and_then(|v| v.as_str().map(String::from))),
            _ => self.attributes.get(dimension).and_then(|v| v.as_str().map(String::from)),
        }
    }

    /// Trimmed record kept in session state for compare/refine turns:
    /// everything useful for a narrative, none of the bulky text.
    pub fn slim(&self) -> Product {
        let mut slim = self.clone();
        slim.description = None;
        slim.scraped_from_url = None;
        slim.attributes = Map::new();
        slim
    }

    /// Display price, domain-aware.
    pub fn display_price(&self) -> Option<String> {
        if let Some(price) = self.vehicle.as_ref().and_then(|v| v.price) {
            return Some(format!("${}", thousands(price)));
        }
        self.price_cents.map(|c| {
            if c % 100 == 0 {
                format!("${}", thousands(c / 100))
            } else {
                format!("${:.2}", c as f64 / 100.0)
            }
        })
    }
}

fn thousands(n: i64) -> String {
    let raw = n.abs().to_string();
    let mut out = String::new();
    for (i, ch) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 {
        format!("-{out}")
    } else {
        out
    }
}
