// src/data/vehicle_store.rs
// Vehicle listings store over SQLite, keyed by VIN.
//
// Filter values arrive as loose strings from extraction ("20000-30000",
// "Honda,Toyota"); this store owns the parsing so callers never build SQL.

use rand::seq::SliceRandom;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info};

use crate::data::product::{FilterMap, Product, VehicleFields};
use crate::error::Result;

pub struct VehicleStore {
    pool: SqlitePool,
}

/// Parse "lo-hi", "lo", or bare numbers out of a range filter string.
fn parse_numeric_range(value: &str) -> (Option<i64>, Option<i64>) {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
        .collect();
    if let Some((lo, hi)) = cleaned.split_once('-') {
        (lo.parse::<f64>().ok().map(|v| v as i64), hi.parse::<f64>().ok().map(|v| v as i64))
    } else {
        let single = cleaned.parse::<f64>().ok().map(|v| v as i64);
        (single, single)
    }
}

/// Split "Honda,Toyota" into trimmed non-empty values.
fn split_multi_value(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn filter_str(filters: &FilterMap, key: &str) -> Option<String> {
    match filters.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

impl VehicleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vehicles (
                vin TEXT PRIMARY KEY,
                make TEXT NOT NULL,
                model TEXT NOT NULL,
                year INTEGER NOT NULL,
                trim TEXT,
                body_style TEXT,
                fuel_type TEXT,
                drivetrain TEXT,
                transmission TEXT,
                price INTEGER,
                mileage INTEGER,
                mpg_city INTEGER,
                mpg_hwy INTEGER,
                exterior_color TEXT,
                interior_color TEXT,
                seating_capacity INTEGER,
                is_used INTEGER,
                photo_count INTEGER NOT NULL DEFAULT 0,
                primary_image_url TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vehicles_search
             ON vehicles (body_style, fuel_type, make, price)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Search listings with loose filters. When a price range is present the
    /// range is split into three bands sampled separately, then shuffled, so
    /// the candidate pool spans the whole budget instead of clustering at
    /// the cheap end.
    pub async fn search_listings(&self, filters: &FilterMap, limit: i64) -> Result<Vec<Product>> {
        let price_range = filter_str(filters, "price").map(|p| parse_numeric_range(&p));

        if let Some((Some(lo), Some(hi))) = price_range {
            if hi > lo && limit >= 30 {
                return self.search_price_stratified(filters, limit, lo.max(1), hi).await;
            }
        }

        self.search_plain(filters, limit, None).await
    }

    async fn search_price_stratified(
        &self,
        filters: &FilterMap,
        limit: i64,
        lo: i64,
        hi: i64,
    ) -> Result<Vec<Product>> {
        let band_width = ((hi - lo) / 3).max(1);
        let per_band = limit / 3 + 1;
        let mut all = Vec::new();
        for band in 0..3 {
            let band_lo = lo + band * band_width;
            let band_hi = if band == 2 { hi } else { band_lo + band_width };
            let mut band_filters = filters.clone();
            band_filters.insert("price".into(), Value::String(format!("{band_lo}-{band_hi}")));
            let rows = self.search_plain(&band_filters, per_band, None).await?;
            all.extend(rows);
        }
        // Shuffle so adjacent price bands don't cluster in ranking order
        all.shuffle(&mut rand::rng());
        all.truncate(limit as usize);
        debug!("Stratified price sampling returned {} listings", all.len());
        Ok(all)
    }

    async fn search_plain(
        &self,
        filters: &FilterMap,
        limit: i64,
        order_by: Option<&str>,
    ) -> Result<Vec<Product>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM vehicles WHERE price IS NOT NULL AND price >= 1 AND photo_count > 0",
        );

        for key in ["make", "model", "body_style", "fuel_type", "drivetrain", "transmission",
                    "exterior_color", "interior_color"] {
            if let Some(raw) = filter_str(filters, key) {
                let values = split_multi_value(&raw);
                if !values.is_empty() {
                    builder.push(format!(" AND {key} COLLATE NOCASE IN ("));
                    let mut sep = builder.separated(", ");
                    for v in values {
                        sep.push_bind(v);
                    }
                    builder.push(")");
                }
            }
        }

        for key in ["year", "price", "mileage"] {
            if let Some(raw) = filter_str(filters, key) {
                let (lo, hi) = parse_numeric_range(&raw);
                // A $1 floor keeps $0 test listings out even for open ranges
                if key == "price" {
                    builder.push(" AND price >= ").push_bind(lo.unwrap_or(0).max(1));
                    if let Some(hi) = hi {
                        builder.push(" AND price <= ").push_bind(hi);
                    }
                } else if lo == hi && lo.is_some() {
                    builder.push(format!(" AND {key} = ")).push_bind(lo.unwrap());
                } else {
                    if let Some(lo) = lo {
                        builder.push(format!(" AND {key} >= ")).push_bind(lo);
                    }
                    if let Some(hi) = hi {
                        builder.push(format!(" AND {key} <= ")).push_bind(hi);
                    }
                }
            }
        }

        if let Some(Value::Bool(is_used)) = filters.get("is_used") {
            builder.push(" AND is_used = ").push_bind(if *is_used { 1i64 } else { 0i64 });
        }

        if let Some(seats) = filters.get("seating_capacity").and_then(|v| v.as_i64()) {
            builder.push(" AND seating_capacity >= ").push_bind(seats);
        }

        if let Some(Value::Array(avoid)) = filters.get("avoid_vins") {
            let vins: Vec<String> = avoid
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
            if !vins.is_empty() {
                builder.push(" AND vin NOT IN (");
                let mut sep = builder.separated(", ");
                for vin in vins {
                    sep.push_bind(vin);
                }
                builder.push(")");
            }
        }

        let order = order_by.unwrap_or("price ASC");
        builder.push(format!(" ORDER BY {order} LIMIT ")).push_bind(limit);

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_vehicle).collect())
    }

    pub async fn get_by_vin(&self, vin: &str) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM vehicles WHERE vin = ?")
            .bind(vin)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_vehicle))
    }

    /// All distinct (make, model, year) in the listings — drives phrase-store
    /// imputation coverage.
    pub async fn all_mmys(&self) -> Result<Vec<(String, String, i64)>> {
        let rows = sqlx::query(
            "SELECT DISTINCT make, model, year FROM vehicles
             WHERE make IS NOT NULL AND model IS NOT NULL AND year IS NOT NULL
             ORDER BY make, model, year",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("make"), r.get("model"), r.get("year")))
            .collect())
    }

    pub async fn insert(&self, product: &Product) -> Result<()> {
        let v = product.vehicle.clone().unwrap_or_default();
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO vehicles (
                vin, make, model, year, trim, body_style, fuel_type, drivetrain,
                transmission, price, mileage, mpg_city, mpg_hwy, exterior_color,
                interior_color, seating_capacity, is_used, photo_count, primary_image_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(v.make.clone().unwrap_or_default())
        .bind(v.model.clone().unwrap_or_default())
        .bind(v.year.unwrap_or(0))
        .bind(&v.trim)
        .bind(&v.body_style)
        .bind(&v.fuel_type)
        .bind(&v.drivetrain)
        .bind(&v.transmission)
        .bind(v.price)
        .bind(v.mileage)
        .bind(v.mpg_city)
        .bind(v.mpg_hwy)
        .bind(&v.exterior_color)
        .bind(&v.interior_color)
        .bind(v.seating_capacity)
        .bind(v.is_used.map(|b| if b { 1i64 } else { 0 }))
        .bind(1i64)
        .bind(Option::<String>::None)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM vehicles")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        info!("Vehicle store warm: {} rows", n);
        Ok(n)
    }
}

fn row_to_vehicle(row: &sqlx::sqlite::SqliteRow) -> Product {
    let make: String = row.get("make");
    let model: String = row.get("model");
    let year: i64 = row.get("year");
    let price: Option<i64> = row.get("price");

    Product {
        id: row.get("vin"),
        name: format!("{year} {make} {model}"),
        brand: Some(make.clone()),
        category: Some("Vehicles".into()),
        price_cents: price.map(|p| p * 100),
        available_qty: Some(1),
        vehicle: Some(VehicleFields {
            make: Some(make),
            model: Some(model),
            year: Some(year),
            trim: row.get("trim"),
            mileage: row.get("mileage"),
            body_style: row.get("body_style"),
            fuel_type: row.get("fuel_type"),
            drivetrain: row.get("drivetrain"),
            transmission: row.get("transmission"),
            price,
            mpg_city: row.get("mpg_city"),
            mpg_hwy: row.get("mpg_hwy"),
            exterior_color: row.get("exterior_color"),
            interior_color: row.get("interior_color"),
            seating_capacity: row.get("seating_capacity"),
            is_used: row.get::<Option<i64>, _>("is_used").map(|v| v != 0),
        }),
        ..Default::default()
    }
}
