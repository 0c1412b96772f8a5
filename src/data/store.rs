// src/data/store.rs
// Catalog product store (laptops/electronics/books) over SQLite.

use serde_json::Map;
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info};

use crate::error::Result;

use super::product::{BookFields, LaptopFields, Product};

/// Structured catalog query. The hybrid-search layer fills this in from the
/// parsed request; the store turns it into SQL exactly once so the strict
/// pass and relaxation ladder share one code path.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub product_types: Vec<String>,
    pub gpu_vendors: Vec<String>,
    pub cpu_vendor: Option<String>,
    pub brand: Option<String>,
    /// Component brands (NVIDIA/AMD/Intel) also match name/description.
    pub brand_lenient: bool,
    pub subcategory: Option<String>,
    pub genre: Option<String>,
    pub format: Option<String>,
    /// Colour family terms; at least one must match colour/name/description.
    pub color_terms: Vec<String>,
    pub price_min_cents: Option<i64>,
    pub price_max_cents: Option<i64>,
    /// "laptop" or "desktop" lenient text matching.
    pub product_type_hint: Option<String>,
    /// Candidate narrowing from KG or vector search.
    pub candidate_ids: Option<Vec<String>>,
    /// Keyword terms (normalised query + synonyms) when no candidate ids.
    pub keyword_terms: Vec<String>,
    pub limit: i64,
    pub offset: i64,
}

pub struct ProductStore {
    pool: SqlitePool,
}

impl ProductStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the products table and its search index when absent.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                product_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                brand TEXT,
                category TEXT,
                subcategory TEXT,
                product_type TEXT,
                description TEXT,
                color TEXT,
                gpu_vendor TEXT,
                price_cents INTEGER NOT NULL DEFAULT 0,
                currency TEXT NOT NULL DEFAULT 'USD',
                available_qty INTEGER NOT NULL DEFAULT 0,
                scraped_from_url TEXT,
                attributes TEXT,
                processor TEXT,
                ram_gb INTEGER,
                storage_gb INTEGER,
                screen_size REAL,
                gpu TEXT,
                battery TEXT,
                os TEXT,
                weight TEXT,
                refresh_rate_hz INTEGER,
                author TEXT,
                genre TEXT,
                pages INTEGER,
                format TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_products_search
             ON products (category, product_type, brand, price_cents)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Run a catalog query: count, then the page. The desktop product-type
    /// hint is tried strictly first and dropped (category kept) when it
    /// matches nothing.
    pub async fn search(&self, query: &ProductQuery) -> Result<(Vec<Product>, i64)> {
        let mut effective = query.clone();
        let mut total = self.count(&effective).await?;

        if total == 0 && query.product_type_hint.as_deref() == Some("desktop") {
            debug!("No strict desktop matches; relaxing product-type text filter");
            effective.product_type_hint = None;
            total = self.count(&effective).await?;
        }

        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM products WHERE 1=1");
        push_filters(&mut builder, &effective);
        builder.push(" ORDER BY price_cents ASC, product_id ASC");
        builder.push(" LIMIT ").push_bind(effective.limit);
        builder.push(" OFFSET ").push_bind(effective.offset);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let products = rows.iter().map(row_to_product).collect();
        Ok((products, total))
    }

    pub async fn count(&self, query: &ProductQuery) -> Result<i64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS n FROM products WHERE 1=1");
        push_filters(&mut builder, query);
        let row = builder.build().fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("n"))
    }

    pub async fn get(&self, product_id: &str) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE product_id = ?")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_product))
    }

    /// Insert or replace a product row (seeding, inventory mutations).
    pub async fn upsert(&self, product: &Product) -> Result<()> {
        let laptop = product.laptop.clone().unwrap_or_default();
        let book = product.book.clone().unwrap_or_default();
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO products (
                product_id, name, brand, category, subcategory, product_type,
                description, color, gpu_vendor, price_cents, currency,
                available_qty, scraped_from_url, attributes,
                processor, ram_gb, storage_gb, screen_size, gpu, battery, os,
                weight, refresh_rate_hz, author, genre, pages, format
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.category)
        .bind(&product.subcategory)
        .bind(&product.product_type)
        .bind(&product.description)
        .bind(&product.color)
        .bind(product.laptop.as_ref().and_then(|l| l.gpu_vendor.clone()))
        .bind(product.price_cents.unwrap_or(0))
        .bind(product.currency.clone().unwrap_or_else(|| "USD".into()))
        .bind(product.available_qty.unwrap_or(0))
        .bind(&product.scraped_from_url)
        .bind(serde_json::to_string(&product.attributes).ok())
        .bind(&laptop.processor)
        .bind(laptop.ram_gb)
        .bind(laptop.storage_gb)
        .bind(laptop.screen_size)
        .bind(&laptop.gpu)
        .bind(&laptop.battery)
        .bind(&laptop.os)
        .bind(&laptop.weight)
        .bind(laptop.refresh_rate_hz)
        .bind(&book.author)
        .bind(&book.genre)
        .bind(book.pages)
        .bind(&book.format)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Warm-up probe used by preload.
    pub async fn ping(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM products")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        info!("Product store warm: {} rows", n);
        Ok(n)
    }
}

/// Shared WHERE-clause generation for count and page queries.
fn push_filters(builder: &mut QueryBuilder<Sqlite>, q: &ProductQuery) {
    // Demo/test rows never surface. Seed rows (no source URL) are fine.
    builder.push(
        " AND (scraped_from_url IS NULL OR (
            scraped_from_url NOT LIKE '%demo%'
            AND scraped_from_url NOT LIKE '%test%'
            AND scraped_from_url NOT LIKE '%example%'))",
    );

    if let Some(category) = &q.category {
        builder.push(" AND category = ").push_bind(category.clone());
    }

    if !q.product_types.is_empty() {
        builder.push(" AND product_type IN (");
        let mut sep = builder.separated(", ");
        for t in &q.product_types {
            sep.push_bind(t.clone());
        }
        builder.push(")");
    }

    if !q.gpu_vendors.is_empty() {
        // NULL means unknown vendor and must not pass a vendor constraint
        builder.push(" AND gpu_vendor IS NOT NULL AND gpu_vendor IN (");
        let mut sep = builder.separated(", ");
        for v in &q.gpu_vendors {
            sep.push_bind(v.trim().to_string());
        }
        builder.push(")");
    }

    if let Some(cpu) = &q.cpu_vendor {
        let pattern = format!("%{}%", cpu.trim().to_lowercase());
        builder
            .push(" AND (LOWER(name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(description) LIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(brand) = &q.brand {
        if q.brand_lenient {
            let pattern = format!("%{}%", brand.to_lowercase());
            builder
                .push(" AND (brand = ")
                .push_bind(brand.clone())
                .push(" OR LOWER(name) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(description) LIKE ")
                .push_bind(pattern)
                .push(")");
        } else {
            // Explicit brand request is strict: no NULL-brand rows sneak in
            builder.push(" AND brand = ").push_bind(brand.clone());
        }
    }

    if let Some(subcategory) = &q.subcategory {
        let lower = subcategory.to_lowercase();
        builder
            .push(" AND (subcategory = ")
            .push_bind(subcategory.clone())
            .push(" OR subcategory IS NULL OR subcategory = ''")
            .push(" OR LOWER(description) LIKE ")
            .push_bind(format!("%{lower}%"));
        if lower == "gaming" {
            builder.push(" OR LOWER(name) LIKE '%gaming%'");
        }
        builder.push(")");
        if lower == "creative" {
            // Gaming-first hardware should not headline a creative search
            builder.push(
                " AND (subcategory IS NULL OR subcategory = '' OR subcategory != 'Gaming')
                  AND LOWER(name) NOT LIKE '%gaming%'
                  AND name NOT LIKE '%ROG%'",
            );
        }
    }

    if let Some(genre) = &q.genre {
        let pattern = format!("%{}%", genre.to_lowercase());
        builder
            .push(" AND (LOWER(genre) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(subcategory) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(description) LIKE ")
            .push_bind(pattern)
            .push(" OR genre IS NULL)");
    }

    if let Some(format) = &q.format {
        let pattern = format!("%{}%", format.to_lowercase());
        builder
            .push(" AND (LOWER(format) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(description) LIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if !q.color_terms.is_empty() {
        // A colour constraint requires a positive match somewhere
        builder.push(" AND (");
        let mut first = true;
        for term in q.color_terms.iter().take(8) {
            let pattern = format!("%{}%", term.to_lowercase());
            if !first {
                builder.push(" OR ");
            }
            first = false;
            builder
                .push("LOWER(color) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(name) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(description) LIKE ")
                .push_bind(pattern);
        }
        builder.push(")");
    }

    if let Some(min) = q.price_min_cents {
        builder.push(" AND price_cents >= ").push_bind(min);
    }
    if let Some(max) = q.price_max_cents {
        builder.push(" AND price_cents <= ").push_bind(max);
    }

    match q.product_type_hint.as_deref() {
        Some("laptop") => {
            builder.push(
                " AND (LOWER(name) LIKE '%laptop%' OR LOWER(name) LIKE '%notebook%'
                   OR LOWER(name) LIKE '%macbook%' OR LOWER(name) LIKE '%chromebook%'
                   OR LOWER(name) LIKE '%thinkpad%'
                   OR LOWER(description) LIKE '%laptop%' OR LOWER(description) LIKE '%notebook%')",
            );
        }
        Some("desktop") => {
            builder.push(
                " AND (LOWER(name) LIKE '%desktop%' OR LOWER(name) LIKE '%workstation%'
                   OR LOWER(name) LIKE '%tower%' OR LOWER(name) LIKE '%gaming pc%'
                   OR LOWER(name) LIKE '% pc%'
                   OR LOWER(description) LIKE '%desktop%' OR LOWER(description) LIKE '%gaming pc%')
                  AND LOWER(name) NOT LIKE '%laptop%'
                  AND LOWER(description) NOT LIKE '%laptop%'",
            );
        }
        _ => {}
    }

    if let Some(ids) = &q.candidate_ids {
        builder.push(" AND product_id IN (");
        if ids.is_empty() {
            builder.push("'')");
        } else {
            let mut sep = builder.separated(", ");
            for id in ids {
                sep.push_bind(id.clone());
            }
            builder.push(")");
        }
    } else if !q.keyword_terms.is_empty() {
        builder.push(" AND (");
        let mut first = true;
        for term in &q.keyword_terms {
            let pattern = format!("%{}%", term.to_lowercase());
            if !first {
                builder.push(" OR ");
            }
            first = false;
            builder
                .push("LOWER(name) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(description) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(category) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(brand) LIKE ")
                .push_bind(pattern);
        }
        builder.push(")");
    }
}

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Product {
    let category: Option<String> = row.get("category");

    let laptop = LaptopFields {
        processor: row.get("processor"),
        ram_gb: row.get("ram_gb"),
        storage_gb: row.get("storage_gb"),
        screen_size: row.get("screen_size"),
        gpu: row.get("gpu"),
        gpu_vendor: row.get("gpu_vendor"),
        battery: row.get("battery"),
        os: row.get("os"),
        weight: row.get("weight"),
        refresh_rate_hz: row.get("refresh_rate_hz"),
    };
    let book = BookFields {
        author: row.get("author"),
        genre: row.get("genre"),
        pages: row.get("pages"),
        format: row.get("format"),
    };

    let attributes = row
        .get::<Option<String>, _>("attributes")
        .and_then(|raw| serde_json::from_str::<Map<_, _>>(&raw).ok())
        .unwrap_or_default();

    Product {
        id: row.get("product_id"),
        name: row.get("name"),
        brand: row.get("brand"),
        subcategory: row.get("subcategory"),
        product_type: row.get("product_type"),
        price_cents: Some(row.get::<i64, _>("price_cents")),
        currency: row.get("currency"),
        available_qty: Some(row.get::<i64, _>("available_qty")),
        description: row.get("description"),
        color: row.get("color"),
        scraped_from_url: row.get("scraped_from_url"),
        attributes,
        laptop: (laptop != LaptopFields::default()).then_some(laptop),
        book: (book != BookFields::default()).then_some(book),
        vehicle: None,
        category,
        ranking: Default::default(),
    }
}
