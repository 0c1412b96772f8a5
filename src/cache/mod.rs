// src/cache/mod.rs
// Redis cache-aside tier.
//
// The cache is an accelerator, never a dependency: a missing or failing
// Redis degrades every operation to a miss/no-op and the request proceeds
// against the source of truth.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RedisConfig;
use crate::data::product::FilterMap;

#[derive(Clone)]
pub struct RedisCache {
    manager: Option<ConnectionManager>,
    default_ttl_secs: u64,
}

impl RedisCache {
    /// Connect if configured. Connection failures disable the tier with a
    /// warning rather than failing startup.
    pub async fn connect(config: &RedisConfig) -> Self {
        let manager = match &config.url {
            None => {
                info!("Redis not configured; cache tier disabled");
                None
            }
            Some(url) => match redis::Client::open(url.as_str()) {
                Ok(client) => match client.get_connection_manager().await {
                    Ok(manager) => {
                        info!("Redis cache connected");
                        Some(manager)
                    }
                    Err(e) => {
                        warn!("Redis unavailable ({}); proceeding without cache", e);
                        None
                    }
                },
                Err(e) => {
                    warn!("Invalid Redis URL ({}); proceeding without cache", e);
                    None
                }
            },
        };
        Self {
            manager,
            default_ttl_secs: config.default_ttl_secs,
        }
    }

    /// Cache disabled entirely (tests, CLI without Redis).
    pub fn disabled() -> Self {
        Self {
            manager: None,
            default_ttl_secs: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.manager.is_some()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut manager = self.manager.clone()?;
        match manager.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!("Cache hit: {}", key);
                    Some(value)
                }
                Err(e) => {
                    warn!("Corrupt cache entry {} dropped: {}", key, e);
                    let _ = manager.del::<_, ()>(key).await;
                    None
                }
            },
            Ok(None) => {
                debug!("Cache miss: {}", key);
                None
            }
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<u64>) {
        let Some(mut manager) = self.manager.clone() else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialise cache entry {}: {}", key, e);
                return;
            }
        };
        let ttl = ttl_secs.unwrap_or(self.default_ttl_secs);
        let outcome = if ttl > 0 {
            manager.set_ex::<_, _, ()>(key, raw, ttl).await
        } else {
            manager.set::<_, _, ()>(key, raw).await
        };
        if let Err(e) = outcome {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Some(mut manager) = self.manager.clone() {
            if let Err(e) = manager.del::<_, ()>(key).await {
                warn!("Cache delete failed for {}: {}", key, e);
            }
        }
    }

    /// Drop every key derived from a product after an inventory or catalog
    /// mutation.
    pub async fn invalidate_product(&self, product_id: &str) {
        for key in [
            product_key(product_id),
            format!("price:{product_id}"),
            format!("inventory:{product_id}"),
        ] {
            self.delete(&key).await;
        }
    }
}

pub fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

pub fn product_key(product_id: &str) -> String {
    format!("product:{product_id}")
}

/// Search-envelope cache key: md5 over the sorted filters plus category,
/// page, and limit, so logically identical requests collide regardless of
/// filter insertion order.
pub fn search_key(filters: &FilterMap, category: Option<&str>, page: &str, limit: i64) -> String {
    let mut entries: Vec<(String, String)> = filters
        .iter()
        .map(|(k, v)| (k.clone(), canonical_value(v)))
        .collect();
    entries.sort();

    let joined = entries
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let material = format!("{}|{}|{}|{}", joined, category.unwrap_or(""), page, limit);
    format!("search:{:x}", md5::compute(material.as_bytes()))
}

fn canonical_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_key_order_independent() {
        let mut a = FilterMap::new();
        a.insert("brand".into(), json!("Dell"));
        a.insert("price_max_cents".into(), json!(150000));

        let mut b = FilterMap::new();
        b.insert("price_max_cents".into(), json!(150000));
        b.insert("brand".into(), json!("Dell"));

        assert_eq!(
            search_key(&a, Some("Electronics"), "0", 12),
            search_key(&b, Some("Electronics"), "0", 12)
        );
    }

    #[test]
    fn test_search_key_sensitive_to_page_and_category() {
        let filters = FilterMap::new();
        let k1 = search_key(&filters, Some("Books"), "0", 12);
        let k2 = search_key(&filters, Some("Books"), "12", 12);
        let k3 = search_key(&filters, Some("Electronics"), "0", 12);
        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
        assert!(k1.starts_with("search:"));
    }

    #[tokio::test]
    async fn test_disabled_cache_is_noop() {
        let cache = RedisCache::disabled();
        assert!(!cache.is_available());
        cache.set_json("k", &json!({"a": 1}), None).await;
        assert!(cache.get_json::<Value>("k").await.is_none());
    }
}
