// src/config/helpers.rs
// Environment lookup helpers shared by the domain configs

use std::str::FromStr;

/// Read an env var, falling back to a default when unset or empty.
pub fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

/// Read an env var and parse it, falling back to a default on absence or parse failure.
pub fn env_parsed_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Read an optional env var; empty strings count as absent.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default() {
        std::env::remove_var("SHOWROOM_TEST_MISSING");
        assert_eq!(env_or("SHOWROOM_TEST_MISSING", "fallback"), "fallback");
    }

    #[test]
    fn test_env_parsed_or_bad_value() {
        std::env::set_var("SHOWROOM_TEST_BAD_INT", "not-a-number");
        assert_eq!(env_parsed_or("SHOWROOM_TEST_BAD_INT", 7u32), 7);
        std::env::remove_var("SHOWROOM_TEST_BAD_INT");
    }
}
