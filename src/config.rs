use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// One year.
pub const MAX_VERIFICATION_TTL_HOURS: i64 = 24 * 365;
/// One week.
pub const MAX_RESET_TTL_MINUTES: i64 = 60 * 24 * 7;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub verification_ttl_hours: i64,
    pub reset_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub tokens: TokenConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL").context("DATABASE_URL is not set")?;
        let database = DatabaseConfig {
            url,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            acquire_timeout_secs: parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", 5)?,
        };
        let tokens = TokenConfig {
            verification_ttl_hours: parse_ttl(
                &lookup,
                "VERIFICATION_TTL_HOURS",
                24,
                MAX_VERIFICATION_TTL_HOURS,
            )?,
            reset_ttl_minutes: parse_ttl(
                &lookup,
                "RESET_TOKEN_TTL_MINUTES",
                60,
                MAX_RESET_TTL_MINUTES,
            )?,
        };
        Ok(Self { database, tokens })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

// TTLs must be positive and bounded.
fn parse_ttl<F>(lookup: &F, key: &str, default: i64, max: i64) -> anyhow::Result<i64>
where
    F: Fn(&str) -> Option<String>,
{
    let ttl = parse_or(lookup, key, default)?;
    anyhow::ensure!(
        (1..=max).contains(&ttl),
        "invalid value for {key}: {ttl} (expected 1..={max})"
    );
    Ok(ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_url_is_set() {
        let cfg = AppConfig::from_lookup(lookup_from(&[(
            "DATABASE_URL",
            "postgres://localhost/accounts",
        )]))
        .expect("config should load");

        assert_eq!(cfg.database.url, "postgres://localhost/accounts");
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.database.acquire_timeout_secs, 5);
        assert_eq!(cfg.tokens.verification_ttl_hours, 24);
        assert_eq!(cfg.tokens.reset_ttl_minutes, 60);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/accounts"),
            ("DB_MAX_CONNECTIONS", "3"),
            ("DB_ACQUIRE_TIMEOUT_SECS", " 12 "),
            ("VERIFICATION_TTL_HOURS", "48"),
            ("RESET_TOKEN_TTL_MINUTES", "15"),
        ]))
        .expect("config should load");

        assert_eq!(cfg.database.max_connections, 3);
        assert_eq!(cfg.database.acquire_timeout_secs, 12);
        assert_eq!(cfg.tokens.verification_ttl_hours, 48);
        assert_eq!(cfg.tokens.reset_ttl_minutes, 15);
    }

    #[test]
    fn missing_url_is_an_error() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn garbage_number_is_an_error() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/accounts"),
            ("DB_MAX_CONNECTIONS", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));
    }

    fn with_ttl(key: &'static str, value: &'static str) -> anyhow::Result<AppConfig> {
        AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/accounts"),
            (key, value),
        ]))
    }

    #[test]
    fn negative_ttls_are_rejected() {
        let err = with_ttl("RESET_TOKEN_TTL_MINUTES", "-5").unwrap_err();
        assert!(err.to_string().contains("RESET_TOKEN_TTL_MINUTES"));
        let err = with_ttl("VERIFICATION_TTL_HOURS", "-1").unwrap_err();
        assert!(err.to_string().contains("VERIFICATION_TTL_HOURS"));
    }

    #[test]
    fn zero_ttls_are_rejected() {
        assert!(with_ttl("RESET_TOKEN_TTL_MINUTES", "0").is_err());
        assert!(with_ttl("VERIFICATION_TTL_HOURS", "0").is_err());
    }

    #[test]
    fn oversized_ttls_are_rejected_instead_of_overflowing() {
        let err = with_ttl("VERIFICATION_TTL_HOURS", "9223372036854775807").unwrap_err();
        assert!(err.to_string().contains("VERIFICATION_TTL_HOURS"));
        assert!(with_ttl("RESET_TOKEN_TTL_MINUTES", "9223372036854775807").is_err());
        assert!(with_ttl("VERIFICATION_TTL_HOURS", "8761").is_err());
        assert!(with_ttl("RESET_TOKEN_TTL_MINUTES", "10081").is_err());
    }

    #[test]
    fn ttl_upper_bounds_are_inclusive() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/accounts"),
            ("VERIFICATION_TTL_HOURS", "8760"),
            ("RESET_TOKEN_TTL_MINUTES", "10080"),
        ]))
        .expect("config should load");
        let policy = crate::users::TokenPolicy::from(&cfg.tokens);
        assert_eq!(policy.verification_ttl, time::Duration::hours(8760));
        assert_eq!(policy.reset_ttl, time::Duration::minutes(10080));
    }
}
