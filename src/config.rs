use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::Context;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub admin: Option<AdminCredentials>,
    pub default_page_size: u64,
    pub max_page_size: u64,
    pub store_timeout: Duration,
    pub store_read_retries: u32,
    pub delivery_fee: Decimal,
}

#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET is not set")?;
        let host = lookup("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&lookup, "APP_PORT", 3000u16)?;

        let ttl_minutes = parse_or(&lookup, "TOKEN_TTL_MINUTES", 60i64)?;
        if ttl_minutes <= 0 {
            anyhow::bail!("TOKEN_TTL_MINUTES must be positive");
        }

        let admin = match (lookup("ADMIN_USERNAME"), lookup("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(AdminCredentials { username, password })
            }
            (None, None) => None,
            _ => anyhow::bail!("ADMIN_USERNAME and ADMIN_PASSWORD must be set together"),
        };

        let default_page_size = parse_or(&lookup, "DEFAULT_PAGE_SIZE", 5u64)?;
        let max_page_size = parse_or(&lookup, "MAX_PAGE_SIZE", 100u64)?;
        if default_page_size == 0 || default_page_size > max_page_size {
            anyhow::bail!("DEFAULT_PAGE_SIZE must be between 1 and MAX_PAGE_SIZE");
        }

        let timeout_ms = parse_or(&lookup, "STORE_TIMEOUT_MS", 5000u64)?;
        let store_read_retries = parse_or(&lookup, "STORE_READ_RETRIES", 2u32)?;
        let delivery_fee = parse_or(&lookup, "DELIVERY_FEE", Decimal::ZERO)?;
        if delivery_fee.is_sign_negative() {
            anyhow::bail!("DELIVERY_FEE must not be negative");
        }

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            token_ttl: chrono::Duration::minutes(ttl_minutes),
            admin,
            default_page_size,
            max_page_size,
            store_timeout: Duration::from_millis(timeout_ms),
            store_read_retries,
            delivery_fee,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key} value {raw:?}: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.token_ttl, chrono::Duration::hours(1));
        assert_eq!(config.default_page_size, 5);
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.store_read_retries, 2);
        assert_eq!(config.delivery_fee, Decimal::ZERO);
        assert!(config.admin.is_none());
    }

    #[test]
    fn missing_secret_is_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://x")]))
            .unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn admin_credentials_must_come_in_pairs() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("ADMIN_USERNAME", "root"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("ADMIN_PASSWORD"));

        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("ADMIN_USERNAME", "root"),
            ("ADMIN_PASSWORD", "hunter2"),
        ]))
        .unwrap();
        assert_eq!(config.admin.unwrap().username, "root");
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("DEFAULT_PAGE_SIZE", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DEFAULT_PAGE_SIZE"));
    }

    #[test]
    fn delivery_fee_parses_as_decimal() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("DELIVERY_FEE", "4.50"),
        ]))
        .unwrap();
        assert_eq!(config.delivery_fee, Decimal::new(450, 2));
    }
}
