use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use anyhow::{Context, Result};
use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub meili_url: String,
    pub meili_key: String,
    pub page_size: usize,
    pub session_ttl_secs: u64,
    /// Base used when building links that leave the service, such as reset emails.
    pub public_url: String,
    pub mail_url: Option<String>,
    pub mail_from: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            port: try_load("RUST_PORT", "7777")?,
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
            meili_url: try_load("MEILI_URL", "http://127.0.0.1:7700")?,
            meili_key: read_secret("MEILI_ADMIN_KEY")?,
            page_size: try_load("PAGE_SIZE", "6")?,
            session_ttl_secs: try_load("SESSION_TTL_SECS", "1209600")?,
            public_url: try_load("PUBLIC_URL", "http://localhost:7777")?,
            mail_url: var("MAIL_URL").ok(),
            mail_from: try_load("MAIL_FROM", "Storefront <noreply@storefront.local>")?,
        })
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    parse(key, &raw)
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid {key} value: {e}"))
}

/// Docker secrets first, then the environment.
fn read_secret(secret_name: &str) -> Result<String> {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(secret) => Ok(secret.trim().to_string()),
        Err(e) => {
            warn!("Failed to read {secret_name} from file: {e}");

            env::var(secret_name)
                .map(|secret| secret.trim().to_string())
                .with_context(|| format!("{secret_name} missing from /run/secrets and environment"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse;

    #[test]
    fn test_parse_valid() {
        let port: u16 = parse("RUST_PORT", "8080").unwrap();
        assert_eq!(port, 8080);

        let url: String = parse("REDIS_URL", "redis://cache:6379").unwrap();
        assert_eq!(url, "redis://cache:6379");
    }

    #[test]
    fn test_parse_invalid_names_key() {
        let err = parse::<u16>("RUST_PORT", "eighty").unwrap_err();
        assert!(err.to_string().starts_with("Invalid RUST_PORT value"));
    }
}
