use std::{fmt::Display, net::SocketAddr, str::FromStr};

use anyhow::{anyhow, Context};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
}

impl Config {
    /// Reads the process environment, falling back to `.env` and then to defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(|key| dotenvy::var(key).ok())
    }

    fn load_with(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            host: try_load(&lookup, "HOST", "0.0.0.0")?,
            port: try_load(&lookup, "PORT", "3000")?,
            database_url: try_load(&lookup, "DATABASE_URL", "sqlite://chapel.db")?,
            max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "5")?,
        })
    }

    pub fn address(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn try_load<T: FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value
        .parse()
        .map_err(|e| anyhow!("invalid {key} value {value:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::load_with(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_url, "sqlite://chapel.db");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.address().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = Config::load_with(lookup(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "sqlite::memory:"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url, "sqlite::memory:");
    }

    #[test]
    fn unparsable_port_is_an_error() {
        assert!(Config::load_with(lookup(&[("PORT", "eighty")])).is_err());
    }
}
