use anyhow::{anyhow, Context};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::publish::DEFAULT_PUBLISH_CONCURRENCY;

const DEFAULT_ENDPOINT: &str = "0.0.0.0:8080";
const DEFAULT_CLUSTERS_CONFIG: &str = "clusters.json";
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 20;

/// Settings of the API binary, read from the environment (and `.env`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceConfig {
    pub database_url: String,
    pub endpoint: SocketAddr,
    pub clusters_config: PathBuf,
    pub publish_concurrency: usize,
    pub database_max_connections: u32,
    pub jaeger_enabled: bool,
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;

        let endpoint = lookup("ENDPOINT")
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned())
            .parse()
            .context("ENDPOINT is not a socket address")?;

        let clusters_config = lookup("CLUSTERS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CLUSTERS_CONFIG));

        let publish_concurrency = match lookup("PUBLISH_CONCURRENCY") {
            Some(value) => value
                .parse()
                .context("PUBLISH_CONCURRENCY is not a number")?,
            None => DEFAULT_PUBLISH_CONCURRENCY,
        };

        if publish_concurrency == 0 {
            return Err(anyhow!("PUBLISH_CONCURRENCY must be at least 1"));
        }

        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => value
                .parse()
                .context("DATABASE_MAX_CONNECTIONS is not a number")?,
            None => DEFAULT_DATABASE_MAX_CONNECTIONS,
        };

        let jaeger_enabled = lookup("JAEGER_ENABLED")
            .map(|value| value.eq_ignore_ascii_case("true") || value == "1")
            .unwrap_or(false);

        Ok(Self {
            database_url,
            endpoint,
            clusters_config,
            publish_concurrency,
            database_max_connections,
            jaeger_enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();

        move |key| vars.get(key).map(|value| value.to_string())
    }

    #[test]
    fn test_defaults() {
        let config =
            ServiceConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/shipyard")]))
                .unwrap();

        assert_eq!(config.endpoint.to_string(), "0.0.0.0:8080");
        assert_eq!(config.clusters_config, PathBuf::from("clusters.json"));
        assert_eq!(config.publish_concurrency, 8);
        assert_eq!(config.database_max_connections, 20);
        assert!(!config.jaeger_enabled);
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/shipyard"),
            ("ENDPOINT", "127.0.0.1:9000"),
            ("CLUSTERS_CONFIG", "/etc/shipyard/clusters.json"),
            ("PUBLISH_CONCURRENCY", "2"),
            ("JAEGER_ENABLED", "TRUE"),
        ]))
        .unwrap();

        assert_eq!(config.endpoint.port(), 9000);
        assert_eq!(config.publish_concurrency, 2);
        assert!(config.jaeger_enabled);
    }

    #[test]
    fn test_invalid_values() {
        assert!(ServiceConfig::from_lookup(lookup(&[])).is_err());
        assert!(ServiceConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("PUBLISH_CONCURRENCY", "0"),
        ]))
        .is_err());
        assert!(ServiceConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("ENDPOINT", "not-an-address"),
        ]))
        .is_err());
    }
}
