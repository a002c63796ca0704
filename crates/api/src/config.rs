//! Process configuration for the HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use storefront_infra::CoreConfig;

#[derive(Debug, Clone)]
pub enum StoreBackend {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub backend: StoreBackend,
    /// Optional JSON file with stock entries and buyer profiles loaded at
    /// startup. Catalog and user management live elsewhere; this is how a
    /// dev instance gets data to place orders against.
    pub seed_file: Option<PathBuf>,
    pub core: CoreConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backend: StoreBackend::InMemory,
            seed_file: None,
            core: CoreConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Read `BIND_ADDR`, `USE_PERSISTENT_STORES`, `DATABASE_URL`,
    /// `DATABASE_MAX_CONNECTIONS`, `SEED_FILE` and the core settings.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("BIND_ADDR is not a socket address: {raw}"))?,
            None => defaults.bind_addr,
        };

        let persistent = lookup("USE_PERSISTENT_STORES")
            .map(|v| v.trim().eq_ignore_ascii_case("true") || v.trim() == "1")
            .unwrap_or(false);

        let backend = if persistent {
            let Some(database_url) = lookup("DATABASE_URL") else {
                bail!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
            };
            let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("DATABASE_MAX_CONNECTIONS is not a number: {raw}"))?,
                None => 10,
            };
            StoreBackend::Postgres {
                database_url,
                max_connections,
            }
        } else {
            StoreBackend::InMemory
        };

        Ok(Self {
            bind_addr,
            backend,
            seed_file: lookup("SEED_FILE").map(PathBuf::from),
            core: CoreConfig::from_lookup(&lookup),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_to_in_memory_on_8080() {
        let cfg = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert!(matches!(cfg.backend, StoreBackend::InMemory));
        assert!(cfg.seed_file.is_none());
    }

    #[test]
    fn persistent_mode_requires_a_database_url() {
        let err = ApiConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "true")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let cfg = ApiConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/storefront"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
        ]))
        .unwrap();
        assert!(matches!(
            cfg.backend,
            StoreBackend::Postgres { max_connections: 4, .. }
        ));
    }

    #[test]
    fn bad_bind_addr_is_an_error() {
        assert!(ApiConfig::from_lookup(lookup(&[("BIND_ADDR", "localhost")])).is_err());
    }
}
