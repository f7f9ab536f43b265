use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for a whole engine operation, store round-trips included
    pub operation_timeout_ms: u64,
    pub max_page_size: u32,
    /// Node component of generated ids, must be below 1024
    pub node_id: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 5,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 10_000,
            max_page_size: 100,
            node_id: 1,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();
        let config = Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                ),
                acquire_timeout_secs: env_or(
                    "DATABASE_ACQUIRE_TIMEOUT_SECS",
                    defaults.database.acquire_timeout_secs,
                ),
                busy_timeout_ms: env_or(
                    "DATABASE_BUSY_TIMEOUT_MS",
                    defaults.database.busy_timeout_ms,
                ),
            },
            engine: EngineConfig {
                operation_timeout_ms: env_or(
                    "ENGINE_OPERATION_TIMEOUT_MS",
                    defaults.engine.operation_timeout_ms,
                ),
                max_page_size: env_or("ENGINE_MAX_PAGE_SIZE", defaults.engine.max_page_size),
                node_id: env_or("ENGINE_NODE_ID", defaults.engine.node_id),
            },
        };

        if config.engine.node_id >= 1024 {
            anyhow::bail!("ENGINE_NODE_ID must be below 1024, got {}", config.engine.node_id);
        }
        if config.engine.max_page_size == 0 {
            anyhow::bail!("ENGINE_MAX_PAGE_SIZE must be positive");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.engine.max_page_size, 100);
        assert_eq!(config.engine.operation_timeout_ms, 10_000);
    }
}
