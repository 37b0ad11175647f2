// Cofre — Runtime configuration
//
// Defaults mirror the deployment the service was sized for (20 pooled
// connections, 2 s to obtain one, 30 s idle). Every value can be overridden
// through a `COFRE_*` environment variable, loaded with the `config` crate.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enclave::PasswordCost;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct CofreConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    /// Upper bound for obtaining a pooled connection, including opening it.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// How long a statement may wait on a database lock.
    pub statement_timeout: Duration,
    pub password_cost: PasswordCost,
}

impl Default for CofreConfig {
    fn default() -> Self {
        Settings::default().into()
    }
}

/// `<platform data dir>/cofre/cofre.db`
pub fn default_database_path() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cofre")
        .join("cofre.db")
}

/// The flat shape of the `COFRE_*` variables: `COFRE_ACQUIRE_TIMEOUT_MS`
/// lands in `acquire_timeout_ms`, and so on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct Settings {
    database_path: PathBuf,
    max_connections: u32,
    acquire_timeout_ms: u64,
    idle_timeout_ms: u64,
    statement_timeout_ms: u64,
    password_memory_kib: u32,
    password_iterations: u32,
    password_parallelism: u32,
}

impl Default for Settings {
    fn default() -> Self {
        let cost = PasswordCost::default();
        Self {
            database_path: default_database_path(),
            max_connections: 20,
            acquire_timeout_ms: 2_000,
            idle_timeout_ms: 30_000,
            statement_timeout_ms: 5_000,
            password_memory_kib: cost.memory_kib,
            password_iterations: cost.iterations,
            password_parallelism: cost.parallelism,
        }
    }
}

impl Settings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "COFRE_MAX_CONNECTIONS",
                value: self.max_connections.to_string(),
            });
        }
        Ok(())
    }
}

impl From<Settings> for CofreConfig {
    fn from(s: Settings) -> Self {
        Self {
            database_path: s.database_path,
            max_connections: s.max_connections,
            acquire_timeout: Duration::from_millis(s.acquire_timeout_ms),
            idle_timeout: Duration::from_millis(s.idle_timeout_ms),
            statement_timeout: Duration::from_millis(s.statement_timeout_ms),
            password_cost: PasswordCost {
                memory_kib: s.password_memory_kib,
                iterations: s.password_iterations,
                parallelism: s.password_parallelism,
            },
        }
    }
}

impl CofreConfig {
    /// Defaults overridden by whatever `COFRE_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Environment::with_prefix("COFRE").try_parsing(true))
    }

    fn load(environment: Environment) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings.into())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
