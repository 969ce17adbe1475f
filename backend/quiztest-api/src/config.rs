use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(config::ConfigError::Message(format!(
                "Unknown store backend: {}",
                other
            ))),
        }
    }
}

/// Tunables of the assembly and grading engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Seeds drawn at most when looking for a layout that shows every
    /// ordering question out of its solved order.
    pub seed_redraw_attempts: u32,
    /// Runs of the grading write when it loses an optimistic concurrency race.
    pub history_write_retries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed_redraw_attempts: 10,
            history_write_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    /// JSON fixtures loaded into the memory backend at startup.
    pub fixtures_path: Option<String>,
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "quiztest".to_string(),
            bind_addr: "0.0.0.0:8081".to_string(),
            store_backend: StoreBackend::Mongo,
            fixtures_path: None,
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml first, APP__* environment variables override
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Self::from_settings(&settings)
    }

    fn from_settings(settings: &config::Config) -> Result<Self, config::ConfigError> {
        let defaults = Config::default();
        let engine_defaults = EngineConfig::default();

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or(defaults.mongo_uri);

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or(defaults.bind_addr);

        let store_backend = match settings
            .get_string("store.backend")
            .or_else(|_| env::var("STORE_BACKEND"))
        {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.store_backend,
        };

        let fixtures_path = settings
            .get_string("store.fixtures_path")
            .or_else(|_| env::var("STORE_FIXTURES_PATH"))
            .ok();

        let seed_redraw_attempts = positive_int(
            settings,
            "engine.seed_redraw_attempts",
            engine_defaults.seed_redraw_attempts,
        )?;

        let history_write_retries = positive_int(
            settings,
            "engine.history_write_retries",
            engine_defaults.history_write_retries,
        )?;

        Ok(Config {
            mongo_uri,
            mongo_database,
            bind_addr,
            store_backend,
            fixtures_path,
            engine: EngineConfig {
                seed_redraw_attempts,
                history_write_retries,
            },
        })
    }
}

/// Reads `key` as an integer of at least 1, falling back to `default` when
/// the key is not set.
fn positive_int<T: TryFrom<i64>>(
    settings: &config::Config,
    key: &str,
    default: T,
) -> Result<T, config::ConfigError> {
    match settings.get_int(key) {
        Ok(value) => T::try_from(value.max(1)).map_err(|_| {
            config::ConfigError::Message(format!("{} is out of range: {}", key, value))
        }),
        Err(config::ConfigError::NotFound(_)) => Ok(default),
        Err(e) => Err(e),
    }
}
