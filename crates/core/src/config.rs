use std::env;
use std::fs;
use std::path::Path;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse config file `{path}`: {source}")]
    Parse { path: String, source: toml::de::Error },
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    database: RawDatabase,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    logging: RawLogging,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatabase {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLlm {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLogging {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then apply environment
    /// overrides (`RUDDER_*`). Missing file or missing keys fall back to
    /// defaults; secrets stay wrapped in `SecretString`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let raw = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                toml::from_str::<RawConfig>(&text).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => RawConfig::default(),
        };

        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let database = DatabaseConfig {
            url: env_or("RUDDER_DB_URL", raw.database.url)
                .unwrap_or_else(|| "sqlite://rudder.db".to_string()),
            max_connections: raw.database.max_connections.unwrap_or(5),
            timeout_secs: raw.database.timeout_secs.unwrap_or(30),
        };

        let llm = LlmConfig {
            base_url: env_or("RUDDER_LLM_BASE_URL", raw.llm.base_url),
            api_key: env_or("RUDDER_LLM_API_KEY", raw.llm.api_key).map(SecretString::from),
            model: env_or("RUDDER_LLM_MODEL", raw.llm.model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            timeout_secs: raw.llm.timeout_secs.unwrap_or(60),
        };

        let logging = LoggingConfig {
            level: env_or("RUDDER_LOG_LEVEL", raw.logging.level)
                .unwrap_or_else(|| "info".to_string()),
            format: raw.logging.format.unwrap_or(LogFormat::Compact),
        };

        Self { database, llm, logging }
    }
}

fn env_or(key: &str, fallback: Option<String>) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty()).or(fallback)
}
