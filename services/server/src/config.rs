use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
    #[error("Invalid settings file {0}: {1}")]
    InvalidSettings(PathBuf, String),
}

/// The optional JSON settings file. Key names match the deployed `settings.json`.
#[derive(Deserialize, Debug, Default)]
struct SettingsFile {
    #[serde(rename = "HOST")]
    host: Option<String>,
    #[serde(rename = "PORT")]
    port: Option<u16>,
    model_name: Option<String>,
    base_url: Option<String>,
}

impl SettingsFile {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::InvalidSettings(path.to_path_buf(), e.to_string())),
        };
        serde_json::from_str(&contents)
            .map_err(|e| ConfigError::InvalidSettings(path.to_path_buf(), e.to_string()))
    }
}

/// Holds all configuration loaded at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub model_name: String,
    pub base_url: String,
    pub api_key: String,
    pub characters_path: PathBuf,
    pub default_character: String,
    pub generation_timeout: Duration,
    pub memory_window: usize,
    pub max_parked_sessions: usize,
    pub tools_enabled: bool,
    pub shutdown_grace: Duration,
    pub log_level: Level,
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from the settings file and environment variables.
    ///
    /// Environment variables override the settings file; every value has a
    /// hardcoded default.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let settings_path = std::env::var("SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/settings.json"));
        let settings = SettingsFile::load(&settings_path)?;

        let host = std::env::var("HOST")
            .ok()
            .or(settings.host)
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_var("PORT", settings.port.unwrap_or(55555))?;
        let bind_address = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| ConfigError::InvalidValue("HOST".to_string(), e.to_string()))?
            .next()
            .ok_or_else(|| {
                ConfigError::InvalidValue("HOST".to_string(), format!("'{host}' did not resolve"))
            })?;

        let model_name = std::env::var("MODEL_NAME")
            .ok()
            .or(settings.model_name)
            .unwrap_or_else(|| "deepseek-r1-14b-q4".to_string());
        let base_url = std::env::var("BASE_URL")
            .ok()
            .or(settings.base_url)
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let api_key = std::env::var("API_KEY").unwrap_or_else(|_| "ollama".to_string());

        let characters_path = std::env::var("CHARACTERS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./char_data"));
        let default_character = std::env::var("DEFAULT_CHARACTER")
            .unwrap_or_else(|_| companion_core::DEFAULT_CHARACTER.to_string());

        let generation_timeout =
            Duration::from_secs(parse_var::<u64>("GENERATION_TIMEOUT_SECS", 120)?);
        if generation_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "GENERATION_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let memory_window = parse_var::<usize>("MEMORY_WINDOW", 5)?;
        let max_parked_sessions = parse_var::<usize>(
            "MAX_PARKED_SESSIONS",
            crate::registry::DEFAULT_PARKED_CAPACITY,
        )?;
        let tools_enabled = parse_var::<bool>("TOOLS_ENABLED", false)?;
        let shutdown_grace = Duration::from_secs(parse_var::<u64>("SHUTDOWN_GRACE_SECS", 10)?);

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            model_name,
            base_url,
            api_key,
            characters_path,
            default_character,
            generation_timeout,
            memory_window,
            max_parked_sessions,
            tools_enabled,
            shutdown_grace,
            log_level,
        })
    }

    /// The OpenAI-compatible API root of the generation service.
    pub fn api_base(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            base.to_string()
        } else {
            format!("{base}/v1")
        }
    }
}
