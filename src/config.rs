use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub pdfco: PdfCoConfig,
    pub email: EmailConfig,
    pub ai_parser: AiParserConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfCoConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: String,
    pub mailbox: String,
    pub use_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiParserConfig {
    pub api_key: String,
    pub endpoint: String,
    pub timeout_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub database_path: PathBuf,
}

impl PdfCoConfig {
    pub fn timeout(&self) -> AppResult<Duration> {
        seconds_to_duration(self.timeout_seconds, "pdfco.timeout_seconds")
    }
}

impl AiParserConfig {
    pub fn timeout(&self) -> AppResult<Duration> {
        seconds_to_duration(self.timeout_seconds, "ai_parser.timeout_seconds")
    }
}

fn seconds_to_duration(seconds: f64, key: &str) -> AppResult<Duration> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(AppError::Config(format!(
            "{key} must be a positive number of seconds, got {seconds}"
        )));
    }
    Ok(Duration::from_secs_f64(seconds))
}

impl Default for Config {
    fn default() -> Self {
        let parse_env_var = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let parse_env_number = |key: &str, default: f64| -> f64 {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        Config {
            pdfco: PdfCoConfig {
                api_key: parse_env_var("PDFCO_API_KEY", ""),
                base_url: parse_env_var("PDFCO_BASE_URL", "https://api.pdf.co"),
                timeout_seconds: 30.0,
            },
            email: EmailConfig {
                imap_host: parse_env_var("IMAP_HOST", ""),
                imap_port: std::env::var("IMAP_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(993),
                username: parse_env_var("IMAP_USERNAME", ""),
                password: parse_env_var("IMAP_PASSWORD", ""),
                mailbox: parse_env_var("IMAP_MAILBOX", "INBOX"),
                use_tls: true,
            },
            ai_parser: AiParserConfig {
                api_key: parse_env_var("AI_PARSER_API_KEY", ""),
                endpoint: parse_env_var("AI_PARSER_ENDPOINT", ""),
                timeout_seconds: parse_env_number("AI_PARSER_TIMEOUT", 30.0),
            },
            queue: QueueConfig {
                database_path: PathBuf::from(parse_env_var(
                    "QUEUE_DATABASE_PATH",
                    "data/queue.db",
                )),
            },
        }
    }
}

/// Builds the configuration from environment defaults, then overlays any
/// values found in the TOML file. A missing file is not an error.
pub fn load_config(path: Option<&Path>) -> AppResult<Config> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    let defaults = Config::default();

    if !path.exists() {
        tracing::debug!("No config file at {}, using environment only", path.display());
        return Ok(defaults);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("Failed to read {}: {e}", path.display())))?;
    let overrides: toml::Table = content
        .parse()
        .map_err(|e| AppError::Config(format!("Failed to parse {}: {e}", path.display())))?;

    let config = merge(defaults, overrides)?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn merge(defaults: Config, overrides: toml::Table) -> AppResult<Config> {
    let toml::Value::Table(mut base) = toml::Value::try_from(&defaults)
        .map_err(|e| AppError::Config(format!("Failed to serialize defaults: {e}")))?
    else {
        return Err(AppError::Config("Defaults did not serialize to a table".to_string()));
    };

    for (section, values) in overrides {
        // Unknown sections are ignored, like unknown keys.
        let (Some(toml::Value::Table(target)), toml::Value::Table(values)) =
            (base.get_mut(&section), values)
        else {
            continue;
        };
        for (key, value) in values {
            target.insert(key, value);
        }
    }

    toml::Value::Table(base)
        .try_into()
        .map_err(|e| AppError::Config(format!("Invalid configuration: {e}")))
}
