//! Configuration module for the logsmith server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values. The log-line
//! template and timezone offset are validated here, at startup, so that
//! rendering can never fail once the server is running.

use chrono::FixedOffset;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::{Template, TemplateError};

/// Command-line arguments for the log server
#[derive(Parser, Debug)]
#[command(name = "logsmith")]
#[command(author = "logsmith authors")]
#[command(version = "0.1.0")]
#[command(about = "A concurrent TCP log collection server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host/IP to bind (e.g., 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Port number to bind
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to the destination log file
    #[arg(long)]
    pub logfile: Option<PathBuf>,

    /// Max messages per client per second
    #[arg(long)]
    pub max: Option<u32>,

    /// Log line template (placeholders: {timestamp}, {client}, {level},
    /// {message}, {correlationId})
    #[arg(long)]
    pub format: Option<String>,

    /// Per-connection read timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Timezone offset in hours from UTC for rendered timestamps
    #[arg(long, allow_negative_numbers = true)]
    pub tz_offset: Option<i32>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Host/IP to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-connection read timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Number of worker threads
    pub workers: Option<usize>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            workers: None,
        }
    }
}

/// Log output configuration
#[derive(Debug, Deserialize)]
pub struct OutputSection {
    /// Path to the destination log file
    #[serde(default = "default_logfile")]
    pub file: PathBuf,
    /// Log line template
    #[serde(default = "default_template")]
    pub template: String,
    /// Timezone offset in hours from UTC
    #[serde(default = "default_tz_offset")]
    pub tz_offset_hours: i32,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            file: default_logfile(),
            template: default_template(),
            tz_offset_hours: default_tz_offset(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Deserialize)]
pub struct RateLimitSection {
    /// Max messages per client per second
    #[serde(default = "default_max_per_second")]
    pub max_per_second: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_per_second: default_max_per_second(),
        }
    }
}

/// Logging configuration (for the server's own diagnostics)
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_logfile() -> PathBuf {
    PathBuf::from("logs.txt")
}

fn default_template() -> String {
    "[{timestamp}] {client} {level}: {message} (ID: {correlationId})".to_string()
}

fn default_tz_offset() -> i32 {
    -5
}

fn default_max_per_second() -> u32 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_file: PathBuf,
    pub max_per_second: u32,
    pub template: Template,
    pub read_timeout: Duration,
    pub utc_offset: FixedOffset,
    pub workers: Option<usize>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();
        Self::resolve(cli)
    }

    /// Merge CLI args with TOML config (CLI takes precedence) and validate.
    fn resolve(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let template_str = cli.format.unwrap_or(toml_config.output.template);
        let template = Template::parse(&template_str)
            .map_err(|e| ConfigError::InvalidTemplate(template_str.clone(), e))?;

        let tz_offset = cli.tz_offset.unwrap_or(toml_config.output.tz_offset_hours);
        let utc_offset = FixedOffset::east_opt(tz_offset * 3600)
            .ok_or(ConfigError::InvalidTzOffset(tz_offset))?;

        Ok(Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            log_file: cli.logfile.unwrap_or(toml_config.output.file),
            max_per_second: cli.max.unwrap_or(toml_config.rate_limit.max_per_second),
            template,
            read_timeout: Duration::from_secs(
                cli.timeout.unwrap_or(toml_config.server.timeout_secs),
            ),
            utc_offset,
            workers: cli.workers.or(toml_config.server.workers),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidTemplate(String, TemplateError),
    InvalidTzOffset(i32),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidTemplate(template, e) => {
                write!(f, "Invalid log template '{template}': {e}")
            }
            ConfigError::InvalidTzOffset(hours) => {
                write!(f, "Timezone offset {hours}h is out of range (-23..=23)")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
