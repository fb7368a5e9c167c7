//! Configuration module for the http-echo server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the echo server
#[derive(Parser, Debug, Default)]
#[command(name = "http-echo")]
#[command(author = "http-echo authors")]
#[command(version = "0.1.0")]
#[command(about = "A tiny HTTP server that echoes a configured value", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address and port to listen on (e.g., 0.0.0.0:5678)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Text to echo on every request
    #[arg(short, long)]
    pub text: Option<String>,

    /// Name of an environment variable to echo instead of literal text
    #[arg(short, long)]
    pub env: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Positional arguments are not accepted; captured here so validation
    /// can reject them with the documented exit code instead of clap's.
    #[arg(hide = true)]
    pub extra: Vec<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub echo: EchoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Echo-related configuration
#[derive(Debug, Deserialize, Default)]
pub struct EchoConfig {
    /// Literal text to echo
    pub text: Option<String>,
    /// Environment variable to echo
    pub env: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:5678".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// What the server echoes on its root path.
///
/// `Text` is fixed for the process lifetime, `Env` is resolved again on
/// every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoSource {
    Text(String),
    Env(String),
}

impl EchoSource {
    /// Resolve the value to echo. An `Env` source naming an unset variable
    /// resolves to a failure message embedding the variable name; the caller
    /// still serves it as a normal response.
    pub fn resolve(&self) -> String {
        match self {
            EchoSource::Text(v) => v.clone(),
            EchoSource::Env(name) => std::env::var(name)
                .unwrap_or_else(|_| format!("failed resolving env var '{name}'")),
        }
    }
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub echo: EchoSource,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence) and validate.
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        if !cli.extra.is_empty() {
            return Err(ConfigError::UnexpectedArguments(cli.extra));
        }

        let text = cli.text.or(toml_config.echo.text);
        let env = cli.env.or(toml_config.echo.env);

        // Text wins when both are supplied; at least one is required.
        let echo = match (text, env) {
            (Some(t), _) if !t.is_empty() => EchoSource::Text(t),
            (_, Some(e)) if !e.is_empty() => EchoSource::Env(e),
            _ => return Err(ConfigError::MissingValue),
        };

        Ok(Config {
            listen: normalize_listen(&cli.listen.unwrap_or(toml_config.server.listen)),
            echo,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Accept a bare `:port` address and bind it to all interfaces.
fn normalize_listen(listen: &str) -> String {
    if listen.starts_with(':') {
        format!("0.0.0.0{listen}")
    } else {
        listen.to_string()
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    MissingValue,
    UnexpectedArguments(Vec<String>),
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
            ConfigError::MissingValue => write!(f, "Missing --text or --env option!"),
            ConfigError::UnexpectedArguments(args) => {
                write!(f, "Too many arguments: {}", args.join(" "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}
