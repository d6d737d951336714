//! Application configuration.
//!
//! Loaded once at startup from, in order of precedence:
//! 1. `.env` (via `dotenvy`) so `ANTHROPIC_API_KEY` can live next to the binary
//! 2. an optional YAML file with `${VAR}` / `${VAR:-default}` interpolation
//! 3. built-in defaults for every missing field

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::SamplingPolicy;
use crate::mcp_client::Interpreters;

/// Env var naming the config file when `--config` is not given.
pub const CONFIG_ENV_VAR: &str = "MCP_DEMO_CONFIG";

/// Config file looked up in the working directory as a last resort.
pub const DEFAULT_CONFIG_FILE: &str = "mcp-demo.yaml";

const API_KEY_ENV_VAR: &str = "ANTHROPIC_API_KEY";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("invalid config file '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("ANTHROPIC_API_KEY not set in environment")]
    MissingApiKey,
}

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelSettings,
    pub server: ServerSettings,
    pub interpreters: Interpreters,
    pub sampling: SamplingSettings,
    pub logging: LoggingSettings,
}

/// Hosted model connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Falls back to `ANTHROPIC_API_KEY` when unset.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_version: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            api_version: "2023-06-01".to_string(),
        }
    }
}

impl ModelSettings {
    /// The API key, or `MissingApiKey` if none was configured.
    pub fn require_api_key(&self) -> Result<String, ConfigError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .ok_or(ConfigError::MissingApiKey)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    pub policy: SamplingPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    pub format: LogFormat,
    /// Mirror logs to a rotated file in the platform data directory.
    pub file: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "mcp_demo_bridge=info,warn".to_string(),
            format: LogFormat::Text,
            file: false,
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load configuration. `explicit` is the `--config` argument, if any.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: failed to load .env: {e}");
        }
    }

    let mut config = match find_config_path(explicit) {
        Some(path) => load_config_file(&path)?,
        None => AppConfig::default(),
    };

    if config.model.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
        config.model.api_key = std::env::var(API_KEY_ENV_VAR).ok();
    }

    Ok(config)
}

/// Resolve which config file to read, if any.
///
/// Order: explicit path, then `MCP_DEMO_CONFIG`, then `./mcp-demo.yaml`
/// if it exists.
pub fn find_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    local.exists().then_some(local)
}

/// Read and parse a YAML config file after env interpolation.
pub fn load_config_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let interpolated = interpolate_env_vars(&raw);
    if interpolated.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Replace `${VAR}` and `${VAR:-default}` with environment values.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
