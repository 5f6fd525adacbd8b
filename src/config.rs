//! Process configuration.
//!
//! Values are layered once at startup, lowest precedence first:
//! - built-in defaults
//! - an optional YAML/JSON file named by `CONFIG_PATH` (`${VAR}` placeholders
//!   are substituted from the environment before parsing)
//! - environment variables, including any loaded from a `.env` file (which
//!   never overrides variables already set in the process):
//!   - `AGENTS_BASE_URL` - downstream agent service host
//!   - `AGENTS_EVALUATE_PATH` - downstream path, defaults to `/`
//!   - `AGENTS_ACCESS_KEY` - bearer token, omitted when empty
//!   - `AGENTS_AUTH_HEADER` - header carrying the token, defaults to `Authorization`
//!   - `AGENTS_TIMEOUT_MS` - outbound request timeout, defaults to `30000`
//!   - `HOST` / `PORT` - listen address, defaults to `0.0.0.0:4000`
//!   - `CORS_ORIGIN` - restrict CORS to a single origin

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use tracing::{info, warn};

use crate::error::ConfigError;

pub const DEFAULT_AGENTS_BASE_URL: &str = "https://qgvzzypa2rxbddoksf75vhqx.agents.do-ai.run";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: Option<String>,
}

/// Where and how evaluation requests are forwarded.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub base_url: String,
    pub evaluate_path: String,
    pub access_key: String,
    pub auth_header: String,
    pub timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            cors_origin: None,
        }
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_AGENTS_BASE_URL.to_string(),
            evaluate_path: "/".to_string(),
            access_key: String::new(),
            auth_header: "Authorization".to_string(),
            timeout_ms: 30_000,
        }
    }
}

// Keeps the access key out of logs.
impl fmt::Debug for AgentsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentsConfig")
            .field("base_url", &self.base_url)
            .field("evaluate_path", &self.evaluate_path)
            .field("access_key", &if self.has_access_key() { "<redacted>" } else { "" })
            .field("auth_header", &self.auth_header)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl AgentsConfig {
    pub fn has_access_key(&self) -> bool {
        !self.access_key.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Full downstream URL: base URL without trailing slashes, then the path.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.evaluate_path)
    }
}

impl Config {
    /// Load configuration from `.env`, `CONFIG_PATH` (if set) and the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with_env_file(None)
    }

    /// Like [`Config::load`], reading `env_file` instead of searching for `.env`.
    pub fn load_with_env_file(env_file: Option<&Path>) -> Result<Self> {
        let loaded = match env_file {
            Some(path) => dotenvy::from_path(path).map(|_| path.to_path_buf()),
            None => dotenvy::dotenv(),
        };
        match loaded {
            Ok(path) => info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => warn!("Ignoring unreadable env file: {}", e),
        }

        let lookup = |key: &str| std::env::var(key).ok();
        let mut config = match non_empty(lookup("CONFIG_PATH")) {
            Some(path) => Self::from_file(&path, lookup)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML or JSON config file, chosen by extension.
    pub fn from_file<F>(path: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path))?;
        let content = substitute_env_vars(&content, lookup)?;

        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        let config: Config = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML in {}", path))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path))?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string()).into()),
        };
        Ok(config)
    }

    /// Apply environment overrides. Empty values count as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        if let Some(base_url) = get("AGENTS_BASE_URL") {
            self.agents.base_url = base_url;
        }
        if let Some(path) = get("AGENTS_EVALUATE_PATH") {
            self.agents.evaluate_path = path;
        }
        if let Some(access_key) = get("AGENTS_ACCESS_KEY") {
            self.agents.access_key = access_key;
        }
        if let Some(auth_header) = get("AGENTS_AUTH_HEADER") {
            self.agents.auth_header = auth_header;
        }
        if let Some(timeout) = get("AGENTS_TIMEOUT_MS") {
            self.agents.timeout_ms = parse_var("AGENTS_TIMEOUT_MS", &timeout)?;
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = parse_var("PORT", &port)?;
        }
        if let Some(origin) = get("CORS_ORIGIN") {
            self.server.cors_origin = Some(origin);
        }
        Ok(())
    }

    pub fn normalize(&mut self) {
        let path = self.agents.evaluate_path.trim();
        self.agents.evaluate_path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        self.agents.base_url = self.agents.base_url.trim().to_string();
        if matches!(self.server.cors_origin.as_deref(), Some("")) {
            self.server.cors_origin = None;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let agents = &self.agents;

        let url = reqwest::Url::parse(&agents.base_url).map_err(|e| {
            ConfigError::InvalidValue("AGENTS_BASE_URL".to_string(), e.to_string())
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(
                "AGENTS_BASE_URL".to_string(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        if !agents.evaluate_path.starts_with('/') {
            return Err(ConfigError::InvalidValue(
                "AGENTS_EVALUATE_PATH".to_string(),
                "must start with '/'".to_string(),
            ));
        }

        reqwest::header::HeaderName::from_bytes(agents.auth_header.as_bytes()).map_err(|e| {
            ConfigError::InvalidValue("AGENTS_AUTH_HEADER".to_string(), e.to_string())
        })?;

        if agents.has_access_key() {
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", agents.access_key))
                .map_err(|_| {
                    ConfigError::InvalidValue(
                        "AGENTS_ACCESS_KEY".to_string(),
                        "contains characters not allowed in a header".to_string(),
                    )
                })?;
        }

        if agents.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "AGENTS_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        if let Some(origin) = &self.server.cors_origin {
            axum::http::HeaderValue::from_str(origin).map_err(|e| {
                ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string())
            })?;
        }

        Ok(())
    }
}

/// Replace `${VAR_NAME}` placeholders; unknown variables are left as written.
pub fn substitute_env_vars<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = Regex::new(r"\$\{(\w+)\}")?;
    let replaced = pattern.replace_all(content, |caps: &regex::Captures<'_>| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    Ok(replaced.into_owned())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}
