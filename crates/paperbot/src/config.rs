//! Gateway configuration.
//!
//! Loaded once at start-up from `config.toml` plus `PAPERBOT__*` environment
//! overrides, then passed explicitly into the API state.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use log::info;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "paperbot";

/// Single-variable override for the upstream base URL.
pub const UPSTREAM_ENV_VAR: &str = "PAPERBOT_API_BASE_URL";

/// Loopback address of a locally running backend.
pub const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub profile: String,
    pub logging: LoggingConfig,
    /// Listener configuration.
    pub server: ServerConfig,
    /// Backend API the gateway forwards to.
    pub upstream: UpstreamConfig,
    /// Forwarding limits and deadlines.
    pub proxy: ProxyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: "default".to_string(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Apply the legacy `PAPERBOT_API_BASE_URL` value, if any.
    pub fn with_upstream_override(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            self.upstream.base_url = url;
        }
        self.upstream.base_url = self.upstream.base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Wall-clock deadline for buffered upstream calls.
    pub timeout_secs: u64,
    /// Connection establishment deadline, the only one applied to streams.
    pub connect_timeout_secs: u64,
    /// Largest inbound body forwarded upstream.
    pub max_request_bytes: usize,
    /// Largest upstream body buffered for a JSON relay.
    pub max_response_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            connect_timeout_secs: 10,
            max_request_bytes: 10 * 1024 * 1024,
            max_response_bytes: 32 * 1024 * 1024,
        }
    }
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ============================================================================
// Paths
// ============================================================================

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_file: PathBuf,
}

impl AppPaths {
    pub fn discover(override_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => {
                let expanded = expand_path(path)?;
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => default_config_dir()?.join("config.toml"),
        };

        if config_file.parent().is_none() {
            return Err(anyhow!("invalid config file path: {config_file:?}"));
        }

        Ok(Self { config_file })
    }
}

impl fmt::Display for AppPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config: {}", self.config_file.display())
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load the config, writing a default file first if none exists.
pub fn load_or_init_config(paths: &AppPaths, dry_run: bool) -> Result<AppConfig> {
    if !paths.config_file.exists() {
        if dry_run {
            info!(
                "dry-run: would create default config at {}",
                paths.config_file.display()
            );
        } else {
            write_default_config(&paths.config_file)?;
        }
    }

    let config = load_config(&paths.config_file)?;
    Ok(config.with_upstream_override(env::var(UPSTREAM_ENV_VAR).ok()))
}

/// Load the config file (optional) and `PAPERBOT__*` environment overrides.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let defaults = ProxyConfig::default();
    let built = Config::builder()
        .set_default("profile", "default")?
        .set_default("logging.level", "info")?
        .set_default("upstream.base_url", DEFAULT_UPSTREAM_URL)?
        .set_default("proxy.timeout_secs", defaults.timeout_secs)?
        .set_default("proxy.connect_timeout_secs", defaults.connect_timeout_secs)?
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(Environment::with_prefix(&env_prefix()).separator("__"))
        .build()
        .with_context(|| format!("loading config from {}", path.display()))?;

    let config: AppConfig = built
        .try_deserialize()
        .context("deserializing configuration")?;
    Ok(config.with_upstream_override(None))
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn default_config_header(path: &Path) -> String {
    let mut buffer = String::new();
    buffer.push_str("# Configuration for ");
    buffer.push_str(APP_NAME);
    buffer.push('\n');
    buffer.push_str("# File: ");
    buffer.push_str(&path.display().to_string());
    buffer.push('\n');
    buffer.push_str("# The ");
    buffer.push_str(UPSTREAM_ENV_VAR);
    buffer.push_str(" environment variable overrides upstream.base_url.\n");
    buffer.push('\n');
    buffer
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        expand_str_path(text)
    } else {
        Ok(path)
    }
}

fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        let mut path = PathBuf::from(dir);
        path.push(APP_NAME);
        return Ok(path);
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

/// `PAPERBOT`, so `PAPERBOT__UPSTREAM__BASE_URL` maps to `upstream.base_url`.
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
