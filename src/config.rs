// src/config.rs
//! Service configuration: optional TOML file, then `EVENTS_*` env overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

pub const ENV_CONFIG_PATH: &str = "EVENTS_CONFIG_PATH";
pub const ENV_DATA_PATH: &str = "EVENTS_DATA_PATH";
pub const ENV_IMPORT_PATH: &str = "EVENTS_IMPORT_PATH";
pub const ENV_STORE_TIMEOUT_MS: &str = "EVENTS_STORE_TIMEOUT_MS";
pub const ENV_API_PREFIX: &str = "EVENTS_API_PREFIX";
pub const ENV_METRICS: &str = "EVENTS_METRICS";
pub const ENV_ADMIN: &str = "EVENTS_ADMIN";

pub const DEFAULT_CONFIG_PATH: &str = "config/events.toml";
pub const DEFAULT_IMPORT_PATH: &str = "jsondata.json";
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_API_PREFIX: &str = "/api";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// JSON snapshot backing the store; `None` keeps everything in memory.
    pub data_path: Option<PathBuf>,
    /// Source file for `POST /import/` and the `import_events` binary.
    pub import_path: PathBuf,
    pub store_timeout_ms: u64,
    pub api_prefix: String,
    pub metrics_enabled: bool,
    pub admin_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            import_path: PathBuf::from(DEFAULT_IMPORT_PATH),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            metrics_enabled: false,
            admin_enabled: true,
        }
    }
}

impl AppConfig {
    /// Resolve the config file, then apply env overrides:
    /// 1) $EVENTS_CONFIG_PATH (must exist)
    /// 2) config/events.toml
    /// 3) built-in defaults
    pub fn load() -> Result<Self> {
        let base = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!(
                        "{ENV_CONFIG_PATH} points to non-existent path {}",
                        pb.display()
                    ));
                }
                Self::from_file(&pb)?
            }
            Err(_) => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        let cfg = base.with_env_overrides();
        info!(
            target: "api",
            prefix = %cfg.api_prefix,
            data_path = ?cfg.data_path,
            import_path = %cfg.import_path.display(),
            store_timeout_ms = cfg.store_timeout_ms,
            metrics = cfg.metrics_enabled,
            admin = cfg.admin_enabled,
            "configuration loaded"
        );
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg.normalized())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(p) = env_nonempty(ENV_DATA_PATH) {
            self.data_path = Some(PathBuf::from(p));
        }
        if let Some(p) = env_nonempty(ENV_IMPORT_PATH) {
            self.import_path = PathBuf::from(p);
        }
        if let Some(raw) = env_nonempty(ENV_STORE_TIMEOUT_MS) {
            match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => self.store_timeout_ms = ms,
                _ => warn!(target: "api", value = %raw, "invalid {ENV_STORE_TIMEOUT_MS}, keeping {}", self.store_timeout_ms),
            }
        }
        if let Some(p) = env_nonempty(ENV_API_PREFIX) {
            self.api_prefix = p;
        }
        if let Some(v) = env_nonempty(ENV_METRICS) {
            self.metrics_enabled = v == "1";
        }
        if let Some(v) = env_nonempty(ENV_ADMIN) {
            self.admin_enabled = v != "0";
        }
        self.normalized()
    }

    /// Prefix always starts with `/` and never ends with one; `/` alone means
    /// no prefix (empty string).
    fn normalized(mut self) -> Self {
        let trimmed = self.api_prefix.trim().trim_matches('/');
        self.api_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        if self.store_timeout_ms == 0 {
            self.store_timeout_ms = DEFAULT_STORE_TIMEOUT_MS;
        }
        self
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
