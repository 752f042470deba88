use crate::classroom::{ClassroomOptions, WriteMode};
use collab_shared::domain::DEFAULT_ACCESS_CODE;
use serde::Deserialize;
use std::{env, fs, path::Path, time::Duration};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub listen_port: Option<u16>,
    pub dev_cors_origin: Option<String>,
    /// Shared secret for `/api/admin/*`. Falls back to `cron_api_key`.
    pub admin_api_key: Option<String>,
    /// Shared secret for `/api/cron/*`.
    pub cron_api_key: Option<String>,
    #[serde(default = "default_access_code")]
    pub default_access_code: String,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_chat_max_len")]
    pub chat_max_len: usize,
    #[serde(default)]
    pub session_writes: WriteMode,
}

fn default_access_code() -> String {
    DEFAULT_ACCESS_CODE.to_string()
}

fn default_store_timeout_ms() -> u64 {
    5000
}

fn default_chat_max_len() -> usize {
    2000
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
            ConfigError::Invalid(m) => write!(f, "invalid config: {}", m),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::Yaml(value)
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("jwt_secret must not be empty".into()));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid("store_timeout_ms must be positive".into()));
        }
        if self.chat_max_len == 0 {
            return Err(ConfigError::Invalid("chat_max_len must be positive".into()));
        }
        Ok(())
    }

    pub fn admin_key(&self) -> Option<&str> {
        non_empty(&self.admin_api_key).or_else(|| self.cron_key())
    }

    pub fn cron_key(&self) -> Option<&str> {
        non_empty(&self.cron_api_key)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn classroom_options(&self) -> ClassroomOptions {
        ClassroomOptions {
            default_access_code: self.default_access_code.clone(),
            chat_max_len: self.chat_max_len,
            session_writes: self.session_writes,
        }
    }
}
