use std::path::{Path, PathBuf};

use collab_shared::auth::Role;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::AppError;

pub const ENV_CONFIG: &str = "COLLAB_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    /// Bearer token from the last login.
    #[serde(default)]
    pub token: Option<String>,
    /// Display name the token was issued for.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl ClientConfig {
    /// Token and name of the active identity, or an error asking for a login.
    pub fn identity(&self) -> Result<(&str, &str), AppError> {
        match (self.token.as_deref(), self.name.as_deref()) {
            (Some(t), Some(n)) => Ok((t, n)),
            _ => Err(AppError::Config(
                "not logged in; run login-student or login-teacher first".into(),
            )),
        }
    }

    pub fn base_url(&self) -> String {
        normalize_server_url(&self.server_url)
    }
}

pub fn resolve_config_path(cli_value: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(p) = cli_value {
        return Ok(p);
    }
    if let Ok(p) = std::env::var(ENV_CONFIG) {
        return Ok(PathBuf::from(p));
    }
    default_config_path().ok_or_else(|| AppError::Config("could not determine config dir".into()))
}

pub fn default_config_path() -> Option<PathBuf> {
    let pd = ProjectDirs::from("dev", "collab", "collab")?;
    Some(pd.config_dir().join("client.yaml"))
}

pub fn load_config(path: &Path) -> Result<ClientConfig, AppError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("read {} failed: {e}", path.display())))?;
    let cfg: ClientConfig = serde_yaml::from_str(&data)
        .map_err(|e| AppError::Config(format!("parse {} failed: {e}", path.display())))?;
    Ok(cfg)
}

pub fn save_config(path: &Path, cfg: &ClientConfig) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let data = serde_yaml::to_string(cfg)
        .map_err(|e| AppError::Config(format!("serialize config failed: {e}")))?;
    std::fs::write(path, data)
        .map_err(|e| AppError::Config(format!("write {} failed: {e}", path.display())))?;
    // The file holds a bearer token
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

pub fn normalize_server_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", trimmed.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_urls_get_scheme_and_lose_trailing_slash() {
        assert_eq!(normalize_server_url("10.0.0.5:5151/"), "http://10.0.0.5:5151");
        assert_eq!(
            normalize_server_url(" https://class.example/ "),
            "https://class.example"
        );
    }

    #[test]
    fn config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("client.yaml");
        let cfg = ClientConfig {
            server_url: "http://localhost:5151".into(),
            token: Some("tok".into()),
            name: Some("Ada".into()),
            role: Some(Role::Student),
        };
        save_config(&path, &cfg).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.identity().unwrap(), ("tok", "Ada"));
        assert_eq!(loaded.role, Some(Role::Student));
    }

    #[test]
    fn missing_token_asks_for_login() {
        let cfg: ClientConfig = serde_yaml::from_str("server_url: localhost:5151\n").unwrap();
        assert!(matches!(cfg.identity(), Err(AppError::Config(_))));
        assert_eq!(cfg.base_url(), "http://localhost:5151");
    }
}
