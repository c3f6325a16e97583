//! Configuration resolution for `FieldOps`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/fieldops/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete `FieldOps` configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

/// One-time code and session lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub otp_ttl_secs: i64,
    /// Failed attempts after which a code is dead.
    pub otp_max_attempts: i64,
    pub session_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            otp_ttl_secs: 5 * 60,
            otp_max_attempts: 5,
            session_ttl_secs: 30 * 24 * 60 * 60, // 30 days
        }
    }
}

/// Machine registry limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Upper bound on placeholders created by one pre-registration.
    pub max_placeholders: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_placeholders: 20,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    if let Some(path) = explicit {
        let file = load_config_file(path)?;
        merge_config(&mut config, file);
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("settings.json"))
}

/// Get the default database path.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("fieldops.db"))
}

fn config_dir() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("fieldops"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    if overlay.server.database_path.is_some() {
        base.server.database_path = overlay.server.database_path;
    }
    base.server.log_level = overlay.server.log_level;
    base.server.log_json = overlay.server.log_json;

    base.auth = overlay.auth;
    base.registry = overlay.registry;
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("FIELDOPS_DATABASE_PATH") {
        config.server.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("FIELDOPS_LOG_LEVEL") {
        config.server.log_level = val;
    }
    if let Some(n) = var("FIELDOPS_OTP_TTL_SECS").and_then(|v| v.parse().ok()) {
        config.auth.otp_ttl_secs = n;
    }
    if let Some(n) = var("FIELDOPS_OTP_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
        config.auth.otp_max_attempts = n;
    }
    if let Some(n) = var("FIELDOPS_SESSION_TTL_SECS").and_then(|v| v.parse().ok()) {
        config.auth.session_ttl_secs = n;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_auth_policy() {
        let config = Config::default();
        assert_eq!(config.auth.otp_ttl_secs, 300);
        assert_eq!(config.auth.otp_max_attempts, 5);
        assert_eq!(config.auth.session_ttl_secs, 2_592_000);
        assert_eq!(config.registry.max_placeholders, 20);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"auth": {"otp_ttl_secs": 120}}"#).unwrap();

        let mut config = Config::default();
        merge_config(&mut config, load_config_file(&path).unwrap());

        assert_eq!(config.auth.otp_ttl_secs, 120);
        assert_eq!(config.auth.otp_max_attempts, 5);
        assert_eq!(config.registry.max_placeholders, 20);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(load_config_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn env_overrides_win_and_ignore_garbage() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| match key {
            "FIELDOPS_SESSION_TTL_SECS" => Some("60".into()),
            "FIELDOPS_OTP_MAX_ATTEMPTS" => Some("lots".into()),
            "FIELDOPS_DATABASE_PATH" => Some("/tmp/f.db".into()),
            _ => None,
        });

        assert_eq!(config.auth.session_ttl_secs, 60);
        assert_eq!(config.auth.otp_max_attempts, 5);
        assert_eq!(config.server.database_path, Some(PathBuf::from("/tmp/f.db")));
    }
}
