//! Shared configuration for scenesync tools.
//!
//! TOML profiles, password resolution (env + keyring + plaintext),
//! and translation to `scenesync_core::EngineConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use scenesync_core::{DEFAULT_PORT, EngineConfig, EventSubscription};

/// Keyring service name; entries are keyed `<profile>/password`.
pub const KEYRING_SERVICE: &str = "scenesync";

/// Environment variable consulted for the password when a profile does
/// not name its own.
pub const PASSWORD_ENV: &str = "SCENESYNC_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named remote profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Profile names, sorted.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named remote instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// IP address or hostname of the WebSocket server.
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Seconds between reconnection attempts.
    pub reconnect_interval: Option<u64>,

    /// Milliseconds between performance stats refreshes.
    pub stats_interval_ms: Option<u64>,

    /// Milliseconds between media status refreshes.
    pub media_interval_ms: Option<u64>,

    /// Request timeout in seconds.
    pub timeout: Option<u64>,

    /// Subscribe to the high-volume input meter events.
    pub meters: Option<bool>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            password: None,
            password_env: None,
            reconnect_interval: None,
            stats_interval_ms: None,
            media_interval_ms: None,
            timeout: None,
            meters: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "scenesync", "scenesync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("scenesync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, layered as defaults, then the TOML file, then
/// `SCENESYNC_` variables (`__` separates nested keys, e.g.
/// `SCENESYNC_PROFILES__STUDIO__HOST`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SCENESYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
}

/// Resolve the password from the credential chain. `None` means the
/// remote is expected to run without authentication.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Env var (profile's own name, else the shared one)
    let env_name = profile.password_env.as_deref().unwrap_or(PASSWORD_ENV);
    if let Ok(val) = std::env::var(env_name) {
        return Some(SecretString::from(val));
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    profile
        .password
        .as_ref()
        .filter(|pw| !pw.is_empty())
        .map(|pw| SecretString::from(pw.clone()))
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(password)?;
    Ok(())
}

/// Look up a profile by name.
pub fn profile<'a>(cfg: &'a Config, name: &str) -> Result<&'a Profile, ConfigError> {
    cfg.profiles
        .get(name)
        .ok_or_else(|| ConfigError::ProfileNotFound { name: name.into() })
}

/// Build an `EngineConfig` from a profile, with no flag overrides.
pub fn profile_to_engine_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::new(profile.host.trim(), profile.port);
    config.password = resolve_password(profile, profile_name);

    if let Some(secs) = profile.reconnect_interval {
        config.reconnect_interval = Duration::from_secs(secs);
    }
    if let Some(ms) = profile.stats_interval_ms {
        config.stats_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = profile.media_interval_ms {
        config.media_interval = Duration::from_millis(ms);
    }
    if let Some(secs) = profile.timeout {
        config.request_timeout = Duration::from_secs(secs);
    }
    if profile.meters == Some(false) {
        config
            .subscriptions
            .remove(EventSubscription::INPUT_VOLUME_METERS);
    }

    config.validate().map_err(|e| ConfigError::Validation {
        field: format!("profiles.{profile_name}"),
        reason: e.to_string(),
    })?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn profile_defaults_to_standard_port() {
        let profile: Profile = toml::from_str(r#"host = "studio.local""#).unwrap();
        assert_eq!(profile.port, 4455);
        assert!(profile.password.is_none());
    }

    #[test]
    fn engine_config_applies_overrides() {
        let profile = Profile {
            host: " 10.0.0.5 ".into(),
            port: 4456,
            reconnect_interval: Some(10),
            media_interval_ms: Some(250),
            timeout: Some(5),
            meters: Some(false),
            ..Profile::default()
        };
        let cfg = profile_to_engine_config(&profile, "unit-overrides").unwrap();
        assert_eq!(cfg.host, "10.0.0.5");
        assert_eq!(cfg.port, Some(4456));
        assert_eq!(cfg.reconnect_interval, Duration::from_secs(10));
        assert_eq!(cfg.stats_interval, Duration::from_secs(1));
        assert_eq!(cfg.media_interval, Duration::from_millis(250));
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert!(!cfg.subscriptions.contains(EventSubscription::INPUT_VOLUME_METERS));
    }

    #[test]
    fn empty_host_fails_validation() {
        let err = profile_to_engine_config(&Profile::default(), "empty").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
        assert!(err.to_string().contains("hostname"));
    }

    #[test]
    fn plaintext_password_is_last_resort() {
        let profile = Profile {
            host: "studio.local".into(),
            password: Some("hunter2".into()),
            password_env: Some("SCENESYNC_TEST_UNSET_PASSWORD_VAR".into()),
            ..Profile::default()
        };
        let secret = resolve_password(&profile, "unit-plaintext-no-keyring").unwrap();
        assert_eq!(secret.expose_secret(), "hunter2");
    }

    #[test]
    fn empty_plaintext_password_means_none() {
        let profile = Profile {
            password: Some(String::new()),
            password_env: Some("SCENESYNC_TEST_UNSET_PASSWORD_VAR".into()),
            ..Profile::default()
        };
        assert!(resolve_password(&profile, "unit-empty-no-keyring").is_none());
    }
}
