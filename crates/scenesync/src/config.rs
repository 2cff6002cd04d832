//! CLI-side configuration: profile selection and flag overrides on top
//! of `scenesync-config`.

use secrecy::SecretString;

use scenesync_config::{self as config, Config, Profile};
use scenesync_core::EngineConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the engine config from the config file, the active profile and
/// CLI overrides (flag > env > profile).
pub fn engine_config(global: &GlobalOpts) -> Result<(EngineConfig, String), CliError> {
    let cfg = config::load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly requested profile must exist.
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available(&cfg),
            });
        }
        None if global.host.is_some() => Profile::default(),
        None => {
            return Err(CliError::NoConfig {
                path: config::config_path().display().to_string(),
            });
        }
    };

    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(port) = global.port {
        profile.port = port;
    }
    if let Some(secs) = global.timeout {
        profile.timeout = Some(secs);
    } else if profile.timeout.is_none() {
        profile.timeout = Some(cfg.defaults.timeout);
    }

    let mut engine = config::profile_to_engine_config(&profile, &profile_name)?;
    if let Some(ref password) = global.password {
        engine.password = Some(SecretString::from(password.clone()));
    }
    Ok((engine, profile_name))
}

/// Comma-separated profile names for help text.
pub fn available(cfg: &Config) -> String {
    let names = cfg.profile_names();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}
