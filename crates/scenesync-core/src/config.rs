// ── Engine configuration ──
//
// Everything the engine needs to reach and mirror one remote instance.
// Built by `scenesync-config` from profiles, or directly by embedders.

use std::time::Duration;

use secrecy::SecretString;

use scenesync_api::{ConnectTarget, EventSubscription, TransportConfig};

use crate::error::CoreError;

/// Default remote-control port.
pub const DEFAULT_PORT: u16 = 4455;

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Remote hostname or IP address.
    pub host: String,
    /// Remote port. `None` is a configuration error.
    pub port: Option<u16>,
    /// Password, if the remote requires authentication.
    pub password: Option<SecretString>,
    /// Event categories requested during the handshake.
    pub subscriptions: EventSubscription,
    /// Fixed delay between reconnection attempts.
    pub reconnect_interval: Duration,
    /// Period of the performance / output status poll.
    pub stats_interval: Duration,
    /// Period of the media playback poll.
    pub media_interval: Duration,
    /// Upgrade + handshake timeout.
    pub connect_timeout: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: Some(DEFAULT_PORT),
            password: None,
            subscriptions: EventSubscription::default(),
            reconnect_interval: Duration::from_secs(5),
            stats_interval: Duration::from_secs(1),
            media_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    /// Check that the connection info is complete.
    pub fn validate(&self) -> Result<(), CoreError> {
        let intervals = [
            ("reconnect", self.reconnect_interval),
            ("stats", self.stats_interval),
            ("media", self.media_interval),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(CoreError::Config {
                message: format!("The {name} interval must be greater than zero"),
            });
        }

        let message = match (self.host.trim().is_empty(), self.port.is_none()) {
            (false, false) => return Ok(()),
            (true, true) => "Missing WebSocket Server connection info",
            (true, false) => "Missing WebSocket Server IP address or hostname",
            (false, true) => "Missing WebSocket Server port",
        };
        Err(CoreError::Config {
            message: message.into(),
        })
    }

    pub(crate) fn target(&self) -> Result<ConnectTarget, CoreError> {
        self.validate()?;
        let port = self.port.unwrap_or(DEFAULT_PORT);
        Ok(ConnectTarget::new(self.host.trim(), port)?
            .with_password(self.password.clone())
            .with_subscriptions(self.subscriptions))
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_remote_conventions() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.port, Some(4455));
        assert_eq!(cfg.reconnect_interval, Duration::from_secs(5));
        assert_eq!(cfg.stats_interval, Duration::from_secs(1));
        assert_eq!(cfg.media_interval, Duration::from_secs(1));
    }

    #[test]
    fn validate_reports_each_missing_field() {
        let message = |cfg: &EngineConfig| cfg.validate().unwrap_err().to_string();

        let mut cfg = EngineConfig::default();
        cfg.port = None;
        assert_eq!(message(&cfg), "Missing WebSocket Server connection info");

        cfg.host = "studio.local".into();
        assert_eq!(message(&cfg), "Missing WebSocket Server port");

        let cfg = EngineConfig::new("  ", 4455);
        assert_eq!(message(&cfg), "Missing WebSocket Server IP address or hostname");

        assert!(EngineConfig::new("studio.local", 4455).validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut cfg = EngineConfig::new("studio.local", 4455);
        cfg.media_interval = Duration::ZERO;
        assert_eq!(
            cfg.validate().unwrap_err().to_string(),
            "The media interval must be greater than zero"
        );
    }

    #[test]
    fn target_uses_trimmed_host() {
        let target = EngineConfig::new(" 10.0.0.5 ", 4456).target().unwrap();
        assert_eq!(target.url.as_str(), "ws://10.0.0.5:4456/");
    }
}
