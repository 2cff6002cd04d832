//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use scenesync_config::ConfigError;
use scenesync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const REJECTED: i32 = 4;
    pub const INCOMPATIBLE: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {address}")]
    #[diagnostic(
        code(scenesync::connection_failed),
        help(
            "Check that StudioPro is running with its WebSocket server enabled.\n\
             Address: {address}\n\
             Try: scenesync --host <ip> --port 4455 snapshot"
        )
    )]
    ConnectionFailed {
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("The remote does not speak a compatible protocol: {message}")]
    #[diagnostic(
        code(scenesync::incompatible),
        help("scenesync needs WebSocket server protocol RPC v1 (server version 5.x).")
    )]
    Incompatible { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("The remote requires a password")]
    #[diagnostic(
        code(scenesync::auth_required),
        help(
            "Store one with: scenesync config set-password --profile {profile}\n\
             Or set SCENESYNC_PASSWORD."
        )
    )]
    AuthRequired { profile: String },

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(scenesync::auth_failed),
        help(
            "Verify the server password in the remote's WebSocket settings.\n\
             Run: scenesync config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    // ── Requests ─────────────────────────────────────────────────────
    #[error("{request_type} was rejected (code {code}){}", detail_suffix(.message))]
    #[diagnostic(code(scenesync::rejected))]
    Rejected {
        request_type: String,
        code: u16,
        message: String,
    },

    #[error("Request timed out after {millis}ms")]
    #[diagnostic(
        code(scenesync::timeout),
        help("Increase the timeout with --timeout or check the remote's load.")
    )]
    Timeout { millis: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(scenesync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(scenesync::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: scenesync config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No remote configured")]
    #[diagnostic(
        code(scenesync::no_config),
        help(
            "Create a profile with: scenesync config init\n\
             Or pass --host. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(scenesync::config))]
    Config(ConfigError),

    #[error("Internal error: {0}")]
    #[diagnostic(code(scenesync::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(scenesync::json), help("Check the JSON and try again."))]
    Json(#[from] serde_json::Error),
}

fn detail_suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthRequired { .. } | Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Incompatible { .. } => exit_code::INCOMPATIBLE,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::ProfileNotFound { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the address and profile to a core error.
    pub fn from_core(err: CoreError, address: &str, profile: &str) -> Self {
        match err {
            CoreError::Config { message } => CliError::Validation {
                field: "connection".into(),
                reason: message,
            },
            CoreError::AuthenticationRequired => CliError::AuthRequired {
                profile: profile.into(),
            },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: profile.into(),
                message,
            },
            CoreError::ProtocolMismatch { message } => CliError::Incompatible { message },
            CoreError::ConnectionRefused { reason } | CoreError::ConnectionFailed { reason } => {
                CliError::ConnectionFailed {
                    address: address.into(),
                    source: reason.into(),
                }
            }
            CoreError::NotConnected => CliError::ConnectionFailed {
                address: address.into(),
                source: "the session was lost".into(),
            },
            CoreError::Timeout { timeout_ms } => CliError::Timeout { millis: timeout_ms },
            CoreError::Rejected {
                request_type,
                code,
                message,
            } => CliError::Rejected {
                request_type,
                code,
                message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::ProfileNotFound { name } => CliError::ProfileNotFound {
                name,
                available: "(see: scenesync config profiles)".into(),
            },
            other => CliError::Config(other),
        }
    }
}
