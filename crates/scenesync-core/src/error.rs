// ── Core error types ──
//
// Errors surfaced by the sync engine. Transport failures are translated
// into domain variants; `class()` drives the retry decision and the
// user-visible connection status.

use thiserror::Error;

use scenesync_api::protocol::status;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("{message}")]
    Config { message: String },

    // ── Authentication errors ────────────────────────────────────────
    #[error("Authentication required: no password configured")]
    AuthenticationRequired,

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Protocol errors ──────────────────────────────────────────────
    #[error("Incompatible remote: {message}")]
    ProtocolMismatch { message: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Connection refused: {reason}")]
    ConnectionRefused { reason: String },

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Remote errors ────────────────────────────────────────────────
    #[error("{request_type} rejected (code {code}): {message}")]
    Rejected {
        request_type: String,
        code: u16,
        message: String,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// How an error affects the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing host or port. Fatal until the operator fixes it.
    Configuration,
    /// Missing or wrong password. Fatal.
    Authentication,
    /// Remote speaks an incompatible protocol. Fatal.
    Protocol,
    /// Refused, reset, closed, timed out. Drives reconnection.
    Transient,
    /// A single request was rejected; the connection is fine.
    Remote,
}

impl CoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config { .. } => ErrorClass::Configuration,
            Self::AuthenticationRequired | Self::AuthenticationFailed { .. } => {
                ErrorClass::Authentication
            }
            Self::ProtocolMismatch { .. } => ErrorClass::Protocol,
            Self::ConnectionRefused { .. }
            | Self::ConnectionFailed { .. }
            | Self::NotConnected
            | Self::Timeout { .. } => ErrorClass::Transient,
            Self::Rejected { .. } | Self::Internal(_) => ErrorClass::Remote,
        }
    }

    /// Whether the reconnection policy should retry after this error.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Whether this error means the session itself is gone.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }

    /// Whether the remote rejected a request because the addressed
    /// resource lacks the capability (no audio, no such vendor, ...).
    pub fn is_capability_absent(&self) -> bool {
        matches!(
            self,
            Self::Rejected { code, .. } if matches!(
                *code,
                status::RESOURCE_NOT_FOUND
                    | status::INVALID_RESOURCE_TYPE
                    | status::INVALID_RESOURCE_STATE
            )
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<scenesync_api::Error> for CoreError {
    fn from(err: scenesync_api::Error) -> Self {
        use scenesync_api::Error as Api;

        match err {
            Api::AuthenticationRequired => CoreError::AuthenticationRequired,
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::UnsupportedProtocol(reason) => CoreError::ProtocolMismatch {
                message: format!(
                    "{reason} (the remote is outdated or is not a StudioPro control endpoint)"
                ),
            },
            Api::UnsupportedRpcVersion { requested, offered } => CoreError::ProtocolMismatch {
                message: format!("client speaks RPC v{requested}, remote offers v{offered}"),
            },
            Api::Handshake(reason) => CoreError::ProtocolMismatch { message: reason },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid address: {e}"),
            },
            Api::ConnectionRefused { address } => CoreError::ConnectionRefused { reason: address },
            Api::WebSocketConnect(reason) => CoreError::ConnectionFailed { reason },
            Api::WebSocketClosed { .. } | Api::NotConnected => CoreError::NotConnected,
            Api::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            Api::Request {
                request_type,
                code,
                comment,
            } => CoreError::Rejected {
                request_type,
                code,
                message: comment.unwrap_or_default(),
            },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            Api::Serialization(e) => CoreError::Internal(format!("Serialization error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_classify_for_retry() {
        let refused: CoreError = scenesync_api::Error::ConnectionRefused {
            address: "10.0.0.5:4455".into(),
        }
        .into();
        assert_eq!(refused.class(), ErrorClass::Transient);
        assert!(refused.is_retryable());

        let auth: CoreError = scenesync_api::Error::Authentication {
            message: "Invalid password".into(),
        }
        .into();
        assert_eq!(auth.class(), ErrorClass::Authentication);
        assert!(!auth.is_retryable());

        let proto: CoreError =
            scenesync_api::Error::UnsupportedProtocol("Server sent no subprotocol".into()).into();
        assert_eq!(proto.class(), ErrorClass::Protocol);

        let closed: CoreError = scenesync_api::Error::WebSocketClosed {
            code: 1006,
            reason: String::new(),
        }
        .into();
        assert!(closed.is_not_connected());
    }

    #[test]
    fn rejected_request_is_not_a_connection_problem() {
        let err: CoreError = scenesync_api::Error::Request {
            request_type: "GetSceneItemList".into(),
            code: 600,
            comment: Some("No scene".into()),
        }
        .into();
        assert_eq!(err.class(), ErrorClass::Remote);
        assert!(!err.is_not_connected());
        assert!(err.is_capability_absent());
        assert!(!CoreError::NotConnected.is_capability_absent());
    }
}
