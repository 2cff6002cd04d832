use thiserror::Error;

use crate::protocol::status;

/// Top-level error type for the `scenesync-api` crate.
///
/// Covers every failure mode of a remote session: handshake and
/// authentication, the WebSocket transport, and per-request rejections.
/// `scenesync-core` classifies these into retry / no-retry decisions.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The remote requires a password but none was configured.
    #[error("Authentication required but no password is configured")]
    AuthenticationRequired,

    /// The remote rejected the identify message (close code 4009).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Protocol ────────────────────────────────────────────────────
    /// The server did not speak the expected WebSocket subprotocol.
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// No RPC version both sides understand.
    #[error("Unsupported RPC version: client speaks {requested}, server offers {offered}")]
    UnsupportedRpcVersion { requested: u32, offered: u32 },

    /// The server sent a frame the handshake did not expect.
    #[error("Protocol violation: {0}")]
    Handshake(String),

    // ── Transport ───────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TCP connection refused by the remote host.
    #[error("Connection refused by {address}")]
    ConnectionRefused { address: String },

    /// WebSocket connection failed for any other reason.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the remote.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The session is gone; the request was never delivered.
    #[error("Not connected")]
    NotConnected,

    /// No response within the configured request timeout.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Requests ────────────────────────────────────────────────────
    /// The remote answered a request with a non-success status.
    #[error("{request_type} failed (code {code}){}", comment_suffix(.comment.as_deref()))]
    Request {
        request_type: String,
        code: u16,
        comment: Option<String>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw frame for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// JSON serialization of an outgoing frame failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn comment_suffix(comment: Option<&str>) -> String {
    comment.map(|c| format!(": {c}")).unwrap_or_default()
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. }
                | Self::WebSocketConnect(_)
                | Self::WebSocketClosed { .. }
                | Self::NotConnected
                | Self::Timeout { .. }
        )
    }

    /// Returns `true` if the session itself is gone.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected | Self::WebSocketClosed { .. })
    }

    /// Returns `true` if the remote rejected the request because the
    /// addressed resource does not have the requested capability
    /// (e.g. asking a video-only source for its audio tracks).
    pub fn is_capability_absent(&self) -> bool {
        matches!(
            self,
            Self::Request { code, .. } if matches!(
                *code,
                status::RESOURCE_NOT_FOUND
                    | status::INVALID_RESOURCE_TYPE
                    | status::INVALID_RESOURCE_STATE
            )
        )
    }

    /// Extract the remote request status code, if available.
    pub fn request_code(&self) -> Option<u16> {
        match self {
            Self::Request { code, .. } => Some(*code),
            _ => None,
        }
    }
}
