//! Wire types for the remote-control protocol (RPC version 1).
//!
//! Every frame is a JSON text message `{ "op": <opcode>, "d": { ... } }`.
//! The client speaks the `obswebsocket.json` subprotocol.

use base64::Engine;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// The only RPC version this client speaks.
pub const RPC_VERSION: u32 = 1;

/// WebSocket subprotocol negotiated during the upgrade.
pub const SUBPROTOCOL: &str = "obswebsocket.json";

// ── Opcodes ──────────────────────────────────────────────────────────

pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
    pub const REQUEST_BATCH: u8 = 8;
    pub const REQUEST_BATCH_RESPONSE: u8 = 9;
}

// ── Close codes ──────────────────────────────────────────────────────

pub mod close {
    pub const NOT_IDENTIFIED: u16 = 4007;
    pub const AUTHENTICATION_FAILED: u16 = 4009;
    pub const UNSUPPORTED_RPC_VERSION: u16 = 4010;
    pub const SESSION_INVALIDATED: u16 = 4011;
}

// ── Request status codes ─────────────────────────────────────────────

pub mod status {
    pub const SUCCESS: u16 = 100;
    pub const NOT_READY: u16 = 207;
    pub const MISSING_REQUEST_FIELD: u16 = 300;
    pub const RESOURCE_NOT_FOUND: u16 = 600;
    pub const RESOURCE_ALREADY_EXISTS: u16 = 601;
    pub const INVALID_RESOURCE_TYPE: u16 = 602;
    pub const NOT_ENOUGH_RESOURCES: u16 = 603;
    pub const INVALID_RESOURCE_STATE: u16 = 604;
}

// ── Event subscriptions ──────────────────────────────────────────────

bitflags! {
    /// Event categories requested in the identify message.
    ///
    /// High-volume categories are not part of [`ALL`](Self::ALL) and must be
    /// requested explicitly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventSubscription: u32 {
        const GENERAL = 1 << 0;
        const CONFIG = 1 << 1;
        const SCENES = 1 << 2;
        const INPUTS = 1 << 3;
        const TRANSITIONS = 1 << 4;
        const FILTERS = 1 << 5;
        const OUTPUTS = 1 << 6;
        const SCENE_ITEMS = 1 << 7;
        const MEDIA_INPUTS = 1 << 8;
        const VENDORS = 1 << 9;
        const UI = 1 << 10;
        const ALL = Self::GENERAL.bits()
            | Self::CONFIG.bits()
            | Self::SCENES.bits()
            | Self::INPUTS.bits()
            | Self::TRANSITIONS.bits()
            | Self::FILTERS.bits()
            | Self::OUTPUTS.bits()
            | Self::SCENE_ITEMS.bits()
            | Self::MEDIA_INPUTS.bits()
            | Self::VENDORS.bits()
            | Self::UI.bits();
        const INPUT_VOLUME_METERS = 1 << 16;
        const INPUT_ACTIVE_STATE_CHANGED = 1 << 17;
        const INPUT_SHOW_STATE_CHANGED = 1 << 18;
        const SCENE_ITEM_TRANSFORM_CHANGED = 1 << 19;
    }
}

impl Default for EventSubscription {
    /// Everything the state mirror consumes, including meters and
    /// active/show state.
    fn default() -> Self {
        Self::ALL
            | Self::INPUT_ACTIVE_STATE_CHANGED
            | Self::INPUT_SHOW_STATE_CHANGED
            | Self::INPUT_VOLUME_METERS
            | Self::SCENE_ITEM_TRANSFORM_CHANGED
    }
}

// ── Frames ───────────────────────────────────────────────────────────

/// Outer envelope shared by every frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub op: u8,
    pub d: Value,
}

impl Envelope {
    pub fn new<T: Serialize>(op: u8, data: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            op,
            d: serde_json::to_value(data)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

/// A push event, still untyped. `scenesync-core` turns these into its
/// closed event enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub event_type: String,
    #[serde(default)]
    pub event_intent: u32,
    #[serde(default)]
    pub event_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<'a> {
    pub request_type: &'a str,
    pub request_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<&'a Value>,
}

/// Status block attached to every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    #[serde(default)]
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBatch<'a> {
    pub request_id: &'a str,
    pub halt_on_failure: bool,
    pub requests: Vec<Request<'a>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBatchResponse {
    pub request_id: String,
    #[serde(default)]
    pub results: Vec<RequestResponse>,
}

// ── Authentication ───────────────────────────────────────────────────

/// Compute the identify authentication string.
///
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    BASE64.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}
