// Session contract consumed by the engine.
//
// The engine never talks to a socket directly: it holds a `Connector`
// and the `Session` it yields. The WebSocket implementation lives in
// `websocket.rs`; tests substitute scripted fakes.

use std::future::Future;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Error;
use crate::protocol::{EventSubscription, RawEvent, RequestResponse, RequestStatus, status};

/// Ordered push-event stream produced by a live session.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Something the session pushes without being asked.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Event(RawEvent),
    /// The connection is gone. Always the last item on the stream.
    Closed { code: Option<u16>, reason: String },
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub url: Url,
    pub password: Option<SecretString>,
    pub subscriptions: EventSubscription,
}

impl ConnectTarget {
    /// Build a `ws://host:port` target.
    pub fn new(host: &str, port: u16) -> Result<Self, Error> {
        Ok(Self {
            url: Url::parse(&format!("ws://{host}:{port}"))?,
            password: None,
            subscriptions: EventSubscription::default(),
        })
    }

    pub fn with_password(mut self, password: Option<SecretString>) -> Self {
        self.password = password;
        self
    }

    pub fn with_subscriptions(mut self, subscriptions: EventSubscription) -> Self {
        self.subscriptions = subscriptions;
        self
    }
}

/// Timeouts applied by the WebSocket transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

// ── Batches ──────────────────────────────────────────────────────────

/// One entry of a batched call. `request_id` is chosen by the caller and
/// echoed back so results can be matched to their originating item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub request_id: String,
    pub request_type: String,
    pub request_data: Option<Value>,
}

impl BatchRequest {
    pub fn new(request_id: impl Into<String>, request_type: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            request_type: request_type.into(),
            request_data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.request_data = Some(data);
        self
    }
}

/// Per-item result of a batched call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub request_id: String,
    pub request_type: String,
    pub status: RequestStatus,
    pub data: Option<Value>,
}

impl BatchResponse {
    pub fn ok(request_id: impl Into<String>, request_type: impl Into<String>, data: Value) -> Self {
        Self {
            request_id: request_id.into(),
            request_type: request_type.into(),
            status: RequestStatus {
                result: true,
                code: status::SUCCESS,
                comment: None,
            },
            data: Some(data),
        }
    }

    pub fn failed(
        request_id: impl Into<String>,
        request_type: impl Into<String>,
        code: u16,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            request_type: request_type.into(),
            status: RequestStatus {
                result: false,
                code,
                comment: Some(comment.into()),
            },
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.result
    }

    /// Turn the per-item status into a `Result`, mirroring a unary call.
    pub fn into_result(self) -> Result<Value, Error> {
        if self.status.result {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(Error::Request {
                request_type: self.request_type,
                code: self.status.code,
                comment: self.status.comment,
            })
        }
    }
}

impl From<RequestResponse> for BatchResponse {
    fn from(resp: RequestResponse) -> Self {
        Self {
            request_id: resp.request_id,
            request_type: resp.request_type,
            status: resp.request_status,
            data: resp.response_data,
        }
    }
}

// ── Traits ───────────────────────────────────────────────────────────

/// Opens sessions. Cheap to clone and keep around for reconnects.
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    /// Open a session: upgrade, negotiate the RPC version, authenticate,
    /// and subscribe to the requested event categories.
    fn connect(
        &self,
        target: &ConnectTarget,
    ) -> impl Future<Output = Result<(Self::Session, EventReceiver), Error>> + Send;
}

/// A live, identified session.
pub trait Session: Send + Sync + 'static {
    /// Unary request. Resolves to the response data (`Null` if the
    /// request has none) or `Error::Request` on a non-success status.
    fn call(
        &self,
        request_type: &str,
        request_data: Option<Value>,
    ) -> impl Future<Output = Result<Value, Error>> + Send;

    /// Batched request. Only fails wholesale when the session is gone;
    /// individual rejections are reported per item.
    fn call_batch(
        &self,
        requests: Vec<BatchRequest>,
    ) -> impl Future<Output = Result<Vec<BatchResponse>, Error>> + Send;

    /// Close the session. Idempotent.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
