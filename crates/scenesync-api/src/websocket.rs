//! WebSocket session for the remote-control protocol.
//!
//! Performs the upgrade (subprotocol `obswebsocket.json`), the
//! Hello / Identify / Identified handshake, and then runs two background
//! tasks: a writer draining outgoing frames and a reader that routes
//! responses to their waiting callers and pushes events, in arrival
//! order, onto an unbounded channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use scenesync_api::transport::{ConnectTarget, Connector, Session, TransportEvent};
//! use scenesync_api::websocket::WebSocketConnector;
//!
//! let target = ConnectTarget::new("127.0.0.1", 4455)?;
//! let (session, mut events) = WebSocketConnector::default().connect(&target).await?;
//!
//! let version = session.call("GetVersion", None).await?;
//! println!("{}", version["obsVersion"]);
//!
//! while let Some(TransportEvent::Event(event)) = events.recv().await {
//!     println!("{}", event.event_type);
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::error::Error;
use crate::protocol::{
    Envelope, Hello, Identified, Identify, RPC_VERSION, RawEvent, Request, RequestBatch,
    RequestBatchResponse, RequestResponse, SUBPROTOCOL, auth_response, close, op,
};
use crate::transport::{
    BatchRequest, BatchResponse, ConnectTarget, Connector, EventReceiver, Session,
    TransportConfig, TransportEvent,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<DashMap<String, oneshot::Sender<Reply>>>;

/// What the reader hands back to a waiting caller.
#[derive(Debug)]
enum Reply {
    Single(RequestResponse),
    Batch(Vec<RequestResponse>),
}

// ── WebSocketConnector ───────────────────────────────────────────────

/// Opens [`WebSocketSession`]s.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: TransportConfig,
}

impl WebSocketConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    async fn open(&self, target: &ConnectTarget) -> Result<(WebSocketSession, EventReceiver), Error> {
        tracing::info!(url = %target.url, "Connecting to remote");

        let uri: tungstenite::http::Uri = target
            .url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

        let request = ClientRequestBuilder::new(uri).with_sub_protocol(SUBPROTOCOL);

        let (mut ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| map_connect_error(e, &target.url))?;

        let rpc_version = handshake(&mut ws, target).await?;
        tracing::info!(rpc_version, "Session identified");

        let (write, read) = ws.split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(DashMap::new());
        let cancel = CancellationToken::new();

        tokio::spawn(write_loop(write, outgoing_rx, cancel.clone()));
        tokio::spawn(read_loop(read, Arc::clone(&pending), event_tx, cancel.clone()));

        let session = WebSocketSession {
            outgoing: outgoing_tx,
            pending,
            cancel,
            request_timeout: self.config.request_timeout,
            rpc_version,
        };
        Ok((session, event_rx))
    }
}

impl Connector for WebSocketConnector {
    type Session = WebSocketSession;

    async fn connect(&self, target: &ConnectTarget) -> Result<(WebSocketSession, EventReceiver), Error> {
        tokio::time::timeout(self.config.connect_timeout, self.open(target))
            .await
            .map_err(|_| Error::Timeout {
                timeout_ms: millis(self.config.connect_timeout),
            })?
    }
}

// ── WebSocketSession ─────────────────────────────────────────────────

/// An identified session. Dropping it does not close the socket; call
/// [`Session::close`].
pub struct WebSocketSession {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    cancel: CancellationToken,
    request_timeout: Duration,
    rpc_version: u32,
}

impl WebSocketSession {
    /// RPC version agreed during the handshake.
    pub fn rpc_version(&self) -> u32 {
        self.rpc_version
    }

    async fn round_trip(&self, request_id: String, frame: &Envelope) -> Result<Reply, Error> {
        let text = serde_json::to_string(frame)?;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        if self.cancel.is_cancelled() || self.outgoing.send(Message::text(text)).is_err() {
            self.pending.remove(&request_id);
            return Err(Error::NotConnected);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            // Reader dropped the sender: the socket is gone.
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => {
                self.pending.remove(&request_id);
                Err(Error::Timeout {
                    timeout_ms: millis(self.request_timeout),
                })
            }
        }
    }
}

impl Session for WebSocketSession {
    async fn call(&self, request_type: &str, request_data: Option<Value>) -> Result<Value, Error> {
        let request_id = Uuid::new_v4().to_string();
        let frame = Envelope::new(
            op::REQUEST,
            &Request {
                request_type,
                request_id: &request_id,
                request_data: request_data.as_ref(),
            },
        )?;

        tracing::debug!(request_type, "request");
        match self.round_trip(request_id, &frame).await? {
            Reply::Single(resp) => BatchResponse::from(resp).into_result(),
            Reply::Batch(_) => Err(Error::Handshake(format!(
                "batch response to unary {request_type}"
            ))),
        }
    }

    async fn call_batch(&self, requests: Vec<BatchRequest>) -> Result<Vec<BatchResponse>, Error> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let batch_id = Uuid::new_v4().to_string();
        let frame = Envelope::new(
            op::REQUEST_BATCH,
            &RequestBatch {
                request_id: &batch_id,
                halt_on_failure: false,
                requests: requests
                    .iter()
                    .map(|r| Request {
                        request_type: &r.request_type,
                        request_id: &r.request_id,
                        request_data: r.request_data.as_ref(),
                    })
                    .collect(),
            },
        )?;

        tracing::debug!(items = requests.len(), "batch request");
        match self.round_trip(batch_id, &frame).await? {
            Reply::Batch(results) => Ok(results.into_iter().map(BatchResponse::from).collect()),
            Reply::Single(resp) => Err(Error::Handshake(format!(
                "unary response to batch ({})",
                resp.request_type
            ))),
        }
    }

    async fn close(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!("Closing session");
            self.cancel.cancel();
        }
    }
}

// ── Handshake ────────────────────────────────────────────────────────

/// Hello → Identify → Identified. Returns the negotiated RPC version.
async fn handshake(ws: &mut WsStream, target: &ConnectTarget) -> Result<u32, Error> {
    let envelope = read_envelope(ws).await?;
    if envelope.op != op::HELLO {
        return Err(Error::Handshake(format!("expected Hello, got op {}", envelope.op)));
    }
    let hello: Hello = decode(envelope.d)?;
    tracing::debug!(
        server_version = hello.obs_web_socket_version.as_deref().unwrap_or("unknown"),
        rpc_version = hello.rpc_version,
        auth = hello.authentication.is_some(),
        "Hello received"
    );

    if hello.rpc_version < RPC_VERSION {
        return Err(Error::UnsupportedRpcVersion {
            requested: RPC_VERSION,
            offered: hello.rpc_version,
        });
    }

    let authentication = match (&hello.authentication, &target.password) {
        (None, _) => None,
        (Some(_), None) => return Err(Error::AuthenticationRequired),
        (Some(challenge), Some(password)) => Some(auth_response(
            password.expose_secret(),
            &challenge.salt,
            &challenge.challenge,
        )),
    };

    let identify = Envelope::new(
        op::IDENTIFY,
        &Identify {
            rpc_version: RPC_VERSION,
            authentication,
            event_subscriptions: target.subscriptions.bits(),
        },
    )?;
    ws.send(Message::text(serde_json::to_string(&identify)?))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let envelope = read_envelope(ws).await.map_err(|e| match e {
        Error::UnsupportedRpcVersion { requested, .. } => Error::UnsupportedRpcVersion {
            requested,
            offered: hello.rpc_version,
        },
        other => other,
    })?;
    if envelope.op != op::IDENTIFIED {
        return Err(Error::Handshake(format!(
            "expected Identified, got op {}",
            envelope.op
        )));
    }
    let identified: Identified = decode(envelope.d)?;
    Ok(identified.negotiated_rpc_version)
}

/// Read frames until a text frame arrives; a close frame becomes an error.
async fn read_envelope(ws: &mut WsStream) -> Result<Envelope, Error> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                    message: e.to_string(),
                    body: text.to_string(),
                });
            }
            Some(Ok(Message::Close(frame))) => return Err(close_error(frame)),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            None => {
                return Err(Error::WebSocketClosed {
                    code: 1006,
                    reason: "stream ended during handshake".into(),
                });
            }
        }
    }
}

fn close_error(frame: Option<CloseFrame>) -> Error {
    let (code, reason) = close_parts(frame);
    match code {
        Some(close::AUTHENTICATION_FAILED) => Error::Authentication {
            message: if reason.is_empty() {
                "Invalid password".into()
            } else {
                reason
            },
        },
        Some(close::UNSUPPORTED_RPC_VERSION) => Error::UnsupportedRpcVersion {
            requested: RPC_VERSION,
            offered: 0,
        },
        code => Error::WebSocketClosed {
            code: code.unwrap_or(1005),
            reason,
        },
    }
}

fn close_parts(frame: Option<CloseFrame>) -> (Option<u16>, String) {
    frame.map_or((None, String::new()), |cf| {
        (Some(u16::from(cf.code)), cf.reason.to_string())
    })
}

fn map_connect_error(err: tungstenite::Error, url: &Url) -> Error {
    match err {
        tungstenite::Error::Io(ref io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            Error::ConnectionRefused {
                address: format!(
                    "{}:{}",
                    url.host_str().unwrap_or_default(),
                    url.port_or_known_default().unwrap_or_default()
                ),
            }
        }
        tungstenite::Error::Protocol(ProtocolError::SecWebSocketSubProtocolError(e)) => {
            Error::UnsupportedProtocol(e.to_string())
        }
        other => Error::WebSocketConnect(other.to_string()),
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn write_loop(
    mut write: SplitSink<WsStream, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            msg = outgoing.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = write.send(msg).await {
                    tracing::debug!(error = %e, "WebSocket write failed");
                    cancel.cancel();
                    break;
                }
            }
        }
    }
    let _ = write.close().await;
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    pending: PendingMap,
    events: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
) {
    let closed = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                break TransportEvent::Closed { code: None, reason: "closed by client".into() };
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch_frame(&text, &pending, &events),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = close_parts(frame);
                    tracing::info!(?code, %reason, "WebSocket close frame received");
                    break TransportEvent::Closed { code, reason };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "WebSocket read failed");
                    break TransportEvent::Closed { code: None, reason: e.to_string() };
                }
                None => {
                    tracing::info!("WebSocket stream ended");
                    break TransportEvent::Closed { code: None, reason: "stream ended".into() };
                }
            }
        }
    };

    cancel.cancel();
    // Dropping the senders wakes every waiting caller with `NotConnected`.
    pending.clear();
    let _ = events.send(closed);
}

/// Route one text frame: responses to their callers, events to the stream.
fn dispatch_frame(
    text: &str,
    pending: &DashMap<String, oneshot::Sender<Reply>>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse frame");
            return;
        }
    };

    match envelope.op {
        op::EVENT => match serde_json::from_value::<RawEvent>(envelope.d) {
            Ok(event) => {
                // No receiver just means nobody is listening any more.
                let _ = events.send(TransportEvent::Event(event));
            }
            Err(e) => tracing::debug!(error = %e, "Malformed event frame"),
        },
        op::REQUEST_RESPONSE => match serde_json::from_value::<RequestResponse>(envelope.d) {
            Ok(resp) => {
                let id = resp.request_id.clone();
                complete(pending, &id, Reply::Single(resp));
            }
            Err(e) => tracing::debug!(error = %e, "Malformed response frame"),
        },
        op::REQUEST_BATCH_RESPONSE => {
            match serde_json::from_value::<RequestBatchResponse>(envelope.d) {
                Ok(resp) => complete(pending, &resp.request_id, Reply::Batch(resp.results)),
                Err(e) => tracing::debug!(error = %e, "Malformed batch response frame"),
            }
        }
        other => tracing::trace!(op = other, "Ignoring frame"),
    }
}

fn complete(pending: &DashMap<String, oneshot::Sender<Reply>>, request_id: &str, reply: Reply) {
    if let Some((_, tx)) = pending.remove(request_id) {
        let _ = tx.send(reply);
    } else {
        tracing::debug!(request_id, "Response for unknown or expired request");
    }
}

fn decode<T: DeserializeOwned>(data: Value) -> Result<T, Error> {
    serde_json::from_value(data.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: data.to_string(),
    })
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ────────────────────────────────────────────────────────────
