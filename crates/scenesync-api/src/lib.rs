// scenesync-api: Async client for the StudioPro remote-control protocol (RPC v1)

pub mod error;
pub mod protocol;
pub mod responses;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use protocol::{EventSubscription, RawEvent, RequestStatus};
pub use transport::{
    BatchRequest, BatchResponse, ConnectTarget, Connector, EventReceiver, Session,
    TransportConfig, TransportEvent,
};
pub use websocket::{WebSocketConnector, WebSocketSession};
