// scenesync-core: Client-side state mirror of a remote StudioPro session.

mod builders;
pub mod config;
mod convert;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod poll;
pub mod reconcile;
pub mod store;
pub mod stream;
pub mod views;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_PORT, EngineConfig};
pub use engine::{ConnectionState, ConnectionStatus, Engine, StatusReport};
pub use error::{CoreError, ErrorClass};
pub use event::{Event, EventKind, EventScope};
pub use poll::PeriodicTask;
pub use reconcile::{FollowUp, Reaction};
pub use store::{ChangeSet, StateStore, Ticket};
pub use stream::EntityStream;
pub use views::ChoiceLists;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Scenes
    Group, Scene, SceneItem, SceneItems,
    // Sources
    AudioState, Filter, MediaState, MediaStatus, MonitorType, Source, SourceFilters, SourceKind,
    Transition,
    // Outputs
    Output, RecordState, RecordStatus, ReplayBufferStatus, StreamStatus,
    // Session
    Choice, Counters, DskState, Monitor, NamedList, PerformanceStats, RemoteInfo, SessionState,
    TransitionState, VendorEvent, VideoSettings,
};

// Transport seam, for embedders supplying their own connector.
pub use scenesync_api::{Connector, EventSubscription, Session, WebSocketConnector};
