// ── Mirrored session model ──
//
// Canonical representation of the remote session. Everything is keyed by
// remote-assigned names; the engine never invents identities of its own.

pub mod choice;
pub mod output;
pub mod scene;
pub mod session;
pub mod source;

// ── Re-exports ──────────────────────────────────────────────────────

pub use choice::Choice;
pub use output::{
    Output, RecordState, RecordStatus, ReplayBufferStatus, StreamStatus, VIRTUALCAM_OUTPUT,
};
pub use scene::{Group, Scene, SceneItem, SceneItems};
pub use session::{
    Counters, DskState, Monitor, NamedList, PerformanceStats, RemoteInfo, SessionState,
    TransitionState, VendorEvent, VideoSettings,
};
pub use source::{
    AudioState, Filter, MediaState, MediaStatus, MonitorType, Source, SourceFilters, SourceKind,
    Transition,
};
