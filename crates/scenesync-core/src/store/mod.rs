// ── Reactive state store ──
//
// Keyed entity storage plus session singletons, with push-based change
// notification and freshness bookkeeping for in-flight requests.

mod changes;
mod collection;
mod state_store;

pub use changes::ChangeSet;
pub use state_store::{StateStore, Ticket};

pub(crate) use state_store::field;
