//! Command dispatch: bridges CLI args -> engine calls -> output formatting.

pub mod config_cmd;
pub mod dsk;
pub mod request;
pub mod snapshot;
pub mod watch;

use scenesync_core::{CoreError, Engine, WebSocketConnector};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// A connected engine plus what error messages need to name it.
pub struct Remote {
    pub engine: Engine<WebSocketConnector>,
    pub address: String,
    pub profile: String,
}

impl Remote {
    pub fn error(&self, err: CoreError) -> CliError {
        CliError::from_core(err, &self.address, &self.profile)
    }
}

/// Dispatch a connection-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, remote: &Remote, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Snapshot(args) => snapshot::handle(remote, &args, global),
        Command::Watch(args) => watch::handle(remote, &args, global).await,
        Command::Request(args) => request::handle(remote, args, global).await,
        Command::Dsk(args) => dsk::handle(remote, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command does not need a connection".into(),
        )),
    }
}
