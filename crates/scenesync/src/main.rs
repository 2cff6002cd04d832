mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::io::IsTerminal;
use std::time::Duration;

use clap::Parser;
use indicatif::ProgressBar;
use tracing_subscriber::EnvFilter;

use scenesync_core::{DEFAULT_PORT, Engine, WebSocketConnector};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::commands::Remote;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a connection
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "scenesync", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let (engine_config, profile) = config::engine_config(&cli.global)?;
            let address = format!(
                "ws://{}:{}",
                engine_config.host,
                engine_config.port.unwrap_or(DEFAULT_PORT)
            );
            let remote = Remote {
                engine: Engine::websocket(engine_config),
                address,
                profile,
            };

            connect(&remote.engine, &cli.global)
                .await
                .map_err(|e| remote.error(e))?;

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &remote, &cli.global).await;
            remote.engine.shutdown().await;
            result
        }
    }
}

/// Connect, with a spinner on interactive terminals.
async fn connect(
    engine: &Engine<WebSocketConnector>,
    global: &GlobalOpts,
) -> Result<(), scenesync_core::CoreError> {
    let spinner = (!global.quiet && std::io::stderr().is_terminal()).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_message(format!("Connecting to {}", engine.config().host));
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    });

    let result = engine.connect().await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    if result.is_err() {
        engine.shutdown().await;
    }
    result
}
