mod command;
mod config;
mod credentials;
mod error;
mod session;
mod transport;

use anyhow::Context;
use build_runner_shared::limits;
use clap::Parser;
use command::CommandExecutor;
use config::RunnerConfig;
use credentials::CredentialStore;
use session::{ConnectionHandler, Dispatcher};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use transport::Listener;

#[derive(Parser, Debug)]
#[command(name = "build-runner", version, about)]
struct Args {
    /// Listen address, `tcp://host:port` or `unix://path`
    #[arg(long, default_value = limits::DEFAULT_ADDRESS)]
    address: String,

    /// Keep accepting connections instead of exiting after the first
    #[arg(long, default_value_t = false)]
    multiple: bool,

    /// Credential store to merge registry credentials into
    #[arg(long, env = "BUILD_RUNNER_AUTH_FILE")]
    auth_file: Option<PathBuf>,

    /// Kill the command if it runs longer than this many seconds
    #[arg(long, value_name = "SECS")]
    command_timeout: Option<u64>,

    #[arg(long, default_value_t = limits::MAX_REQUEST_BYTES)]
    max_request_bytes: usize,

    /// Pause before a single-shot runner exits
    #[arg(long, value_name = "MS", default_value_t = limits::SINGLE_SHOT_GRACE_MS)]
    grace_period_ms: u64,
}

impl From<Args> for RunnerConfig {
    fn from(args: Args) -> Self {
        Self {
            address: args.address,
            multiple: args.multiple,
            auth_file: args.auth_file,
            command_timeout: args.command_timeout.map(Duration::from_secs),
            max_request_bytes: args.max_request_bytes,
            grace_period: Duration::from_millis(args.grace_period_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Console stdout belongs to the child's output
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RunnerConfig::from(Args::parse());
    run(config).await
}

async fn run(config: RunnerConfig) -> anyhow::Result<ExitCode> {
    let auth_file = config
        .resolve_auth_file()
        .context("failed to locate the credential store")?;
    let store = Arc::new(CredentialStore::new(auth_file));
    info!("Credential store: {}", store.path().display());

    let listener = Listener::bind_str(&config.address).await?;

    let handler = ConnectionHandler::new(
        store,
        CommandExecutor::new(config.command_timeout),
        config.max_request_bytes,
    );
    let dispatcher = Dispatcher::new(listener, handler, config.grace_period);

    if config.multiple {
        info!("Serving connections on {}", dispatcher.local_description());
        dispatcher.serve_forever().await;
        return Ok(ExitCode::SUCCESS);
    }

    let result = dispatcher
        .serve_once()
        .await
        .context("failed to accept a connection")?;
    if result.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            "Exiting after failed request: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
        Ok(ExitCode::FAILURE)
    }
}
