use std::sync::{Arc, Mutex};

use anyhow::Context;
use buschat::broker::{Broker, lock};
use buschat::cli::{ChatArgs, Cli, Command};
use buschat::config::{Settings, load_config, load_config_from};
use buschat::terminal;
use buschat::transport::websocket::start_websocket_server;
use buschat::utils::logging;
use clap::Parser;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("failed to load configuration")?;
    logging::init(&settings.log.level);

    match cli.command {
        Command::Relay { listen } => run_relay(&settings, listen).await,
        Command::Chat(args) => run_chat(settings, args).await,
    }
}

async fn run_relay(settings: &Settings, listen: Option<String>) -> anyhow::Result<()> {
    let addr =
        listen.unwrap_or_else(|| format!("{}:{}", settings.relay.host, settings.relay.port));
    let broker = Broker::from_settings(&settings.relay).context("failed to open retained store")?;
    let broker = Arc::new(Mutex::new(broker));

    tokio::select! {
        result = start_websocket_server(&addr, broker.clone()) => {
            result.with_context(|| format!("relay failed on {addr}"))?;
            error!("WebSocket relay exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    if let Err(e) = lock(&broker).retained().flush() {
        warn!(error = %e, "failed to flush retained messages");
    }
    Ok(())
}

async fn run_chat(settings: Settings, args: ChatArgs) -> anyhow::Result<()> {
    let mut chat = settings.chat;
    args.apply(&mut chat)?;
    info!(url = %chat.broker_url(), "joining chat");
    terminal::run(chat, args.session_config()).await
}
