//! Command line interface
//!
//! Subcommands:
//! - `relay`: run the WebSocket relay broker
//! - `chat`: join a bus line from the terminal

use clap::{Args, Parser, Subcommand};
use tungstenite::http::Uri;

use crate::config::{ChatSettings, SessionConfig};
use crate::utils::ChatError;

#[derive(Parser, Debug)]
#[command(name = "buschat", version, about = "Bus-line group chat over a pub/sub relay")]
pub struct Cli {
    /// Configuration file (extension optional). Defaults to `config/default`.
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the WebSocket relay broker
    Relay {
        /// Address to listen on, e.g. 0.0.0.0:8080 (default: relay.host:relay.port)
        #[arg(long)]
        listen: Option<String>,
    },
    /// Join a bus line chat
    Chat(ChatArgs),
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[arg(long)]
    pub nickname: String,

    /// Bus line to join
    #[arg(long)]
    pub group: String,

    /// Broker URL, e.g. ws://127.0.0.1:8080/ws. Overrides the configured broker.
    #[arg(long)]
    pub url: Option<String>,
}

impl ChatArgs {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.nickname.clone(), self.group.clone())
    }

    /// Points `settings` at `--url` when given.
    pub fn apply(&self, settings: &mut ChatSettings) -> Result<(), ChatError> {
        match &self.url {
            Some(url) => apply_broker_url(url, settings),
            None => Ok(()),
        }
    }
}

/// Sets host, port, path and secure transport from a `ws://` or `wss://` URL.
pub fn apply_broker_url(url: &str, settings: &mut ChatSettings) -> Result<(), ChatError> {
    let invalid = |reason: &str| ChatError::Configuration(format!("invalid broker url {url:?}: {reason}"));

    let uri: Uri = url.parse().map_err(|_| invalid("not a url"))?;
    let secure = match uri.scheme_str() {
        Some("ws") => false,
        Some("wss") => true,
        _ => return Err(invalid("scheme must be ws or wss")),
    };
    let host = uri.host().ok_or_else(|| invalid("missing host"))?;

    settings.host = host.to_string();
    settings.port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });
    settings.path = uri.path().to_string();
    settings.use_secure_transport = secure;
    Ok(())
}
