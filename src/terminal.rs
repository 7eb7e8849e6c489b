//! Terminal front-end for `buschat chat`.
//!
//! Reads lines from stdin and renders updates to stdout. Commands:
//! - `/group <name>`: switch bus line
//! - `/nick <name>`: change nickname
//! - `/online`: list who is online
//! - `/quit`: leave

use anyhow::Context;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::config::{ChatSettings, SessionConfig};
use crate::session::{ChatController, ClientIdentity, ViewUpdate};
use crate::transport::{Transport, WsTransport};

/// A parsed line of user input.
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Say(&'a str),
    Group(&'a str),
    Nick(&'a str),
    Online,
    Quit,
    Unknown(&'a str),
}

pub fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(command) = line.strip_prefix('/') else {
        return Input::Say(line);
    };
    let (name, arg) = match command.split_once(' ') {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg) {
        ("group", g) if !g.is_empty() => Input::Group(g),
        ("nick", n) if !n.is_empty() => Input::Nick(n),
        ("online", _) => Input::Online,
        ("quit", _) => Input::Quit,
        _ => Input::Unknown(line),
    }
}

pub fn render(update: &ViewUpdate) -> String {
    match update {
        ViewUpdate::Message(msg) => format!("<{}> {}", msg.nickname, msg.msg_text),
        ViewUpdate::OnlineChanged(online) => render_online(online),
        ViewUpdate::ConnectionLost(reason) => format!("!!! connection lost: {reason}"),
        ViewUpdate::Reconnected => "*** reconnected".to_string(),
    }
}

fn render_online(online: &[String]) -> String {
    if online.is_empty() {
        "*** nobody else is online".to_string()
    } else {
        format!("*** online: {}", online.join(", "))
    }
}

async fn say(line: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

/// Runs the chat until `/quit`, end of input or Ctrl-C.
pub async fn run(settings: ChatSettings, config: SessionConfig) -> anyhow::Result<()> {
    let transport_settings = settings.clone();
    let mut controller = ChatController::new(settings, move |_: &ClientIdentity| {
        WsTransport::from_settings(&transport_settings)
    });

    controller
        .configure(config.clone())
        .await
        .context("failed to join the chat")?;
    say(&format!("*** joined {} as {}", config.group, config.nickname)).await?;

    let result = run_with(&mut controller, BufReader::new(io::stdin())).await;

    if let Err(e) = controller.disconnect().await {
        warn!(error = %e, "failed to leave cleanly");
    }
    result
}

/// Feeds `input` lines to the controller and renders its updates until
/// `/quit`, end of input or Ctrl-C. Leaves the controller connected.
pub async fn run_with<T, F, R>(
    controller: &mut ChatController<T, F>,
    input: R,
) -> anyhow::Result<()>
where
    T: Transport,
    F: FnMut(&ClientIdentity) -> T,
    R: AsyncBufRead + Unpin,
{
    // `next_line` keeps a partly read line across cancellation.
    let mut lines = input.lines();

    loop {
        tokio::select! {
            update = controller.next_update(), if controller.is_connected() => match update {
                Some(update) => say(&render(&update)).await?,
                None => say("!!! disconnected, use /group to rejoin").await?,
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !handle_input(controller, &line).await? {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn handle_input<T, F>(
    controller: &mut ChatController<T, F>,
    line: &str,
) -> anyhow::Result<bool>
where
    T: Transport,
    F: FnMut(&ClientIdentity) -> T,
{
    match parse_input(line) {
        Input::Quit => return Ok(false),
        Input::Online => say(&render_online(&controller.online_users())).await?,
        Input::Group(group) => {
            let config = SessionConfig::new(controller.nickname(), group);
            match controller.configure(config).await {
                Ok(true) => say(&format!("*** joined {group}")).await?,
                Ok(false) => say(&format!("*** already on {group}")).await?,
                Err(e) => say(&format!("!!! {e}")).await?,
            }
        }
        Input::Nick(nickname) => {
            let group = controller.group().unwrap_or_default().to_string();
            match controller.configure(SessionConfig::new(nickname, group)).await {
                Ok(_) => say(&format!("*** you are now {nickname}")).await?,
                Err(e) => say(&format!("!!! {e}")).await?,
            }
        }
        Input::Say(text) => {
            if let Err(e) = controller.send_message(text) {
                say(&format!("!!! {e}")).await?;
            }
        }
        Input::Unknown(command) => say(&format!("!!! unknown command: {command}")).await?,
    }
    Ok(true)
}
