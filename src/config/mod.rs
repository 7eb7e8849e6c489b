//! Configuration loading.
//!
//! Settings come from `config/default.toml` (optional) and `BUSCHAT__*`
//! environment variables, layered over built-in defaults. The `SessionConfig`
//! value replaces the form fields the chat used to read directly: it is the
//! only way a nickname and a group reach the session.

mod settings;

use crate::config::settings::PartialSettings;
use crate::utils::ChatError;
use config::{Config, ConfigError, Environment, File};

pub use settings::{ChatSettings, LogSettings, RelaySettings, Settings};

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the relay, chat and log configurations
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit file stem (extension optional).
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("BUSCHAT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(merge(partial, Settings::default()))
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let relay = partial.relay;
    let chat = partial.chat;
    let log = partial.log;

    Settings {
        relay: match relay {
            Some(r) => RelaySettings {
                host: r.host.unwrap_or(default.relay.host),
                port: r.port.unwrap_or(default.relay.port),
                max_connections: r.max_connections.unwrap_or(default.relay.max_connections),
                retained_db_path: r.retained_db_path.or(default.relay.retained_db_path),
            },
            None => default.relay,
        },
        chat: match chat {
            Some(c) => {
                let d = default.chat;
                ChatSettings {
                    host: c.host.unwrap_or(d.host),
                    port: c.port.unwrap_or(d.port),
                    path: c.path.unwrap_or(d.path),
                    use_secure_transport: c.use_secure_transport.unwrap_or(d.use_secure_transport),
                    keep_alive_secs: c.keep_alive_secs.unwrap_or(d.keep_alive_secs),
                    reconnect: c.reconnect.unwrap_or(d.reconnect),
                    clean_session: c.clean_session.unwrap_or(d.clean_session),
                    reconnect_delay_ms: c.reconnect_delay_ms.unwrap_or(d.reconnect_delay_ms),
                    connect_timeout_secs: c
                        .connect_timeout_secs
                        .unwrap_or(d.connect_timeout_secs),
                    client_id_prefix: c.client_id_prefix.unwrap_or(d.client_id_prefix),
                    chat_base: c.chat_base.unwrap_or(d.chat_base),
                    presence_namespace: c.presence_namespace.unwrap_or(d.presence_namespace),
                }
            }
            None => default.chat,
        },
        log: LogSettings {
            level: log
                .and_then(|l| l.level)
                .unwrap_or(default.log.level),
        },
    }
}

const TOPIC_RESERVED: [char; 3] = ['/', '+', '#'];

/// What the user picked: who they are and which bus line they ride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub nickname: String,
    pub group: String,
}

impl SessionConfig {
    pub fn new(nickname: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            group: group.into(),
        }
    }

    /// Rejects a missing nickname or group before any connection is attempted.
    ///
    /// Both end up as topic levels, so topic separators and wildcards are
    /// rejected too.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.nickname.trim().is_empty() {
            return Err(ChatError::Configuration(
                "a nickname is required to use the chat".to_string(),
            ));
        }
        if self.group.trim().is_empty() {
            return Err(ChatError::Configuration("a group must be selected".to_string()));
        }
        for (field, value) in [("nickname", &self.nickname), ("group", &self.group)] {
            if value.contains(TOPIC_RESERVED) {
                return Err(ChatError::Configuration(format!(
                    "{field} {value:?} must not contain '/', '+' or '#'"
                )));
            }
        }
        Ok(())
    }
}
