use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the relay broker, the chat client and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub relay: RelaySettings,
    pub chat: ChatSettings,
    pub log: LogSettings,
}

/// Configuration settings for the relay broker.
///
/// Defines the bind address, the connection cap and where retained
/// messages are stored. Without a `retained_db_path` the store is temporary.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub retained_db_path: Option<String>,
}

/// Configuration settings for a chat client.
///
/// Covers the broker endpoint, the connect-time parameters and the topic layout.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChatSettings {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub use_secure_transport: bool,
    pub keep_alive_secs: u64,
    pub reconnect: bool,
    pub clean_session: bool,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub client_id_prefix: String,
    pub chat_base: String,
    pub presence_namespace: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub relay: Option<PartialRelaySettings>,
    pub chat: Option<PartialChatSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialRelaySettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
    pub retained_db_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialChatSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub use_secure_transport: Option<bool>,
    pub keep_alive_secs: Option<u64>,
    pub reconnect: Option<bool>,
    pub clean_session: Option<bool>,
    pub reconnect_delay_ms: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub client_id_prefix: Option<String>,
    pub chat_base: Option<String>,
    pub presence_namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_connections: 1000,
            retained_db_path: None,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 443,
            path: "/ws".to_string(),
            use_secure_transport: true,
            keep_alive_secs: 10,
            reconnect: true,
            clean_session: true,
            reconnect_delay_ms: 1000,
            connect_timeout_secs: 10,
            client_id_prefix: "client-94068-nick-".to_string(),
            chat_base: "chat/onboard/bus/".to_string(),
            presence_namespace: "bus-onboard/clients/".to_string(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            relay: RelaySettings::default(),
            chat: ChatSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl ChatSettings {
    /// The WebSocket URL of the broker, `wss://` when secure transport is on.
    pub fn broker_url(&self) -> String {
        let scheme = if self.use_secure_transport { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }
}
