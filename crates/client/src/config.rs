//! Client configuration read from `SCENESYNC_*` environment variables.
//!
//! Every variable is optional and falls back to the documented default.
//! A value that is present but does not parse is an error rather than being
//! silently replaced by the default.
//!
//! # Environment Variables
//!
//! Transport:
//! - `SCENESYNC_WS_URL` - WebSocket endpoint (default: `ws://localhost:8080/ws`)
//!
//! Reconnection:
//! - `SCENESYNC_RECONNECT_INITIAL_MS` - First backoff delay (default: 1000)
//! - `SCENESYNC_RECONNECT_MAX_MS` - Backoff cap (default: 30000)
//! - `SCENESYNC_RECONNECT_MAX_ATTEMPTS` - Attempts before giving up (default: 10)
//! - `SCENESYNC_RECONNECT_JITTER` - Jitter factor in 0..=1 (default: 0.2)
//!
//! Commands:
//! - `SCENESYNC_ACK_TIMEOUT_MS` - Acknowledgement timeout per attempt (default: 5000)
//! - `SCENESYNC_COMMAND_MAX_RETRIES` - Retries after the first send (default: 3)
//!
//! Scenes:
//! - `SCENESYNC_DEFAULT_ROOM` - Room for unknown scene ids (default: `4`)
//! - `SCENESYNC_SNAPSHOT_PATH` - JSON file of room snapshots (optional)
//! - `SCENESYNC_SCENE_ID` - Scene activated by the binary (default: `scene_A1`)
//! - `SCENESYNC_BRIDGE_BUFFER` - Messages held until the game runtime is ready (default: 64)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use scenesync_domain::{RoomId, FALLBACK_SCENE_ID};

use crate::infrastructure::game_bridge::DEFAULT_BUFFER_LIMIT;
use crate::infrastructure::messaging::command_dispatcher::{
    DEFAULT_ACK_TIMEOUT_MS, DEFAULT_MAX_RETRIES,
};
use crate::infrastructure::messaging::CommandConfig;
use crate::infrastructure::websocket::core::{
    BACKOFF_MULTIPLIER, INITIAL_RETRY_DELAY_MS, JITTER_FACTOR, MAX_RETRY_ATTEMPTS,
    MAX_RETRY_DELAY_MS,
};
use crate::infrastructure::websocket::ReconnectConfig;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";
pub const DEFAULT_ROOM: &str = "4";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: cannot parse '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("{key}: {reason}")]
    OutOfRange { key: &'static str, reason: String },

    #[error("SCENESYNC_WS_URL: {0}")]
    Url(String),

    #[error("SCENESYNC_DEFAULT_ROOM: {0}")]
    Room(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub ws_url: Url,
    pub reconnect: ReconnectConfig,
    pub commands: CommandConfig,
    pub default_room: RoomId,
    pub snapshot_path: Option<PathBuf>,
    pub scene_id: String,
    pub bridge_buffer_limit: usize,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };

        let ws_url = parse_ws_url(
            vars.string("SCENESYNC_WS_URL")
                .as_deref()
                .unwrap_or(DEFAULT_WS_URL),
        )?;

        let jitter_factor = vars.parsed("SCENESYNC_RECONNECT_JITTER", JITTER_FACTOR)?;
        if !(0.0..=1.0).contains(&jitter_factor) {
            return Err(ConfigError::OutOfRange {
                key: "SCENESYNC_RECONNECT_JITTER",
                reason: format!("{jitter_factor} is outside 0..=1"),
            });
        }
        let initial_ms = vars.parsed("SCENESYNC_RECONNECT_INITIAL_MS", INITIAL_RETRY_DELAY_MS)?;
        let max_ms = vars.parsed("SCENESYNC_RECONNECT_MAX_MS", MAX_RETRY_DELAY_MS)?;
        if max_ms < initial_ms {
            return Err(ConfigError::OutOfRange {
                key: "SCENESYNC_RECONNECT_MAX_MS",
                reason: format!("{max_ms} is below the initial delay {initial_ms}"),
            });
        }
        let reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            max_attempts: vars.parsed("SCENESYNC_RECONNECT_MAX_ATTEMPTS", MAX_RETRY_ATTEMPTS)?,
            multiplier: BACKOFF_MULTIPLIER,
            jitter_factor,
        };

        let commands = CommandConfig {
            ack_timeout: Duration::from_millis(
                vars.parsed("SCENESYNC_ACK_TIMEOUT_MS", DEFAULT_ACK_TIMEOUT_MS)?,
            ),
            max_retries: vars.parsed("SCENESYNC_COMMAND_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
        };

        let default_room = RoomId::new(
            vars.string("SCENESYNC_DEFAULT_ROOM")
                .unwrap_or_else(|| DEFAULT_ROOM.to_string()),
        )
        .map_err(|e| ConfigError::Room(e.to_string()))?;

        Ok(Self {
            ws_url,
            reconnect,
            commands,
            default_room,
            snapshot_path: vars.string("SCENESYNC_SNAPSHOT_PATH").map(PathBuf::from),
            scene_id: vars
                .string("SCENESYNC_SCENE_ID")
                .unwrap_or_else(|| FALLBACK_SCENE_ID.to_string()),
            bridge_buffer_limit: vars.parsed("SCENESYNC_BRIDGE_BUFFER", DEFAULT_BUFFER_LIMIT)?,
        })
    }
}

struct Vars<'a, F> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Trimmed value; blank counts as unset
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.string(key) {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
            None => Ok(default),
        }
    }
}

fn parse_ws_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Url(format!("'{raw}': {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::Url(format!(
            "unsupported scheme '{other}', expected ws or wss"
        ))),
    }
}
