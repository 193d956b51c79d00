//! WebSocket protocol types for the SARVIS push channel
//!
//! All messages are JSON objects tagged by `type`. The backend pushes:
//! - Connection confirmation with the session's user
//! - Voice calls relayed from the robot's wake-word detector
//! - Media (YouTube) commands
//! - Acknowledgements for what the app reported back
//!
//! The app answers voice calls and media commands so the backend can stop
//! waiting, and sends a `ping` heartbeat.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        #[serde(default)]
        message: String,
        #[serde(default)]
        session_id: serde_json::Value,
        user: Option<ConnectedUser>,
    },

    /// Wake word heard by the robot
    VoiceCommand {
        command: String,
        #[serde(default)]
        timestamp: String,
    },

    YoutubeCommand {
        command: YoutubeCommand,
        #[serde(default)]
        timestamp: String,
    },

    VoiceCallConfirmationAck {
        #[serde(default)]
        confirmed: bool,
        #[serde(default)]
        message: String,
    },

    YoutubeCommandConfirmationAck {
        #[serde(default)]
        success: bool,
        #[serde(default)]
        message: String,
    },

    YoutubeCommandReportAck {
        #[serde(default)]
        confirmed: bool,
        #[serde(default)]
        message: String,
    },

    Pong {
        timestamp: Option<String>,
    },

    #[serde(other)]
    Unknown,
}

/// User attached to a freshly opened channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectedUser {
    pub uid: String,
    pub login_id: String,
    pub nickname: String,
}

/// Media commands the backend can relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum YoutubeCommand {
    #[serde(rename = "YOUTUBE_OPEN")]
    Open,
    #[serde(rename = "YOUTUBE_PLAY")]
    Play,
    #[serde(rename = "YOUTUBE_PAUSE")]
    Pause,
    #[serde(rename = "YOUTUBE_SEEK_FORWARD")]
    SeekForward,
    #[serde(rename = "YOUTUBE_SEEK_BACKWARD")]
    SeekBackward,
    /// Anything this client cannot play; still acknowledged as failed
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl YoutubeCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "YOUTUBE_OPEN",
            Self::Play => "YOUTUBE_PLAY",
            Self::Pause => "YOUTUBE_PAUSE",
            Self::SeekForward => "YOUTUBE_SEEK_FORWARD",
            Self::SeekBackward => "YOUTUBE_SEEK_BACKWARD",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn from_wire(s: &str) -> Self {
        match s {
            "YOUTUBE_OPEN" => Self::Open,
            "YOUTUBE_PLAY" => Self::Play,
            "YOUTUBE_PAUSE" => Self::Pause,
            "YOUTUBE_SEEK_FORWARD" => Self::SeekForward,
            "YOUTUBE_SEEK_BACKWARD" => Self::SeekBackward,
            _ => Self::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for YoutubeCommand {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let command = Self::from_wire(&raw);
        if command == Self::Unknown {
            tracing::warn!(command = %raw, "unsupported media command");
        }
        Ok(command)
    }
}

/// Outcome reported back for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Success,
    Failed,
}

impl From<bool> for CommandStatus {
    fn from(ok: bool) -> Self {
        if ok { Self::Success } else { Self::Failed }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The app alerted the user about a voice call
    VoiceCallConfirmation { timestamp: String },

    /// Result of a relayed media command
    YoutubeCommandAck { data: AckData },

    /// A media command the app ran on its own (manual or local voice)
    YoutubeCommandReport {
        command: String,
        status: CommandStatus,
        timestamp: String,
    },

    /// Keepalive
    Ping { timestamp: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckData {
    pub status: CommandStatus,
    pub timestamp: String,
}

impl ClientMessage {
    pub fn voice_call_confirmation() -> Self {
        Self::VoiceCallConfirmation { timestamp: now() }
    }

    pub fn youtube_ack(status: CommandStatus) -> Self {
        Self::YoutubeCommandAck {
            data: AckData {
                status,
                timestamp: now(),
            },
        }
    }

    pub fn youtube_report(command: impl Into<String>, status: CommandStatus) -> Self {
        Self::YoutubeCommandReport {
            command: command.into(),
            status,
            timestamp: now(),
        }
    }

    pub fn ping() -> Self {
        Self::Ping { timestamp: now() }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
