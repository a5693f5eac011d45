//! Session State Model
//!
//! This module defines the state a caller observes while a conversation is
//! being set up or is running. `Phase` is the single source of truth: every
//! boolean a UI needs (connected, agent present, agent speaking) is derived
//! from it rather than stored alongside it.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const STATUS_READY: &str = "Ready to connect";
pub const STATUS_REQUESTING_TOKEN: &str = "Getting access token...";
pub const STATUS_WAITING_FOR_AGENT: &str = "Waiting for agent...";
pub const STATUS_AGENT_READY: &str = "Agent connected! Ready to chat.";
pub const STATUS_AGENT_SPEAKING: &str = "Agent speaking...";
pub const STATUS_DISCONNECTING: &str = "Disconnecting...";

/// The kind of conversation a session carries. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConversationMode {
    /// Bidirectional audio, with microphone capture and agent playback.
    #[default]
    #[serde(rename = "webcall")]
    VoiceCall,
    /// Text messages only.
    #[serde(rename = "chat")]
    TextChat,
}

impl ConversationMode {
    /// The wire name used by the relay and the upstream API.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationMode::VoiceCall => "webcall",
            ConversationMode::TextChat => "chat",
        }
    }
}

impl fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the known conversation modes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown conversation mode '{0}', expected 'webcall' or 'chat'")]
pub struct UnknownModeError(pub String);

impl FromStr for ConversationMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "webcall" => Ok(ConversationMode::VoiceCall),
            "chat" => Ok(ConversationMode::TextChat),
            other => Err(UnknownModeError(other.to_string())),
        }
    }
}

/// The lifecycle position of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    /// An access grant has been requested, or the transport is starting.
    Connecting,
    /// The transport session is up; the agent has not joined yet.
    Connected,
    /// The agent has joined. `speaking` tracks whether it is currently talking.
    AgentConnected { speaking: bool },
    /// A best-effort transport stop is in flight.
    Disconnecting,
}

/// Caller-visible snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub phase: Phase,
    pub mode: ConversationMode,
    pub is_muted: bool,
    pub status_message: String,
    /// Draft text that has not been sent yet.
    pub pending_text_input: String,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(ConversationMode::default())
    }
}

impl SessionState {
    pub fn new(mode: ConversationMode) -> Self {
        Self {
            phase: Phase::Idle,
            mode,
            is_muted: false,
            status_message: STATUS_READY.to_string(),
            pending_text_input: String::new(),
        }
    }

    /// Returns the state to its initial values, keeping only the selected mode.
    pub fn reset(&mut self) {
        *self = Self::new(self.mode);
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn is_connecting(&self) -> bool {
        self.phase == Phase::Connecting
    }

    /// True once the transport session is up, whether or not the agent has joined.
    pub fn is_connected(&self) -> bool {
        matches!(self.phase, Phase::Connected | Phase::AgentConnected { .. })
    }

    pub fn is_agent_connected(&self) -> bool {
        matches!(self.phase, Phase::AgentConnected { .. })
    }

    pub fn is_agent_speaking(&self) -> bool {
        matches!(self.phase, Phase::AgentConnected { speaking: true })
    }

    pub fn can_send_text(&self) -> bool {
        self.mode == ConversationMode::TextChat && self.is_agent_connected()
    }

    pub fn can_toggle_mute(&self) -> bool {
        self.mode == ConversationMode::VoiceCall && self.is_connected()
    }
}

pub(crate) fn connecting_status(mode: ConversationMode) -> String {
    format!("Connecting to {} session...", mode)
}
