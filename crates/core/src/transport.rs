//! Transport Capability Boundary
//!
//! The real-time transport (audio capture, playback, network delivery) is an
//! external SDK. This module defines what the orchestrator needs from it: a
//! handful of imperative calls plus a stream of named events. The event
//! vocabulary is fixed; anything outside it is dropped during parsing.

use crate::session::ConversationMode;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

pub const SESSION_STARTED: &str = "session_started";
pub const SESSION_ENDED: &str = "session_ended";
pub const AGENT_CONNECTED: &str = "agent_connected";
pub const AGENT_SPEAKING_STARTED: &str = "agent_speaking_started";
pub const AGENT_SPEAKING_STOPPED: &str = "agent_speaking_stopped";
pub const TRANSCRIPT: &str = "transcript";
pub const MICROPHONE_PERMISSION_GRANTED: &str = "microphone_permission_granted";
pub const MICROPHONE_PERMISSION_ERROR: &str = "microphone_permission_error";
pub const MICROPHONE_ACCESS_FAILED: &str = "microphone_access_failed";
pub const ERROR: &str = "error";

/// Receiving half of one event subscription.
pub type EventStream = mpsc::UnboundedReceiver<RawTransportEvent>;

/// An event exactly as the transport emitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransportEvent {
    pub name: String,
    pub payload: Value,
}

impl RawTransportEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// An event that carries no payload.
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }
}

/// The recognized transport events, with their payloads decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    SessionStarted,
    SessionEnded,
    AgentConnected,
    AgentSpeakingStarted,
    AgentSpeakingStopped,
    /// Agent speech or text. `raw` is the untouched payload for transcript callbacks.
    Transcript { text: String, raw: Value },
    MicrophonePermissionGranted,
    MicrophonePermissionError { error: String, can_retry: bool },
    MicrophoneAccessFailed { error: String },
    /// A fatal transport failure.
    Error(String),
}

#[derive(Deserialize)]
struct TranscriptPayload {
    text: String,
}

#[derive(Deserialize)]
struct MicrophonePermissionErrorPayload {
    error: String,
    #[serde(rename = "canRetry", default)]
    can_retry: bool,
}

#[derive(Deserialize)]
struct MicrophoneAccessFailedPayload {
    error: String,
}

impl TransportEvent {
    /// Decodes a raw event. Unknown names and malformed payloads yield `None`.
    pub fn parse(raw: &RawTransportEvent) -> Option<Self> {
        let event = match raw.name.as_str() {
            SESSION_STARTED => Self::SessionStarted,
            SESSION_ENDED => Self::SessionEnded,
            AGENT_CONNECTED => Self::AgentConnected,
            AGENT_SPEAKING_STARTED => Self::AgentSpeakingStarted,
            AGENT_SPEAKING_STOPPED => Self::AgentSpeakingStopped,
            MICROPHONE_PERMISSION_GRANTED => Self::MicrophonePermissionGranted,
            TRANSCRIPT => {
                let payload: TranscriptPayload = decode(raw)?;
                Self::Transcript {
                    text: payload.text,
                    raw: raw.payload.clone(),
                }
            }
            MICROPHONE_PERMISSION_ERROR => {
                let payload: MicrophonePermissionErrorPayload = decode(raw)?;
                Self::MicrophonePermissionError {
                    error: payload.error,
                    can_retry: payload.can_retry,
                }
            }
            MICROPHONE_ACCESS_FAILED => {
                let payload: MicrophoneAccessFailedPayload = decode(raw)?;
                Self::MicrophoneAccessFailed {
                    error: payload.error,
                }
            }
            ERROR => Self::Error(match &raw.payload {
                Value::String(message) => message.clone(),
                Value::Null => "Unknown transport error".to_string(),
                other => other.to_string(),
            }),
            _ => {
                debug!(event = %raw.name, "Ignoring unrecognized transport event");
                return None;
            }
        };
        Some(event)
    }
}

fn decode<T: for<'de> Deserialize<'de>>(raw: &RawTransportEvent) -> Option<T> {
    match serde_json::from_value(raw.payload.clone()) {
        Ok(payload) => Some(payload),
        Err(e) => {
            debug!(event = %raw.name, error = %e, "Ignoring transport event with malformed payload");
            None
        }
    }
}

/// Failure reported by a transport call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The capability surface of a real-time transport SDK.
///
/// Every call may fail, and events may arrive in any order once
/// `start_session` has been invoked.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn start_session(
        &self,
        token: &str,
        mode: ConversationMode,
        host: &str,
    ) -> Result<(), TransportError>;

    async fn stop_session(&self) -> Result<(), TransportError>;

    async fn mute(&self) -> Result<(), TransportError>;

    async fn unmute(&self) -> Result<(), TransportError>;

    async fn send_text_message(&self, text: &str) -> Result<(), TransportError>;

    async fn start_audio_playback(&self) -> Result<(), TransportError>;

    /// Registers a new listener and returns its event stream.
    fn subscribe(&self) -> EventStream;

    /// Detaches every listener registered so far.
    fn unsubscribe_all(&self);
}

/// The single owned event subscription of a session.
///
/// Holds the task draining the subscription's stream. Releasing the handle
/// detaches the transport's listeners, which closes the stream and lets the
/// pump finish on its own (the pump may be the caller). Dropping an
/// unreleased handle aborts the pump.
pub struct EventSubscription {
    transport: Arc<dyn Transport>,
    pump: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Detaches all previous listeners, then subscribes afresh and hands the
    /// new stream to `pump`.
    pub fn acquire<F>(transport: Arc<dyn Transport>, pump: F) -> Self
    where
        F: FnOnce(EventStream) -> JoinHandle<()>,
    {
        transport.unsubscribe_all();
        let events = transport.subscribe();
        let pump = Some(pump(events));
        Self { transport, pump }
    }

    pub fn release(mut self) {
        self.transport.unsubscribe_all();
        self.pump.take();
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicBool, AtomicU64, Ordering},
        },
        time::Duration,
    };
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Start {
            token: String,
            mode: ConversationMode,
            host: String,
        },
        Stop,
        Mute,
        Unmute,
        SendText(String),
        StartAudioPlayback,
    }

    /// In-memory transport that records calls and lets tests emit events.
    #[derive(Default)]
    pub struct FakeTransport {
        calls: Mutex<Vec<Call>>,
        listeners: Mutex<Vec<mpsc::UnboundedSender<RawTransportEvent>>>,
        pub fail_start: AtomicBool,
        pub fail_stop: AtomicBool,
        pub fail_playback: AtomicBool,
        pub fail_mute: AtomicBool,
        pub fail_send: AtomicBool,
        /// Milliseconds each mute, unmute or send call takes before returning.
        pub command_delay_ms: AtomicU64,
        /// When set, `start_session` waits for `start_gate` before returning.
        pub hold_start: AtomicBool,
        pub start_gate: Notify,
    }

    impl FakeTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
        }

        pub fn listener_count(&self) -> usize {
            self.listeners.lock().unwrap().len()
        }

        /// Delivers an event to every registered listener.
        pub fn emit(&self, event: RawTransportEvent) {
            for listener in self.listeners.lock().unwrap().iter() {
                let _ = listener.send(event.clone());
            }
        }

        pub fn emit_bare(&self, name: &str) {
            self.emit(RawTransportEvent::bare(name));
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        async fn command_delay(&self) {
            let ms = self.command_delay_ms.load(Ordering::SeqCst);
            if ms > 0 {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
        }

        fn outcome(flag: &AtomicBool, what: &str) -> Result<(), TransportError> {
            if flag.load(Ordering::SeqCst) {
                Err(TransportError::new(format!("{} failed", what)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn start_session(
            &self,
            token: &str,
            mode: ConversationMode,
            host: &str,
        ) -> Result<(), TransportError> {
            self.record(Call::Start {
                token: token.to_string(),
                mode,
                host: host.to_string(),
            });
            if self.hold_start.load(Ordering::SeqCst) {
                self.start_gate.notified().await;
            }
            Self::outcome(&self.fail_start, "start")
        }

        async fn stop_session(&self) -> Result<(), TransportError> {
            self.record(Call::Stop);
            Self::outcome(&self.fail_stop, "stop")
        }

        async fn mute(&self) -> Result<(), TransportError> {
            self.command_delay().await;
            self.record(Call::Mute);
            Self::outcome(&self.fail_mute, "mute")
        }

        async fn unmute(&self) -> Result<(), TransportError> {
            self.command_delay().await;
            self.record(Call::Unmute);
            Self::outcome(&self.fail_mute, "unmute")
        }

        async fn send_text_message(&self, text: &str) -> Result<(), TransportError> {
            self.command_delay().await;
            self.record(Call::SendText(text.to_string()));
            Self::outcome(&self.fail_send, "send")
        }

        async fn start_audio_playback(&self) -> Result<(), TransportError> {
            self.record(Call::StartAudioPlayback);
            Self::outcome(&self.fail_playback, "audio playback")
        }

        fn subscribe(&self) -> EventStream {
            let (tx, rx) = mpsc::unbounded_channel();
            self.listeners.lock().unwrap().push(tx);
            rx
        }

        fn unsubscribe_all(&self) {
            self.listeners.lock().unwrap().clear();
        }
    }
}
