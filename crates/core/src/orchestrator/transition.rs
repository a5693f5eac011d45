//! State transitions driven by transport events.
//!
//! `apply` mutates state and log synchronously under the orchestrator lock and
//! returns whatever asynchronous work the caller must do once the lock is gone.

use super::Inner;
use crate::{
    conversation::Sender,
    session::{self, Phase},
    transport::TransportEvent,
};
use serde_json::Value;
use tracing::{debug, info};

#[derive(Debug, PartialEq)]
pub(super) enum FollowUp {
    Nothing,
    Transcript { text: String, raw: Value },
    End,
    Fail { status: String, report: String },
}

pub(super) fn apply(inner: &mut Inner, event: TransportEvent) -> FollowUp {
    let state = &mut inner.state;
    match event {
        TransportEvent::SessionStarted => {
            if state.phase == Phase::Connecting && inner.grant.is_some() {
                info!("Transport session started");
                state.phase = Phase::Connected;
                state.status_message = session::STATUS_WAITING_FOR_AGENT.to_string();
            } else {
                debug!(phase = ?state.phase, "Ignoring session_started");
            }
            FollowUp::Nothing
        }
        TransportEvent::AgentConnected => {
            let joinable = match state.phase {
                Phase::Connected => true,
                Phase::Connecting => inner.grant.is_some(),
                _ => false,
            };
            if joinable {
                info!("Agent connected");
                state.phase = Phase::AgentConnected { speaking: false };
                state.status_message = session::STATUS_AGENT_READY.to_string();
            } else {
                debug!(phase = ?state.phase, "Ignoring agent_connected");
            }
            FollowUp::Nothing
        }
        TransportEvent::AgentSpeakingStarted | TransportEvent::AgentSpeakingStopped => {
            let speaking = event == TransportEvent::AgentSpeakingStarted;
            if let Phase::AgentConnected { .. } = state.phase {
                state.phase = Phase::AgentConnected { speaking };
                state.status_message = if speaking {
                    session::STATUS_AGENT_SPEAKING
                } else {
                    session::STATUS_AGENT_READY
                }
                .to_string();
            } else {
                debug!(phase = ?state.phase, speaking, "Ignoring speaking change without an agent");
            }
            FollowUp::Nothing
        }
        TransportEvent::Transcript { text, raw } => {
            inner.log.append(Sender::Agent, text.clone());
            FollowUp::Transcript { text, raw }
        }
        TransportEvent::MicrophonePermissionGranted => {
            info!("Microphone access granted");
            FollowUp::Nothing
        }
        TransportEvent::MicrophonePermissionError { error, can_retry } => {
            info!(%error, can_retry, "Microphone permission denied");
            FollowUp::Fail {
                status: format!("Microphone error: {}", error),
                report: error,
            }
        }
        TransportEvent::MicrophoneAccessFailed { error } => FollowUp::Fail {
            status: format!("Microphone access failed: {}", error),
            report: error,
        },
        TransportEvent::Error(message) => FollowUp::Fail {
            status: format!("Error: {}", message),
            report: message,
        },
        TransportEvent::SessionEnded => FollowUp::End,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        conversation::ConversationLog,
        gateway::AccessGrant,
        session::{ConversationMode, SessionState},
    };
    use serde_json::json;

    fn inner_in(phase: Phase, with_grant: bool) -> Inner {
        let mut state = SessionState::new(ConversationMode::TextChat);
        state.phase = phase;
        Inner {
            state,
            log: ConversationLog::new(),
            epoch: 1,
            grant: with_grant.then(|| AccessGrant {
                token: "t".into(),
                host: "h".into(),
            }),
            subscription: None,
            reset_task: None,
        }
    }

    #[test]
    fn test_session_started_requires_grant() {
        let mut inner = inner_in(Phase::Connecting, false);
        apply(&mut inner, TransportEvent::SessionStarted);
        assert_eq!(inner.state.phase, Phase::Connecting);

        let mut inner = inner_in(Phase::Connecting, true);
        apply(&mut inner, TransportEvent::SessionStarted);
        assert_eq!(inner.state.phase, Phase::Connected);
        assert_eq!(inner.state.status_message, session::STATUS_WAITING_FOR_AGENT);
    }

    #[test]
    fn test_speaking_only_toggles_with_agent_present() {
        let mut inner = inner_in(Phase::Connected, true);
        apply(&mut inner, TransportEvent::AgentSpeakingStarted);
        assert_eq!(inner.state.phase, Phase::Connected);
        assert!(!inner.state.is_agent_speaking());

        apply(&mut inner, TransportEvent::AgentConnected);
        apply(&mut inner, TransportEvent::AgentSpeakingStarted);
        assert!(inner.state.is_agent_speaking());
        assert_eq!(inner.state.status_message, session::STATUS_AGENT_SPEAKING);

        apply(&mut inner, TransportEvent::AgentSpeakingStopped);
        assert_eq!(inner.state.phase, Phase::AgentConnected { speaking: false });
        assert_eq!(inner.state.status_message, session::STATUS_AGENT_READY);
    }

    #[test]
    fn test_speaking_invariant_holds_for_any_event_order() {
        let events = [
            TransportEvent::AgentSpeakingStarted,
            TransportEvent::SessionStarted,
            TransportEvent::AgentSpeakingStarted,
            TransportEvent::AgentConnected,
            TransportEvent::AgentSpeakingStarted,
            TransportEvent::SessionStarted,
            TransportEvent::AgentConnected,
            TransportEvent::AgentSpeakingStopped,
            TransportEvent::AgentSpeakingStopped,
        ];
        for start in [Phase::Idle, Phase::Connecting, Phase::Connected] {
            let mut inner = inner_in(start, true);
            for event in events.iter().cloned() {
                apply(&mut inner, event);
                assert!(!inner.state.is_agent_speaking() || inner.state.is_agent_connected());
            }
        }
    }

    #[test]
    fn test_transcript_appends_agent_message() {
        let mut inner = inner_in(Phase::AgentConnected { speaking: false }, true);
        let follow_up = apply(
            &mut inner,
            TransportEvent::Transcript {
                text: "hello".into(),
                raw: json!({ "text": "hello" }),
            },
        );

        assert_eq!(
            follow_up,
            FollowUp::Transcript {
                text: "hello".into(),
                raw: json!({ "text": "hello" })
            }
        );
        let message = inner.log.last().unwrap();
        assert_eq!(message.sender, Sender::Agent);
        assert_eq!(message.text, "hello");
    }

    #[test]
    fn test_errors_request_failure_tear_down() {
        let mut inner = inner_in(Phase::Connecting, true);
        assert_eq!(
            apply(
                &mut inner,
                TransportEvent::MicrophoneAccessFailed {
                    error: "denied".into()
                }
            ),
            FollowUp::Fail {
                status: "Microphone access failed: denied".into(),
                report: "denied".into()
            }
        );
        assert_eq!(
            apply(&mut inner, TransportEvent::Error("boom".into())),
            FollowUp::Fail {
                status: "Error: boom".into(),
                report: "boom".into()
            }
        );
        assert_eq!(apply(&mut inner, TransportEvent::SessionEnded), FollowUp::End);
    }
}
