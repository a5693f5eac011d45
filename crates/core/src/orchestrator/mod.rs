//! Session Orchestrator
//!
//! Turns a token request into a live transport session and keeps the
//! caller-visible `SessionState` consistent while transport events arrive.
//!
//! All mutations go through one async mutex and the lock is never held while
//! waiting on the gateway or the transport. Anything that resumes after such a
//! wait (a grant response, a transport acknowledgment, a queued event, the
//! grace-reset timer) carries the epoch it was started under and is discarded
//! when a newer connect, disconnect, or failure has bumped the epoch since.

mod transition;


use crate::{
    config::OrchestratorConfig,
    conversation::{ConversationLog, Message, Sender},
    credentials::Credentials,
    error::{SessionError, SessionResult},
    gateway::{AccessGrant, TokenGateway},
    session::{self, ConversationMode, Phase, SessionState},
    transport::{EventStream, EventSubscription, RawTransportEvent, Transport, TransportEvent},
};
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};
use tracing::{Instrument, debug, info, info_span, instrument, warn};
use transition::FollowUp;
use uuid::Uuid;

pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type TranscriptCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Everything the orchestrator mutates, guarded by a single lock.
struct Inner {
    state: SessionState,
    log: ConversationLog,
    epoch: u64,
    grant: Option<AccessGrant>,
    subscription: Option<EventSubscription>,
    reset_task: Option<JoinHandle<()>>,
}

impl Inner {
    /// Invalidates all deferred work of the current session and returns the new epoch.
    fn supersede(&mut self) -> u64 {
        self.epoch += 1;
        if let Some(task) = self.reset_task.take() {
            task.abort();
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.release();
        }
        self.grant = None;
        self.epoch
    }
}

struct Shared {
    gateway: Arc<dyn TokenGateway>,
    transport: Arc<dyn Transport>,
    config: OrchestratorConfig,
    on_error: Option<ErrorCallback>,
    on_transcript: Option<TranscriptCallback>,
    inner: Mutex<Inner>,
    /// Held for the whole of a caller command that talks to the transport
    /// after reading state, so such commands run one at a time. The event
    /// pump never takes it.
    command: Mutex<()>,
    state_tx: watch::Sender<SessionState>,
}

impl Shared {
    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.state.clone());
    }
}

/// A status/report pair describing why a session is being torn down.
struct Failure {
    status: String,
    report: String,
}

/// Builds a `SessionOrchestrator` with optional callbacks.
pub struct OrchestratorBuilder {
    gateway: Arc<dyn TokenGateway>,
    transport: Arc<dyn Transport>,
    config: OrchestratorConfig,
    mode: ConversationMode,
    on_error: Option<ErrorCallback>,
    on_transcript: Option<TranscriptCallback>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// The initial conversation mode.
    pub fn mode(mut self, mode: ConversationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_transcript(
        mut self,
        callback: impl Fn(&str, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> SessionOrchestrator {
        let state = SessionState::new(self.mode);
        let (state_tx, _) = watch::channel(state.clone());
        SessionOrchestrator {
            shared: Arc::new(Shared {
                gateway: self.gateway,
                transport: self.transport,
                config: self.config,
                on_error: self.on_error,
                on_transcript: self.on_transcript,
                inner: Mutex::new(Inner {
                    state,
                    log: ConversationLog::new(),
                    epoch: 0,
                    grant: None,
                    subscription: None,
                    reset_task: None,
                }),
                command: Mutex::new(()),
                state_tx,
            }),
        }
    }
}

/// Client-side owner of one conversation session at a time.
///
/// Cloning yields another handle to the same orchestrator.
#[derive(Clone)]
pub struct SessionOrchestrator {
    shared: Arc<Shared>,
}

impl SessionOrchestrator {
    pub fn builder(
        gateway: Arc<dyn TokenGateway>,
        transport: Arc<dyn Transport>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            gateway,
            transport,
            config: OrchestratorConfig::default(),
            mode: ConversationMode::default(),
            on_error: None,
            on_transcript: None,
        }
    }

    pub fn new(
        gateway: Arc<dyn TokenGateway>,
        transport: Arc<dyn Transport>,
        config: OrchestratorConfig,
    ) -> Self {
        Self::builder(gateway, transport).config(config).build()
    }

    /// The latest published session state.
    pub fn state(&self) -> SessionState {
        self.shared.state_tx.borrow().clone()
    }

    /// A receiver that is notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    pub async fn conversation(&self) -> Vec<Message> {
        self.shared.inner.lock().await.log.messages().to_vec()
    }

    /// Selects the conversation mode for the next session.
    pub async fn set_mode(&self, mode: ConversationMode) -> SessionResult<()> {
        let mut inner = self.shared.inner.lock().await;
        if !inner.state.is_idle() {
            return Err(SessionError::ModeLocked);
        }
        inner.state.mode = mode;
        self.shared.publish(&inner);
        Ok(())
    }

    pub async fn set_pending_input(&self, text: impl Into<String>) {
        let mut inner = self.shared.inner.lock().await;
        inner.state.pending_text_input = text.into();
        self.shared.publish(&inner);
    }

    /// Starts a new session.
    ///
    /// Calls made while a session is already connecting or active are ignored.
    /// Blank credentials are rejected before any request is made. Gateway and
    /// transport-start failures tear the attempt down and are returned after
    /// being reported; failures of an attempt that was superseded in the
    /// meantime are dropped silently.
    #[instrument(skip_all, fields(agent_id = %credentials.agent_id))]
    pub async fn connect(&self, credentials: Credentials) -> SessionResult<()> {
        let (epoch, mode, session_id) = {
            let mut inner = self.shared.inner.lock().await;
            if !inner.state.is_idle() {
                debug!(phase = ?inner.state.phase, "Connect ignored, a session is already in progress");
                return Ok(());
            }
            if let Err(e) = credentials.validate() {
                warn!(error = %e, "Rejecting connect with incomplete credentials");
                inner.state.status_message = e.to_string();
                self.shared.publish(&inner);
                drop(inner);
                self.report_error(&e.to_string());
                return Err(e.into());
            }

            let epoch = inner.supersede();
            let session_id = Uuid::new_v4();
            inner.log.clear();
            inner.state.phase = Phase::Connecting;
            inner.state.is_muted = false;
            inner.state.status_message = session::STATUS_REQUESTING_TOKEN.to_string();
            self.shared.publish(&inner);
            (epoch, inner.state.mode, session_id)
        };
        info!(%session_id, %mode, "Requesting access grant");

        let grant = match self.shared.gateway.request_grant(&credentials, mode).await {
            Ok(grant) => grant,
            Err(e) => return self.fail_connect(epoch, SessionError::Gateway(e)).await,
        };

        {
            let mut inner = self.shared.inner.lock().await;
            if inner.epoch != epoch || inner.state.phase != Phase::Connecting {
                info!(%session_id, "Discarding access grant of a superseded attempt");
                return Ok(());
            }
            inner.state.status_message = session::connecting_status(mode);
            inner.subscription = Some(self.subscribe(epoch, session_id));
            inner.grant = Some(grant.clone());
            self.shared.publish(&inner);
        }
        info!(%session_id, host = %grant.host, "Starting transport session");

        if let Err(e) = self
            .shared
            .transport
            .start_session(&grant.token, mode, &grant.host)
            .await
        {
            return self.fail_connect(epoch, SessionError::TransportStart(e)).await;
        }

        if mode == ConversationMode::VoiceCall {
            if !self.is_current(epoch).await {
                self.discard_started_session(session_id).await;
                return Ok(());
            }
            if let Err(e) = self.shared.transport.start_audio_playback().await {
                return self.fail_connect(epoch, SessionError::TransportStart(e)).await;
            }
        }

        if !self.is_current(epoch).await {
            self.discard_started_session(session_id).await;
        }
        Ok(())
    }

    /// Stops the transport and resets all session state. Never fails.
    pub async fn disconnect(&self) {
        info!("Disconnect requested");
        self.tear_down(None, None).await;
    }

    /// Flips the microphone mute in voice sessions and returns the resulting
    /// mute flag. Outside an active voice session this is a no-op.
    pub async fn toggle_mute(&self) -> SessionResult<bool> {
        let _command = self.shared.command.lock().await;
        let (epoch, target) = {
            let inner = self.shared.inner.lock().await;
            if !inner.state.can_toggle_mute() {
                debug!(phase = ?inner.state.phase, mode = %inner.state.mode, "Mute toggle ignored");
                return Ok(inner.state.is_muted);
            }
            (inner.epoch, !inner.state.is_muted)
        };

        let result = if target {
            self.shared.transport.mute().await
        } else {
            self.shared.transport.unmute().await
        };
        if let Err(e) = result {
            warn!(error = %e, muted = target, "Transport rejected mute toggle");
            let action = if target { "mute" } else { "unmute" };
            self.report_command_failure(
                epoch,
                format!("Failed to {}: {}", action, e),
                &e.message,
            )
            .await;
            return Err(SessionError::Transport(e));
        }

        let mut inner = self.shared.inner.lock().await;
        if inner.epoch == epoch && inner.state.can_toggle_mute() {
            inner.state.is_muted = target;
            self.shared.publish(&inner);
        }
        Ok(inner.state.is_muted)
    }

    /// Sends a user message to the agent.
    ///
    /// Returns `Ok(false)` without side effects when the text is blank, the
    /// agent has not joined yet, or the session is a voice call. A message
    /// that passed those checks stays in the log even if the transport then
    /// fails to deliver it; the failure is reported and the session stays up.
    pub async fn send_text_message(&self, text: &str) -> SessionResult<bool> {
        if text.trim().is_empty() {
            return Ok(false);
        }
        let _command = self.shared.command.lock().await;
        let epoch = {
            let mut inner = self.shared.inner.lock().await;
            if !inner.state.can_send_text() {
                debug!(phase = ?inner.state.phase, mode = %inner.state.mode, "Text message ignored");
                return Ok(false);
            }
            inner.log.append(Sender::User, text);
            inner.state.pending_text_input.clear();
            self.shared.publish(&inner);
            inner.epoch
        };

        if let Err(e) = self.shared.transport.send_text_message(text).await {
            warn!(error = %e, "Transport failed to send text message");
            self.report_command_failure(
                epoch,
                format!("Failed to send message: {}", e),
                &e.message,
            )
            .await;
            return Err(SessionError::Transport(e));
        }
        Ok(true)
    }

    /// Sends the current draft text, if any.
    pub async fn send_pending_input(&self) -> SessionResult<bool> {
        let draft = self.state().pending_text_input;
        self.send_text_message(&draft).await
    }

    async fn is_current(&self, epoch: u64) -> bool {
        self.shared.inner.lock().await.epoch == epoch
    }

    /// Stops a transport session whose attempt was superseded while it was
    /// starting, unless a newer attempt already owns the transport.
    async fn discard_started_session(&self, session_id: Uuid) {
        let idle = self.shared.inner.lock().await.state.is_idle();
        if idle {
            info!(%session_id, "Stopping transport session of a superseded attempt");
            self.stop_transport().await;
        }
    }

    async fn fail_connect(&self, epoch: u64, error: SessionError) -> SessionResult<()> {
        let failure = Failure {
            status: format!("Connection failed: {}", error),
            report: error.to_string(),
        };
        if self.tear_down(Some(epoch), Some(failure)).await {
            Err(error)
        } else {
            debug!(error = %error, "Dropping failure of a superseded attempt");
            Ok(())
        }
    }

    /// Ends the session. With `expected`, does nothing unless that epoch is
    /// still current. With a `failure`, the error status stays visible after
    /// the reset and a grace timer restores the initial status later.
    ///
    /// Returns whether the tear-down ran.
    async fn tear_down(&self, expected: Option<u64>, failure: Option<Failure>) -> bool {
        let epoch = {
            let mut inner = self.shared.inner.lock().await;
            if expected.is_some_and(|e| e != inner.epoch) {
                return false;
            }
            let epoch = inner.supersede();
            inner.state.phase = Phase::Disconnecting;
            inner.state.is_muted = false;
            inner.state.status_message = match &failure {
                Some(f) => f.status.clone(),
                None => session::STATUS_DISCONNECTING.to_string(),
            };
            self.shared.publish(&inner);
            epoch
        };

        if let Some(f) = &failure {
            self.report_error(&f.report);
        }
        self.stop_transport().await;

        let mut inner = self.shared.inner.lock().await;
        if inner.epoch == epoch {
            let status = inner.state.status_message.clone();
            inner.state.reset();
            if failure.is_some() {
                inner.state.status_message = status;
                inner.reset_task = Some(self.schedule_reset(epoch));
            }
            self.shared.publish(&inner);
        }
        true
    }

    async fn stop_transport(&self) {
        if let Err(e) = self.shared.transport.stop_session().await {
            debug!(error = %e, "Error stopping session (this is expected)");
        }
    }

    /// Shows a failed caller command in the status line of a session that is
    /// still current, then reports it. The session itself is left running.
    async fn report_command_failure(&self, epoch: u64, status: String, report: &str) {
        {
            let mut inner = self.shared.inner.lock().await;
            if inner.epoch == epoch {
                inner.state.status_message = status;
                self.shared.publish(&inner);
            }
        }
        self.report_error(report);
    }

    fn report_error(&self, message: &str) {
        warn!(%message, "Session error");
        if let Some(callback) = &self.shared.on_error {
            callback(message);
        }
    }

    fn schedule_reset(&self, epoch: u64) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        let delay = self.shared.config.error_reset_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut inner = shared.inner.lock().await;
            if inner.epoch == epoch && inner.state.is_idle() {
                debug!("Grace period elapsed, resetting session state");
                inner.state.reset();
                inner.reset_task = None;
                shared.publish(&inner);
            }
        })
    }

    fn subscribe(&self, epoch: u64, session_id: Uuid) -> EventSubscription {
        let shared = Arc::downgrade(&self.shared);
        EventSubscription::acquire(self.shared.transport.clone(), move |events| {
            tokio::spawn(
                pump_events(shared, epoch, events).instrument(info_span!("session", %session_id)),
            )
        })
    }

    /// Applies one transport event. Returns whether the pump should keep going.
    async fn ingest(&self, epoch: u64, raw: RawTransportEvent) -> bool {
        let Some(event) = TransportEvent::parse(&raw) else {
            return true;
        };
        let follow_up = {
            let mut inner = self.shared.inner.lock().await;
            if inner.epoch != epoch {
                return false;
            }
            let follow_up = transition::apply(&mut inner, event);
            self.shared.publish(&inner);
            follow_up
        };

        match follow_up {
            FollowUp::Nothing => {}
            FollowUp::Transcript { text, raw } => {
                if let Some(callback) = &self.shared.on_transcript {
                    callback(&text, &raw);
                }
            }
            FollowUp::End => {
                info!("Transport reported the session ended");
                self.tear_down(Some(epoch), None).await;
            }
            FollowUp::Fail { status, report } => {
                self.tear_down(Some(epoch), Some(Failure { status, report }))
                    .await;
            }
        }
        self.is_current(epoch).await
    }
}

async fn pump_events(shared: Weak<Shared>, epoch: u64, mut events: EventStream) {
    while let Some(raw) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let orchestrator = SessionOrchestrator { shared };
        if !orchestrator.ingest(epoch, raw).await {
            break;
        }
    }
    debug!("Event pump finished");
}
