//! Atoms Session Core
//!
//! Client-side building blocks for real-time conversations with a remote
//! agent: a gateway client that trades credentials for a short-lived access
//! grant, the transport capability boundary, an append-only conversation log,
//! and the `SessionOrchestrator` state machine that ties them together.

pub mod config;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod session;
pub mod transport;

pub use config::{GatewayConfig, OrchestratorConfig};
pub use conversation::{ConversationLog, Message, Sender};
pub use credentials::{Credentials, ValidationError};
pub use error::{SessionError, SessionResult};
pub use gateway::{AccessGrant, GatewayError, HttpTokenGateway, TokenGateway};
pub use orchestrator::{OrchestratorBuilder, SessionOrchestrator};
pub use session::{ConversationMode, Phase, SessionState};
pub use transport::{RawTransportEvent, Transport, TransportError, TransportEvent};
