//! Agents: identity, interaction channel and per-agent conversation state.

pub mod agent;
pub mod interaction;
pub mod state;

pub use agent::ChatAgent;
pub use interaction::{confirm, AgentIo, Artifact, ConfirmationRequest, NullAgentIo};
pub use state::{ConversationState, ConversationTurn, ResetScope, StoredRequest};
