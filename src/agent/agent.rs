//! The chat agent: identity, interaction channel and conversation state.

use std::sync::Arc;

use uuid::Uuid;

use super::interaction::{AgentIo, NullAgentIo};
use super::state::ConversationState;
use crate::config::ChatConfig;

/// An agent taking part in a conversation.
///
/// Turns against one agent must not overlap; every mutating operation takes
/// `&mut ChatAgent`, so the borrow checker serializes them.
pub struct ChatAgent {
    id: Uuid,
    name: String,
    headless: bool,
    io: Arc<dyn AgentIo>,
    state: ConversationState,
}

impl ChatAgent {
    /// Create an interactive agent with no output channel.
    pub fn new(name: impl Into<String>, config: ChatConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            headless: false,
            io: Arc::new(NullAgentIo),
            state: ConversationState::new(config),
        }
    }

    pub fn with_io(mut self, io: Arc<dyn AgentIo>) -> Self {
        self.io = io;
        self
    }

    /// Headless agents never prompt; confirmations resolve to their defaults.
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Spawn a sub-agent sharing this agent's channel and mode.
    pub fn child(&self, name: impl Into<String>, config: ChatConfig) -> ChatAgent {
        let mut child = ChatAgent::new(name, config)
            .with_io(self.io.clone())
            .with_headless(self.headless);
        child.state.inherit_model_from(&self.state);
        child
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_headless(&self) -> bool {
        self.headless
    }

    pub fn io(&self) -> &dyn AgentIo {
        self.io.as_ref()
    }

    pub fn io_handle(&self) -> Arc<dyn AgentIo> {
        self.io.clone()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ConversationState {
        &mut self.state
    }
}

impl std::fmt::Debug for ChatAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatAgent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("headless", &self.headless)
            .field("messages", &self.state.messages().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfigOverride;

    #[test]
    fn child_shares_mode_and_inherits_model() {
        let mut parent = ChatAgent::new("lead", ChatConfig::default()).with_headless(true);
        parent.state_mut().update_config(&ChatConfigOverride::model("gpt-4o"));

        let child = parent.child("helper", ChatConfig::default());
        assert!(child.is_headless());
        assert_ne!(child.id(), parent.id());
        assert_eq!(child.state().config().model.as_deref(), Some("gpt-4o"));
    }
}
