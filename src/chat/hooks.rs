//! Hooks run after every committed chat turn.

use async_trait::async_trait;

use crate::agent::ChatAgent;
use crate::error::Result;
use crate::types::ChatResponse;
use crate::util::analytics::output_chat_analytics;

/// Runs once a turn has been committed to history.
///
/// Errors are logged and never fail the turn.
#[async_trait]
pub trait ChatCompletionHook: Send + Sync {
    async fn after_chat_completion(&self, agent: &ChatAgent, output: &str, response: &ChatResponse) -> Result<()>;
}

/// Writes usage, cost and timing lines to the agent after each turn.
#[derive(Debug, Clone, Default)]
pub struct ChatAnalyticsHook {
    label: Option<String>,
}

impl ChatAnalyticsHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }
}

#[async_trait]
impl ChatCompletionHook for ChatAnalyticsHook {
    async fn after_chat_completion(&self, agent: &ChatAgent, _output: &str, response: &ChatResponse) -> Result<()> {
        output_chat_analytics(response, agent.io(), self.label.as_deref());
        Ok(())
    }
}
