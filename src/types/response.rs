//! Responses and per-step results reported by a model client.

use serde::{Deserialize, Serialize};

use super::generation::FinishReason;
use super::message::{AgentToolCall, ModelMessage};
use super::usage::{Cost, Timing, Usage};

/// One completed model step (a single generation, possibly ending in tool calls).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    #[serde(default)]
    pub text: String,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<AgentToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// The full response to a multi-step streaming call.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Messages produced by the model, including tool calls and tool results.
    #[serde(default)]
    pub messages: Vec<ModelMessage>,
    /// Usage of the final step, which reflects the context size at the end of the turn.
    pub usage: Usage,
    #[serde(default)]
    pub cost: Cost,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl ChatResponse {
    /// Concatenated assistant text of the response.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == super::message::Role::Assistant)
            .map(ModelMessage::text)
            .collect::<Vec<_>>()
            .join("")
    }
}
