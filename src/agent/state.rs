//! Per-agent conversation state: configuration, turn history and the tool gate.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::config::{ChatConfig, ChatConfigOverride};
use crate::error::Result;
use crate::tools::ToolGate;
use crate::types::{ChatResponse, GenerationSettings, ModelMessage};

/// The persisted part of a request. Tool definitions never persist.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredRequest {
    pub messages: Vec<ModelMessage>,
    #[serde(default)]
    pub settings: GenerationSettings,
}

/// One committed request/response exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub request: StoredRequest,
    pub response: ChatResponse,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(request: StoredRequest, response: ChatResponse) -> Self {
        // stored as epoch millis
        let now = Utc::now().trunc_subsecs(3);
        Self {
            request,
            response,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What [`ConversationState::reset`] restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResetScope {
    /// Restore the current config from the initial config.
    Settings,
    /// Drop every stored turn.
    Chat,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot<'a> {
    current_config: &'a ChatConfig,
    messages: &'a [ConversationTurn],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestoredSnapshot {
    #[serde(default)]
    current_config: Option<ChatConfigOverride>,
    #[serde(default)]
    messages: Option<Vec<ConversationTurn>>,
}

/// Conversation state owned by exactly one agent.
///
/// All mutation is synchronous; the turn loop is the single writer.
#[derive(Debug)]
pub struct ConversationState {
    initial_config: ChatConfig,
    current_config: ChatConfig,
    messages: Vec<ConversationTurn>,
    gate: Arc<ToolGate>,
}

impl ConversationState {
    pub fn new(initial_config: ChatConfig) -> Self {
        let gate = Arc::new(ToolGate::new(initial_config.parallel_tools));
        Self {
            current_config: initial_config.clone(),
            initial_config,
            messages: Vec::new(),
            gate,
        }
    }

    pub fn initial_config(&self) -> &ChatConfig {
        &self.initial_config
    }

    pub fn config(&self) -> &ChatConfig {
        &self.current_config
    }

    /// Shallow-merge `layer` into the current config.
    pub fn update_config(&mut self, layer: &ChatConfigOverride) -> &ChatConfig {
        self.current_config = self.current_config.merged(layer);
        self.sync_gate();
        &self.current_config
    }

    pub fn messages(&self) -> &[ConversationTurn] {
        &self.messages
    }

    pub fn last_turn(&self) -> Option<&ConversationTurn> {
        self.messages.last()
    }

    pub fn push_turn(&mut self, turn: ConversationTurn) {
        self.messages.push(turn);
    }

    /// Remove the newest turn. Empty history is left alone.
    pub fn pop_last_turn(&mut self) -> Option<ConversationTurn> {
        self.messages.pop()
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    pub fn enabled_tools(&self) -> &[String] {
        &self.current_config.enabled_tools
    }

    /// Replace the enabled set. Names must already be concrete.
    pub fn set_enabled_tools(&mut self, names: Vec<String>) -> &[String] {
        let mut deduped = Vec::with_capacity(names.len());
        for name in names {
            if !deduped.contains(&name) {
                deduped.push(name);
            }
        }
        self.current_config.enabled_tools = deduped;
        &self.current_config.enabled_tools
    }

    pub fn enable_tools(&mut self, names: &[String]) -> &[String] {
        for name in names {
            if !self.current_config.enabled_tools.contains(name) {
                self.current_config.enabled_tools.push(name.clone());
            }
        }
        &self.current_config.enabled_tools
    }

    pub fn disable_tools(&mut self, names: &[String]) -> &[String] {
        self.current_config.enabled_tools.retain(|t| !names.contains(t));
        &self.current_config.enabled_tools
    }

    pub fn reset(&mut self, scopes: &[ResetScope]) {
        if scopes.contains(&ResetScope::Settings) {
            self.current_config = self.initial_config.clone();
            self.sync_gate();
        }
        if scopes.contains(&ResetScope::Chat) {
            self.messages.clear();
        }
    }

    pub fn tool_gate(&self) -> Arc<ToolGate> {
        self.gate.clone()
    }

    /// `{currentConfig, messages}` for an external snapshot store.
    pub fn serialize(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(Snapshot {
            current_config: &self.current_config,
            messages: &self.messages,
        })?)
    }

    /// Restore from a snapshot. Missing or unreadable parts fall back to
    /// the initial config and an empty history.
    pub fn deserialize(&mut self, blob: Option<&serde_json::Value>) {
        let restored = blob.and_then(|value| {
            serde_json::from_value::<RestoredSnapshot>(value.clone())
                .map_err(|e| tracing::warn!(error = %e, "discarding unreadable chat state snapshot"))
                .ok()
        });
        let (config, messages) = match restored {
            Some(snapshot) => (snapshot.current_config, snapshot.messages),
            None => (None, None),
        };

        let config = config.filter(|layer| match layer.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "discarding invalid restored chat config");
                false
            }
        });
        self.current_config = match config {
            Some(layer) => self.initial_config.merged(&layer),
            None => self.initial_config.clone(),
        };
        self.messages = messages.unwrap_or_default();
        self.sync_gate();
    }

    /// A child agent with no model of its own inherits the parent's.
    pub fn inherit_model_from(&mut self, parent: &ConversationState) {
        if self.current_config.model.is_none() {
            self.current_config.model = parent.current_config.model.clone();
        }
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let tools = if self.current_config.enabled_tools.is_empty() {
            "None".to_string()
        } else {
            self.current_config.enabled_tools.join(", ")
        };
        let mut lines = vec![
            format!("Messages: {}", self.messages.len()),
            format!("Enabled Tools: {tools}"),
        ];
        if let Some(temperature) = self.current_config.settings.temperature {
            lines.push(format!("Temperature: {temperature}"));
        }
        if let Some(max_tokens) = self.current_config.settings.max_tokens {
            lines.push(format!("Max Tokens: {max_tokens}"));
        }
        lines
    }

    fn sync_gate(&self) {
        self.gate.set_parallel(self.current_config.parallel_tools);
    }
}
