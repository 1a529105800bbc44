//! Model client seam: the collaborator that actually talks to a model.
//!
//! Inference, token counting and pricing all live behind [`ChatClient`].
//! This crate only hands it a request and a stop condition, and reads back
//! what it reports.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentIo;
use crate::error::Result;
use crate::stop::StopCondition;
use crate::tools::{ToolDescriptor, ToolExecutionContext, ToolGate, ToolOutcome};
use crate::types::{AgentToolCall, ChatResponse, GenerationSettings, ModelMessage};

/// Static facts about a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    /// Context window size in tokens.
    pub context_length: usize,
    #[serde(default)]
    pub supports_tools: bool,
    #[serde(default)]
    pub supports_reasoning: bool,
}

impl ModelSpec {
    pub fn new(context_length: usize) -> Self {
        Self {
            context_length,
            supports_tools: true,
            supports_reasoning: false,
        }
    }
}

/// Tool definition as the model sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// Sanitized to `[a-zA-Z0-9_-]`.
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool attached to one request, bound to its agent's invocation gate.
#[derive(Clone)]
pub struct RequestTool {
    definition: ToolDefinition,
    descriptor: ToolDescriptor,
    gate: Arc<ToolGate>,
    io: Arc<dyn AgentIo>,
    agent_id: Uuid,
}

impl RequestTool {
    pub fn new(descriptor: ToolDescriptor, gate: Arc<ToolGate>, io: Arc<dyn AgentIo>, agent_id: Uuid) -> Self {
        let definition = ToolDefinition {
            name: descriptor.wire_name(),
            description: descriptor.tool.description().to_string(),
            parameters: descriptor.tool.parameters().schema.clone(),
        };
        Self {
            definition,
            descriptor,
            gate,
            io,
            agent_id,
        }
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Registered name, before sanitizing.
    pub fn qualified_name(&self) -> &str {
        &self.descriptor.name
    }

    /// Run a model-issued call through the gate. Never fails; errors come back as text.
    pub async fn invoke(&self, call: &AgentToolCall) -> ToolOutcome {
        let ctx = ToolExecutionContext {
            agent_id: Some(self.agent_id),
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(self.descriptor.name.clone()),
            metadata: serde_json::Value::Null,
        };
        self.gate
            .invoke(&self.descriptor, call.arguments.clone(), ctx, self.io.as_ref())
            .await
    }
}

impl std::fmt::Debug for RequestTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTool")
            .field("name", &self.definition.name)
            .field("qualified_name", &self.descriptor.name)
            .finish()
    }
}

/// A fully assembled request for one turn.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<RequestTool>,
    pub settings: GenerationSettings,
}

impl ChatRequest {
    /// Look up a request tool by the wire name the model used.
    pub fn tool(&self, wire_name: &str) -> Option<&RequestTool> {
        self.tools.iter().find(|t| t.definition.name == wire_name)
    }
}

/// A live client bound to one model.
#[async_trait]
pub trait ChatClient: Send + Sync {
    fn model_id(&self) -> &str;

    fn model_spec(&self) -> ModelSpec;

    /// Run a multi-step streaming call.
    ///
    /// Implementations call `stop` after every completed step and stop
    /// generating once it returns true. Tool calls are executed through
    /// [`RequestTool::invoke`].
    async fn stream_chat(&self, request: ChatRequest, stop: &dyn StopCondition) -> Result<(String, ChatResponse)>;
}

/// Resolves a model name or pattern to a client that is currently reachable.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// `Ok(None)` means nothing is online right now; callers retry.
    async fn get_client(&self, model: &str) -> Result<Option<Arc<dyn ChatClient>>>;
}

/// A fixed set of clients keyed by model id.
///
/// `"auto"` resolves to the first registered client; other names may use
/// `*` wildcards.
#[derive(Default)]
pub struct StaticModelRegistry {
    order: Vec<String>,
    clients: HashMap<String, Arc<dyn ChatClient>>,
}

impl StaticModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.register(client);
        self
    }

    pub fn register(&mut self, client: Arc<dyn ChatClient>) {
        let id = client.model_id().to_string();
        if self.clients.insert(id.clone(), client).is_none() {
            self.order.push(id);
        }
    }

    fn resolve(&self, model: &str) -> Option<Arc<dyn ChatClient>> {
        if model == "auto" {
            return self.order.first().and_then(|id| self.clients.get(id)).cloned();
        }
        if let Some(client) = self.clients.get(model) {
            return Some(client.clone());
        }
        let re = crate::tools::registry::wildcard_regex(model).ok()?;
        self.order
            .iter()
            .find(|id| re.is_match(id))
            .and_then(|id| self.clients.get(id))
            .cloned()
    }
}

#[async_trait]
impl ModelRegistry for StaticModelRegistry {
    async fn get_client(&self, model: &str) -> Result<Option<Arc<dyn ChatClient>>> {
        Ok(self.resolve(model))
    }
}
