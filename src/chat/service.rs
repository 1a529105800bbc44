//! Chat service: registries, model access and every per-agent chat operation.

use std::sync::Arc;

use super::compaction::compact_context;
use super::hooks::ChatCompletionHook;
use super::runner::{run_chat, TurnOutcome};
use crate::agent::{ChatAgent, ConversationTurn, ResetScope};
use crate::client::ModelRegistry;
use crate::config::{ChatConfig, ChatConfigOverride, ChatServiceConfig};
use crate::context::{ContextHandler, ContextHandlerRegistry, ContextPipeline};
use crate::error::Result;
use crate::tools::{Tool, ToolRegistry};
use crate::types::{ChatResponse, GenerationSettings, ModelMessage};
use crate::util::retry::RetryPolicy;

const PREVIEW_LIMIT: usize = 100;
const PREVIEW_CUT: usize = 130;

/// Owns the tool and context-handler registries and drives chat turns.
///
/// Registration needs `&mut self`; everything an agent does afterwards goes
/// through `&self` plus the agent itself.
pub struct ChatService {
    config: ChatServiceConfig,
    tools: ToolRegistry,
    handlers: ContextHandlerRegistry,
    models: Arc<dyn ModelRegistry>,
    hooks: Vec<Arc<dyn ChatCompletionHook>>,
    retry: RetryPolicy,
}

impl ChatService {
    /// Create a service with the standard context handlers registered.
    pub fn new(config: ChatServiceConfig, models: Arc<dyn ModelRegistry>) -> Self {
        Self {
            config,
            tools: ToolRegistry::new(),
            handlers: ContextHandlerRegistry::with_defaults(),
            models,
            hooks: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn ChatCompletionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn add_hook(&mut self, hook: Arc<dyn ChatCompletionHook>) {
        self.hooks.push(hook);
    }

    pub fn config(&self) -> &ChatServiceConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn handlers(&self) -> &ContextHandlerRegistry {
        &self.handlers
    }

    pub fn models(&self) -> &dyn ModelRegistry {
        self.models.as_ref()
    }

    pub fn hooks(&self) -> &[Arc<dyn ChatCompletionHook>] {
        &self.hooks
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    // -- registration --

    pub fn register_tool(&mut self, name: impl Into<String>, tool: Arc<dyn Tool>) -> Result<()> {
        self.tools.register(name, tool)
    }

    /// Register each tool as `"{package}/{tool}"`.
    pub fn register_tools<I>(&mut self, package: &str, tools: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        self.tools.register_package(package, tools)
    }

    pub fn register_context_handler(&mut self, name: impl Into<String>, handler: Arc<dyn ContextHandler>) -> Result<()> {
        self.handlers.register(name, handler)
    }

    pub fn register_context_handlers<I, S>(&mut self, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Arc<dyn ContextHandler>)>,
        S: Into<String>,
    {
        self.handlers.register_all(handlers)
    }

    pub fn available_tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    // -- agents --

    /// Create an agent whose initial config is the service defaults with `agent_config` on top.
    ///
    /// Enabled tool patterns are expanded here and never stored as patterns.
    pub fn attach(&self, name: impl Into<String>, agent_config: &ChatConfigOverride) -> Result<ChatAgent> {
        self.config.agent_defaults.validate()?;
        agent_config.validate()?;
        let mut config = ChatConfig::default()
            .merged(&self.config.agent_defaults)
            .merged(agent_config);
        config.enabled_tools = self.tools.expand(&config.enabled_tools)?;
        Ok(ChatAgent::new(name, config))
    }

    /// A child agent with no model of its own picks up the parent's.
    pub fn transfer_state_from_parent(&self, child: &mut ChatAgent, parent: &ChatAgent) {
        child.state_mut().inherit_model_from(parent.state());
    }

    // -- turns --

    /// Run one turn and return the output text with the full response.
    pub async fn submit_turn(&self, agent: &mut ChatAgent, input: &str) -> Result<(String, ChatResponse)> {
        let outcome = self.submit_turn_with(agent, input, &ChatConfigOverride::default()).await?;
        Ok((outcome.output, outcome.response))
    }

    /// Run one turn with a per-turn override layered over the agent's current config.
    pub async fn submit_turn_with(
        &self,
        agent: &mut ChatAgent,
        input: &str,
        per_turn: &ChatConfigOverride,
    ) -> Result<TurnOutcome> {
        let config = self.resolve_turn_config(agent, per_turn)?;
        run_chat(self, agent, input, config).await
    }

    fn resolve_turn_config(&self, agent: &ChatAgent, per_turn: &ChatConfigOverride) -> Result<ChatConfig> {
        per_turn.validate()?;
        let mut config = agent.state().config().merged(per_turn);
        if per_turn.enabled_tools.is_some() {
            config.enabled_tools = self.tools.expand(&config.enabled_tools)?;
        }
        if config.model.is_none() {
            config.model = Some(self.config.default_model.clone());
        }
        Ok(config)
    }

    /// Build the message list the next turn would send for `input`.
    pub async fn build_chat_messages(&self, input: &str, config: &ChatConfig, agent: &ChatAgent) -> Result<Vec<ModelMessage>> {
        ContextPipeline::new(&self.tools, &self.handlers)
            .assemble(input, config, agent)
            .await
    }

    /// One line per context message the next request would carry, input excluded.
    pub async fn context_preview(&self, agent: &ChatAgent) -> Result<Vec<String>> {
        let messages = self
            .build_chat_messages("input", agent.state().config(), agent)
            .await?;
        let mut lines = vec![format!("Total messages: {}", messages.len())];
        let shown = messages.len().saturating_sub(1);
        for (index, message) in messages[..shown].iter().enumerate() {
            let text = message.text();
            let preview = if text.chars().count() > PREVIEW_LIMIT {
                format!("{}...", text.chars().take(PREVIEW_CUT).collect::<String>())
            } else {
                text
            };
            lines.push(format!("{}. [{}] {preview}", index + 1, message.role));
        }
        Ok(lines)
    }

    /// Summarize and replace the history. Focus text is optional.
    pub async fn compact(&self, agent: &mut ChatAgent, focus: Option<&str>) -> Result<()> {
        let io = agent.io_handle();
        io.set_busy(Some("Compacting context..."));
        let result = compact_context(self, agent, focus).await;
        io.set_busy(None);
        result
    }

    // -- config --

    pub fn chat_config<'a>(&self, agent: &'a ChatAgent) -> &'a ChatConfig {
        agent.state().config()
    }

    /// Shallow-merge `layer` into the agent's current config.
    pub fn update_chat_config<'a>(&self, agent: &'a mut ChatAgent, layer: ChatConfigOverride) -> Result<&'a ChatConfig> {
        layer.validate()?;
        let mut layer = layer;
        if let Some(patterns) = layer.enabled_tools.take() {
            layer.enabled_tools = Some(self.tools.expand(&patterns)?);
        }
        Ok(agent.state_mut().update_config(&layer))
    }

    /// The agent's model, falling back to the service default.
    pub fn model(&self, agent: &ChatAgent) -> String {
        agent
            .state()
            .config()
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone())
    }

    pub fn set_model(&self, agent: &mut ChatAgent, model: impl Into<String>) {
        agent.state_mut().update_config(&ChatConfigOverride::model(model));
    }

    pub fn reset_config(&self, agent: &mut ChatAgent) {
        agent.state_mut().reset(&[ResetScope::Settings]);
    }

    /// Sampling preferences of the current config. Token limits are not preferences.
    pub fn preferences(&self, agent: &ChatAgent) -> GenerationSettings {
        GenerationSettings {
            max_tokens: None,
            ..agent.state().config().settings.clone()
        }
    }

    // -- history --

    pub fn messages<'a>(&self, agent: &'a ChatAgent) -> &'a [ConversationTurn] {
        agent.state().messages()
    }

    pub fn last_message<'a>(&self, agent: &'a ChatAgent) -> Option<&'a ConversationTurn> {
        agent.state().last_turn()
    }

    pub fn clear_messages(&self, agent: &mut ChatAgent) {
        agent.state_mut().clear_messages();
    }

    pub fn pop_last_turn(&self, agent: &mut ChatAgent) -> Option<ConversationTurn> {
        agent.state_mut().pop_last_turn()
    }

    // -- tools --

    pub fn enabled_tools<'a>(&self, agent: &'a ChatAgent) -> &'a [String] {
        agent.state().enabled_tools()
    }

    /// Replace the enabled set. Patterns must each match at least one registered tool.
    pub fn set_enabled_tools<S: AsRef<str>>(&self, agent: &mut ChatAgent, patterns: &[S]) -> Result<Vec<String>> {
        let names = self.tools.expand(patterns)?;
        Ok(agent.state_mut().set_enabled_tools(names).to_vec())
    }

    pub fn enable_tools<S: AsRef<str>>(&self, agent: &mut ChatAgent, patterns: &[S]) -> Result<Vec<String>> {
        let names = self.tools.expand(patterns)?;
        Ok(agent.state_mut().enable_tools(&names).to_vec())
    }

    pub fn disable_tools<S: AsRef<str>>(&self, agent: &mut ChatAgent, patterns: &[S]) -> Result<Vec<String>> {
        let names = self.tools.expand(patterns)?;
        Ok(agent.state_mut().disable_tools(&names).to_vec())
    }
}
