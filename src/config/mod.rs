//! Chat configuration (layered: service defaults < agent override < per-turn override).
//!
//! [`ChatConfig`] is always fully resolved. Every layer above it is a
//! [`ChatConfigOverride`] and is folded in with [`ChatConfig::merged`], which
//! replaces top-level fields and merges generation settings field by field.

pub mod service;

pub use service::ChatServiceConfig;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::agent::ChatAgent;
use crate::error::ParleyError;
use crate::types::GenerationSettings;

pub const DEFAULT_MAX_STEPS: usize = 30;
pub const DEFAULT_COMPACTION_THRESHOLD: f64 = 0.9;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Resolved per-agent chat configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatConfig {
    /// Model name or pattern. `None` defers to the service default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub system_prompt: SystemPrompt,
    pub max_steps: usize,
    pub auto_compact: bool,
    /// Concrete tool names, never patterns.
    pub enabled_tools: Vec<String>,
    pub context: ContextConfig,
    pub settings: GenerationSettings,
    /// Fraction of the model context window that counts as "long".
    pub compaction_threshold: f64,
    pub parallel_tools: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: None,
            system_prompt: SystemPrompt::default(),
            max_steps: DEFAULT_MAX_STEPS,
            auto_compact: true,
            enabled_tools: Vec::new(),
            context: ContextConfig::default(),
            settings: GenerationSettings::default(),
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            parallel_tools: false,
        }
    }
}

impl ChatConfig {
    /// Apply `layer` on top of this config and return the result.
    pub fn merged(&self, layer: &ChatConfigOverride) -> ChatConfig {
        let mut next = self.clone();
        if let Some(model) = &layer.model {
            next.model = Some(model.clone());
        }
        if let Some(prompt) = &layer.system_prompt {
            next.system_prompt = prompt.clone();
        }
        if let Some(max_steps) = layer.max_steps {
            next.max_steps = max_steps;
        }
        if let Some(auto_compact) = layer.auto_compact {
            next.auto_compact = auto_compact;
        }
        if let Some(tools) = &layer.enabled_tools {
            next.enabled_tools = tools.clone();
        }
        if let Some(context) = &layer.context {
            next.context = context.clone();
        }
        if let Some(settings) = &layer.settings {
            next.settings = merge_settings(&next.settings, settings);
        }
        if let Some(threshold) = layer.compaction_threshold {
            next.compaction_threshold = threshold;
        }
        if let Some(parallel) = layer.parallel_tools {
            next.parallel_tools = parallel;
        }
        next
    }
}

fn merge_settings(base: &GenerationSettings, layer: &GenerationSettings) -> GenerationSettings {
    GenerationSettings {
        max_tokens: layer.max_tokens.or(base.max_tokens),
        temperature: layer.temperature.or(base.temperature),
        top_p: layer.top_p.or(base.top_p),
        top_k: layer.top_k.or(base.top_k),
        stop_sequences: layer.stop_sequences.clone().or_else(|| base.stop_sequences.clone()),
        presence_penalty: layer.presence_penalty.or(base.presence_penalty),
        frequency_penalty: layer.frequency_penalty.or(base.frequency_penalty),
    }
}

/// A partial [`ChatConfig`]; `None` leaves the underlying value alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatConfigOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<SystemPrompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_compact: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<GenerationSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compaction_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tools: Option<bool>,
}

impl ChatConfigOverride {
    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Reject values no layer may set. The compaction threshold must lie in `(0, 1]`.
    pub fn validate(&self) -> crate::error::Result<()> {
        if let Some(threshold) = self.compaction_threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(ParleyError::Configuration(format!(
                    "compactionThreshold must be greater than 0 and at most 1, got {threshold}"
                )));
            }
        }
        Ok(())
    }
}

/// System prompt: fixed text, or a template rendered against the agent at request time.
#[derive(Clone)]
pub enum SystemPrompt {
    Literal(String),
    Template(Arc<dyn Fn(&ChatAgent) -> String + Send + Sync>),
}

impl SystemPrompt {
    pub fn template<F>(render: F) -> Self
    where
        F: Fn(&ChatAgent) -> String + Send + Sync + 'static,
    {
        Self::Template(Arc::new(render))
    }

    pub fn render(&self, agent: &ChatAgent) -> String {
        match self {
            Self::Literal(text) => text.clone(),
            Self::Template(render) => render(agent),
        }
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::Literal(DEFAULT_SYSTEM_PROMPT.to_string())
    }
}

impl From<&str> for SystemPrompt {
    fn from(text: &str) -> Self {
        Self::Literal(text.to_string())
    }
}

impl From<String> for SystemPrompt {
    fn from(text: String) -> Self {
        Self::Literal(text)
    }
}

impl fmt::Debug for SystemPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Self::Template(_) => f.write_str("Template(..)"),
        }
    }
}

impl PartialEq for SystemPrompt {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Template(a), Self::Template(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// Templates are code; they serialize as null and are never restored.
impl Serialize for SystemPrompt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Literal(text) => serializer.serialize_str(text),
            Self::Template(_) => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for SystemPrompt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        Ok(text.map(Self::Literal).unwrap_or_default())
    }
}

/// Context source lists for the first turn and for every later turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextConfig {
    pub initial: Vec<ContextSource>,
    pub follow_up: Vec<ContextSource>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            initial: vec![
                ContextSource::new("system-message"),
                ContextSource::new("tool-context"),
                ContextSource::new("prior-messages"),
                ContextSource::new("current-message"),
            ],
            follow_up: vec![
                ContextSource::new("prior-messages"),
                ContextSource::new("current-message"),
            ],
        }
    }
}

/// Declarative reference to a context handler plus free-form parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ContextSource {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: serde_json::Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }
}
