//! Convenience re-exports for common use.

pub use crate::agent::{AgentIo, ChatAgent, ConfirmationRequest, ConversationTurn, ResetScope};
pub use crate::chat::{ChatCompletionHook, ChatService, TurnOutcome};
pub use crate::client::{ChatClient, ChatRequest, ModelRegistry, ModelSpec, StaticModelRegistry};
pub use crate::config::{ChatConfig, ChatConfigOverride, ChatServiceConfig, ContextSource, SystemPrompt};
pub use crate::context::{ContextHandler, ContextScope};
pub use crate::error::{ParleyError, Result};
pub use crate::stop::StopCondition;
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments};
pub use crate::types::{ChatResponse, GenerationSettings, ModelMessage, Role, StepResult, StopReason, Usage};
