//! Standard context handlers.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;

use super::{ContextHandler, ContextScope};
use crate::config::ContextSource;
use crate::error::{ParleyError, Result};
use crate::tools::{render_tool_value, validate_arguments, ToolArguments, ToolExecutionContext};
use crate::types::{ModelMessage, Role};

pub const SYSTEM_MESSAGE: &str = "system-message";
pub const TOOL_CONTEXT: &str = "tool-context";
pub const PRIOR_MESSAGES: &str = "prior-messages";
pub const CURRENT_MESSAGE: &str = "current-message";
pub const TOOL_CALL: &str = "tool-call";

pub const PRIOR_MESSAGES_PLACEHOLDER: &str = "... this content was removed to shorten the chat context ...";

const DEFAULT_MAX_MESSAGES: usize = 1000;
const MIN_MAX_MESSAGES: u64 = 4;

/// Handlers every chat service starts with.
pub fn default_handlers() -> Vec<(&'static str, Arc<dyn ContextHandler>)> {
    vec![
        (SYSTEM_MESSAGE, Arc::new(SystemMessageHandler) as Arc<dyn ContextHandler>),
        (TOOL_CONTEXT, Arc::new(ToolContextHandler)),
        (PRIOR_MESSAGES, Arc::new(PriorMessagesHandler)),
        (CURRENT_MESSAGE, Arc::new(CurrentMessageHandler)),
        (TOOL_CALL, Arc::new(ToolCallHandler)),
    ]
}

/// One system message from the configured prompt, rendered at call time.
pub struct SystemMessageHandler;

impl ContextHandler for SystemMessageHandler {
    fn produce<'a>(&'a self, scope: ContextScope<'a>) -> BoxStream<'a, Result<ModelMessage>> {
        stream::once(async move {
            Ok(ModelMessage::system(scope.config.system_prompt.render(scope.agent)))
        })
        .boxed()
    }
}

/// The user input, verbatim.
pub struct CurrentMessageHandler;

impl ContextHandler for CurrentMessageHandler {
    fn produce<'a>(&'a self, scope: ContextScope<'a>) -> BoxStream<'a, Result<ModelMessage>> {
        stream::once(async move { Ok(ModelMessage::user(scope.input)) }).boxed()
    }
}

/// Runs every handler an enabled tool requires, once each, in first-seen order.
pub struct ToolContextHandler;

impl ContextHandler for ToolContextHandler {
    fn produce<'a>(&'a self, scope: ContextScope<'a>) -> BoxStream<'a, Result<ModelMessage>> {
        Box::pin(async_stream::try_stream! {
            let mut required: Vec<String> = Vec::new();
            for name in &scope.config.enabled_tools {
                let tool = scope.tools.require(name)?;
                for handler in tool.required_context_handlers() {
                    if !required.contains(handler) {
                        required.push(handler.clone());
                    }
                }
            }

            for name in required {
                let handler = scope.handlers.require(&name)?;
                let source = ContextSource::new(name.as_str());
                let mut produced = handler.produce(scope.with_source(&source));
                while let Some(message) = produced.next().await {
                    yield message?;
                }
            }
        })
    }
}

/// Replays the previous turn's request and response.
///
/// Param `maxMessages` (at least 4, default 1000) bounds the replay; longer
/// histories lose their middle to a single placeholder message.
pub struct PriorMessagesHandler;

impl ContextHandler for PriorMessagesHandler {
    fn produce<'a>(&'a self, scope: ContextScope<'a>) -> BoxStream<'a, Result<ModelMessage>> {
        let replay = max_messages(scope.source).map(|max| {
            let messages: Vec<ModelMessage> = scope
                .agent
                .state()
                .last_turn()
                .map(|turn| {
                    turn.request
                        .messages
                        .iter()
                        .chain(turn.response.messages.iter())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            collapse_middle(messages, max)
        });

        match replay {
            Ok(messages) => stream::iter(messages.into_iter().map(Ok)).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }
}

fn max_messages(source: &ContextSource) -> Result<usize> {
    match source.param("maxMessages") {
        None => Ok(DEFAULT_MAX_MESSAGES),
        Some(value) => value
            .as_u64()
            .filter(|n| *n >= MIN_MAX_MESSAGES)
            .map(|n| n as usize)
            .ok_or_else(|| ParleyError::InvalidContextParams {
                handler: PRIOR_MESSAGES.to_string(),
                message: format!("maxMessages must be an integer of at least {MIN_MAX_MESSAGES}, got {value}"),
            }),
    }
}

/// Keep a prefix and suffix of `messages`, replacing the middle with a placeholder
/// so the result holds at most `max + 1` messages. `max` is raised to 4 if lower.
pub(crate) fn collapse_middle(mut messages: Vec<ModelMessage>, max: usize) -> Vec<ModelMessage> {
    let max = max.max(MIN_MAX_MESSAGES as usize);
    let len = messages.len();
    if len <= max {
        return messages;
    }
    let remove = len - max;
    let start = (max / 2).max(2);
    let end = (start + remove).min(len - 2);

    let suffix = messages.split_off(end);
    messages.truncate(start);
    messages.push(ModelMessage::user(PRIOR_MESSAGES_PLACEHOLDER));
    messages.extend(suffix);
    messages
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum InjectedRole {
    System,
    User,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallParams {
    role: InjectedRole,
    header: String,
    tool_name: String,
    tool_input: serde_json::Map<String, serde_json::Value>,
}

/// Runs one tool up front and injects its result under a header.
///
/// Params: `role` (`system` or `user`), `header`, `toolName`, `toolInput`.
pub struct ToolCallHandler;

impl ContextHandler for ToolCallHandler {
    fn produce<'a>(&'a self, scope: ContextScope<'a>) -> BoxStream<'a, Result<ModelMessage>> {
        Box::pin(async_stream::try_stream! {
            let params: ToolCallParams = serde_json::from_value(serde_json::Value::Object(scope.source.params.clone()))
                .map_err(|e| ParleyError::InvalidContextParams {
                    handler: TOOL_CALL.to_string(),
                    message: e.to_string(),
                })?;

            let tool = scope.tools.require(&params.tool_name)?;
            let input = serde_json::Value::Object(params.tool_input);
            validate_arguments(&params.tool_name, &input, &tool.tool.parameters().schema)?;

            let ctx = ToolExecutionContext {
                agent_id: Some(scope.agent.id()),
                tool_call_id: None,
                tool_name: Some(params.tool_name.clone()),
                metadata: serde_json::Value::Null,
            };
            let result = tool.tool.execute(&ToolArguments::new(input), &ctx).await?;

            let role = match params.role {
                InjectedRole::System => Role::System,
                InjectedRole::User => Role::User,
            };
            let text = format!("{}\n\n{}", params.header, render_tool_value(&result));
            yield ModelMessage::text_with_role(role, text.trim());
        })
    }
}
