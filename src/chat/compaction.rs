//! Replaces a long history with a single summarizing turn.

use super::service::ChatService;
use crate::agent::{ChatAgent, ConversationTurn, StoredRequest};
use crate::client::ChatRequest;
use crate::context::ContextPipeline;
use crate::error::{ParleyError, Result};
use crate::stop::NeverStop;
use crate::types::ModelMessage;

pub const DEFAULT_COMPACTION_FOCUS: &str = "the current task, decisions made so far, and any unfinished work";

/// The instruction sent in place of user input when summarizing.
pub fn summary_instruction(focus: Option<&str>) -> String {
    let focus = focus
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_COMPACTION_FOCUS);
    format!(
        "Please provide a detailed summary of the prior conversation, including all important details, context, and what was being worked on, focusing on {focus}."
    )
}

/// Summarize the history and replace it with one turn.
///
/// The stored request keeps only system messages; the replayed history and the
/// summary instruction are dropped once the model has answered. Empty history
/// is left alone.
pub(crate) async fn compact_context(service: &ChatService, agent: &mut ChatAgent, focus: Option<&str>) -> Result<()> {
    if agent.state().messages().is_empty() {
        return Ok(());
    }

    let io = agent.io_handle();
    let mut config = agent.state().config().clone();
    config.enabled_tools.clear();

    let instruction = summary_instruction(focus);
    let messages = ContextPipeline::new(service.tools(), service.handlers())
        .assemble(&instruction, &config, agent)
        .await?;

    let model = service.model(agent);
    let client = service
        .retry_policy()
        .acquire(&model, || service.models().get_client(&model))
        .await?;

    io.set_busy(Some("Waiting for response from AI..."));
    let request = ChatRequest {
        messages: messages.clone(),
        tools: Vec::new(),
        settings: config.settings.clone(),
    };
    let streamed = client.stream_chat(request, &NeverStop).await;
    io.set_busy(None);
    let (_summary, response) = streamed.map_err(|e| ParleyError::TurnFailed(Box::new(e)))?;

    let replaced = agent.state().messages().len();
    let kept: Vec<ModelMessage> = messages.into_iter().filter(ModelMessage::is_system).collect();
    let state = agent.state_mut();
    state.clear_messages();
    state.push_turn(ConversationTurn::new(
        StoredRequest {
            messages: kept,
            settings: config.settings,
        },
        response,
    ));

    tracing::info!(agent = %agent.name(), replaced, "compacted chat history");
    io.info_line("Context compacted successfully");
    Ok(())
}
