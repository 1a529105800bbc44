//! The turn loop: acquire a client, assemble, stream, commit, run hooks,
//! then decide whether the history needs compacting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::compaction::compact_context;
use super::service::ChatService;
use crate::agent::{confirm, AgentIo, ChatAgent, ConfirmationRequest, ConversationTurn, StoredRequest};
use crate::client::{ChatRequest, ModelSpec, RequestTool};
use crate::config::ChatConfig;
use crate::context::ContextPipeline;
use crate::error::{ParleyError, Result};
use crate::stop::StopCondition;
use crate::types::{ChatResponse, StepResult, StopReason};

const STEP_LIMIT_TIMEOUT: Duration = Duration::from_secs(60);
const COMPACT_PROMPT_TIMEOUT: Duration = Duration::from_secs(30);

pub const CONTINUE_INPUT: &str = "Continue";

/// Result of one logical turn, including any continuation after compaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub output: String,
    pub response: ChatResponse,
    pub stop_reason: StopReason,
    /// Steps the client reported before the last stop check.
    pub steps: usize,
}

/// Step-by-step stop decisions for one streaming call.
struct TurnStopPredicate {
    spec: ModelSpec,
    threshold: f64,
    max_steps: usize,
    headless: bool,
    io: Arc<dyn AgentIo>,
    step_count: AtomicUsize,
    stop_reason: Mutex<StopReason>,
}

impl TurnStopPredicate {
    fn new(spec: ModelSpec, config: &ChatConfig, agent: &ChatAgent) -> Self {
        Self {
            spec,
            threshold: config.compaction_threshold,
            max_steps: config.max_steps,
            headless: agent.is_headless(),
            io: agent.io_handle(),
            step_count: AtomicUsize::new(0),
            stop_reason: Mutex::new(StopReason::Finished),
        }
    }

    fn stop_with(&self, reason: StopReason) -> bool {
        *self.stop_reason.lock().unwrap_or_else(PoisonError::into_inner) = reason;
        true
    }

    fn stop_reason(&self) -> StopReason {
        *self.stop_reason.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn step_count(&self) -> usize {
        self.step_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StopCondition for TurnStopPredicate {
    async fn should_stop(&self, steps: &[StepResult]) -> bool {
        let count = steps.len();
        self.step_count.store(count, Ordering::SeqCst);

        if let Some(last) = steps.last() {
            if last.usage.exceeds_fraction(self.spec.context_length, self.threshold) {
                tracing::info!(step = count, tokens = last.usage.context_tokens(), "context window nearly full");
                return self.stop_with(StopReason::LongContext);
            }
        }

        if count > self.max_steps {
            if self.headless {
                return self.stop_with(StopReason::MaxSteps);
            }
            let request = ConfirmationRequest::new(
                format!(
                    "The agent has completed {count} steps, which is longer than your configured limit of {}. Would you like to continue?",
                    self.max_steps
                ),
                false,
                STEP_LIMIT_TIMEOUT,
            );
            if !confirm(self.io.as_ref(), request).await {
                return self.stop_with(StopReason::MaxSteps);
            }
        }

        false
    }
}

/// Run one turn for `agent` with an already resolved `config`.
///
/// A failure anywhere before the commit leaves history untouched. A
/// long-context stop that triggers compaction continues the task with
/// whatever step budget remains.
pub(crate) fn run_chat<'a>(
    service: &'a ChatService,
    agent: &'a mut ChatAgent,
    input: &'a str,
    config: ChatConfig,
) -> BoxFuture<'a, Result<TurnOutcome>> {
    Box::pin(async move {
        let io = agent.io_handle();
        let result = run_turn(service, agent, input, config).await;
        io.set_busy(None);
        result
    })
}

async fn run_turn(service: &ChatService, agent: &mut ChatAgent, input: &str, config: ChatConfig) -> Result<TurnOutcome> {
    let io = agent.io_handle();
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| service.config().default_model.clone());

    io.set_busy(Some("Waiting for an online model to respond..."));
    let client = service
        .retry_policy()
        .acquire(&model, || service.models().get_client(&model))
        .await?;
    io.info_line(&format!("Using model {}", client.model_id()));
    tracing::info!(agent = %agent.name(), model = %client.model_id(), "starting chat turn");

    let messages = ContextPipeline::new(service.tools(), service.handlers())
        .assemble(input, &config, agent)
        .await?;

    let gate = agent.state().tool_gate();
    let mut tools: Vec<RequestTool> = Vec::with_capacity(config.enabled_tools.len());
    for name in &config.enabled_tools {
        let descriptor = service.tools().require(name)?.clone();
        let tool = RequestTool::new(descriptor, gate.clone(), io.clone(), agent.id());
        if let Some(clash) = tools.iter().find(|t| t.definition().name == tool.definition().name) {
            return Err(ParleyError::Configuration(format!(
                "Tools \"{}\" and \"{}\" share the wire name \"{}\"",
                clash.qualified_name(),
                tool.qualified_name(),
                tool.definition().name
            )));
        }
        tools.push(tool);
    }

    let request = ChatRequest {
        messages: messages.clone(),
        tools,
        settings: config.settings.clone(),
    };
    let spec = client.model_spec();
    let predicate = TurnStopPredicate::new(spec.clone(), &config, agent);

    io.set_busy(Some("Sending request to AI..."));
    let (output, response) = match client.stream_chat(request, &predicate).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(agent = %agent.name(), error = %e, "chat turn failed, nothing committed");
            return Err(ParleyError::TurnFailed(Box::new(e)));
        }
    };

    let stop_reason = predicate.stop_reason();
    let steps = predicate.step_count();
    agent.state_mut().push_turn(ConversationTurn::new(
        StoredRequest {
            messages,
            settings: config.settings.clone(),
        },
        response.clone(),
    ));
    tracing::debug!(
        agent = %agent.name(),
        steps,
        stop_reason = %stop_reason,
        turns = agent.state().messages().len(),
        "committed chat turn"
    );

    for hook in service.hooks() {
        if let Err(e) = hook.after_chat_completion(agent, &output, &response).await {
            tracing::warn!(agent = %agent.name(), error = %e, "after chat completion hook failed");
        }
    }

    if response.usage.exceeds_fraction(spec.context_length, config.compaction_threshold)
        && should_compact(agent).await
    {
        io.info_line("Context is getting long. Compacting context...");
        io.set_busy(Some("Compacting context..."));

        // the turn is already committed, so a failed summary only skips compaction
        if let Err(e) = compact_context(service, agent, None).await {
            tracing::warn!(agent = %agent.name(), error = %e, "compaction failed, keeping full history");
            io.error_line(&format!("Context compaction failed, the conversation was kept as-is: {e}"));
            return Ok(TurnOutcome {
                output,
                response,
                stop_reason,
                steps,
            });
        }

        if stop_reason == StopReason::LongContext {
            let remaining = config.max_steps.saturating_sub(steps);
            if remaining > 0 {
                io.info_line("Context compacted, and agent still has work to do. Continuing work...");
                let mut next = config;
                next.max_steps = remaining;
                return run_chat(service, agent, CONTINUE_INPUT, next).await;
            }
        }
    }

    Ok(TurnOutcome {
        output,
        response,
        stop_reason,
        steps,
    })
}

async fn should_compact(agent: &ChatAgent) -> bool {
    if agent.state().config().auto_compact || agent.is_headless() {
        return true;
    }
    let request = ConfirmationRequest::new(
        "Context is getting long. Would you like to compact it to save tokens?",
        true,
        COMPACT_PROMPT_TIMEOUT,
    );
    confirm(agent.io(), request).await
}
