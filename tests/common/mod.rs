//! Shared test helpers: a scripted model client and a recording agent channel.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use parley::agent::{AgentIo, Artifact, ConfirmationRequest};
use parley::chat::ChatService;
use parley::client::{ChatClient, ChatRequest, ModelSpec, StaticModelRegistry};
use parley::config::ChatServiceConfig;
use parley::error::{ParleyError, Result};
use parley::stop::StopCondition;
use parley::types::*;
use parley::util::retry::RetryPolicy;

/// One step the scripted model will produce.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStep {
    pub text: String,
    pub usage: Usage,
    pub tool_calls: Vec<AgentToolCall>,
}

impl ScriptedStep {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            usage: usage(10, 20),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(id: &str, wire_name: &str, args: serde_json::Value) -> Self {
        Self {
            text: String::new(),
            usage: usage(10, 5),
            tool_calls: vec![AgentToolCall {
                id: id.to_string(),
                name: wire_name.to_string(),
                arguments: args,
            }],
        }
    }

    pub fn with_usage(mut self, input: u32, output: u32) -> Self {
        self.usage = usage(input, output);
        self
    }
}

pub fn usage(input: u32, output: u32) -> Usage {
    Usage {
        input_tokens: input,
        output_tokens: output,
        total_tokens: input + output,
        ..Default::default()
    }
}

/// What a single `stream_chat` call does.
#[derive(Debug, Clone)]
pub enum Script {
    Steps(Vec<ScriptedStep>),
    /// Keep producing the same step until stopped, up to a safety limit.
    Endless(ScriptedStep),
    Fail(String),
}

/// A request as the client received it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ModelMessage>,
    pub tool_names: Vec<String>,
    pub steps_run: usize,
}

/// A model client that replays queued scripts and records every request.
pub struct ScriptedClient {
    model_id: String,
    spec: ModelSpec,
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<RecordedCall>>,
}

const ENDLESS_LIMIT: usize = 100;

impl ScriptedClient {
    pub fn new(model_id: &str, context_length: usize) -> Self {
        Self {
            model_id: model_id.to_string(),
            spec: ModelSpec::new(context_length),
            scripts: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self, script: Script) -> &Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    pub fn queue_text(&self, text: &str) -> &Self {
        self.queue(Script::Steps(vec![ScriptedStep::text(text)]))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn model_spec(&self) -> ModelSpec {
        self.spec.clone()
    }

    async fn stream_chat(&self, request: ChatRequest, stop: &dyn StopCondition) -> Result<(String, ChatResponse)> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Steps(vec![ScriptedStep::text("ok")]));

        let mut record = RecordedCall {
            messages: request.messages.clone(),
            tool_names: request.tools.iter().map(|t| t.definition().name.clone()).collect(),
            steps_run: 0,
        };

        let planned: Vec<ScriptedStep> = match script {
            Script::Fail(message) => {
                self.calls.lock().unwrap().push(record);
                return Err(ParleyError::Stream(message));
            }
            Script::Steps(steps) => steps,
            Script::Endless(step) => vec![step; ENDLESS_LIMIT],
        };

        let mut steps: Vec<StepResult> = Vec::new();
        let mut messages = Vec::new();
        let mut output = String::new();

        for step in planned {
            if !step.text.is_empty() {
                output.push_str(&step.text);
                messages.push(ModelMessage::assistant(step.text.clone()));
            }
            for call in &step.tool_calls {
                let outcome = match request.tool(&call.name) {
                    Some(tool) => tool.invoke(call).await,
                    None => parley::tools::ToolOutcome {
                        text: format!("unknown tool {}", call.name),
                        is_error: true,
                    },
                };
                messages.push(ModelMessage {
                    role: Role::Assistant,
                    content: vec![ContentPart::ToolCall(call.clone())],
                    name: None,
                });
                messages.push(ModelMessage::tool_result(
                    call.id.clone(),
                    serde_json::Value::String(outcome.text),
                    outcome.is_error,
                ));
            }
            steps.push(StepResult {
                text: step.text.clone(),
                usage: step.usage.clone(),
                tool_calls: step.tool_calls.clone(),
                finish_reason: Some(if step.tool_calls.is_empty() {
                    FinishReason::Stop
                } else {
                    FinishReason::ToolCalls
                }),
            });
            if stop.should_stop(&steps).await {
                break;
            }
        }

        record.steps_run = steps.len();
        self.calls.lock().unwrap().push(record);

        let last = steps.last().cloned().unwrap_or_default();
        Ok((
            output,
            ChatResponse {
                messages,
                usage: last.usage,
                finish_reason: last.finish_reason,
                ..Default::default()
            },
        ))
    }
}

/// Records everything an agent shows and answers confirmations from a queue.
#[derive(Default)]
pub struct RecordingIo {
    pub info: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub busy: Mutex<Vec<Option<String>>>,
    pub artifacts: Mutex<Vec<Artifact>>,
    pub prompts: Mutex<Vec<ConfirmationRequest>>,
    answers: Mutex<VecDeque<Option<bool>>>,
    asked: AtomicUsize,
}

impl RecordingIo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, answer: Option<bool>) {
        self.answers.lock().unwrap().push_back(answer);
    }

    pub fn info_lines(&self) -> Vec<String> {
        self.info.lock().unwrap().clone()
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn last_busy(&self) -> Option<Option<String>> {
        self.busy.lock().unwrap().last().cloned()
    }

    pub fn prompt_messages(&self) -> Vec<String> {
        self.prompts.lock().unwrap().iter().map(|p| p.message.clone()).collect()
    }

    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentIo for RecordingIo {
    async fn ask_confirmation(&self, request: &ConfirmationRequest) -> Option<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.clone());
        self.answers.lock().unwrap().pop_front().flatten()
    }

    fn info_line(&self, line: &str) {
        self.info.lock().unwrap().push(line.to_string());
    }

    fn error_line(&self, line: &str) {
        self.errors.lock().unwrap().push(line.to_string());
    }

    fn set_busy(&self, status: Option<&str>) {
        self.busy.lock().unwrap().push(status.map(str::to_string));
    }

    fn artifact_output(&self, artifact: Artifact) {
        self.artifacts.lock().unwrap().push(artifact);
    }
}

/// A service backed by one scripted client, with backoff sleeps disabled.
pub fn service_with(client: Arc<ScriptedClient>) -> ChatService {
    let registry = StaticModelRegistry::new().with_client(client);
    ChatService::new(ChatServiceConfig::default(), Arc::new(registry)).with_retry_policy(RetryPolicy {
        jitter: false,
        ..Default::default()
    })
}

pub fn texts(messages: &[ModelMessage]) -> Vec<String> {
    messages.iter().map(ModelMessage::text).collect()
}

pub fn roles(messages: &[ModelMessage]) -> Vec<Role> {
    messages.iter().map(|m| m.role).collect()
}
