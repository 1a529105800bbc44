//! Tool invocation gate: serializes tool calls per agent and contains their failures.
//!
//! By default every tool call an agent makes waits its turn on a FIFO queue,
//! so concurrent model steps never run two tools at once. Parallel mode skips
//! the queue entirely. Either way a failing (or panicking) tool becomes an
//! error string for the model instead of an error for the turn.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use tokio::sync::Mutex;

use super::arguments::ToolArguments;
use super::registry::ToolDescriptor;
use super::tool::{render_tool_value, ToolExecutionContext};
use super::validation::validate_arguments;
use crate::agent::interaction::{AgentIo, Artifact};

/// Text handed back to the model for one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub text: String,
    pub is_error: bool,
}

/// Per-agent tool execution serializer.
#[derive(Debug, Default)]
pub struct ToolGate {
    queue: Mutex<()>,
    parallel: AtomicBool,
}

impl ToolGate {
    pub fn new(parallel: bool) -> Self {
        Self {
            queue: Mutex::new(()),
            parallel: AtomicBool::new(parallel),
        }
    }

    pub fn set_parallel(&self, parallel: bool) {
        self.parallel.store(parallel, Ordering::SeqCst);
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel.load(Ordering::SeqCst)
    }

    /// Run `task` now in parallel mode, otherwise after every earlier submission.
    pub async fn run_tool_maybe_in_parallel<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.is_parallel() {
            return task().await;
        }
        let _slot = self.queue.lock().await;
        task().await
    }

    /// Validate, execute and render one tool call through the gate.
    pub async fn invoke(
        &self,
        tool: &ToolDescriptor,
        args: serde_json::Value,
        ctx: ToolExecutionContext,
        io: &dyn AgentIo,
    ) -> ToolOutcome {
        self.run_tool_maybe_in_parallel(|| execute_contained(tool, args, ctx, io))
            .await
    }
}

async fn execute_contained(
    tool: &ToolDescriptor,
    args: serde_json::Value,
    ctx: ToolExecutionContext,
    io: &dyn AgentIo,
) -> ToolOutcome {
    let name = tool.name.as_str();
    let request_json = serde_json::to_string_pretty(&args).unwrap_or_else(|_| args.to_string());

    let result = match validate_arguments(name, &args, &tool.tool.parameters().schema) {
        Err(e) => Err(e.to_string()),
        Ok(()) => {
            let arguments = ToolArguments::new(args);
            AssertUnwindSafe(tool.tool.execute(&arguments, &ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(crate::error::ParleyError::tool_execution(name, "tool panicked")))
                .map_err(|e| e.to_string())
        }
    };

    match result {
        Ok(value) => {
            let text = render_tool_value(&value);
            io.artifact_output(Artifact {
                name: format!("Tool Call ({name})"),
                mime_type: "text/markdown".to_string(),
                body: format!(
                    "### Tool Call: {name}\n\n**Request JSON:**\n\n```json\n{request_json}\n```\n\n**Response:**\n\n```\n{text}\n```\n"
                ),
            });
            ToolOutcome { text, is_error: false }
        }
        Err(message) => {
            tracing::warn!(tool = %name, error = %message, "tool call failed");
            io.error_line(&format!("Error calling tool {name}({request_json}): {message}"));
            ToolOutcome {
                text: format!(
                    "Error calling tool: {message}. Please check your tool call for correctness and retry the function call."
                ),
                is_error: true,
            }
        }
    }
}
