//! Interaction seam between the chat core and whatever presents the agent.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::util::timeout::with_timeout_or;

/// A yes/no question for the human, with the answer used if nobody responds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmationRequest {
    pub message: String,
    pub default: bool,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl ConfirmationRequest {
    pub fn new(message: impl Into<String>, default: bool, timeout: Duration) -> Self {
        Self {
            message: message.into(),
            default,
            timeout,
        }
    }
}

/// A document produced for the operator, such as a tool-call transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub mime_type: String,
    pub body: String,
}

/// Output, busy-indicator and confirmation channel of one agent.
///
/// Every method has a quiet default so hosts only implement what they render.
#[async_trait]
pub trait AgentIo: Send + Sync {
    /// Ask the human to confirm. `None` means no answer was given.
    async fn ask_confirmation(&self, _request: &ConfirmationRequest) -> Option<bool> {
        None
    }

    fn info_line(&self, _line: &str) {}

    fn error_line(&self, _line: &str) {}

    /// Show `Some(status)` while busy; `None` returns to idle.
    fn set_busy(&self, _status: Option<&str>) {}

    fn artifact_output(&self, _artifact: Artifact) {}
}

/// An [`AgentIo`] that renders nothing and never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAgentIo;

impl AgentIo for NullAgentIo {}

/// Ask `io` for confirmation, bounded by the request's timeout.
///
/// No answer and an expired timeout both resolve to `request.default`.
pub async fn confirm(io: &dyn AgentIo, request: ConfirmationRequest) -> bool {
    let answer = with_timeout_or(request.timeout, io.ask_confirmation(&request), None).await;
    match answer {
        Some(answer) => answer,
        None => {
            tracing::debug!(default = request.default, "confirmation unanswered, using default");
            request.default
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
