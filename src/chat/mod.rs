//! Chat orchestration: the service facade, the turn loop and compaction.

pub mod compaction;
pub mod hooks;
pub mod runner;
pub mod service;

pub use compaction::{summary_instruction, DEFAULT_COMPACTION_FOCUS};
pub use hooks::{ChatAnalyticsHook, ChatCompletionHook};
pub use runner::{TurnOutcome, CONTINUE_INPUT};
pub use service::ChatService;
