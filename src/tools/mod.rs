//! Tool system: the invoke/describe contract, the registry and the invocation gate.

pub mod arguments;
pub mod gate;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use gate::{ToolGate, ToolOutcome};
pub use registry::{sanitize_tool_name, ToolDescriptor, ToolRegistry};
pub use tool::{render_tool_value, AgentTool, Tool, ToolExecutionContext};
pub use types::AgentToolParameters;
pub use validation::validate_arguments;
