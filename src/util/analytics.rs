//! Human-readable usage, cost and timing lines for a finished response.

use crate::agent::AgentIo;
use crate::types::ChatResponse;

pub const DEFAULT_ANALYTICS_LABEL: &str = "Chat Complete";

/// Render usage, cost (only when a total is known) and timing lines.
pub fn chat_analytics_lines(response: &ChatResponse, label: &str) -> Vec<String> {
    let usage = &response.usage;
    let cached = nonzero_u32(usage.cache_read_tokens)
        .map(|n| format!(" (+{n} cached)"))
        .unwrap_or_default();
    let reasoning = nonzero_u32(usage.reasoning_tokens)
        .map(|n| format!(" (+{n} reasoning)"))
        .unwrap_or_default();

    let mut lines = vec![format!(
        "[{label}] Input Tokens: {}{cached}, Output: {}{reasoning}, Total: {}",
        usage.input_tokens, usage.output_tokens, usage.total_tokens
    )];

    let cost = &response.cost;
    if let Some(total) = nonzero_f64(cost.total) {
        let dollars = |v: Option<f64>| match nonzero_f64(v) {
            Some(v) => format!("${v:.4}"),
            None => "$unknown".to_string(),
        };
        let cached = nonzero_f64(cost.cached_input)
            .map(|v| format!(" (+${v:.4} cached)"))
            .unwrap_or_default();
        let reasoning = nonzero_f64(cost.reasoning)
            .map(|v| format!(" (+${v:.4} reasoning)"))
            .unwrap_or_default();
        lines.push(format!(
            "[{label}] Input Cost: {}{cached}, Output: {}{reasoning}, Total: ${total:.4}",
            dollars(cost.input),
            dollars(cost.output),
        ));
    }

    let seconds = response.timing.elapsed_ms as f64 / 1000.0;
    let throughput = nonzero_f64(response.timing.tokens_per_sec)
        .map(|tps| format!("{tps:.2}"))
        .unwrap_or_else(|| "N/A".to_string());
    lines.push(format!("[{label}] Time: {seconds:.2}s, Throughput: {throughput} tokens/sec"));

    lines
}

/// Write [`chat_analytics_lines`] to the agent's info channel.
pub fn output_chat_analytics(response: &ChatResponse, io: &dyn AgentIo, label: Option<&str>) {
    for line in chat_analytics_lines(response, label.unwrap_or(DEFAULT_ANALYTICS_LABEL)) {
        io.info_line(&line);
    }
}

fn nonzero_u32(v: Option<u32>) -> Option<u32> {
    v.filter(|n| *n != 0)
}

fn nonzero_f64(v: Option<f64>) -> Option<f64> {
    v.filter(|n| *n != 0.0)
}
