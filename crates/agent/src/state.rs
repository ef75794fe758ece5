//! The agent's observable state machine and event vocabulary (§4.7).

use chrono::{DateTime, Utc};
use lace_domain::tool::{ToolCall, ToolResult};
use lace_providers::retry::RetryMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Thinking,
    Streaming,
    ToolExecution,
    Stopped,
}

/// Per-turn record emitted on completion, held in memory only (not part
/// of the event log).
#[derive(Debug, Clone)]
pub struct TurnMetrics {
    pub turn_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub retry_metrics: RetryMetrics,
}

/// Everything observers can subscribe to while a turn runs.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    StateChange { from: AgentState, to: AgentState },
    TurnStart { turn_id: String },
    TurnProgress { elapsed_ms: u64 },
    AgentToken { token: String },
    AgentThinkingStart,
    AgentThinkingComplete,
    ToolCallStart { call: ToolCall },
    ToolCallComplete { call_id: String, result: ToolResult },
    TurnComplete { metrics: TurnMetrics },
    TurnAborted { metrics: TurnMetrics },
    TokenUsageUpdate { total_used: u64 },
    TokenBudgetWarning { message: String },
    Error { message: String },
}
