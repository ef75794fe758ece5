//! The agent engine (§4.7), the message queue it drains on return to
//! `idle` (§4.6), compaction (§4.9), and delegation (§4.8) — the pieces
//! of the core that own mutable, per-thread state rather than just
//! exposing a stateless contract.

pub mod agent;
pub mod cancel_map;
pub mod compact;
pub mod delegation;
pub mod queue;
pub mod state;

pub use agent::{child_result_metadata, Agent, TurnOutcome};
pub use cancel_map::CancelMap;
pub use delegation::{DelegationConfig, DelegationManager, DELEGATE_SYSTEM_PROMPT};
pub use queue::{MessageQueue, Priority, QueueEntry, QueueStats, Source};
pub use state::{AgentEvent, AgentState, TurnMetrics};
