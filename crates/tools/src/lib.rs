//! The tool contract and dispatch pipeline (§4.4-§4.5): registry,
//! approval policy, and executor, plus reference tools (including the
//! reserved `delegate` tool's thin shell) that exist only to demonstrate
//! the contract.

pub mod approval;
pub mod delegate_tool;
pub mod examples;
pub mod executor;
pub mod registry;
pub mod tool_trait;

pub use approval::{ApprovalCallback, ApprovalPolicy, Decision};
pub use delegate_tool::DelegateTool;
pub use executor::ToolExecutor;
pub use registry::ToolRegistry;
pub use tool_trait::{DelegateHook, ProgressSink, Tool, ToolContext};
