//! The tool contract (§4.4): discovery metadata plus an `execute` entry
//! point. Concrete tool bodies beyond the two reference examples in
//! [`crate::examples`] are out of scope for this core.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use lace_domain::cancel::CancelToken;
use lace_domain::ids::ThreadId;
use lace_domain::tool::{ToolDefinition, ToolResult};

/// A sink for progress notifications a long-running tool may emit while
/// executing. Optional: most tools never touch it.
pub trait ProgressSink: Send {
    fn on_progress(&mut self, message: &str);
}

impl<F: FnMut(&str) + Send> ProgressSink for F {
    fn on_progress(&mut self, message: &str) {
        (self)(message)
    }
}

/// The seam `delegate` calls through (§4.8). `lace-tools` only fixes the
/// contract; `lace-agent` is the only crate that implements it, since
/// spinning up a child agent needs the store/provider/executor wiring
/// this crate deliberately does not depend on.
#[async_trait]
pub trait DelegateHook: Send + Sync {
    async fn delegate(
        &self,
        task: String,
        provider: Option<String>,
        model: Option<String>,
        parent_thread: &ThreadId,
        cancel: &CancelToken,
    ) -> ToolResult;
}

/// Everything a tool's `execute` needs beyond its own arguments.
pub struct ToolContext<'a> {
    pub cancel: CancelToken,
    pub thread_id: ThreadId,
    pub working_dir: PathBuf,
    pub progress: Option<&'a mut dyn ProgressSink>,
    pub delegate_hook: Option<Arc<dyn DelegateHook>>,
}

impl<'a> ToolContext<'a> {
    pub fn new(cancel: CancelToken, thread_id: ThreadId, working_dir: PathBuf) -> Self {
        Self {
            cancel,
            thread_id,
            working_dir,
            progress: None,
            delegate_hook: None,
        }
    }

    pub fn with_delegate_hook(mut self, hook: Arc<dyn DelegateHook>) -> Self {
        self.delegate_hook = Some(hook);
        self
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. Must never panic: failures are reported as
    /// `ToolResult { is_error: true, .. }`, not Rust-level errors, so the
    /// executor can always hand the provider a result instead of unwinding
    /// the turn.
    async fn execute(&self, args: serde_json::Value, ctx: &mut ToolContext<'_>) -> ToolResult;
}
