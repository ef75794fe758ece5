//! `DelegationManager` (§4.8): spawns a child agent on a child thread in
//! response to a `delegate` tool call, and correlates the child's final
//! answer back onto the parent's `TOOL_RESULT`.
//!
//! No direct teacher analog — the teacher's `node-sdk`/`gateway` crates
//! spawn subprocess "nodes" over a wire protocol rather than in-process
//! child agents — so this is built fresh on top of this workspace's own
//! `Agent`, reusing its turn loop verbatim for the child rather than
//! inventing a second one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use lace_budget::{BudgetConfig, TokenBudget};
use lace_domain::cancel::CancelToken;
use lace_domain::config::RetryConfig;
use lace_domain::error::Result;
use lace_domain::ids::ThreadId;
use lace_domain::tool::{ToolResult, ToolResultMetadata};
use lace_providers::traits::Provider;
use lace_store::ThreadStore;
use lace_tools::tool_trait::DelegateHook;
use lace_tools::{ApprovalPolicy, ToolExecutor, ToolRegistry};

use crate::agent::Agent;
use crate::cancel_map::CancelMap;

/// System prompt a delegated child agent runs with. Deliberately distinct
/// from the parent's: the child has no conversational history of its own
/// beyond the single task it was handed.
pub const DELEGATE_SYSTEM_PROMPT: &str =
    "You are a sub-agent handling one delegated task. Complete it and reply \
     with a final, self-contained answer; you will not be asked a follow-up.";

/// Everything [`DelegationManager::new`] needs to stand up a child agent
/// identical in shape to the parent, minus whatever the caller chooses to
/// vary (provider selection, recursion).
#[derive(Clone)]
pub struct DelegationConfig {
    pub default_provider: Arc<dyn Provider>,
    pub providers: HashMap<String, Arc<dyn Provider>>,
    pub tool_registry: Arc<ToolRegistry>,
    pub approval: Arc<ApprovalPolicy>,
    pub budget: BudgetConfig,
    pub retry: RetryConfig,
    pub queue_max_length: usize,
    pub working_dir: PathBuf,
    /// §4.8 step 2: "minus `delegate` itself if recursion is disabled".
    pub allow_recursive_delegation: bool,
}

/// Creates and drives child agents on behalf of a `delegate` tool call,
/// and cascades parent cancellation onto them via the shared
/// [`CancelMap`] (§4.8 step 5, §5).
pub struct DelegationManager {
    store: Arc<dyn ThreadStore>,
    cancel_map: Arc<CancelMap>,
    config: DelegationConfig,
    /// Next child index to mint per parent thread. A plain counter is
    /// enough: thread ids are minted once and never reused, so collisions
    /// would only arise from concurrent delegation out of the same
    /// parent, which the agent's serial tool-call loop rules out.
    next_child_index: Mutex<HashMap<ThreadId, u32>>,
    /// Set to a weak self-reference once wrapped in an `Arc`, so a child
    /// can be handed the same hook for further delegation without this
    /// trait needing an `Arc<Self>` receiver.
    self_ref: Mutex<Option<Weak<DelegationManager>>>,
}

impl DelegationManager {
    /// Construct and wrap in an `Arc` in one step — required so recursive
    /// delegation (when enabled) can hand a child agent a strong
    /// reference back to this same manager.
    pub fn new(store: Arc<dyn ThreadStore>, cancel_map: Arc<CancelMap>, config: DelegationConfig) -> Arc<Self> {
        let recursive = config.allow_recursive_delegation;
        let manager = Arc::new(Self {
            store,
            cancel_map,
            config,
            next_child_index: Mutex::new(HashMap::new()),
            self_ref: Mutex::new(None),
        });
        if recursive {
            *manager.self_ref.lock() = Some(Arc::downgrade(&manager));
        }
        manager
    }

    fn mint_child_id(&self, parent: &ThreadId) -> ThreadId {
        let mut counters = self.next_child_index.lock();
        let next = counters.entry(parent.clone()).or_insert(0);
        *next += 1;
        parent.child(*next)
    }

    fn resolve_provider(&self, requested: Option<&str>) -> Arc<dyn Provider> {
        requested
            .and_then(|name| self.config.providers.get(name).cloned())
            .unwrap_or_else(|| self.config.default_provider.clone())
    }

    /// Build the tool registry a child sees: the parent's registry as-is
    /// when recursive delegation is allowed (the child can itself
    /// delegate, cascading arbitrarily deep), or every tool *except*
    /// `delegate` otherwise, so a grandchild cannot further fan out.
    fn child_registry(&self) -> Arc<ToolRegistry> {
        if self.config.allow_recursive_delegation {
            return self.config.tool_registry.clone();
        }
        let without_delegate = ToolRegistry::new();
        for tool in self.config.tool_registry.get_all_tools() {
            if tool.definition().name != "delegate" {
                without_delegate.register(tool);
            }
        }
        Arc::new(without_delegate)
    }

    async fn run_child(
        &self,
        parent_thread: &ThreadId,
        task: String,
        provider_name: Option<String>,
    ) -> Result<(ThreadId, crate::agent::TurnOutcome)> {
        let child_id = self.mint_child_id(parent_thread);
        let provider = self.resolve_provider(provider_name.as_deref());

        let executor = Arc::new(ToolExecutor::new(self.child_registry(), self.config.approval.clone()));
        let budget = Arc::new(TokenBudget::new(self.config.budget));

        let child_agent = Agent::new(
            child_id.clone(),
            self.store.clone(),
            provider,
            executor,
            budget,
            self.cancel_map.clone(),
            self.config.retry.clone(),
            self.config.queue_max_length,
            self.config.working_dir.clone(),
            Some(DELEGATE_SYSTEM_PROMPT.to_string()),
        )?;

        if let Some(hook) = self.self_ref.lock().as_ref().and_then(Weak::upgrade) {
            child_agent.set_delegate_hook(hook);
        }

        self.cancel_map.add_to_group(parent_thread, &child_id);
        let outcome = child_agent.run_turn_to_completion(task).await;
        self.cancel_map.remove_from_group(parent_thread, &child_id);

        Ok((child_id, outcome))
    }
}

#[async_trait]
impl DelegateHook for DelegationManager {
    async fn delegate(
        &self,
        task: String,
        provider: Option<String>,
        _model: Option<String>,
        parent_thread: &ThreadId,
        cancel: &CancelToken,
    ) -> ToolResult {
        if cancel.is_cancelled() {
            return ToolResult::error("cancelled");
        }

        match self.run_child(parent_thread, task, provider).await {
            Ok((child_id, outcome)) if outcome.aborted => {
                ToolResult::error("delegated task was cancelled").with_metadata(child_result_metadata(&child_id))
            }
            Ok((child_id, outcome)) => {
                if let Some(err) = outcome.error {
                    ToolResult::error(format!("delegate failed: {err}")).with_metadata(child_result_metadata(&child_id))
                } else {
                    ToolResult::text(outcome.content).with_metadata(child_result_metadata(&child_id))
                }
            }
            Err(err) => ToolResult::error(format!("delegate failed: {err}")),
        }
    }
}

fn child_result_metadata(thread_id: &ThreadId) -> ToolResultMetadata {
    crate::agent::child_result_metadata(thread_id)
}
