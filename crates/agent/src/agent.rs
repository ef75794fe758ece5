//! The agent turn loop (§4.7): the state machine that drives one
//! `sendMessage` call through provider invocation, sequential tool
//! dispatch, and back to `idle`.
//!
//! Direct grounding: `gateway::runtime::turn::run_turn` /
//! `TurnEvent` / `TurnContext`. The Rust implementation keeps the
//! teacher's shape closely — a spawned tokio task per turn, a channel of
//! events the caller drains, per-step tracing spans — but dispatches tool
//! calls **sequentially** (a `for` loop with per-call `.await`) rather
//! than the teacher's concurrent `futures_util::future::join_all`, and
//! drives its own explicit `AgentState` field rather than inferring state
//! from call-stack position, since observers must be able to read
//! `state_change` events and the queue gates strictly on the state value.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use lace_budget::{BudgetConfig, TokenBudget, TurnUsage};
use lace_domain::cancel::CancelToken;
use lace_domain::config::RetryConfig;
use lace_domain::error::{LaceError, Result};
use lace_domain::event::{EventData, ThreadEvent};
use lace_domain::ids::ThreadId;
use lace_domain::message::Message;
use lace_domain::tool::{ToolResultContent, ToolResultMetadata};
use lace_providers::retry::{with_retry, RetryMetrics};
use lace_providers::traits::{Provider, StreamSink};
use lace_store::ThreadStore;
use lace_tools::tool_trait::DelegateHook;
use lace_tools::{ToolContext, ToolExecutor};

use crate::cancel_map::CancelMap;
use crate::compact;
use crate::queue::{MessageQueue, Priority, QueueEntry, Source};
use crate::state::{AgentEvent, AgentState, TurnMetrics};

/// Outcome of a single complete turn (through however many tool-call
/// rounds it took), used both by the top-level driver and by
/// `DelegationManager` to read a child agent's final answer.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub content: String,
    pub aborted: bool,
    pub error: Option<String>,
    pub metrics: TurnMetrics,
}

const MAX_TOOL_LOOPS: usize = 25;

struct EventSink {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventSink {
    fn emit(&self, event: AgentEvent) {
        // No receivers is not an error: the agent runs headless just fine.
        let _ = self.tx.send(event);
    }
}

/// A single conversational agent bound to one thread, one provider, and
/// one tool set. Cheap to clone (every field is an `Arc` or a lock
/// around shared state) so it can be captured by the spawned turn task.
#[derive(Clone)]
pub struct Agent {
    thread_id: ThreadId,
    store: Arc<dyn ThreadStore>,
    provider: Arc<dyn Provider>,
    executor: Arc<ToolExecutor>,
    budget: Arc<TokenBudget>,
    queue: Arc<MessageQueue>,
    state: Arc<RwLock<AgentState>>,
    cancel_map: Arc<CancelMap>,
    retry_config: RetryConfig,
    working_dir: PathBuf,
    events: Arc<EventSink>,
    compaction_keep: usize,
    compaction_max_turns: usize,
    /// The `delegate` tool's hook (§4.8), set after construction since a
    /// `DelegationManager` commonly wants a handle to the very `Agent` it
    /// is wiring up. `None` means `delegate` calls fail closed.
    delegate_hook: Arc<RwLock<Option<Arc<dyn DelegateHook>>>>,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        thread_id: ThreadId,
        store: Arc<dyn ThreadStore>,
        provider: Arc<dyn Provider>,
        executor: Arc<ToolExecutor>,
        budget: Arc<TokenBudget>,
        cancel_map: Arc<CancelMap>,
        retry_config: RetryConfig,
        queue_max_length: usize,
        working_dir: PathBuf,
        system_prompt: Option<String>,
    ) -> Result<Self> {
        store.create_thread(&thread_id, None)?;

        let existing = store.get_events(&thread_id)?;
        if let Some(prompt) = &system_prompt {
            let already_set = existing
                .iter()
                .any(|e| matches!(e.data, EventData::SystemPrompt { .. }));
            if !already_set {
                store.append_event(
                    &thread_id,
                    EventData::SystemPrompt {
                        text: prompt.clone(),
                    },
                )?;
            }
            provider.set_system_prompt(prompt);
        }

        let (tx, _rx) = broadcast::channel(256);

        Ok(Self {
            thread_id,
            store,
            provider,
            executor,
            budget,
            queue: Arc::new(MessageQueue::new(queue_max_length)),
            state: Arc::new(RwLock::new(AgentState::Idle)),
            cancel_map,
            retry_config,
            working_dir,
            events: Arc::new(EventSink { tx }),
            compaction_keep: compact::DEFAULT_KEEP_EVENTS,
            compaction_max_turns: 20,
            delegate_hook: Arc::new(RwLock::new(None)),
        })
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// Wire up the `delegate` tool's hook (§4.8). Left unset, `delegate`
    /// calls fail closed with an error result rather than panicking.
    pub fn set_delegate_hook(&self, hook: Arc<dyn DelegateHook>) {
        *self.delegate_hook.write() = Some(hook);
    }

    pub fn state(&self) -> AgentState {
        *self.state.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.tx.subscribe()
    }

    /// Explicit system-prompt refresh on reparent (§4.7): the prompt is
    /// otherwise computed once at construction and never silently reused
    /// across a session/project change.
    pub fn reparent_system_prompt(&self, prompt: &str) -> Result<()> {
        self.store.append_event(
            &self.thread_id,
            EventData::SystemPrompt {
                text: prompt.to_string(),
            },
        )?;
        self.provider.set_system_prompt(prompt);
        Ok(())
    }

    /// Return to `idle` at the end of a turn, unless `stop()` raced with
    /// this turn and already moved the agent into the terminal `stopped`
    /// state — that must stick, not be clobbered back to `idle`.
    fn settle_to_idle(&self) {
        let mut guard = self.state.write();
        if *guard == AgentState::Stopped {
            return;
        }
        let old = *guard;
        *guard = AgentState::Idle;
        drop(guard);
        if old != AgentState::Idle {
            self.events.emit(AgentEvent::StateChange {
                from: old,
                to: AgentState::Idle,
            });
        }
    }

    fn set_state(&self, new_state: AgentState) {
        let old = {
            let mut guard = self.state.write();
            let old = *guard;
            *guard = new_state;
            old
        };
        if old != new_state {
            self.events.emit(AgentEvent::StateChange {
                from: old,
                to: new_state,
            });
        }
    }

    /// Step 1 of the turn algorithm: if idle, run the turn now (spawned so
    /// `abort()` can interrupt it from another call); otherwise enqueue
    /// and return. After a spawned turn (and any turns drained from the
    /// queue) completes, the agent is left `idle`. Equivalent to
    /// [`Self::send_message_with_priority`] at `Priority::Normal`.
    pub fn send_message(&self, text: impl Into<String>) -> bool {
        self.send_message_with_priority(text, Priority::Normal)
    }

    /// Same as [`Self::send_message`], but lets the caller mark the entry
    /// `High` priority (§4.6) so it jumps ahead of already-queued `Normal`
    /// entries once the agent returns to `idle`. Priority only matters for
    /// the enqueue path: a message that starts running immediately because
    /// the agent is already `idle` has no queue position to jump.
    pub fn send_message_with_priority(&self, text: impl Into<String>, priority: Priority) -> bool {
        let text = text.into();
        {
            let mut guard = self.state.write();
            if *guard == AgentState::Stopped {
                return false;
            }
            if *guard != AgentState::Idle {
                drop(guard);
                self.queue.enqueue(QueueEntry {
                    id: Uuid::new_v4().to_string(),
                    content: text,
                    source: Source::User,
                    priority,
                    enqueued_at: Instant::now(),
                });
                return false;
            }
            *guard = AgentState::Thinking;
        }
        self.events.emit(AgentEvent::StateChange {
            from: AgentState::Idle,
            to: AgentState::Thinking,
        });

        let agent = self.clone();
        tokio::spawn(async move {
            agent.drive(text).await;
        });
        true
    }

    /// Run `text` to completion, then drain whatever was queued while it
    /// ran, one turn at a time, before finally settling at `idle`.
    async fn drive(&self, mut text: String) {
        loop {
            let _ = self.run_turn_to_completion(text).await;
            if self.state() == AgentState::Stopped {
                break;
            }
            match self.queue.try_pop() {
                Some(entry) => text = entry.content,
                None => break,
            }
        }
    }

    /// Run one complete turn — including however many rounds of tool
    /// calls it takes — and return its outcome. Callers that want queue
    /// semantics should go through [`Agent::send_message`]; this method
    /// is also used directly by child agents spun up for delegation,
    /// which have no queue of their own to drain.
    pub async fn run_turn_to_completion(&self, text: String) -> TurnOutcome {
        let turn_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start_instant = Instant::now();
        self.set_state(AgentState::Thinking);
        self.events.emit(AgentEvent::TurnStart {
            turn_id: turn_id.clone(),
        });

        let cancel = self.cancel_map.register(&self.thread_id);

        if let Err(err) = self
            .store
            .append_event(&self.thread_id, EventData::UserMessage { text })
        {
            return self.finish_with_error(&turn_id, started_at, start_instant, err);
        }

        let mut total_retry_metrics = RetryMetrics::default();
        let mut final_content = String::new();

        for _ in 0..MAX_TOOL_LOOPS {
            if cancel.is_cancelled() {
                return self.finish_aborted(&turn_id, started_at, start_instant, total_retry_metrics);
            }

            let events = match self.store.get_events(&self.thread_id) {
                Ok(events) => events,
                Err(err) => return self.finish_with_error(&turn_id, started_at, start_instant, err),
            };

            let budget_was_short = !self.budget_allows(&events);
            if compact::should_compact(&events, self.compaction_max_turns) || budget_was_short {
                self.run_compaction(&events, &cancel).await;
            }

            let events = match self.store.get_events(&self.thread_id) {
                Ok(events) => events,
                Err(err) => return self.finish_with_error(&turn_id, started_at, start_instant, err),
            };

            // §7 BudgetExceeded: if the budget was short before this pass
            // and compaction/truncation still couldn't bring it within
            // the effective limit, end the turn rather than calling the
            // provider with context it told us it can't afford.
            if budget_was_short && !self.budget_allows(&events) {
                return self.finish_with_error(
                    &turn_id,
                    started_at,
                    start_instant,
                    LaceError::BudgetExceeded(
                        "token budget cannot be satisfied even after compaction; run /compact or start a new thread"
                            .to_string(),
                    ),
                );
            }

            let messages = project_messages(&events);
            let tool_defs = self.executor.tool_definitions();

            self.events.emit(AgentEvent::AgentThinkingStart);
            let response = if self.provider.supports_streaming() {
                self.set_state(AgentState::Streaming);
                self.call_streaming(&messages, &tool_defs, &cancel, &mut total_retry_metrics).await
            } else {
                self.call_non_streaming(&messages, &tool_defs, &cancel, &mut total_retry_metrics).await
            };
            self.events.emit(AgentEvent::AgentThinkingComplete);

            let response = match response {
                Ok(response) => response,
                Err(LaceError::Cancelled) => {
                    return self.finish_aborted(&turn_id, started_at, start_instant, total_retry_metrics)
                }
                Err(err) => return self.finish_with_error(&turn_id, started_at, start_instant, err),
            };

            if let Some(usage) = &response.usage {
                self.budget.record(TurnUsage {
                    prompt_tokens: usage.prompt_tokens as i64,
                    completion_tokens: usage.completion_tokens as i64,
                });
                self.events.emit(AgentEvent::TokenUsageUpdate {
                    total_used: self.budget.total_used(),
                });
            }
            if self.budget.is_near_limit() {
                if let Some(message) = self.budget.recommendations().warning_message {
                    self.events.emit(AgentEvent::TokenBudgetWarning { message });
                }
            }

            final_content = response.content.clone();
            if !response.content.is_empty() {
                if let Err(err) = self.store.append_event(
                    &self.thread_id,
                    EventData::AgentMessage {
                        text: response.content.clone(),
                    },
                ) {
                    return self.finish_with_error(&turn_id, started_at, start_instant, err);
                }
            }

            if response.tool_calls.is_empty() {
                break;
            }

            for call in &response.tool_calls {
                if let Err(err) = self.store.append_event(
                    &self.thread_id,
                    EventData::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                ) {
                    return self.finish_with_error(&turn_id, started_at, start_instant, err);
                }
            }

            self.set_state(AgentState::ToolExecution);
            for call in &response.tool_calls {
                if cancel.is_cancelled() {
                    return self.finish_aborted(&turn_id, started_at, start_instant, total_retry_metrics);
                }

                self.events.emit(AgentEvent::ToolCallStart { call: call.clone() });
                let mut ctx = ToolContext::new(cancel.clone(), self.thread_id.clone(), self.working_dir.clone());
                if let Some(hook) = self.delegate_hook.read().clone() {
                    ctx = ctx.with_delegate_hook(hook);
                }
                let result = self.executor.execute_call(call, &mut ctx).await;

                if let Err(err) = self.store.append_event(
                    &self.thread_id,
                    EventData::ToolResult {
                        id: call.id.clone(),
                        content: result.content.clone(),
                        is_error: result.is_error,
                        metadata: result.metadata.clone(),
                    },
                ) {
                    return self.finish_with_error(&turn_id, started_at, start_instant, err);
                }
                self.events.emit(AgentEvent::ToolCallComplete {
                    call_id: call.id.clone(),
                    result,
                });
            }

            self.set_state(AgentState::Thinking);
        }

        self.finish_complete(&turn_id, started_at, start_instant, total_retry_metrics, final_content)
    }

    fn budget_allows(&self, events: &[ThreadEvent]) -> bool {
        let estimate = TokenBudget::estimate(&project_messages(events));
        self.budget.can_make_request(estimate)
    }

    /// Explicit `/compact` (§4.9, §6): force a compaction pass outside the
    /// normal budget-triggered path, regardless of current budget state.
    /// A no-op if there is nothing beyond the keep-window to compact yet.
    pub async fn compact_now(&self) -> Result<()> {
        let events = self.store.get_events(&self.thread_id)?;
        let cancel = CancelToken::new();
        self.run_compaction(&events, &cancel).await;
        Ok(())
    }

    async fn run_compaction(&self, events: &[ThreadEvent], cancel: &CancelToken) {
        let marker = compact::run_compaction(
            self.provider.as_ref(),
            &self.thread_id,
            events,
            self.compaction_keep,
            cancel,
        )
        .await;
        let Some(marker) = marker else {
            return;
        };
        if let Err(err) = self.store.append_event(&self.thread_id, marker.data) {
            tracing::warn!(thread_id = %self.thread_id, error = %err, "failed to persist compaction marker");
        }
    }

    async fn call_non_streaming(
        &self,
        messages: &[Message],
        tools: &[lace_domain::tool::ToolDefinition],
        cancel: &CancelToken,
        retry_metrics: &mut RetryMetrics,
    ) -> Result<lace_providers::traits::ProviderResponse> {
        let (result, metrics) = with_retry(
            &self.retry_config,
            |attempt| {
                tracing::info!(
                    thread_id = %self.thread_id,
                    attempt = attempt.attempt,
                    delay_ms = attempt.delay.as_millis() as u64,
                    error = %attempt.error,
                    "retrying provider call"
                );
            },
            || self.provider.create_response(messages, tools, cancel),
        )
        .await;
        merge_retry_metrics(retry_metrics, metrics);
        result
    }

    async fn call_streaming(
        &self,
        messages: &[Message],
        tools: &[lace_domain::tool::ToolDefinition],
        cancel: &CancelToken,
        retry_metrics: &mut RetryMetrics,
    ) -> Result<lace_providers::traits::ProviderResponse> {
        let emitted_any = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut metrics = RetryMetrics::default();
        let mut attempt: u32 = 0;
        let mut backoff = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(std::time::Duration::from_millis(self.retry_config.initial_delay_ms))
            .with_max_interval(std::time::Duration::from_millis(self.retry_config.max_delay_ms))
            .with_max_elapsed_time(None)
            .build();

        loop {
            attempt += 1;
            emitted_any.store(false, std::sync::atomic::Ordering::SeqCst);
            let mut sink = ForwardingSink {
                events: &self.events,
                emitted: emitted_any.clone(),
            };
            match self
                .provider
                .create_streaming_response(messages, tools, cancel, &mut sink)
                .await
            {
                Ok(response) => {
                    metrics.attempts = attempt - 1;
                    metrics.successful = true;
                    merge_retry_metrics(retry_metrics, metrics);
                    return Ok(response);
                }
                Err(err) => {
                    let emitted = emitted_any.load(std::sync::atomic::Ordering::SeqCst);
                    let retriable = err.is_retriable() && !emitted;
                    if !retriable || attempt >= self.retry_config.max_attempts {
                        metrics.attempts = attempt - 1;
                        metrics.successful = false;
                        metrics.last_error = Some(err.to_string());
                        merge_retry_metrics(retry_metrics, metrics);
                        return Err(err);
                    }
                    let delay = backoff::backoff::Backoff::next_backoff(&mut backoff)
                        .unwrap_or(std::time::Duration::from_millis(self.retry_config.max_delay_ms));
                    metrics.total_delay_ms += delay.as_millis() as u64;
                    metrics.last_error = Some(err.to_string());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn finish_complete(
        &self,
        turn_id: &str,
        started_at: chrono::DateTime<Utc>,
        start_instant: Instant,
        retry_metrics: RetryMetrics,
        content: String,
    ) -> TurnOutcome {
        self.cancel_map.remove(&self.thread_id);
        self.settle_to_idle();
        let metrics = TurnMetrics {
            turn_id: turn_id.to_string(),
            started_at,
            elapsed_ms: start_instant.elapsed().as_millis() as u64,
            tokens_in: self.budget.prompt_used() as u32,
            tokens_out: self.budget.completion_used() as u32,
            retry_metrics,
        };
        self.events.emit(AgentEvent::TurnComplete { metrics: metrics.clone() });
        TurnOutcome {
            content,
            aborted: false,
            error: None,
            metrics,
        }
    }

    fn finish_aborted(
        &self,
        turn_id: &str,
        started_at: chrono::DateTime<Utc>,
        start_instant: Instant,
        retry_metrics: RetryMetrics,
    ) -> TurnOutcome {
        self.cancel_map.remove(&self.thread_id);
        self.settle_to_idle();
        let metrics = TurnMetrics {
            turn_id: turn_id.to_string(),
            started_at,
            elapsed_ms: start_instant.elapsed().as_millis() as u64,
            tokens_in: self.budget.prompt_used() as u32,
            tokens_out: self.budget.completion_used() as u32,
            retry_metrics,
        };
        self.events.emit(AgentEvent::TurnAborted { metrics: metrics.clone() });
        TurnOutcome {
            content: String::new(),
            aborted: true,
            error: None,
            metrics,
        }
    }

    fn finish_with_error(
        &self,
        turn_id: &str,
        started_at: chrono::DateTime<Utc>,
        start_instant: Instant,
        error: LaceError,
    ) -> TurnOutcome {
        self.cancel_map.remove(&self.thread_id);
        self.settle_to_idle();
        let metrics = TurnMetrics {
            turn_id: turn_id.to_string(),
            started_at,
            elapsed_ms: start_instant.elapsed().as_millis() as u64,
            tokens_in: self.budget.prompt_used() as u32,
            tokens_out: self.budget.completion_used() as u32,
            retry_metrics: RetryMetrics::default(),
        };
        let message = error.to_string();
        self.events.emit(AgentEvent::Error { message: message.clone() });
        TurnOutcome {
            content: String::new(),
            aborted: false,
            error: Some(message),
            metrics,
        }
    }

    /// Cancel the in-flight turn, if any, and return whether anything was
    /// actually running. Idempotent: calling this on an idle agent is a
    /// no-op that returns `false`.
    pub fn abort(&self) -> bool {
        if self.state() == AgentState::Idle {
            return false;
        }
        self.cancel_map.cancel(&self.thread_id)
    }

    /// Permanently retire the agent (§4.7's terminal `stopped` state):
    /// cancel any in-flight turn, drop anything still queued, and refuse
    /// every subsequent `send_message`. Unlike `abort()`, which returns to
    /// `idle` so the agent can keep working, `stop()` never comes back.
    /// Idempotent: stopping an already-stopped agent is a no-op that
    /// returns `false`.
    pub fn stop(&self) -> bool {
        if self.state() == AgentState::Stopped {
            return false;
        }
        self.cancel_map.cancel(&self.thread_id);
        self.queue.drain_with(|_| {});
        self.set_state(AgentState::Stopped);
        true
    }
}

struct ForwardingSink<'a> {
    events: &'a EventSink,
    emitted: Arc<std::sync::atomic::AtomicBool>,
}

impl<'a> StreamSink for ForwardingSink<'a> {
    fn on_token(&mut self, token: &str) {
        self.emitted.store(true, std::sync::atomic::Ordering::SeqCst);
        self.events.emit(AgentEvent::AgentToken {
            token: token.to_string(),
        });
    }
}

fn merge_retry_metrics(into: &mut RetryMetrics, from: RetryMetrics) {
    into.attempts += from.attempts;
    into.total_delay_ms += from.total_delay_ms;
    into.successful = from.successful;
    if from.last_error.is_some() {
        into.last_error = from.last_error;
    }
}

/// Project a thread's event log into the provider-agnostic message list
/// (§4.7 step 4), honouring the latest `COMPACTION` prefix replacement:
/// events before the marker are represented only by its summary.
fn project_messages(events: &[ThreadEvent]) -> Vec<Message> {
    let boundary = compact::compaction_boundary(events);
    let mut messages = Vec::new();

    if boundary > 0 {
        if let EventData::Compaction { compacted_events, .. } = &events[boundary - 1].data {
            for synthetic in compacted_events {
                messages.push(Message::system(format!(
                    "[compacted history] {}",
                    synthetic.text
                )));
            }
        }
    }

    for event in &events[boundary..] {
        match &event.data {
            EventData::UserMessage { text } => messages.push(Message::user(text.clone())),
            EventData::AgentMessage { text } => messages.push(Message::assistant(text.clone())),
            EventData::ToolCall { id, name, arguments } => {
                messages.push(Message::assistant_with_tool_calls(
                    "",
                    vec![(id.clone(), name.clone(), arguments.clone())],
                ));
            }
            EventData::ToolResult { id, content, is_error, .. } => {
                let text = content
                    .iter()
                    .map(|c| match c {
                        ToolResultContent::Text { text } => text.as_str(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                messages.push(Message::tool_result(id.clone(), text, *is_error));
            }
            EventData::LocalSystemMessage { text } => messages.push(Message::system(text.clone())),
            EventData::SystemPrompt { text } => messages.push(Message::system(text.clone())),
            EventData::UserSystemPrompt { text } => messages.push(Message::system(text.clone())),
            EventData::Compaction { .. } => {}
        }
    }

    messages
}

/// Build a `ToolResultMetadata` carrying a delegated child's thread id
/// (§4.8 correlation path (a)).
pub fn child_result_metadata(thread_id: &ThreadId) -> ToolResultMetadata {
    ToolResultMetadata {
        thread_id: Some(thread_id.as_str().to_string()),
        extra: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lace_domain::config::PolicyConfig;
    use lace_providers::scripted::ScriptedProvider;
    use lace_providers::traits::ProviderResponse;
    use lace_store::MemoryThreadStore;
    use lace_tools::approval::{AlwaysDeny, ApprovalPolicy};
    use lace_tools::examples::EchoTool;
    use lace_tools::ToolRegistry;

    fn make_agent(provider: Arc<dyn Provider>) -> Agent {
        let store: Arc<dyn ThreadStore> = Arc::new(MemoryThreadStore::default());
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(EchoTool));
        let approval = Arc::new(ApprovalPolicy::new(
            PolicyConfig {
                allow_non_destructive: true,
                ..Default::default()
            },
            Arc::new(AlwaysDeny),
        ));
        let executor = Arc::new(ToolExecutor::new(registry, approval));
        let budget = Arc::new(TokenBudget::new(BudgetConfig::default()));
        let cancel_map = Arc::new(CancelMap::new());
        Agent::new(
            ThreadId::generate_today(),
            store,
            provider,
            executor,
            budget,
            cancel_map,
            RetryConfig {
                initial_delay_ms: 1,
                max_delay_ms: 2,
                max_attempts: 5,
            },
            64,
            std::env::temp_dir(),
            Some("you are a test agent".into()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn simple_turn_with_no_tools_completes() {
        let provider = Arc::new(ScriptedProvider::new("test").without_streaming());
        provider.push_response(ProviderResponse {
            content: "hello back".into(),
            ..Default::default()
        });
        let agent = make_agent(provider);

        let outcome = agent.run_turn_to_completion("hi".into()).await;
        assert_eq!(outcome.content, "hello back");
        assert!(!outcome.aborted);
        assert!(outcome.error.is_none());
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn tool_call_then_follow_up_runs_two_rounds() {
        let provider = Arc::new(ScriptedProvider::new("test").without_streaming());
        provider.push_response(ProviderResponse {
            content: "".into(),
            tool_calls: vec![lace_domain::tool::ToolCall {
                id: "c1".into(),
                name: "echo".into(),
                arguments: serde_json::json!({ "text": "ping" }),
            }],
            ..Default::default()
        });
        provider.push_response(ProviderResponse {
            content: "done".into(),
            ..Default::default()
        });
        let agent = make_agent(provider);

        let outcome = agent.run_turn_to_completion("go".into()).await;
        assert_eq!(outcome.content, "done");

        let events = agent.store.get_events(agent.thread_id()).unwrap();
        assert!(events.iter().any(|e| matches!(e.data, EventData::ToolCall { .. })));
        assert!(events.iter().any(|e| matches!(e.data, EventData::ToolResult { .. })));
    }

    #[tokio::test]
    async fn abort_on_idle_agent_is_a_no_op() {
        let provider = Arc::new(ScriptedProvider::new("test").without_streaming());
        let agent = make_agent(provider);
        assert!(!agent.abort());
    }

    #[tokio::test]
    async fn queued_message_runs_while_busy_then_is_drained() {
        let provider = Arc::new(ScriptedProvider::new("test").without_streaming());
        provider.push_response(ProviderResponse {
            content: "first".into(),
            ..Default::default()
        });
        provider.push_response(ProviderResponse {
            content: "second".into(),
            ..Default::default()
        });
        let agent = make_agent(provider);

        assert!(agent.send_message("one"));
        assert!(!agent.send_message("two")); // busy: queued instead of started

        // Give the spawned turn + drained queued turn time to finish.
        for _ in 0..50 {
            if agent.state() == AgentState::Idle && agent.queue.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let events = agent.store.get_events(agent.thread_id()).unwrap();
        let user_messages: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.data {
                EventData::UserMessage { text } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(user_messages, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn turn_ends_with_budget_exceeded_when_compaction_cannot_help() {
        let store: Arc<dyn ThreadStore> = Arc::new(MemoryThreadStore::default());
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(EchoTool));
        let approval = Arc::new(ApprovalPolicy::new(
            PolicyConfig {
                allow_non_destructive: true,
                ..Default::default()
            },
            Arc::new(AlwaysDeny),
        ));
        let executor = Arc::new(ToolExecutor::new(registry, approval));
        // Effective limit of 0 tokens: nothing ever fits, and with only a
        // system prompt + the first user message there is nothing for
        // compaction to fold away either.
        let budget = Arc::new(TokenBudget::new(BudgetConfig {
            max_tokens: 0,
            warning_threshold: 0.8,
            reserve_tokens: 0,
        }));
        let cancel_map = Arc::new(CancelMap::new());
        let provider = Arc::new(ScriptedProvider::new("test").without_streaming());
        provider.push_response(ProviderResponse {
            content: "should never be reached".into(),
            ..Default::default()
        });
        let agent = Agent::new(
            ThreadId::generate_today(),
            store,
            provider,
            executor,
            budget,
            cancel_map,
            RetryConfig {
                initial_delay_ms: 1,
                max_delay_ms: 2,
                max_attempts: 5,
            },
            64,
            std::env::temp_dir(),
            Some("you are a test agent".into()),
        )
        .unwrap();

        let outcome = agent.run_turn_to_completion("hi".into()).await;
        assert!(!outcome.aborted);
        assert_eq!(outcome.content, "");
        let error = outcome.error.expect("expected a BudgetExceeded error");
        assert!(error.contains("budget exceeded"));
        assert!(error.contains("/compact"));
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn high_priority_queued_message_jumps_ahead_of_normal_ones() {
        let provider = Arc::new(ScriptedProvider::new("test").without_streaming());
        for content in ["one", "b", "a", "c"] {
            provider.push_response(ProviderResponse {
                content: content.into(),
                ..Default::default()
            });
        }
        let agent = make_agent(provider);

        assert!(agent.send_message("one")); // starts immediately, agent goes Thinking
        assert!(!agent.send_message_with_priority("a", Priority::Normal)); // queued
        assert!(!agent.send_message_with_priority("b", Priority::High)); // queued, jumps ahead
        assert!(!agent.send_message_with_priority("c", Priority::Normal)); // queued

        for _ in 0..50 {
            if agent.state() == AgentState::Idle && agent.queue.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let events = agent.store.get_events(agent.thread_id()).unwrap();
        let user_messages: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.data {
                EventData::UserMessage { text } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(user_messages, vec!["one", "b", "a", "c"]);
    }

    #[tokio::test]
    async fn stop_is_terminal_and_rejects_further_messages() {
        let provider = Arc::new(ScriptedProvider::new("test").without_streaming());
        provider.push_response(ProviderResponse {
            content: "hello back".into(),
            ..Default::default()
        });
        let agent = make_agent(provider);

        let outcome = agent.run_turn_to_completion("hi".into()).await;
        assert_eq!(outcome.content, "hello back");
        assert_eq!(agent.state(), AgentState::Idle);

        assert!(agent.stop());
        assert_eq!(agent.state(), AgentState::Stopped);
        assert!(!agent.send_message("are you there?"));
        assert_eq!(agent.state(), AgentState::Stopped);
    }

    #[tokio::test]
    async fn repeated_stop_is_idempotent() {
        let provider = Arc::new(ScriptedProvider::new("test").without_streaming());
        let agent = make_agent(provider);
        assert!(agent.stop());
        assert!(!agent.stop());
    }
}
