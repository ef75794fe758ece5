//! End-to-end turn scenarios (§8) exercised against the full `Agent`
//! rather than its internal unit tests, using a provider slow enough to
//! make `abort()` mid-turn meaningful.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use lace_agent::{Agent, AgentState, CancelMap};
use lace_budget::{BudgetConfig, TokenBudget};
use lace_domain::cancel::CancelToken;
use lace_domain::config::{PolicyConfig, RetryConfig};
use lace_domain::ids::ThreadId;
use lace_domain::message::Message;
use lace_domain::tool::ToolDefinition;
use lace_providers::traits::{Provider, ProviderResponse, StreamSink};
use lace_store::{MemoryThreadStore, ThreadStore};
use lace_tools::approval::AlwaysDeny;
use lace_tools::{ApprovalPolicy, ToolExecutor, ToolRegistry};

/// A provider whose `create_response` sleeps before answering, long
/// enough for a test to call `abort()` while the turn is still in flight.
struct SlowProvider {
    delay: Duration,
}

#[async_trait]
impl Provider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }
    fn default_model(&self) -> &str {
        "slow-model"
    }
    fn supports_streaming(&self) -> bool {
        false
    }

    async fn create_response(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        cancel: &CancelToken,
    ) -> lace_domain::error::Result<ProviderResponse> {
        let ticks = self.delay.as_millis() / 5;
        for _ in 0..ticks.max(1) {
            if cancel.is_cancelled() {
                return Err(lace_domain::error::LaceError::Cancelled);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(ProviderResponse {
            content: "too slow to matter".into(),
            ..Default::default()
        })
    }

    async fn create_streaming_response(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: &CancelToken,
        _sink: &mut dyn StreamSink,
    ) -> lace_domain::error::Result<ProviderResponse> {
        self.create_response(messages, tools, cancel).await
    }

    fn set_system_prompt(&self, _text: &str) {}
}

fn make_agent(provider: Arc<dyn Provider>) -> Agent {
    let store: Arc<dyn ThreadStore> = Arc::new(MemoryThreadStore::default());
    let registry = Arc::new(ToolRegistry::new());
    let approval = Arc::new(ApprovalPolicy::new(PolicyConfig::default(), Arc::new(AlwaysDeny)));
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
            max_attempts: 3,
        },
        64,
        std::env::temp_dir(),
        Some("test agent".into()),
    )
    .unwrap()
}

/// §8 scenario 3: abort mid-turn yields `turn_aborted`, never
/// `turn_complete`, and leaves the agent `idle`.
#[tokio::test]
async fn abort_mid_turn_yields_turn_aborted_not_turn_complete() {
    let provider = Arc::new(SlowProvider {
        delay: Duration::from_millis(200),
    });
    let agent = make_agent(provider);
    let mut events = agent.subscribe();

    assert!(agent.send_message("hi"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(agent.abort());

    let mut saw_aborted = false;
    let mut saw_complete = false;
    let mut saw_error = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(50), events.recv()).await {
            Ok(Ok(lace_agent::AgentEvent::TurnAborted { .. })) => saw_aborted = true,
            Ok(Ok(lace_agent::AgentEvent::TurnComplete { .. })) => saw_complete = true,
            Ok(Ok(lace_agent::AgentEvent::Error { .. })) => saw_error = true,
            Ok(Ok(_)) => {}
            Ok(Err(_)) => break,
            Err(_) => {
                if agent.state() == AgentState::Idle {
                    break;
                }
            }
        }
    }

    assert!(saw_aborted, "expected a turn_aborted event");
    assert!(!saw_complete, "must not emit turn_complete for an aborted turn");
    assert!(!saw_error, "cancellation must never surface as an error event");
    assert_eq!(agent.state(), AgentState::Idle);
}

/// Calling `abort()` twice on an idle agent behaves identically both
/// times (§8 idempotence property).
#[tokio::test]
async fn repeated_abort_on_idle_agent_is_idempotent() {
    let provider = Arc::new(SlowProvider {
        delay: Duration::from_millis(10),
    });
    let agent = make_agent(provider);
    assert!(!agent.abort());
    assert!(!agent.abort());
}
