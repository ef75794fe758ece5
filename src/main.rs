//! Reference host binary for the Lace conversation core.
//!
//! Binds `ThreadStore`, `Agent`, and `DelegationManager` together behind a
//! single-thread terminal REPL. Concrete provider wire formats and UI
//! rendering are deliberately outside this core's scope (§1 of the
//! specification); `DemoProvider` below stands in for whichever real
//! backend a deployment would wire up behind `--provider`/`--model`.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use parking_lot::RwLock;
use tracing_subscriber::EnvFilter;

use lace_agent::{Agent, AgentEvent, AgentState, CancelMap, DelegationConfig, DelegationManager};
use lace_budget::{BudgetConfig, TokenBudget};
use lace_domain::cancel::CancelToken;
use lace_domain::config::LaceConfig;
use lace_domain::error::LaceError;
use lace_domain::ids::ThreadId;
use lace_domain::message::{Message, Role};
use lace_domain::tool::ToolDefinition;
use lace_providers::traits::{Provider, ProviderResponse, StreamSink};
use lace_store::{JsonlThreadStore, MemoryThreadStore, ThreadStore};
use lace_tools::approval::{ApprovalCallback, ApprovalPolicy, Decision};
use lace_tools::examples::{ClockTool, EchoTool};
use lace_tools::{DelegateTool, ToolExecutor, ToolRegistry};

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Lace, a reference instance of the conversation/agent core. \
     Use tools when they help, and answer directly otherwise.";

#[derive(Parser, Debug)]
#[command(name = "lace", about = "Lace conversation core — reference CLI")]
struct Cli {
    /// Path to a TOML config file (§6). A missing file is treated as empty.
    #[arg(long, default_value = "lace.toml")]
    config: PathBuf,

    /// Root data directory for thread storage and prompt files.
    #[arg(long, default_value = ".lace")]
    data_dir: PathBuf,

    /// Resume a specific thread id instead of starting a new one.
    #[arg(long)]
    thread: Option<String>,

    /// Resume the newest thread instead of starting a new one (`continue`, §6).
    #[arg(long)]
    r#continue: bool,

    /// Use an in-memory store instead of the on-disk JSONL store.
    #[arg(long)]
    memory_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lace=info")))
        .init();

    let cli = Cli::parse();

    // ── Config ─────────────────────────────────────────────────────
    let config = LaceConfig::load_from_file(&cli.config)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            LaceConfig::default()
        })
        .apply_env_overrides();

    // ── Thread store ───────────────────────────────────────────────
    let store: Arc<dyn ThreadStore> = if cli.memory_only {
        Arc::new(MemoryThreadStore::default())
    } else {
        Arc::new(JsonlThreadStore::new(&cli.data_dir)?)
    };

    let (thread_id, resumed) = resume_or_create_thread(store.as_ref(), cli.thread.clone(), cli.r#continue)?;
    tracing::info!(%thread_id, resumed, "thread ready");

    // ── Tools ──────────────────────────────────────────────────────
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(EchoTool));
    registry.register(Arc::new(ClockTool));
    registry.register(Arc::new(DelegateTool));

    let approval = Arc::new(ApprovalPolicy::new(config.policy.clone(), Arc::new(StdinApprovalCallback)));
    let executor = Arc::new(ToolExecutor::new(registry.clone(), approval.clone()));

    // ── Provider ───────────────────────────────────────────────────
    let provider: Arc<dyn Provider> = Arc::new(DemoProvider::new(
        config.provider.clone().unwrap_or_else(|| "demo".into()),
        config.model.clone().unwrap_or_else(|| "demo-echo".into()),
        config.streaming,
    ));

    // ── Budget ─────────────────────────────────────────────────────
    let budget_config = BudgetConfig {
        max_tokens: config.max_tokens as u64,
        warning_threshold: config.warning_threshold,
        reserve_tokens: config.reserve_tokens as u64,
    };
    let budget = Arc::new(TokenBudget::new(budget_config));

    let cancel_map = Arc::new(CancelMap::new());
    let working_dir = config
        .working_directory
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    let system_prompt = load_system_prompt(&cli.data_dir)?;

    let agent = Agent::new(
        thread_id.clone(),
        store.clone(),
        provider.clone(),
        executor,
        budget,
        cancel_map.clone(),
        config.retry.clone(),
        config.queue.max_length,
        working_dir.clone(),
        Some(system_prompt),
    )?;

    // ── Delegation (§4.8) ────────────────────────────────────────────
    let delegation = DelegationManager::new(
        store.clone(),
        cancel_map,
        DelegationConfig {
            default_provider: provider,
            providers: HashMap::new(),
            tool_registry: registry,
            approval,
            budget: budget_config,
            retry: config.retry.clone(),
            queue_max_length: config.queue.max_length,
            working_dir,
            allow_recursive_delegation: false,
        },
    );
    agent.set_delegate_hook(delegation);

    // ── Event printer ──────────────────────────────────────────────
    let mut events = agent.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(event);
        }
    });

    // ── Interrupt handling (§6: exit code 130 on user interrupt) ───
    let interrupt_agent = agent.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if interrupt_agent.abort() {
                eprintln!("\n[aborted]");
            }
            std::process::exit(130);
        }
    });

    match run_repl(agent).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_repl(agent: Agent) -> Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    println!("lace reference core — type a message, /compact to compact, exit to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        if line == "/compact" {
            match agent.compact_now().await {
                Ok(()) => println!("[compacted]"),
                Err(e) => eprintln!("compact failed: {e}"),
            }
            continue;
        }

        agent.send_message(line.to_string());
        wait_for_idle(&agent).await;
    }

    Ok(())
}

async fn wait_for_idle(agent: &Agent) {
    while agent.state() != AgentState::Idle {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn print_event(event: AgentEvent) {
    match event {
        AgentEvent::AgentToken { token } => {
            print!("{token}");
            std::io::stdout().flush().ok();
        }
        AgentEvent::ToolCallStart { call } => {
            println!("\n[tool] {} {}", call.name, call.arguments);
        }
        AgentEvent::ToolCallComplete { call_id, result } => {
            let status = if result.is_error { "error" } else { "ok" };
            println!("[tool:{status}] {call_id}: {}", result.extract_all_text());
        }
        AgentEvent::TurnComplete { metrics } => {
            println!(
                "\n[turn complete in {}ms, tokens in={} out={}]",
                metrics.elapsed_ms, metrics.tokens_in, metrics.tokens_out
            );
        }
        AgentEvent::TurnAborted { .. } => println!("\n[turn aborted]"),
        AgentEvent::Error { message } => println!("\n[error] {message}"),
        AgentEvent::TokenBudgetWarning { message } => println!("\n[budget] {message}"),
        _ => {}
    }
}

/// `resumeOrCreateThread` (§6): deterministic resume-or-create over the
/// store, plus `continue`'s "resume the newest thread" behaviour.
fn resume_or_create_thread(
    store: &dyn ThreadStore,
    requested: Option<String>,
    continue_newest: bool,
) -> Result<(ThreadId, bool)> {
    if continue_newest {
        let newest = store.list_threads()?.into_iter().max_by_key(|t| t.created_at);
        return Ok(match newest {
            Some(meta) => {
                store.create_thread(&meta.id, meta.parent_session_id.clone())?;
                (meta.id, true)
            }
            None => {
                let id = ThreadId::generate_today();
                store.create_thread(&id, None)?;
                (id, false)
            }
        });
    }

    if let Some(raw) = requested {
        let id = ThreadId::parse(raw)?;
        let existed = store.get_thread(&id)?.is_some();
        store.create_thread(&id, None)?;
        return Ok((id, existed));
    }

    let id = ThreadId::generate_today();
    store.create_thread(&id, None)?;
    Ok((id, false))
}

/// System-prompt file layout (§6): two documents, created with defaults
/// if missing; empty after whitespace-trim counts as absent.
fn load_system_prompt(data_dir: &std::path::Path) -> Result<String> {
    std::fs::create_dir_all(data_dir)?;
    let system = read_or_init(&data_dir.join("system-prompt"), DEFAULT_SYSTEM_PROMPT)?;
    let instructions = read_or_init(&data_dir.join("user-instructions"), "")?;

    let mut prompt = system;
    if !instructions.trim().is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(instructions.trim());
    }
    Ok(prompt)
}

fn read_or_init(path: &std::path::Path, default: &str) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::write(path, default)?;
            Ok(default.to_string())
        }
        Err(e) => Err(e.into()),
    }
}

/// Terminal-prompt `ApprovalCallback` (§4.5 step 8): blocks on a stdin
/// line, interpreted as yes / session / no.
struct StdinApprovalCallback;

#[async_trait]
impl ApprovalCallback for StdinApprovalCallback {
    async fn decide(&self, tool_name: &str, args: &serde_json::Value) -> Decision {
        let tool_name = tool_name.to_string();
        let args = args.clone();
        tokio::task::spawn_blocking(move || {
            eprint!("approve {tool_name}({args})? [y]es / [s]ession / [N]o: ");
            std::io::stderr().flush().ok();
            let mut input = String::new();
            if std::io::stdin().read_line(&mut input).is_err() {
                return Decision::Deny;
            }
            match input.trim().to_lowercase().as_str() {
                "y" | "yes" => Decision::AllowOnce,
                "s" | "session" => Decision::AllowSession,
                _ => Decision::Deny,
            }
        })
        .await
        .unwrap_or(Decision::Deny)
    }
}

/// Stand-in `Provider` (§4.3) for whichever concrete backend a real
/// deployment wires up. Echoes the latest user message back, optionally
/// word-at-a-time through the streaming sink, so the rest of the core
/// (turn loop, budget, tool dispatch, delegation) has something to run
/// against without a network call or an API key.
struct DemoProvider {
    name: String,
    default_model: String,
    streaming: bool,
    system_prompt: RwLock<Option<String>>,
}

impl DemoProvider {
    fn new(name: String, default_model: String, streaming: bool) -> Self {
        Self {
            name,
            default_model,
            streaming,
            system_prompt: RwLock::new(None),
        }
    }

    fn respond_to(&self, messages: &[Message]) -> String {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.extract_all_text());
        match last_user {
            Some(text) => format!("(demo) you said: {text}"),
            None => "(demo) hello".to_string(),
        }
    }
}

#[async_trait]
impl Provider for DemoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn create_response(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _cancel: &CancelToken,
    ) -> lace_domain::error::Result<ProviderResponse> {
        Ok(ProviderResponse {
            content: self.respond_to(messages),
            ..Default::default()
        })
    }

    async fn create_streaming_response(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        cancel: &CancelToken,
        sink: &mut dyn StreamSink,
    ) -> lace_domain::error::Result<ProviderResponse> {
        let content = self.respond_to(messages);
        for word in content.split_inclusive(' ') {
            if cancel.is_cancelled() {
                return Err(LaceError::Cancelled);
            }
            sink.on_token(word);
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        Ok(ProviderResponse {
            content,
            ..Default::default()
        })
    }

    fn set_system_prompt(&self, text: &str) {
        *self.system_prompt.write() = Some(text.to_string());
    }
}
