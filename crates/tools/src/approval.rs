//! Approval policy (§4.5): a deterministic decision function layered over
//! an interactive callback, with per-session caching.
//!
//! The teacher's exec-approval gate
//! (`gateway::runtime::approval::ApprovalStore`) is a narrower,
//! single-purpose `oneshot`-channel pending-approval table keyed by
//! `Uuid` with a configurable timeout. The eight-step precedence chain
//! below has no teacher analog and is built fresh as a pure decision
//! function; [`OneshotApprovalCallback`] reuses the teacher's
//! `oneshot`/`PendingApproval` shape verbatim as the concrete interactive
//! callback used at step 8.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use lace_domain::config::PolicyConfig;
use lace_domain::tool::ToolAnnotations;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    AllowOnce,
    AllowSession,
    Deny,
}

/// The user-facing callback consulted at step 8 once no earlier rule has
/// decided. Implementors may prompt a terminal, a web UI, or anything
/// else; this core only depends on the contract.
#[async_trait]
pub trait ApprovalCallback: Send + Sync {
    async fn decide(&self, tool_name: &str, args: &serde_json::Value) -> Decision;
}

/// A callback that always denies — useful as a safe default when no UI is
/// wired up (e.g. non-interactive batch runs).
pub struct AlwaysDeny;

#[async_trait]
impl ApprovalCallback for AlwaysDeny {
    async fn decide(&self, _tool_name: &str, _args: &serde_json::Value) -> Decision {
        Decision::Deny
    }
}

/// The eight-step decision function plus a per-agent session cache.
pub struct ApprovalPolicy {
    policy: PolicyConfig,
    callback: std::sync::Arc<dyn ApprovalCallback>,
    session_cache: RwLock<HashMap<String, Decision>>,
}

impl ApprovalPolicy {
    pub fn new(policy: PolicyConfig, callback: std::sync::Arc<dyn ApprovalCallback>) -> Self {
        Self {
            policy,
            callback,
            session_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Run the precedence chain in §4.5, first match wins. `allowOnce` and
    /// `deny` are never cached; only an `allowSession` answer (from the
    /// auto-approve list, from a cached previous decision, or from the
    /// callback) is remembered.
    pub async fn decide(
        &self,
        tool_name: &str,
        args: &serde_json::Value,
        annotations: ToolAnnotations,
    ) -> Decision {
        if annotations.safe_internal {
            return Decision::AllowOnce;
        }
        if self.policy.disable_all_tools {
            return Decision::Deny;
        }
        if self.policy.disable_tools.iter().any(|t| t == tool_name) {
            return Decision::Deny;
        }
        if self.policy.disable_all_guardrails {
            return Decision::AllowOnce;
        }
        if self.policy.auto_approve_tools.iter().any(|t| t == tool_name) {
            return Decision::AllowOnce;
        }
        if self.policy.allow_non_destructive
            && annotations.read_only_hint
            && !annotations.open_world_hint
        {
            return Decision::AllowOnce;
        }
        if let Some(cached) = self.session_cache.read().get(tool_name) {
            if *cached == Decision::AllowSession {
                return Decision::AllowSession;
            }
        }

        let decision = self.callback.decide(tool_name, args).await;
        if decision == Decision::AllowSession {
            self.session_cache
                .write()
                .insert(tool_name.to_string(), Decision::AllowSession);
        }
        decision
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OneshotApprovalCallback — the teacher's ApprovalStore, adapted
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub enum HumanDecision {
    Approved,
    ApprovedForSession,
    Denied { reason: Option<String> },
}

pub struct PendingApproval {
    pub id: Uuid,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub respond: oneshot::Sender<HumanDecision>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalInfo {
    pub id: Uuid,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<&PendingApproval> for ApprovalInfo {
    fn from(p: &PendingApproval) -> Self {
        Self {
            id: p.id,
            tool_name: p.tool_name.clone(),
            arguments: p.arguments.clone(),
            created_at: p.created_at,
        }
    }
}

/// Thread-safe store for pending human approvals, each resolved through a
/// `oneshot::Sender`/`Receiver` pair. `OneshotApprovalCallback::decide`
/// inserts a pending entry and awaits its resolution (or the configured
/// timeout, treated as a deny).
pub struct ApprovalStore {
    pending: RwLock<HashMap<Uuid, PendingApproval>>,
    timeout: Duration,
}

impl ApprovalStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn insert(&self, approval: PendingApproval) -> ApprovalInfo {
        let info = ApprovalInfo::from(&approval);
        self.pending.write().insert(approval.id, approval);
        info
    }

    pub fn approve(&self, id: &Uuid, for_session: bool) -> bool {
        if let Some(pending) = self.pending.write().remove(id) {
            let decision = if for_session {
                HumanDecision::ApprovedForSession
            } else {
                HumanDecision::Approved
            };
            let _ = pending.respond.send(decision);
            return true;
        }
        false
    }

    pub fn deny(&self, id: &Uuid, reason: Option<String>) -> bool {
        if let Some(pending) = self.pending.write().remove(id) {
            let _ = pending.respond.send(HumanDecision::Denied { reason });
            return true;
        }
        false
    }

    pub fn list_pending(&self) -> Vec<ApprovalInfo> {
        self.pending.read().values().map(ApprovalInfo::from).collect()
    }
}

pub struct OneshotApprovalCallback {
    store: std::sync::Arc<ApprovalStore>,
}

impl OneshotApprovalCallback {
    pub fn new(store: std::sync::Arc<ApprovalStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ApprovalCallback for OneshotApprovalCallback {
    async fn decide(&self, tool_name: &str, args: &serde_json::Value) -> Decision {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        self.store.insert(PendingApproval {
            id,
            tool_name: tool_name.to_string(),
            arguments: args.clone(),
            created_at: Utc::now(),
            respond: tx,
        });

        match tokio::time::timeout(self.store.timeout(), rx).await {
            Ok(Ok(HumanDecision::Approved)) => Decision::AllowOnce,
            Ok(Ok(HumanDecision::ApprovedForSession)) => Decision::AllowSession,
            Ok(Ok(HumanDecision::Denied { .. })) => Decision::Deny,
            Ok(Err(_)) | Err(_) => {
                self.store.remove_expired(&id);
                Decision::Deny
            }
        }
    }
}

impl ApprovalStore {
    pub fn remove_expired(&self, id: &Uuid) {
        self.pending.write().remove(id);
    }
}
