//! Proactive token accounting for a turn's provider context.
//!
//! `TokenBudget` is a distinct concern from a daily cost/token quota: it
//! tracks *this turn's* running headroom against a context window, not
//! calendar-day spend. The counter shape — a `parking_lot::RwLock`-guarded
//! struct with a reset-and-recompute read path — mirrors the teacher's
//! `QuotaTracker`, keyed here by nothing but the budget's own lifetime
//! rather than by UTC day.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use lace_domain::message::Message;

/// `{maxTokens, warningThreshold, reserveTokens}` from the specification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub max_tokens: u64,
    /// Fraction of `max_tokens`, in `(0, 1]`, past which `is_near_limit` holds.
    pub warning_threshold: f64,
    pub reserve_tokens: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: 100_000,
            warning_threshold: 0.8,
            reserve_tokens: 2_000,
        }
    }
}

impl BudgetConfig {
    /// `maxTokens - reserveTokens`, the ceiling `canMakeRequest` checks
    /// against.
    pub fn effective_limit(&self) -> u64 {
        self.max_tokens.saturating_sub(self.reserve_tokens)
    }
}

/// Usage reported by a provider call, as handed to [`TokenBudget::record`].
/// Signed so that a caller passing a bogus negative value (a provider bug,
/// or a manual correction) is ignored rather than underflowing the total.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

/// What the agent should do right now, per §4.2's tie-break policy:
/// compaction before truncation, truncation of the oldest events before
/// dropping recent ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendations {
    pub should_summarise: bool,
    pub should_prune: bool,
    pub max_request_size: u64,
    pub warning_message: Option<String>,
}

#[derive(Debug, Default)]
struct Totals {
    prompt: u64,
    completion: u64,
}

impl Totals {
    fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

/// Running per-turn token account. Shared across an agent's lifetime;
/// `reset` is called at compaction or whenever the caller wants a fresh
/// window (e.g. a new thread).
pub struct TokenBudget {
    config: RwLock<BudgetConfig>,
    used: RwLock<Totals>,
}

impl TokenBudget {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config: RwLock::new(config),
            used: RwLock::new(Totals::default()),
        }
    }

    pub fn config(&self) -> BudgetConfig {
        *self.config.read()
    }

    pub fn update_config(&self, config: BudgetConfig) {
        *self.config.write() = config;
    }

    /// Record usage from a completed provider call. Negative components are
    /// ignored entirely (neither added nor subtracted); the running totals
    /// are never allowed below zero.
    pub fn record(&self, usage: TurnUsage) {
        let mut used = self.used.write();
        if usage.prompt_tokens > 0 {
            used.prompt = used.prompt.saturating_add(usage.prompt_tokens as u64);
        }
        if usage.completion_tokens > 0 {
            used.completion = used
                .completion
                .saturating_add(usage.completion_tokens as u64);
        }
    }

    /// Total tokens recorded so far (prompt + completion), clamped at 0 by
    /// construction.
    pub fn total_used(&self) -> u64 {
        self.used.read().total()
    }

    pub fn prompt_used(&self) -> u64 {
        self.used.read().prompt
    }

    pub fn completion_used(&self) -> u64 {
        self.used.read().completion
    }

    /// `true` iff `used + estimated <= effectiveLimit`.
    pub fn can_make_request(&self, estimated_tokens: u64) -> bool {
        let used = self.total_used();
        let limit = self.config.read().effective_limit();
        used.saturating_add(estimated_tokens) <= limit
    }

    /// `true` iff `used >= warningThreshold * maxTokens`.
    pub fn is_near_limit(&self) -> bool {
        let cfg = self.config.read();
        let threshold = (cfg.max_tokens as f64 * cfg.warning_threshold).floor() as u64;
        self.total_used() >= threshold
    }

    /// Conservative character-based estimate (~4 chars/token), used when a
    /// provider has not yet reported real counts for this request.
    pub fn estimate(messages: &[Message]) -> u64 {
        let chars: usize = messages
            .iter()
            .map(|m| m.content.extract_all_text().chars().count())
            .sum();
        // Round up so estimates never silently under-count.
        ((chars as u64) + 3) / 4
    }

    pub fn recommendations(&self) -> Recommendations {
        let cfg = self.config.read();
        let used = self.total_used();
        let limit = cfg.effective_limit();
        let near = self.is_near_limit();
        let over = used > limit;

        let warning_message = if over {
            Some(format!(
                "token budget exceeded ({used}/{limit} tokens); run /compact"
            ))
        } else if near {
            Some(format!(
                "approaching token budget ({used}/{} tokens, {:.0}% threshold)",
                cfg.max_tokens,
                cfg.warning_threshold * 100.0
            ))
        } else {
            None
        };

        Recommendations {
            should_summarise: over || near,
            should_prune: over,
            max_request_size: limit.saturating_sub(used),
            warning_message,
        }
    }

    /// Zero the running totals. Used after compaction replaces the
    /// projected prefix, or when starting a fresh window.
    pub fn reset(&self) {
        *self.used.write() = Totals::default();
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}
