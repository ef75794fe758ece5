//! Shared error taxonomy used across all Lace crates.

/// Every failure mode the conversation core can surface.
///
/// Each variant corresponds to one kind in the error-handling design: the
/// variant itself fixes how a caller must react (retry, record as a tool
/// result, end the turn, ...); see the handling note on each.
#[derive(thiserror::Error, Debug)]
pub enum LaceError {
    /// Bad tool arguments, bad schema, malformed config. Never retried.
    #[error("validation: {0}")]
    Validation(String),

    /// Policy or user denied a tool call. Turn continues.
    #[error("approval denied: {0}")]
    ApprovalDenied(String),

    /// A tool ran and failed. Provider is told via a `TOOL_RESULT`.
    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    /// Network / 5xx / 429 from a provider. Retried per the provider's
    /// retry policy.
    #[error("provider transient error: {0}")]
    ProviderTransient(String),

    /// Auth, hard quota, or malformed response from a provider. Ends the
    /// turn with an `error` event.
    #[error("provider fatal error: {0}")]
    ProviderFatal(String),

    /// User abort or deadline. Ends the turn with `turn_aborted`, never
    /// surfaced as an `error` event.
    #[error("cancelled")]
    Cancelled,

    /// A ThreadStore write failed. Fatal to the turn in progress.
    #[error("storage error: {0}")]
    Storage(String),

    /// Budget could not be satisfied even after compaction/truncation.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl LaceError {
    /// True for errors the provider retry policy should act on.
    pub fn is_retriable(&self) -> bool {
        matches!(self, LaceError::ProviderTransient(_))
    }
}

pub type Result<T> = std::result::Result<T, LaceError>;
