use serde::{Deserialize, Serialize};

/// Token usage for a completion, as reported by a provider call (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
