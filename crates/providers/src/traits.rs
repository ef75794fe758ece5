//! The provider contract (§4.3): a uniform request/response and streaming
//! interface over model backends, independent of any concrete wire format.
//! Concrete adapters (Anthropic/OpenAI/etc.) are out of scope for this
//! core; only the contract and a scriptable reference implementation
//! ([`crate::scripted::ScriptedProvider`]) live here.
//!
//! Shape follows the teacher's `LlmProvider` (`#[async_trait] pub trait
//! LlmProvider: Send + Sync`), generalised to the spec's streaming sink
//! and retry-aware call signature.

use async_trait::async_trait;

use lace_domain::cancel::CancelToken;
use lace_domain::error::Result;
use lace_domain::stream::Usage;
use lace_domain::tool::{ToolCall, ToolDefinition};

/// A sink the provider writes token fragments to while streaming. Modeled
/// as an explicit callback rather than a channel so providers stay
/// agnostic to how the caller buffers or forwards fragments.
pub trait StreamSink: Send {
    fn on_token(&mut self, token: &str);
}

impl<F: FnMut(&str) + Send> StreamSink for F {
    fn on_token(&mut self, token: &str) {
        (self)(token)
    }
}

/// A provider-agnostic chat completion response (§4.3).
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
}

/// Trait every model backend adapter implements. Methods take borrowed
/// inputs to match the call-site shape the turn loop actually uses: the
/// agent owns the message list it projects from the thread's event log
/// and only lends it to the provider for the duration of one call.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn supports_streaming(&self) -> bool;

    async fn create_response(
        &self,
        messages: &[lace_domain::message::Message],
        tools: &[ToolDefinition],
        cancel: &CancelToken,
    ) -> Result<ProviderResponse>;

    /// Stream a response, writing fragments to `sink` as they arrive.
    /// Returns the same aggregate `ProviderResponse` a non-streaming call
    /// would, once the stream completes.
    async fn create_streaming_response(
        &self,
        messages: &[lace_domain::message::Message],
        tools: &[ToolDefinition],
        cancel: &CancelToken,
        sink: &mut dyn StreamSink,
    ) -> Result<ProviderResponse>;

    /// Set the system prompt used by subsequent calls. Providers with no
    /// dedicated system channel may fold this into the message list
    /// themselves; callers never need to know which.
    fn set_system_prompt(&self, text: &str);

    /// Best-effort token count for a would-be request. `None` when the
    /// provider cannot count without making a call (the caller falls back
    /// to `TokenBudget::estimate`).
    fn count_tokens(&self, _messages: &[lace_domain::message::Message], _tools: &[ToolDefinition]) -> Option<u32> {
        None
    }
}
