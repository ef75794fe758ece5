//! The provider contract (§4.3): a uniform request/response and streaming
//! interface over model backends, the retry policy layered over it, and
//! `ScriptedProvider`, the fake backend the rest of the workspace tests
//! against in place of a concrete Anthropic/OpenAI/Ollama adapter.

pub mod retry;
pub mod scripted;
pub mod traits;

pub use scripted::ScriptedProvider;
pub use traits::{Provider, ProviderResponse, StreamSink};
