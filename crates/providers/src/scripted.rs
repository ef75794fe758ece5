//! `ScriptedProvider`: a `Provider` driven by a pre-programmed script of
//! responses and errors, with no network calls. It is both the reference
//! implementation of the contract §4.3 asks every adapter to honour, and
//! the harness the top-level test suite uses for the six end-to-end
//! scenarios in §8 — grounded on the teacher's pattern of testing
//! `turn.rs`-adjacent logic through pure helper functions rather than a
//! mocking framework.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use lace_domain::cancel::CancelToken;
use lace_domain::error::{LaceError, Result};
use lace_domain::message::Message;
use lace_domain::tool::ToolDefinition;

use crate::traits::{Provider, ProviderResponse, StreamSink};

/// One scripted outcome for a single call to `create_response` /
/// `create_streaming_response`.
pub enum ScriptedStep {
    Ok(ProviderResponse),
    Err(LaceError),
}

pub struct ScriptedProvider {
    name: String,
    default_model: String,
    streaming: bool,
    script: Mutex<VecDeque<ScriptedStep>>,
    system_prompt: Mutex<Option<String>>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_model: "scripted-model".into(),
            streaming: true,
            script: Mutex::new(VecDeque::new()),
            system_prompt: Mutex::new(None),
        }
    }

    pub fn without_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    /// Queue a successful response to be returned by the next call.
    pub fn push_response(&self, response: ProviderResponse) -> &Self {
        self.script.lock().push_back(ScriptedStep::Ok(response));
        self
    }

    /// Queue an error to be returned by the next call.
    pub fn push_error(&self, error: LaceError) -> &Self {
        self.script.lock().push_back(ScriptedStep::Err(error));
        self
    }

    pub fn system_prompt(&self) -> Option<String> {
        self.system_prompt.lock().clone()
    }

    fn next_step(&self) -> Result<ProviderResponse> {
        match self.script.lock().pop_front() {
            Some(ScriptedStep::Ok(resp)) => Ok(resp),
            Some(ScriptedStep::Err(err)) => Err(err),
            None => Err(LaceError::ProviderFatal(
                "ScriptedProvider: script exhausted".into(),
            )),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
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
        _messages: &[Message],
        _tools: &[ToolDefinition],
        cancel: &CancelToken,
    ) -> Result<ProviderResponse> {
        if cancel.is_cancelled() {
            return Err(LaceError::Cancelled);
        }
        self.next_step()
    }

    async fn create_streaming_response(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        cancel: &CancelToken,
        sink: &mut dyn StreamSink,
    ) -> Result<ProviderResponse> {
        if cancel.is_cancelled() {
            return Err(LaceError::Cancelled);
        }
        let response = self.next_step()?;
        for word in response.content.split_inclusive(' ') {
            if cancel.is_cancelled() {
                return Err(LaceError::Cancelled);
            }
            sink.on_token(word);
        }
        Ok(response)
    }

    fn set_system_prompt(&self, text: &str) {
        *self.system_prompt.lock() = Some(text.to_string());
    }
}
