//! The tool contract: discovery metadata, call/result shapes, and
//! approval-relevant annotations. Concrete tool bodies live in
//! `lace-tools`; this crate only fixes the wire shapes they share with
//! providers and the event log.

use serde::{Deserialize, Serialize};

/// Declarative tool metadata advertised to a provider and consulted by
/// the approval policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema document describing `arguments`.
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub annotations: ToolAnnotations,
}

/// Hints the approval policy and UIs use to decide how much to trust a
/// tool without a human in the loop.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ToolAnnotations {
    #[serde(default)]
    pub read_only_hint: bool,
    #[serde(default)]
    pub destructive_hint: bool,
    #[serde(default)]
    pub idempotent_hint: bool,
    #[serde(default)]
    pub open_world_hint: bool,
    /// Bypasses approval unconditionally (step 1 of the approval
    /// precedence chain). Reserved for tools the core itself trusts,
    /// such as `delegate`.
    #[serde(default)]
    pub safe_internal: bool,
}

/// A tool invocation requested by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One block of a tool result's content. Kept as a closed enum (mirrors
/// the single `Text` case the core needs; tool authors that want richer
/// content still only emit text here, since rendering belongs to the UI
/// layer this core does not own).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolResultContent {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Free-form metadata attached to a tool result. `thread_id` is how
/// delegation correlates a child thread back to the parent's result
/// (§4.8, correlation path (a)).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResultMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ToolResultContent>,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ToolResultMetadata>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultContent::Text { text: text.into() }],
            is_error: false,
            metadata: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultContent::Text { text: text.into() }],
            is_error: true,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ToolResultMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Join all `Text` blocks with `"\n"`, for logging/previews.
    pub fn extract_all_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolResultContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_result_sets_is_error() {
        let r = ToolResult::error("boom");
        assert!(r.is_error);
        assert_eq!(r.extract_all_text(), "boom");
    }

    #[test]
    fn text_result_is_not_error() {
        let r = ToolResult::text("ok");
        assert!(!r.is_error);
    }

    #[test]
    fn metadata_round_trips_thread_id() {
        let r = ToolResult::text("4").with_metadata(ToolResultMetadata {
            thread_id: Some("lace_20250101_aaaaaa.1".into()),
            extra: Default::default(),
        });
        let json = serde_json::to_string(&r).unwrap();
        let back: ToolResult = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.metadata.unwrap().thread_id.as_deref(),
            Some("lace_20250101_aaaaaa.1")
        );
    }
}
