//! Two reference tools that exist only to demonstrate the contract — an
//! echo tool and a read-only clock — not a tool library. Anything a real
//! deployment needs (shell exec, file edits, process management) is
//! outside this core's scope; wire it up against [`crate::tool_trait::Tool`]
//! the way these two do.

use async_trait::async_trait;
use serde_json::json;

use lace_domain::tool::{ToolAnnotations, ToolDefinition, ToolResult};

use crate::tool_trait::{Tool, ToolContext};

/// Echoes its `text` argument back. Used in tests and demos to exercise
/// the full dispatch path without touching the outside world.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".into(),
            description: "Echo the given text back unchanged.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"],
                "additionalProperties": false
            }),
            annotations: ToolAnnotations {
                read_only_hint: true,
                idempotent_hint: true,
                ..Default::default()
            },
        }
    }

    async fn execute(&self, args: serde_json::Value, _ctx: &mut ToolContext<'_>) -> ToolResult {
        match args.get("text").and_then(|v| v.as_str()) {
            Some(text) => ToolResult::text(text),
            None => ToolResult::error("missing required argument: text"),
        }
    }
}

/// Reports the current UTC time. Read-only and not open-world (it never
/// reaches outside the process), so it qualifies for the
/// `allowNonDestructive` approval shortcut.
pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "clock".into(),
            description: "Return the current UTC time in RFC 3339 format.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
            annotations: ToolAnnotations {
                read_only_hint: true,
                idempotent_hint: false,
                ..Default::default()
            },
        }
    }

    async fn execute(&self, _args: serde_json::Value, _ctx: &mut ToolContext<'_>) -> ToolResult {
        ToolResult::text(chrono::Utc::now().to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lace_domain::cancel::CancelToken;
    use lace_domain::ids::ThreadId;

    fn ctx() -> (ThreadId, std::path::PathBuf) {
        (ThreadId::generate_today(), std::env::temp_dir())
    }

    #[tokio::test]
    async fn echo_returns_its_text() {
        let (thread_id, dir) = ctx();
        let mut ctx = ToolContext::new(CancelToken::new(), thread_id, dir);
        let result = EchoTool.execute(json!({ "text": "hi" }), &mut ctx).await;
        assert!(!result.is_error);
        assert_eq!(result.extract_all_text(), "hi");
    }

    #[tokio::test]
    async fn echo_without_text_is_an_error() {
        let (thread_id, dir) = ctx();
        let mut ctx = ToolContext::new(CancelToken::new(), thread_id, dir);
        let result = EchoTool.execute(json!({}), &mut ctx).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn clock_is_read_only_and_not_idempotent() {
        let def = ClockTool.definition();
        assert!(def.annotations.read_only_hint);
        assert!(!def.annotations.idempotent_hint);
    }

    #[tokio::test]
    async fn clock_returns_parseable_rfc3339() {
        let (thread_id, dir) = ctx();
        let mut ctx = ToolContext::new(CancelToken::new(), thread_id, dir);
        let result = ClockTool.execute(json!({}), &mut ctx).await;
        assert!(!result.is_error);
        assert!(chrono::DateTime::parse_from_rfc3339(&result.extract_all_text()).is_ok());
    }
}
