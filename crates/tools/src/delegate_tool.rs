//! The reserved `delegate` tool (§4.8). Its body does almost nothing: the
//! actual work of spinning up a child agent belongs to whatever
//! `DelegateHook` the host wires into [`crate::tool_trait::ToolContext`]
//! (`lace-agent::delegation::DelegationManager` in this workspace). This
//! tool only validates arguments and forwards them through the hook, so a
//! context with no hook attached (e.g. a grandchild with recursion
//! disabled) fails closed with an error result rather than panicking.

use async_trait::async_trait;
use serde_json::json;

use lace_domain::tool::{ToolAnnotations, ToolDefinition, ToolResult};

use crate::tool_trait::{Tool, ToolContext};

pub struct DelegateTool;

#[async_trait]
impl Tool for DelegateTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "delegate".into(),
            description: "Delegate a task to a child agent running on its own thread, \
                           optionally on a different provider/model."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task": { "type": "string" },
                    "provider": { "type": "string" },
                    "model": { "type": "string" }
                },
                "required": ["task"],
                "additionalProperties": false
            }),
            // Step 1 of the approval precedence chain (§4.5): the core
            // itself decides whether to delegate, not the approval policy.
            annotations: ToolAnnotations {
                safe_internal: true,
                ..Default::default()
            },
        }
    }

    async fn execute(&self, args: serde_json::Value, ctx: &mut ToolContext<'_>) -> ToolResult {
        let Some(task) = args.get("task").and_then(|v| v.as_str()) else {
            return ToolResult::error("missing required argument: task");
        };
        let provider = args.get("provider").and_then(|v| v.as_str()).map(String::from);
        let model = args.get("model").and_then(|v| v.as_str()).map(String::from);

        match ctx.delegate_hook.clone() {
            Some(hook) => {
                hook.delegate(task.to_string(), provider, model, &ctx.thread_id, &ctx.cancel)
                    .await
            }
            None => ToolResult::error("delegation is not available in this context"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lace_domain::cancel::CancelToken;
    use lace_domain::ids::ThreadId;

    #[tokio::test]
    async fn missing_task_is_a_validation_error() {
        let mut ctx = ToolContext::new(CancelToken::new(), ThreadId::generate_today(), std::env::temp_dir());
        let result = DelegateTool.execute(json!({}), &mut ctx).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn no_hook_attached_fails_closed() {
        let mut ctx = ToolContext::new(CancelToken::new(), ThreadId::generate_today(), std::env::temp_dir());
        let result = DelegateTool.execute(json!({ "task": "sum 2+2" }), &mut ctx).await;
        assert!(result.is_error);
        assert!(result.extract_all_text().contains("not available"));
    }

    #[test]
    fn definition_is_safe_internal() {
        assert!(DelegateTool.definition().annotations.safe_internal);
    }
}
