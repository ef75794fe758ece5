//! `ToolExecutor` (§4.4): lookup, schema validation, approval, execution,
//! in that order. Unknown-tool and validation failures never invoke the
//! tool or the approval callback; denials never invoke the tool.

use std::sync::Arc;

use lace_domain::tool::{ToolCall, ToolDefinition, ToolResult};

use crate::approval::ApprovalPolicy;
use crate::registry::ToolRegistry;
use crate::tool_trait::ToolContext;

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    approval: Arc<ApprovalPolicy>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, approval: Arc<ApprovalPolicy>) -> Self {
        Self { registry, approval }
    }

    /// Definitions of every registered tool, for providers to advertise.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.registry.get_all_definitions()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run the full dispatch for one call. Always returns a `ToolResult` —
    /// an unknown tool, a schema violation, or a denial all surface as
    /// `is_error: true` results rather than as a Rust-level `Err`, so the
    /// agent can always feed the provider something and continue the turn.
    pub async fn execute_call(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolResult {
        let tool = match self.registry.get(&call.name) {
            Some(tool) => tool,
            None => return ToolResult::error(format!("unknown tool: {}", call.name)),
        };

        let definition = tool.definition();
        if let Err(message) = validate_arguments(&definition.input_schema, &call.arguments) {
            return ToolResult::error(format!("invalid arguments for {}: {message}", call.name));
        }

        let decision = self
            .approval
            .decide(&call.name, &call.arguments, definition.annotations)
            .await;
        if decision == crate::approval::Decision::Deny {
            return ToolResult::error(format!("approval denied for {}", call.name));
        }

        tool.execute(call.arguments.clone(), ctx).await
    }
}

fn validate_arguments(schema: &serde_json::Value, arguments: &serde_json::Value) -> Result<(), String> {
    // A schema that fails to compile is treated as permissive rather than
    // as a hard failure: it should never be possible for a malformed
    // `input_schema` to wedge every call to an otherwise-working tool.
    let Ok(validator) = jsonschema::validator_for(schema) else {
        return Ok(());
    };
    let errors: Vec<String> = validator.iter_errors(arguments).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{AlwaysDeny, ApprovalCallback, Decision};
    use crate::examples::EchoTool;
    use async_trait::async_trait;
    use lace_domain::cancel::CancelToken;
    use lace_domain::config::PolicyConfig;
    use lace_domain::ids::ThreadId;
    use serde_json::json;

    struct AlwaysAllow;
    #[async_trait]
    impl ApprovalCallback for AlwaysAllow {
        async fn decide(&self, _: &str, _: &serde_json::Value) -> Decision {
            Decision::AllowOnce
        }
    }

    fn test_ctx() -> ToolContext<'static> {
        ToolContext::new(CancelToken::new(), ThreadId::generate_today(), std::env::temp_dir())
    }

    fn executor_with(callback: Arc<dyn ApprovalCallback>) -> ToolExecutor {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(EchoTool));
        let approval = Arc::new(ApprovalPolicy::new(PolicyConfig::default(), callback));
        ToolExecutor::new(registry, approval)
    }

    #[tokio::test]
    async fn unknown_tool_errors_without_prompting_approval() {
        struct PanicsIfCalled;
        #[async_trait]
        impl ApprovalCallback for PanicsIfCalled {
            async fn decide(&self, _: &str, _: &serde_json::Value) -> Decision {
                panic!("approval must not be consulted for an unknown tool");
            }
        }
        let executor = executor_with(Arc::new(PanicsIfCalled));
        let call = ToolCall {
            id: "1".into(),
            name: "does_not_exist".into(),
            arguments: json!({}),
        };
        let result = executor.execute_call(&call, &mut test_ctx()).await;
        assert!(result.is_error);
        assert!(result.extract_all_text().contains("unknown tool"));
    }

    #[tokio::test]
    async fn schema_violation_errors_without_prompting_approval() {
        struct PanicsIfCalled;
        #[async_trait]
        impl ApprovalCallback for PanicsIfCalled {
            async fn decide(&self, _: &str, _: &serde_json::Value) -> Decision {
                panic!("approval must not be consulted for an invalid call");
            }
        }
        let executor = executor_with(Arc::new(PanicsIfCalled));
        let call = ToolCall {
            id: "1".into(),
            name: "echo".into(),
            arguments: json!({ "wrong_field": 1 }),
        };
        let result = executor.execute_call(&call, &mut test_ctx()).await;
        assert!(result.is_error);
        assert!(result.extract_all_text().contains("invalid arguments"));
    }

    #[tokio::test]
    async fn denial_errors_without_executing_the_tool() {
        let executor = executor_with(Arc::new(AlwaysDeny));
        let call = ToolCall {
            id: "1".into(),
            name: "echo".into(),
            arguments: json!({ "text": "hi" }),
        };
        let result = executor.execute_call(&call, &mut test_ctx()).await;
        assert!(result.is_error);
        assert!(result.extract_all_text().contains("approval denied"));
    }

    #[tokio::test]
    async fn approved_valid_call_executes_the_tool() {
        let executor = executor_with(Arc::new(AlwaysAllow));
        let call = ToolCall {
            id: "1".into(),
            name: "echo".into(),
            arguments: json!({ "text": "hi" }),
        };
        let result = executor.execute_call(&call, &mut test_ctx()).await;
        assert!(!result.is_error);
        assert_eq!(result.extract_all_text(), "hi");
    }
}
