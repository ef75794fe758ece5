//! Name-keyed tool registry. A `HashMap<String, Arc<dyn Tool>>` behind a
//! `parking_lot::RwLock`, matching the teacher's registry shapes elsewhere
//! (`ProviderRegistry`, `AgentManager`): dynamic discovery by string name
//! maps onto a table, not onto runtime trait-object loading machinery.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use lace_domain::tool::ToolDefinition;

use crate::tool_trait::Tool;

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        self.tools.write().insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn get_all_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.read().values().cloned().collect()
    }

    pub fn get_all_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.read().values().map(|t| t.definition()).collect()
    }

    /// Definitions filtered to tools matching a predicate over their
    /// annotations (e.g. `|a| a.read_only_hint`).
    pub fn filter_by(&self, pred: impl Fn(&lace_domain::tool::ToolAnnotations) -> bool) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .values()
            .map(|t| t.definition())
            .filter(|d| pred(&d.annotations))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}
