//! Tool registry: central index of registered tools.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use trellis_core::messages::ToolDescriptor;

use crate::errors::ToolError;
use crate::traits::{DynTool, Tool};

/// Maps tool names to their implementations.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn DynTool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed tool. Overwrites any tool with the same name.
    pub fn register<T: Tool>(&mut self, tool: T) {
        self.register_dyn(Arc::new(tool));
    }

    /// Register an already erased tool.
    pub fn register_dyn(&mut self, tool: Arc<dyn DynTool>) {
        debug!(tool_name = tool.name(), "tool registered");
        let _ = self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with<T: Tool>(mut self, tool: T) -> Self {
        self.register(tool);
        self
    }

    /// Look up a tool by name.
    pub fn get_tool(&self, name: &str) -> Result<Arc<dyn DynTool>, ToolError> {
        self.tools.get(name).cloned().ok_or_else(|| ToolError::NotFound {
            name: name.to_owned(),
        })
    }

    /// Descriptors of every tool, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> =
            self.tools.values().map(|t| t.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Tool names, sorted alphabetically.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a tool with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
