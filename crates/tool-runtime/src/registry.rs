use crate::tool::{Tool, ToolDefinition};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Tool names permitted for dispatch. Matching is exact and case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    names: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Manages available tools, their definitions, and dispatch lookup.
///
/// Registration order is preserved for the prompt catalog. A tool that is
/// registered but missing from the allow-list is listed but never resolved.
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
    allowed: AllowList,
}

impl ToolRegistry {
    /// Empty registry with an empty allow-list.
    pub fn new() -> Self {
        Self {
            tools: IndexMap::new(),
            allowed: AllowList::default(),
        }
    }

    /// Build a registry from an explicit tool list and allow-list.
    pub fn with_tools(
        tools: impl IntoIterator<Item = Arc<dyn Tool>>,
        allowed: AllowList,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register_arc(tool)?;
        }
        registry.allowed = allowed;
        Ok(registry)
    }

    /// Register a tool. Returns error if name already registered.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let def = tool.definition();
        if self.tools.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        self.tools.insert(def.name, tool);
        Ok(())
    }

    /// Look up a registered tool by name, ignoring the allow-list.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Resolve a tool for dispatch: it must be registered AND allowed.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, DispatchRejection> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| DispatchRejection::UnknownTool {
                name: name.to_string(),
                available: self.names().join(", "),
            })?;
        if !self.allowed.contains(name) {
            return Err(DispatchRejection::NotAllowed {
                name: name.to_string(),
            });
        }
        Ok(tool.clone())
    }

    /// Registered tool definitions, in registration order.
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allowed
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool with name '{0}' is already registered")]
    DuplicateName(String),
}

/// Why a requested action could not be dispatched. The message is handed to
/// the model as the step's observation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchRejection {
    #[error("unknown tool '{name}', try one of: {available}")]
    UnknownTool { name: String, available: String },
    #[error("tool not allowed: '{name}' may not be used here")]
    NotAllowed { name: String },
}
