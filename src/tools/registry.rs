//! Name-keyed tool registry with wildcard expansion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;

use super::tool::Tool;
use crate::error::{ParleyError, Result};

/// A tool registered under its qualified, unique name.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub tool: Arc<dyn Tool>,
}

impl ToolDescriptor {
    pub fn required_context_handlers(&self) -> &[String] {
        self.tool.required_context_handlers()
    }

    /// Name exposed on the wire, restricted to `[a-zA-Z0-9_-]`.
    pub fn wire_name(&self) -> String {
        sanitize_tool_name(&self.name)
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor").field("name", &self.name).finish()
    }
}

/// Registry of every tool known to a chat service, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` under `name`. Registering a name twice is an error.
    pub fn register(&mut self, name: impl Into<String>, tool: Arc<dyn Tool>) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(ParleyError::duplicate("Tool", name));
        }
        tracing::debug!(tool = %name, "registered tool");
        self.index.insert(name.clone(), self.tools.len());
        self.tools.push(ToolDescriptor { name, tool });
        Ok(())
    }

    /// Register each tool as `"{package}/{tool.name()}"`.
    pub fn register_package<I>(&mut self, package: &str, tools: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        for tool in tools {
            let name = format!("{package}/{}", tool.name());
            self.register(name, tool)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn require(&self, name: &str) -> Result<&ToolDescriptor> {
        self.get(name)
            .ok_or_else(|| ParleyError::UnknownTool(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered names matching `pattern`, where `*` matches any run of characters.
    /// A pattern without `*` matches only the exact name.
    pub fn names_like(&self, pattern: &str) -> Vec<String> {
        if !pattern.contains('*') {
            return self.get(pattern).map(|t| vec![t.name.clone()]).unwrap_or_default();
        }
        let Ok(re) = wildcard_regex(pattern) else {
            return Vec::new();
        };
        self.tools
            .iter()
            .filter(|t| re.is_match(&t.name))
            .map(|t| t.name.clone())
            .collect()
    }

    /// Like [`names_like`](Self::names_like), but no match is an error naming the pattern.
    pub fn ensure_names_like(&self, pattern: &str) -> Result<Vec<String>> {
        let names = self.names_like(pattern);
        if names.is_empty() {
            return Err(ParleyError::UnknownTool(pattern.to_string()));
        }
        Ok(names)
    }

    /// Expand a list of names and wildcard patterns into concrete, de-duplicated names.
    pub fn expand<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut expanded = Vec::new();
        for pattern in patterns {
            for name in self.ensure_names_like(pattern.as_ref())? {
                if seen.insert(name.clone()) {
                    expanded.push(name);
                }
            }
        }
        Ok(expanded)
    }
}

pub(crate) fn wildcard_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
}

/// Replace every character outside `[a-zA-Z0-9_-]` with `_`.
pub fn sanitize_tool_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
