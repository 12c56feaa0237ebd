//! Shapes of `Complete.result` payloads that clients know how to render
//!
//! Any other result is an arbitrary JSON value.
use serde::{Deserialize, Serialize};

/// Result of the `methods` command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodList {
    pub type_name: String,
    pub methods: Vec<MethodInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    pub signature: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the method can be invoked in the inferior
    #[serde(default)]
    pub callable: bool,
    /// Computed helper rather than a method found in debug info
    #[serde(default)]
    pub is_synthetic: bool,
}

/// One entry of the `functions` command result list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub signature: String,
    #[serde(default)]
    pub callable: bool,
    #[serde(default)]
    pub module_path: Vec<String>,
}

impl FunctionInfo {
    /// `a::b::name` when a module path is present, else the bare name
    pub fn qualified_name(&self) -> String {
        if self.module_path.is_empty() {
            self.name.clone()
        } else {
            let mut parts = self.module_path.clone();
            parts.push(self.name.clone());
            parts.join("::")
        }
    }
}
