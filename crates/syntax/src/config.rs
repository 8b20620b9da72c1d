use serde::{Deserialize, Serialize};

/// How much of a module a named import pulls in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolPolicy {
    /// Requested definitions plus every same-module top-level definition
    /// they reference, transitively
    #[default]
    WithDependencies,

    /// Exactly the requested definitions
    Exact,
}

impl SymbolPolicy {
    #[must_use]
    pub const fn follows_references(self) -> bool {
        matches!(self, Self::WithDependencies)
    }
}
