use crate::error::{MergeError, Result};
use crate::paths;
use globset::{Glob, GlobSet, GlobSetBuilder};
use libmerge_syntax::{Language, SymbolPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for one merger instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    /// Anchor for absolute-style references; relative imports may not climb above it
    pub workspace_root: PathBuf,

    /// Directory holding importable library modules. Its last component is the
    /// library package name (`lib` for `contest/lib`)
    pub library_root: PathBuf,

    /// Extension of module files, without the dot
    pub extension: String,

    /// How much of a module a named import pulls in
    pub symbol_policy: SymbolPolicy,

    /// Drop `if __name__ == "__main__":` blocks of library modules
    pub strip_main_guard: bool,

    /// Move every `from __future__ import ...` to the top of the output
    pub hoist_future_imports: bool,

    /// Glob patterns of files allowed to degrade instead of failing: a parse
    /// failure keeps their original text, a missing library keeps the import
    pub lenient_fixtures: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            library_root: PathBuf::from("contest/lib"),
            extension: "py".to_string(),
            symbol_policy: SymbolPolicy::default(),
            strip_main_guard: true,
            hoist_future_imports: true,
            lenient_fixtures: Vec::new(),
        }
    }
}

impl MergeConfig {
    pub fn new(workspace_root: impl Into<PathBuf>, library_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            library_root: library_root.into(),
            ..Default::default()
        }
    }

    /// Builder-style fixture pattern
    #[must_use]
    pub fn with_lenient_fixture(mut self, pattern: impl Into<String>) -> Self {
        self.lenient_fixtures.push(pattern.into());
        self
    }

    #[must_use]
    pub const fn with_symbol_policy(mut self, policy: SymbolPolicy) -> Self {
        self.symbol_policy = policy;
        self
    }

    /// Library root resolved against the workspace root when relative
    pub fn library_dir(&self) -> PathBuf {
        if self.library_root.is_absolute() {
            self.library_root.clone()
        } else {
            self.workspace_root.join(&self.library_root)
        }
    }

    /// Package name under which the library is imported
    pub fn library_name(&self) -> Option<String> {
        paths::normalize(&self.library_dir())
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(format!(
                "extension must be non-empty and given without a dot (got {:?})",
                self.extension
            ));
        }
        if Language::from_extension(&self.extension) != Language::Python {
            return Err(format!(
                "extension {:?} is not a Python source extension",
                self.extension
            ));
        }

        let Some(name) = self.library_name() else {
            return Err(format!(
                "library root {} has no directory name",
                self.library_root.display()
            ));
        };
        if !is_identifier(&name) {
            return Err(format!(
                "library directory name {name:?} is not importable as a module name"
            ));
        }

        let workspace = paths::normalize(&self.workspace_root);
        let library = paths::normalize(&self.library_dir());
        if !paths::is_within(&library, &workspace) {
            return Err(format!(
                "library root {} lies outside workspace root {}",
                library.display(),
                workspace.display()
            ));
        }

        for pattern in &self.lenient_fixtures {
            Glob::new(pattern).map_err(|e| format!("invalid fixture pattern {pattern:?}: {e}"))?;
        }

        Ok(())
    }

    pub(crate) fn fixture_matcher(&self) -> Result<FixtureMatcher> {
        FixtureMatcher::new(&self.lenient_fixtures, paths::normalize(&self.workspace_root))
    }
}

/// Matches files that may degrade instead of failing the merge
#[derive(Debug, Clone)]
pub(crate) struct FixtureMatcher {
    set: GlobSet,
    workspace_root: PathBuf,
    empty: bool,
}

impl FixtureMatcher {
    fn new(patterns: &[String], workspace_root: PathBuf) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                MergeError::InvalidConfig(format!("invalid fixture pattern {pattern:?}: {e}"))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| MergeError::InvalidConfig(format!("fixture patterns: {e}")))?;

        Ok(Self {
            set,
            workspace_root,
            empty: patterns.is_empty(),
        })
    }

    /// Checked against the workspace-relative path and the bare file name
    pub fn is_lenient(&self, path: &Path) -> bool {
        if self.empty {
            return false;
        }
        let relative = path.strip_prefix(&self.workspace_root).unwrap_or(path);
        self.set.is_match(relative)
            || path
                .file_name()
                .is_some_and(|name| self.set.is_match(Path::new(name)))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}
