use libmerge_syntax::{ImportedName, ParsedSource, StatementEdit};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Index of a module within one [`MergeContext`]
pub type ModuleId = usize;

/// Traversal state of a file. Files absent from the context are unseen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    InProgress,
    Resolved,
}

/// What an importer needs from a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// The file being merged, rendered in full
    Main,

    /// Wildcard or plain-module import: every segment
    Whole,

    /// Named import: the requested definitions (plus dependencies, per policy)
    Names(Vec<ImportedName>),
}

/// A resolved library import of a module
#[derive(Debug, Clone)]
pub struct Dependency {
    pub target: PathBuf,
    pub request: Request,

    /// Dotted module path as written, for diagnostics
    pub module: String,
    pub line: usize,
}

/// A loaded source file and everything the assembler decided about it
#[derive(Debug)]
pub struct ResolvedModule {
    pub id: ModuleId,
    pub path: PathBuf,
    pub raw_text: String,

    /// `None` when the file failed to parse and was allowed to degrade
    pub parsed: Option<ParsedSource>,
    pub dependencies: Vec<Dependency>,

    /// Statement edits applying the import stripping; absent means keep
    pub edits: HashMap<usize, StatementEdit>,

    /// Names from this file's `from __future__ import` statements
    pub futures: Vec<String>,
    pub is_main: bool,
}

impl ResolvedModule {
    pub fn edit(&self, statement: usize) -> StatementEdit {
        self.edits
            .get(&statement)
            .cloned()
            .unwrap_or(StatementEdit::Keep)
    }

    #[must_use]
    pub const fn is_opaque(&self) -> bool {
        self.parsed.is_none()
    }

    /// Whole file with resolved imports stripped
    pub fn cleaned_text(&self) -> String {
        match &self.parsed {
            Some(parsed) => parsed.render(|idx, _| self.edit(idx)),
            None => self.raw_text.clone(),
        }
    }
}

/// Per-invocation traversal state: which files were reached and what they hold.
///
/// Owned by a single merge call and dropped with it.
#[derive(Debug)]
pub struct MergeContext {
    workspace_root: PathBuf,
    modules: Vec<ResolvedModule>,
    index: HashMap<PathBuf, ModuleId>,
    states: Vec<FileState>,
}

impl MergeContext {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            modules: Vec::new(),
            index: HashMap::new(),
            states: Vec::new(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn lookup(&self, path: &Path) -> Option<ModuleId> {
        self.index.get(path).copied()
    }

    pub fn state_of(&self, id: ModuleId) -> FileState {
        self.states[id]
    }

    /// Register `path` as in progress before it is read. Returns its id
    pub fn begin(&mut self, path: &Path) -> ModuleId {
        if let Some(id) = self.lookup(path) {
            return id;
        }
        let id = self.states.len();
        self.states.push(FileState::InProgress);
        self.index.insert(path.to_path_buf(), id);
        id
    }

    /// Store the loaded module registered by [`begin`](Self::begin)
    pub fn attach(&mut self, module: ResolvedModule) {
        debug_assert_eq!(module.id, self.modules.len());
        self.modules.push(module);
    }

    pub fn mark_resolved(&mut self, id: ModuleId) {
        self.states[id] = FileState::Resolved;
    }

    pub fn module(&self, id: ModuleId) -> &ResolvedModule {
        &self.modules[id]
    }

    pub fn modules(&self) -> &[ResolvedModule] {
        &self.modules
    }
}
