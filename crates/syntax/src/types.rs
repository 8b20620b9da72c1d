use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;

/// Module reference as written after `from` / `import`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModulePath {
    /// Number of leading dots (0 = absolute)
    pub level: usize,

    /// Dotted segments following the dots (may be empty for `from . import x`)
    pub segments: Vec<String>,
}

impl ModulePath {
    /// Absolute path from dotted text, e.g. `lib.graph.dijkstra`
    pub fn absolute(dotted: &str) -> Self {
        Self::relative(0, dotted)
    }

    /// Relative path with `level` leading dots
    pub fn relative(level: usize, dotted: &str) -> Self {
        let segments = dotted
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { level, segments }
    }

    #[must_use]
    pub const fn is_relative(&self) -> bool {
        self.level > 0
    }

    /// First dotted segment
    pub fn head(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Segments joined with dots, without the relative prefix
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ".".repeat(self.level), self.dotted())
    }
}

/// A single imported name, optionally renamed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportedName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportedName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    /// Name visible to the importing module
    pub fn bound_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// What an import declaration asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImportedNames {
    /// `from m import *`
    Wildcard,

    /// `from m import a, b as c`
    Named { names: Vec<ImportedName> },

    /// `import m` / `import m as alias`
    Module { alias: Option<String> },
}

/// One top-level import declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDeclaration {
    pub module: ModulePath,
    pub names: ImportedNames,

    /// Index into [`ParsedSource::statements`]
    pub statement: usize,

    /// Line of the statement (1-indexed)
    pub line: usize,

    /// Source text of this declaration's clause (`numpy as np` in `import os, numpy as np`)
    pub clause: String,
}

impl ImportDeclaration {
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        matches!(self.names, ImportedNames::Wildcard)
    }

    /// Requested symbols, `None` when the whole module is imported
    pub fn symbols(&self) -> Option<&[ImportedName]> {
        match &self.names {
            ImportedNames::Named { names } => Some(names),
            ImportedNames::Wildcard | ImportedNames::Module { .. } => None,
        }
    }
}

/// Classification of a top-level statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    /// `def`, `class`, or a decorated one
    Definition { name: String },

    /// `import ...` / `from ... import ...`
    Import,

    /// `from __future__ import ...`
    FutureImport { names: Vec<String> },

    /// `if __name__ == "__main__":`
    MainGuard,

    /// Any other module-level code
    Other,
}

/// A top-level statement and what it touches
#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,

    /// Byte span of the statement node
    pub span: Range<usize>,

    /// First line (1-indexed)
    pub line: usize,

    /// Names this statement binds at module scope
    pub binds: Vec<String>,

    /// Names read anywhere inside the statement, function bodies included
    pub references: BTreeSet<String>,

    /// Names read while the statement itself executes: decorators, base
    /// classes, default values and module-level expressions
    pub eager_references: BTreeSet<String>,
}

impl Statement {
    pub fn definition_name(&self) -> Option<&str> {
        match &self.kind {
            StatementKind::Definition { name } => Some(name),
            _ => None,
        }
    }
}

/// Whole lines holding one or more top-level statements, plus the comments
/// and blank lines leading up to them
#[derive(Debug, Clone)]
pub struct Segment {
    /// Comments and blank lines before the first statement
    pub leading: Range<usize>,

    /// Full lines covering the statements
    pub body: Range<usize>,

    /// Indices into [`ParsedSource::statements`]
    pub statements: Range<usize>,

    pub start_line: usize,
    pub end_line: usize,
}

/// What to do with a statement when rendering a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementEdit {
    Keep,
    Drop,
    Replace(String),
}

/// Parsed Python source: imports and top-level segments over the original text
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub(crate) source: String,
    pub(crate) imports: Vec<ImportDeclaration>,
    pub(crate) statements: Vec<Statement>,
    pub(crate) segments: Vec<Segment>,
    pub(crate) trailing: Range<usize>,
}

impl ParsedSource {
    /// Parse Python text
    pub fn parse(source: &str) -> crate::Result<Self> {
        crate::SourceAnalyzer::python()?.parse(source)
    }

    /// Top-level import declarations in source order
    pub fn imports(&self) -> &[ImportDeclaration] {
        &self.imports
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Comments and blank lines after the last statement
    pub fn trailing_text(&self) -> &str {
        &self.source[self.trailing.clone()]
    }

    /// Statements of one segment
    pub fn segment_statements(&self, segment: usize) -> &[Statement] {
        &self.statements[self.segments[segment].statements.clone()]
    }

    /// Name of the definition a segment holds, if it is a single definition
    pub fn segment_definition(&self, segment: usize) -> Option<&str> {
        match self.segment_statements(segment) {
            [only] => only.definition_name(),
            _ => None,
        }
    }

    /// Names bound anywhere at module scope
    pub fn bound_names(&self) -> impl Iterator<Item = &str> {
        self.statements
            .iter()
            .flat_map(|stmt| stmt.binds.iter().map(String::as_str))
    }

    /// Render one segment, applying `edit` to each statement (by global index).
    ///
    /// A segment whose statements are all dropped renders as its leading trivia only.
    pub fn render_segment<F>(&self, segment: usize, edit: F) -> String
    where
        F: Fn(usize, &Statement) -> StatementEdit,
    {
        let seg = &self.segments[segment];
        let edits: Vec<(usize, StatementEdit)> = seg
            .statements
            .clone()
            .map(|idx| (idx, edit(idx, &self.statements[idx])))
            .collect();

        let mut out = String::from(&self.source[seg.leading.clone()]);
        if edits.iter().all(|(_, e)| *e == StatementEdit::Drop) {
            return out;
        }

        let bytes = self.source.as_bytes();
        let mut cursor = seg.body.start;
        for (idx, edit) in edits {
            let span = self.statements[idx].span.clone();
            match edit {
                StatementEdit::Keep => {}
                StatementEdit::Drop => {
                    out.push_str(&self.source[cursor..span.start]);
                    let mut next = span.end;
                    while next < seg.body.end && matches!(bytes[next], b' ' | b'\t') {
                        next += 1;
                    }
                    if next < seg.body.end && bytes[next] == b';' {
                        next += 1;
                        while next < seg.body.end && matches!(bytes[next], b' ' | b'\t') {
                            next += 1;
                        }
                    }
                    cursor = next;
                }
                StatementEdit::Replace(text) => {
                    out.push_str(&self.source[cursor..span.start]);
                    out.push_str(&text);
                    cursor = span.end;
                }
            }
        }
        out.push_str(&self.source[cursor..seg.body.end]);
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    /// Render every segment in file order (plus trailing trivia)
    pub fn render<F>(&self, edit: F) -> String
    where
        F: Fn(usize, &Statement) -> StatementEdit,
    {
        let mut out = String::with_capacity(self.source.len());
        for idx in 0..self.segments.len() {
            out.push_str(&self.render_segment(idx, &edit));
        }
        out.push_str(self.trailing_text());
        out
    }
}
