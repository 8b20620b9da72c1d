use crate::error::{Result, SyntaxError};
use crate::imports;
use crate::language::Language;
use crate::types::{ImportDeclaration, ParsedSource, Segment, Statement, StatementKind};
use std::collections::BTreeSet;
use tree_sitter::{Node, Parser};

/// AST-based analyzer producing imports and top-level segments
pub struct SourceAnalyzer {
    parser: Parser,
}

impl SourceAnalyzer {
    /// Create new analyzer for a language
    pub fn new(language: Language) -> Result<Self> {
        let ts_language = language.tree_sitter_language()?;
        let mut parser = Parser::new();
        parser
            .set_language(&ts_language)
            .map_err(|e| SyntaxError::tree_sitter(format!("Failed to set language: {e}")))?;

        Ok(Self { parser })
    }

    pub fn python() -> Result<Self> {
        Self::new(Language::Python)
    }

    /// Parse source text; any syntax error fails the whole parse
    pub fn parse(&mut self, content: &str) -> Result<ParsedSource> {
        let tree = self.parser.parse(content, None).ok_or(SyntaxError::NoTree)?;
        let root = tree.root_node();

        if root.has_error() {
            let (line, column) = first_error(root)
                .map(|n| (n.start_position().row + 1, n.start_position().column + 1))
                .unwrap_or((1, 1));
            return Err(SyntaxError::Parse { line, column });
        }

        let line_starts = line_starts(content);
        let mut statements = Vec::new();
        let mut imports = Vec::new();
        let mut rows = Vec::new();

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            if child.kind() == "comment" {
                continue;
            }
            let index = statements.len();
            let decls = imports::declarations(child, content, index);
            statements.push(Self::statement(content, child, &decls));
            rows.push(row_range(child));
            imports.extend(decls);
        }

        let (segments, trailing) = build_segments(content, &line_starts, &rows);
        log::debug!(
            "Parsed {} statements into {} segments ({} imports)",
            statements.len(),
            segments.len(),
            imports.len()
        );

        Ok(ParsedSource {
            source: content.to_string(),
            imports,
            statements,
            segments,
            trailing,
        })
    }

    fn statement(content: &str, node: Node, decls: &[ImportDeclaration]) -> Statement {
        let kind = classify(content, node);
        let binds = match &kind {
            StatementKind::Definition { name } => vec![name.clone()],
            StatementKind::Import => imports::bound_names(decls),
            StatementKind::FutureImport { .. } | StatementKind::MainGuard => Vec::new(),
            StatementKind::Other => assigned_names(content, node),
        };

        let mut collector = ReferenceCollector::new(content);
        if !matches!(kind, StatementKind::Import | StatementKind::FutureImport { .. }) {
            collector.visit(node, false);
        }

        Statement {
            kind,
            span: node.start_byte()..node.end_byte(),
            line: node.start_position().row + 1,
            binds,
            references: collector.all,
            eager_references: collector.eager,
        }
    }
}

fn classify(content: &str, node: Node) -> StatementKind {
    match node.kind() {
        "function_definition" | "class_definition" => definition(content, node),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .map_or(StatementKind::Other, |def| definition(content, def)),
        "future_import_statement" => StatementKind::FutureImport {
            names: future_names(content, node),
        },
        "import_from_statement" if is_future_module(content, node) => StatementKind::FutureImport {
            names: future_names(content, node),
        },
        "import_statement" | "import_from_statement" => StatementKind::Import,
        "if_statement" if is_main_guard(content, node) => StatementKind::MainGuard,
        _ => StatementKind::Other,
    }
}

fn definition(content: &str, node: Node) -> StatementKind {
    node.child_by_field_name("name")
        .map_or(StatementKind::Other, |name| StatementKind::Definition {
            name: imports::text(name, content).to_string(),
        })
}

fn is_future_module(content: &str, node: Node) -> bool {
    node.child_by_field_name("module_name")
        .is_some_and(|m| imports::text(m, content) == "__future__")
}

fn future_names(content: &str, node: Node) -> Vec<String> {
    let mut cursor = node.walk();
    node.children_by_field_name("name", &mut cursor)
        .map(|child| {
            let name = child.child_by_field_name("name").unwrap_or(child);
            imports::text(name, content).to_string()
        })
        .collect()
}

fn is_main_guard(content: &str, node: Node) -> bool {
    let Some(condition) = node.child_by_field_name("condition") else {
        return false;
    };
    let compact: String = imports::text(condition, content)
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '\'' { '"' } else { c })
        .collect();
    compact == "__name__==\"__main__\"" || compact == "\"__main__\"==__name__"
}

/// Identifiers bound by a module-level assignment (`a = ...`, `a, b = ...`)
fn assigned_names(content: &str, node: Node) -> Vec<String> {
    let mut names = Vec::new();
    if node.kind() != "expression_statement" {
        return names;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if matches!(child.kind(), "assignment" | "augmented_assignment") {
            if let Some(left) = child.child_by_field_name("left") {
                pattern_names(content, left, &mut names);
            }
        }
    }
    names
}

fn pattern_names(content: &str, node: Node, names: &mut Vec<String>) {
    match node.kind() {
        "identifier" => names.push(imports::text(node, content).to_string()),
        "pattern_list" | "tuple_pattern" | "list_pattern" | "list_splat_pattern"
        | "dictionary_splat_pattern" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                pattern_names(content, child, names);
            }
        }
        _ => {}
    }
}

/// Names a statement reads. `eager` holds the ones read when the statement
/// itself runs; function and lambda bodies only add to `all`.
struct ReferenceCollector<'a> {
    content: &'a str,
    eager: BTreeSet<String>,
    all: BTreeSet<String>,
    shadowed: Vec<String>,
}

impl<'a> ReferenceCollector<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            content,
            eager: BTreeSet::new(),
            all: BTreeSet::new(),
            shadowed: Vec::new(),
        }
    }

    fn visit(&mut self, node: Node, deferred: bool) {
        match node.kind() {
            "identifier" => self.record(node, deferred),
            "attribute" => {
                if let Some(object) = node.child_by_field_name("object") {
                    self.visit(object, deferred);
                }
            }
            "keyword_argument" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value, deferred);
                }
            }
            "assignment" | "for_statement" | "for_in_clause" => {
                let left = node.child_by_field_name("left");
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if Some(child) == left {
                        self.targets(child, deferred);
                    } else {
                        self.visit(child, deferred);
                    }
                }
            }
            "function_definition" => self.function(node, deferred),
            "lambda" => self.lambda(node, deferred),
            "class_definition" => {
                let name = node.child_by_field_name("name");
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if Some(child) != name {
                        self.visit(child, deferred);
                    }
                }
            }
            _ => self.children(node, deferred),
        }
    }

    fn children(&mut self, node: Node, deferred: bool) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, deferred);
        }
    }

    /// Plain names on the left of `=` or `for` are written, not read
    fn targets(&mut self, node: Node, deferred: bool) {
        match node.kind() {
            "identifier" => {}
            "pattern_list" | "tuple_pattern" | "list_pattern" | "list_splat_pattern" => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.targets(child, deferred);
                }
            }
            _ => self.visit(node, deferred),
        }
    }

    fn record(&mut self, node: Node, deferred: bool) {
        let name = imports::text(node, self.content);
        if self.shadowed.iter().any(|s| s == name) {
            return;
        }
        if !deferred {
            self.eager.insert(name.to_string());
        }
        self.all.insert(name.to_string());
    }

    /// Decorators sit on the enclosing `decorated_definition`; defaults and
    /// annotations run with the `def`, the body runs later
    fn function(&mut self, node: Node, deferred: bool) {
        let mut params = Vec::new();
        if let Some(parameters) = node.child_by_field_name("parameters") {
            self.parameters(parameters, deferred, &mut params);
        }
        if let Some(returns) = node.child_by_field_name("return_type") {
            self.visit(returns, deferred);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.scoped(params, |this| this.visit(body, true));
        }
    }

    fn lambda(&mut self, node: Node, deferred: bool) {
        let mut params = Vec::new();
        if let Some(parameters) = node.child_by_field_name("parameters") {
            self.parameters(parameters, deferred, &mut params);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.scoped(params, |this| this.visit(body, true));
        }
    }

    fn scoped(&mut self, params: Vec<String>, body: impl FnOnce(&mut Self)) {
        let depth = self.shadowed.len();
        self.shadowed.extend(params);
        body(self);
        self.shadowed.truncate(depth);
    }

    fn parameters(&mut self, node: Node, deferred: bool, params: &mut Vec<String>) {
        let mut cursor = node.walk();
        for param in node.named_children(&mut cursor) {
            match param.kind() {
                "default_parameter" | "typed_default_parameter" | "typed_parameter" => {
                    let value = param.child_by_field_name("value");
                    let annotation = param.child_by_field_name("type");
                    let mut inner = param.walk();
                    for child in param.named_children(&mut inner) {
                        if Some(child) == value || Some(child) == annotation {
                            self.visit(child, deferred);
                        } else {
                            pattern_names(self.content, child, params);
                        }
                    }
                }
                _ => pattern_names(self.content, param, params),
            }
        }
    }
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error() || child.is_missing())
        .find_map(first_error)
}

/// Inclusive 0-based row range of a node, ignoring a trailing newline
fn row_range(node: Node) -> (usize, usize) {
    let start = node.start_position().row;
    let end = node.end_position();
    let end_row = if end.column == 0 && end.row > start {
        end.row - 1
    } else {
        end.row
    };
    (start, end_row)
}

fn line_starts(content: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(content.match_indices('\n').map(|(idx, _)| idx + 1))
        .collect()
}

fn line_end(content: &str, starts: &[usize], row: usize) -> usize {
    starts.get(row + 1).copied().unwrap_or(content.len()).min(content.len())
}

/// Group statements sharing lines into segments; returns segments and the
/// trailing trivia range
fn build_segments(
    content: &str,
    starts: &[usize],
    rows: &[(usize, usize)],
) -> (Vec<Segment>, std::ops::Range<usize>) {
    let mut segments: Vec<Segment> = Vec::new();
    let mut consumed = 0;

    for (idx, &(start_row, end_row)) in rows.iter().enumerate() {
        if let Some(last) = segments.last_mut() {
            if start_row < last.end_line {
                // shares a line with the previous statement
                let end_line = last.end_line.max(end_row + 1);
                last.end_line = end_line;
                last.body.end = line_end(content, starts, end_line - 1);
                last.statements.end = idx + 1;
                consumed = last.body.end;
                continue;
            }
        }

        let body_start = starts.get(start_row).copied().unwrap_or(content.len());
        let body_end = line_end(content, starts, end_row);
        segments.push(Segment {
            leading: consumed..body_start,
            body: body_start..body_end,
            statements: idx..idx + 1,
            start_line: start_row + 1,
            end_line: end_row + 1,
        });
        consumed = body_end;
    }

    (segments, consumed..content.len())
}
