//! Import extraction from tree-sitter nodes.
//!
//! Only `import_statement` and `import_from_statement` nodes are handled here;
//! `from __future__` imports have their own node kind and never become
//! declarations.

use crate::types::{ImportDeclaration, ImportedName, ImportedNames, ModulePath};
use tree_sitter::Node;

/// Build the declarations carried by one import statement node
pub(crate) fn declarations(node: Node, content: &str, statement: usize) -> Vec<ImportDeclaration> {
    let line = node.start_position().row + 1;
    match node.kind() {
        "import_from_statement" => from_import(node, content, statement, line)
            .into_iter()
            .collect(),
        "import_statement" => plain_imports(node, content, statement, line),
        _ => Vec::new(),
    }
}

/// Names an import statement binds at module scope
pub(crate) fn bound_names(declarations: &[ImportDeclaration]) -> Vec<String> {
    let mut names = Vec::new();
    for decl in declarations {
        match &decl.names {
            ImportedNames::Wildcard => {}
            ImportedNames::Named { names: list } => {
                names.extend(list.iter().map(|n| n.bound_name().to_string()));
            }
            ImportedNames::Module { alias: Some(alias) } => names.push(alias.clone()),
            ImportedNames::Module { alias: None } => {
                if let Some(head) = decl.module.head() {
                    names.push(head.to_string());
                }
            }
        }
    }
    names
}

fn from_import(
    node: Node,
    content: &str,
    statement: usize,
    line: usize,
) -> Option<ImportDeclaration> {
    let module_node = node.child_by_field_name("module_name")?;
    let module = match module_node.kind() {
        "relative_import" => relative_module(module_node, content),
        _ if text(module_node, content) == "__future__" => return None,
        _ => ModulePath::absolute(text(module_node, content)),
    };

    let mut cursor = node.walk();
    let wildcard = node
        .named_children(&mut cursor)
        .any(|child| child.kind() == "wildcard_import");

    let names = if wildcard {
        ImportedNames::Wildcard
    } else {
        let mut cursor = node.walk();
        let list = node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|child| imported_name(child, content))
            .collect();
        ImportedNames::Named { names: list }
    };

    let clause_start = module_node.start_byte();
    Some(ImportDeclaration {
        module,
        names,
        statement,
        line,
        clause: content[clause_start..node.end_byte()].to_string(),
    })
}

fn plain_imports(
    node: Node,
    content: &str,
    statement: usize,
    line: usize,
) -> Vec<ImportDeclaration> {
    let mut cursor = node.walk();
    node.children_by_field_name("name", &mut cursor)
        .filter_map(|child| {
            let (module, alias) = match child.kind() {
                "aliased_import" => {
                    let name = child.child_by_field_name("name")?;
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|a| text(a, content).to_string());
                    (ModulePath::absolute(text(name, content)), alias)
                }
                _ => (ModulePath::absolute(text(child, content)), None),
            };
            Some(ImportDeclaration {
                module,
                names: ImportedNames::Module { alias },
                statement,
                line,
                clause: text(child, content).to_string(),
            })
        })
        .collect()
}

fn relative_module(node: Node, content: &str) -> ModulePath {
    let mut level = 0;
    let mut dotted = "";
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_prefix" => level = text(child, content).matches('.').count(),
            "dotted_name" => dotted = text(child, content),
            _ => {}
        }
    }
    ModulePath::relative(level, dotted)
}

fn imported_name(node: Node, content: &str) -> Option<ImportedName> {
    match node.kind() {
        "aliased_import" => {
            let name = node.child_by_field_name("name")?;
            Some(ImportedName {
                name: text(name, content).to_string(),
                alias: node
                    .child_by_field_name("alias")
                    .map(|a| text(a, content).to_string()),
            })
        }
        "dotted_name" | "identifier" => Some(ImportedName::new(text(node, content))),
        _ => None,
    }
}

pub(crate) fn text<'a>(node: Node, content: &'a str) -> &'a str {
    &content[node.start_byte()..node.end_byte()]
}
