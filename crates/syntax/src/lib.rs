//! # Libmerge Syntax
//!
//! Structured view of Python sources for single-file bundling.
//!
//! ## Architecture
//!
//! ```text
//! Source Text
//!     │
//!     ├──> Language Detection (from extension)
//!     │
//!     ├──> Tree-sitter Parsing → AST (syntax errors are reported, never ignored)
//!     │
//!     ├──> Import Extraction
//!     │    └─> ImportDeclaration[] (module path, relative level, names | wildcard)
//!     │
//!     └──> Segmentation
//!          ├─> One segment per top-level statement group (with leading comments)
//!          ├─> Bound names and referenced identifiers per statement
//!          └─> Symbol selection (named definitions, same-module dependencies)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use libmerge_syntax::{extract_symbols, ParsedSource, SymbolPolicy};
//!
//! let code = "from lib.basic import gcd\n\ndef solve():\n    return gcd(10, 5)\n";
//! let parsed = ParsedSource::parse(code).unwrap();
//! assert_eq!(parsed.imports()[0].module.to_string(), "lib.basic");
//!
//! let library = "def gcd(a, b):\n    return a\n\ndef lcm(a, b):\n    return b\n";
//! let names = vec!["lcm".to_string()];
//! let text = extract_symbols(library, Some(&names), SymbolPolicy::Exact).unwrap();
//! assert!(text.contains("def lcm") && !text.contains("def gcd"));
//! ```

mod analyzer;
mod config;
mod error;
mod imports;
mod language;
mod symbols;
mod types;

pub use analyzer::SourceAnalyzer;
pub use config::SymbolPolicy;
pub use error::{Result, SyntaxError};
pub use language::Language;
pub use symbols::{extract_symbols, select_segments, Selection};
pub use types::{
    ImportDeclaration, ImportedName, ImportedNames, ModulePath, ParsedSource, Segment, Statement,
    StatementEdit, StatementKind,
};
