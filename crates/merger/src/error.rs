use libmerge_syntax::SyntaxError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MergeError>;

#[derive(Error, Debug)]
pub enum MergeError {
    /// An import targets the library tree but no module file backs it
    #[error("Library module not found: {module} (imported from {}:{line}): {reason}", .importer.display())]
    MissingLibrary {
        module: String,
        importer: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Syntax error in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: SyntaxError,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported source file: {}", .0.display())]
    UnsupportedFile(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

impl MergeError {
    /// Dotted module path of a missing-library error
    pub fn missing_module(&self) -> Option<&str> {
        match self {
            Self::MissingLibrary { module, .. } => Some(module),
            _ => None,
        }
    }
}
