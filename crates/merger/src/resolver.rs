use crate::config::MergeConfig;
use crate::paths;
use libmerge_syntax::{ImportDeclaration, ImportedNames, ParsedSource};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where an import declaration points
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Library module file to inline
    Library { path: PathBuf },

    /// Outside the managed library tree (stdlib, third-party); left untouched
    Foreign,

    /// Targets the library tree but nothing backs it on disk
    Missing { reason: String },
}

/// One import of a file and where it leads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub line: usize,

    /// Module path as written, relative dots included
    pub module: String,
    pub names: ImportedNames,
    pub resolution: Resolution,
}

/// Maps import declarations to module files.
///
/// Precedence:
/// 1. relative imports walk up from the importing file's directory; a library
///    package segment re-roots the remainder at the library root
/// 2. absolute imports starting with the library package name map under the
///    library root
/// 3. other absolute imports probe the library root, then the importing
///    file's directory, and are foreign when neither has the file
#[derive(Debug, Clone)]
pub struct PathResolver {
    workspace_root: PathBuf,
    library_root: PathBuf,
    library_name: Option<String>,
    extension: String,
}

impl PathResolver {
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            workspace_root: paths::normalize(&config.workspace_root),
            library_root: paths::normalize(&config.library_dir()),
            library_name: config.library_name(),
            extension: config.extension.clone(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Resolve `decl` as written in `importing_file` (a normalized path)
    pub fn resolve(&self, importing_file: &Path, decl: &ImportDeclaration) -> Resolution {
        let importing_dir = importing_file.parent().unwrap_or(&self.workspace_root);
        let module = &decl.module;

        if module.is_relative() {
            return self.resolve_relative(importing_dir, module.level, &module.segments);
        }

        if module.head().is_some() && module.head() == self.library_name.as_deref() {
            return self.under_library(&module.segments[1..]);
        }

        let in_library = self.module_file(&self.library_root, &module.segments);
        if in_library.is_file() {
            return Resolution::Library {
                path: paths::normalize(&in_library),
            };
        }
        let beside = self.module_file(importing_dir, &module.segments);
        if beside.is_file() {
            return Resolution::Library {
                path: paths::normalize(&beside),
            };
        }
        Resolution::Foreign
    }

    /// Resolve every top-level import of a parsed file
    pub fn report(&self, importing_file: &Path, parsed: &ParsedSource) -> Vec<ImportReport> {
        parsed
            .imports()
            .iter()
            .map(|decl| ImportReport {
                line: decl.line,
                module: decl.module.to_string(),
                names: decl.names.clone(),
                resolution: self.resolve(importing_file, decl),
            })
            .collect()
    }

    fn resolve_relative(&self, importing_dir: &Path, level: usize, segments: &[String]) -> Resolution {
        let mut base = importing_dir.to_path_buf();
        for _ in 1..level {
            if !base.pop() {
                return missing("relative import beyond the filesystem root");
            }
        }
        if !paths::is_within(&base, &self.workspace_root) {
            return missing(format!(
                "relative import ascends above the workspace root {}",
                self.workspace_root.display()
            ));
        }
        if segments.is_empty() {
            return missing("package-relative import names no module file");
        }

        if let Some(name) = &self.library_name {
            if let Some(pos) = segments.iter().position(|s| s == name) {
                return self.under_library(&segments[pos + 1..]);
            }
        }

        let candidate = self.module_file(&base, segments);
        if candidate.is_file() {
            Resolution::Library {
                path: paths::normalize(&candidate),
            }
        } else {
            missing(format!("no module file at {}", candidate.display()))
        }
    }

    fn under_library(&self, rest: &[String]) -> Resolution {
        if rest.is_empty() {
            return missing("the library package itself is not a module file");
        }
        let candidate = self.module_file(&self.library_root, rest);
        if candidate.is_file() {
            Resolution::Library {
                path: paths::normalize(&candidate),
            }
        } else {
            missing(format!("no module file at {}", candidate.display()))
        }
    }

    /// `a.b.c` → `<base>/a/b/c.<ext>`
    fn module_file(&self, base: &Path, segments: &[String]) -> PathBuf {
        let mut path = base.to_path_buf();
        for segment in segments {
            path.push(segment);
        }
        path.set_extension(&self.extension);
        path
    }
}

fn missing(reason: impl Into<String>) -> Resolution {
    Resolution::Missing {
        reason: reason.into(),
    }
}
