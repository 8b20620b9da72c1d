use libmerge_merger::{ImportReport, MergeOutcome, Resolution};
use libmerge_syntax::ImportedNames;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// JSON body of `bundle --json`
#[derive(Debug, Serialize)]
pub struct BundleReport {
    pub contest: String,
    pub problem: String,
    pub source: PathBuf,
    pub output: PathBuf,
    pub modules: Vec<PathBuf>,
    pub notes: Vec<String>,
}

impl BundleReport {
    pub fn new(contest: &str, problem: &str, output: PathBuf, outcome: MergeOutcome) -> Self {
        Self {
            contest: contest.to_string(),
            problem: problem.to_string(),
            source: outcome.main,
            output,
            modules: outcome.modules,
            notes: outcome.notes,
        }
    }
}

/// JSON body of `imports --json`
#[derive(Debug, Serialize)]
pub struct ImportsReport {
    pub file: PathBuf,
    pub imports: Vec<ImportReport>,
}

/// One line per import: `line  module  names  -> resolution`
pub fn render_imports(reports: &[ImportReport], root: &Path) -> String {
    let width = reports.iter().map(|r| r.module.len()).max().unwrap_or(0);
    let mut out = String::new();
    for report in reports {
        out.push_str(&format!(
            "{:>4}  {:<width$}  {:<12}  -> {}\n",
            report.line,
            report.module,
            names(&report.names),
            resolution(&report.resolution, root),
        ));
    }
    if out.is_empty() {
        out.push_str("no top-level imports\n");
    }
    out
}

fn names(names: &ImportedNames) -> String {
    match names {
        ImportedNames::Wildcard => "*".to_string(),
        ImportedNames::Named { names } => names
            .iter()
            .map(|n| match &n.alias {
                Some(alias) => format!("{} as {alias}", n.name),
                None => n.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        ImportedNames::Module { alias: Some(alias) } => format!("(module as {alias})"),
        ImportedNames::Module { alias: None } => "(module)".to_string(),
    }
}

fn resolution(resolution: &Resolution, root: &Path) -> String {
    match resolution {
        Resolution::Library { path } => {
            format!("library {}", path.strip_prefix(root).unwrap_or(path).display())
        }
        Resolution::Foreign => "foreign (kept)".to_string(),
        Resolution::Missing { reason } => format!("missing: {reason}"),
    }
}
