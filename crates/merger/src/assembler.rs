use crate::config::{FixtureMatcher, MergeConfig};
use crate::context::{Dependency, FileState, MergeContext, ModuleId, Request, ResolvedModule};
use crate::error::{MergeError, Result};
use crate::normalize::normalize_blank_lines;
use crate::paths;
use crate::resolver::{PathResolver, Resolution};
use libmerge_syntax::{
    select_segments, ImportDeclaration, ImportedNames, Language, ParsedSource, SourceAnalyzer,
    StatementEdit, StatementKind,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Result of one assembler run
#[derive(Debug)]
pub(crate) struct Assembled {
    pub text: String,
    pub main: PathBuf,
    pub included: Vec<PathBuf>,
    pub notes: Vec<String>,
}

/// A module whose dependencies are being walked
#[derive(Debug)]
struct Frame {
    module: ModuleId,
    next_dependency: usize,

    /// Requests to serve once every dependency of the module is emitted
    pending: Vec<Request>,
}

/// Ordered output of a merge plus the bookkeeping that keeps it duplicate-free
#[derive(Debug, Default)]
struct Output {
    chunks: Vec<String>,
    emitted: HashSet<(ModuleId, usize)>,
    opaque_emitted: HashSet<ModuleId>,

    /// Alias assignments and library-side foreign imports already written
    lines: HashSet<String>,
    included: Vec<ModuleId>,
    shebang: Option<String>,
    notes: Vec<String>,
    last_module: Option<ModuleId>,
}

impl Output {
    fn push(&mut self, module: ModuleId, library: bool, mut text: String) {
        if text.trim().is_empty() {
            return;
        }
        if !text.ends_with('\n') {
            text.push('\n');
        }
        if self.last_module.is_some_and(|last| last != module) {
            self.chunks.push("\n\n".to_string());
        }
        if library && !self.included.contains(&module) {
            self.included.push(module);
        }
        self.chunks.push(text);
        self.last_module = Some(module);
    }

    fn note(&mut self, note: String) {
        log::warn!("{note}");
        self.notes.push(note);
    }
}

/// Walks the import graph of one file and concatenates library code ahead of
/// the code that needs it.
///
/// The walk uses an explicit stack of frames. A dependency found in progress
/// (an import cycle) has its request parked on that module's frame and served
/// when the module completes, so each segment is written at most once.
pub(crate) struct Assembler<'a> {
    config: &'a MergeConfig,
    resolver: PathResolver,
    fixtures: FixtureMatcher,
    analyzer: SourceAnalyzer,
    context: MergeContext,
    output: Output,
}

impl<'a> Assembler<'a> {
    pub fn new(config: &'a MergeConfig) -> Result<Self> {
        let resolver = PathResolver::new(config);
        let context = MergeContext::new(resolver.workspace_root());
        Ok(Self {
            config,
            fixtures: config.fixture_matcher()?,
            analyzer: SourceAnalyzer::python()?,
            resolver,
            context,
            output: Output::default(),
        })
    }

    pub fn run(mut self, main_file: &Path) -> Result<Assembled> {
        let main_path = paths::normalize(main_file);
        let main = self.load(&main_path, true)?;

        if self.context.module(main).is_opaque() {
            let text = self.context.module(main).raw_text.clone();
            return Ok(Assembled {
                text,
                main: main_path,
                included: Vec::new(),
                notes: self.output.notes,
            });
        }

        let mut stack = vec![Frame {
            module: main,
            next_dependency: 0,
            pending: vec![Request::Main],
        }];

        while let Some(top) = stack.last_mut() {
            let next = self
                .context
                .module(top.module)
                .dependencies
                .get(top.next_dependency)
                .cloned();
            top.next_dependency += 1;

            let Some(dependency) = next else {
                if let Some(frame) = stack.pop() {
                    self.context.mark_resolved(frame.module);
                    for request in &frame.pending {
                        self.emit(frame.module, request);
                    }
                }
                continue;
            };

            match self.context.lookup(&dependency.target) {
                None => {
                    let id = self.load(&dependency.target, false)?;
                    stack.push(Frame {
                        module: id,
                        next_dependency: 0,
                        pending: vec![dependency.request],
                    });
                }
                Some(id) => match self.context.state_of(id) {
                    FileState::InProgress => {
                        log::debug!(
                            "Import cycle through {} (line {}); deferring until it completes",
                            dependency.module,
                            dependency.line
                        );
                        if let Some(frame) = stack.iter_mut().find(|frame| frame.module == id) {
                            frame.pending.push(dependency.request);
                        }
                    }
                    FileState::Resolved => self.emit(id, &dependency.request),
                },
            }
        }

        Ok(self.finish(main_path))
    }

    /// Read, parse and plan one file. Registers it as in progress first
    fn load(&mut self, path: &Path, is_main: bool) -> Result<ModuleId> {
        if Language::from_path(path) != Language::Python {
            return Err(MergeError::UnsupportedFile(path.to_path_buf()));
        }
        let id = self.context.begin(path);
        log::debug!("Loading {}", self.display(path));

        let raw_text = std::fs::read_to_string(path).map_err(|source| MergeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if is_main {
            self.output.shebang = raw_text
                .lines()
                .next()
                .filter(|line| line.starts_with("#!"))
                .map(str::to_string);
        }

        let lenient = self.fixtures.is_lenient(path);
        let parsed = match self.analyzer.parse(&raw_text) {
            Ok(parsed) => Some(parsed),
            Err(err) if lenient => {
                let note = format!("{}: {err}; kept original text", self.display(path));
                self.output.note(note);
                None
            }
            Err(source) => {
                return Err(MergeError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut module = ResolvedModule {
            id,
            path: path.to_path_buf(),
            raw_text,
            parsed: None,
            dependencies: Vec::new(),
            edits: HashMap::new(),
            futures: Vec::new(),
            is_main,
        };
        if let Some(parsed) = &parsed {
            self.plan(&mut module, parsed, lenient)?;
        }
        module.parsed = parsed;
        self.context.attach(module);
        Ok(id)
    }

    /// Resolve every import of `module` and decide what happens to each statement
    fn plan(&mut self, module: &mut ResolvedModule, parsed: &ParsedSource, lenient: bool) -> Result<()> {
        let mut by_statement: BTreeMap<usize, Vec<(&ImportDeclaration, bool)>> = BTreeMap::new();

        for decl in parsed.imports() {
            let inlined = match self.resolver.resolve(&module.path, decl) {
                Resolution::Library { path } => {
                    module.dependencies.push(Dependency {
                        target: path,
                        request: self.request_for(decl, &module.path),
                        module: decl.module.to_string(),
                        line: decl.line,
                    });
                    true
                }
                Resolution::Foreign => false,
                Resolution::Missing { reason } if lenient => {
                    let note = format!(
                        "{}:{}: kept unresolved import {} ({reason})",
                        self.display(&module.path),
                        decl.line,
                        decl.module
                    );
                    self.output.note(note);
                    false
                }
                Resolution::Missing { reason } => {
                    return Err(MergeError::MissingLibrary {
                        module: decl.module.to_string(),
                        importer: module.path.clone(),
                        line: decl.line,
                        reason,
                    })
                }
            };
            by_statement
                .entry(decl.statement)
                .or_default()
                .push((decl, inlined));
        }

        for (statement, decls) in by_statement {
            let kept: Vec<&str> = decls
                .iter()
                .filter(|(_, inlined)| !inlined)
                .map(|(decl, _)| decl.clause.as_str())
                .collect();
            if kept.is_empty() {
                module.edits.insert(statement, StatementEdit::Drop);
            } else if kept.len() < decls.len() {
                module
                    .edits
                    .insert(statement, StatementEdit::Replace(format!("import {}", kept.join(", "))));
            }
        }

        for (idx, stmt) in parsed.statements().iter().enumerate() {
            match &stmt.kind {
                StatementKind::FutureImport { names } if self.config.hoist_future_imports => {
                    module.futures.extend(names.iter().cloned());
                    module.edits.insert(idx, StatementEdit::Drop);
                }
                StatementKind::MainGuard if !module.is_main && self.config.strip_main_guard => {
                    module.edits.insert(idx, StatementEdit::Drop);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn request_for(&self, decl: &ImportDeclaration, importer: &Path) -> Request {
        match &decl.names {
            ImportedNames::Wildcard => Request::Whole,
            ImportedNames::Named { names } => Request::Names(names.clone()),
            ImportedNames::Module { .. } => {
                log::warn!(
                    "{}:{}: `import {}` inlines the whole module; qualified references to it are not rewritten",
                    self.display(importer),
                    decl.line,
                    decl.module
                );
                Request::Whole
            }
        }
    }

    /// Write what `request` needs from a completed module
    fn emit(&mut self, id: ModuleId, request: &Request) {
        let module = self.context.module(id);
        let library = !module.is_main;

        let Some(parsed) = &module.parsed else {
            if self.output.opaque_emitted.insert(id) {
                self.output.push(id, library, module.raw_text.clone());
            }
            return;
        };

        let segments: Vec<usize> = match request {
            Request::Main | Request::Whole => (0..parsed.segments().len()).collect(),
            Request::Names(names) => {
                let requested: Vec<String> = names.iter().map(|n| n.name.clone()).collect();
                let selection = select_segments(parsed, &requested, self.config.symbol_policy);
                for name in &selection.missing {
                    log::warn!(
                        "`{name}` is not defined at module level of {}",
                        paths::display_relative(&module.path, self.context.workspace_root())
                    );
                }
                selection.segments
            }
        };

        let mut text = String::new();
        let mut previous: Option<usize> = None;
        for idx in segments {
            if !self.output.emitted.insert((id, idx)) {
                continue;
            }
            let rendered = parsed.render_segment(idx, |stmt, _| module.edit(stmt));
            let import_only = parsed
                .segment_statements(idx)
                .iter()
                .all(|stmt| stmt.kind == StatementKind::Import);
            if library
                && import_only
                && !rendered.trim().is_empty()
                && !self.output.lines.insert(rendered.trim().to_string())
            {
                continue;
            }
            if previous.is_some_and(|p| p + 1 != idx) && !rendered.starts_with('\n') {
                text.push('\n');
            }
            previous = Some(idx);
            text.push_str(&rendered);
        }

        match request {
            Request::Main => {
                text.push_str(parsed.trailing_text());
                if let Some(shebang) = &self.output.shebang {
                    if let Some(rest) = text.strip_prefix(shebang.as_str()) {
                        text = rest.trim_start_matches(['\r', '\n']).to_string();
                    }
                }
            }
            Request::Names(names) => {
                for name in names {
                    let Some(alias) = name.alias.as_deref().filter(|alias| *alias != name.name) else {
                        continue;
                    };
                    let line = format!("{alias} = {}\n", name.name);
                    if self.output.lines.insert(line.clone()) {
                        text.push_str(&line);
                    }
                }
            }
            Request::Whole => {}
        }

        log::debug!(
            "Emitting {} ({} bytes)",
            paths::display_relative(&module.path, self.context.workspace_root()),
            text.len()
        );
        self.output.push(id, library, text);
    }

    fn finish(self, main: PathBuf) -> Assembled {
        let Self {
            context, output, config, ..
        } = self;

        let mut text = String::new();
        if let Some(shebang) = &output.shebang {
            text.push_str(shebang);
            text.push('\n');
        }

        if config.hoist_future_imports {
            let mut seen = HashSet::new();
            let futures: Vec<&str> = context
                .modules()
                .iter()
                .flat_map(|module| module.futures.iter().map(String::as_str))
                .filter(|name| seen.insert(*name))
                .collect();
            if !futures.is_empty() {
                text.push_str(&format!("from __future__ import {}\n\n", futures.join(", ")));
            }
        }

        text.push_str(&output.chunks.concat());

        let included = output
            .included
            .iter()
            .map(|&id| context.module(id).path.clone())
            .collect();

        Assembled {
            text: normalize_blank_lines(&text),
            main,
            included,
            notes: output.notes,
        }
    }

    fn display(&self, path: &Path) -> String {
        paths::display_relative(path, self.context.workspace_root())
    }
}
