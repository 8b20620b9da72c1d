use crate::config::SymbolPolicy;
use crate::error::Result;
use crate::types::{ParsedSource, StatementEdit, StatementKind};
use std::collections::{HashMap, HashSet};

/// Segments picked for a named import, in emission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub segments: Vec<usize>,

    /// Requested names the module neither defines nor binds
    pub missing: Vec<String>,
}

/// Extract the requested top-level definitions from module text.
///
/// `None` returns the text unchanged. Module-level statements that are not
/// definitions are always kept.
pub fn extract_symbols(
    module_text: &str,
    names: Option<&[String]>,
    policy: SymbolPolicy,
) -> Result<String> {
    let Some(names) = names else {
        return Ok(module_text.to_string());
    };

    let parsed = ParsedSource::parse(module_text)?;
    let selection = select_segments(&parsed, names, policy);
    for name in &selection.missing {
        log::warn!("Symbol `{name}` is not defined at module level");
    }

    Ok(selection
        .segments
        .iter()
        .map(|&idx| parsed.render_segment(idx, |_, _| StatementEdit::Keep))
        .collect())
}

/// Choose the segments a named import needs.
///
/// Requested definitions come in request order, except that anything read
/// when a segment executes is placed before it: base classes, decorators and
/// default values ahead of their definition, and for module-level code every
/// definition it may call. Module-level statements keep their file order.
pub fn select_segments(parsed: &ParsedSource, names: &[String], policy: SymbolPolicy) -> Selection {
    let segment_count = parsed.segments().len();

    let mut definitions: HashMap<&str, usize> = HashMap::new();
    let mut globals = Vec::new();
    for idx in 0..segment_count {
        if let Some(name) = parsed.segment_definition(idx) {
            definitions.insert(name, idx);
        } else if is_global(parsed, idx) {
            globals.push(idx);
        }
    }

    let mut chosen: HashSet<usize> = HashSet::new();
    let mut requested = Vec::new();
    let mut missing = Vec::new();
    for name in names {
        match definitions.get(name.as_str()) {
            Some(&idx) => {
                if chosen.insert(idx) {
                    requested.push(idx);
                }
            }
            None => {
                if !parsed.bound_names().any(|bound| bound == name) {
                    missing.push(name.clone());
                }
            }
        }
    }

    let mut dependencies = Vec::new();
    if policy.follows_references() {
        let mut worklist: Vec<usize> = requested.iter().chain(globals.iter()).copied().collect();
        while let Some(idx) = worklist.pop() {
            for stmt in parsed.segment_statements(idx) {
                for reference in &stmt.references {
                    if let Some(&dep) = definitions.get(reference.as_str()) {
                        if chosen.insert(dep) {
                            dependencies.push(dep);
                            worklist.push(dep);
                        }
                    }
                }
            }
        }
        dependencies.sort_unstable();
    }

    let mut order = Placement::new(parsed, &chosen, &globals);
    let leading = globals
        .iter()
        .take_while(|&&idx| order.prerequisites(idx).iter().all(|p| !chosen.contains(p)))
        .copied()
        .collect::<Vec<_>>();
    for idx in leading
        .into_iter()
        .chain(requested)
        .chain(globals.iter().copied())
        .chain(dependencies)
    {
        order.visit(idx);
    }

    Selection {
        segments: order.emitted,
        missing,
    }
}

fn is_global(parsed: &ParsedSource, segment: usize) -> bool {
    parsed
        .segment_statements(segment)
        .iter()
        .all(|stmt| matches!(stmt.kind, StatementKind::Other | StatementKind::Import))
}

/// Depth-first placement of chosen segments behind what they need at run time
struct Placement<'a> {
    parsed: &'a ParsedSource,
    chosen: &'a HashSet<usize>,
    binders: HashMap<&'a str, Vec<usize>>,
    previous_global: HashMap<usize, usize>,
    visiting: HashSet<usize>,
    emitted: Vec<usize>,
    done: HashSet<usize>,
}

impl<'a> Placement<'a> {
    fn new(parsed: &'a ParsedSource, chosen: &'a HashSet<usize>, globals: &[usize]) -> Self {
        let mut binders: HashMap<&str, Vec<usize>> = HashMap::new();
        for &idx in chosen.iter().chain(globals) {
            for stmt in parsed.segment_statements(idx) {
                for name in &stmt.binds {
                    binders.entry(name.as_str()).or_default().push(idx);
                }
            }
        }
        for list in binders.values_mut() {
            list.sort_unstable();
            list.dedup();
        }

        let previous_global = globals
            .windows(2)
            .map(|pair| (pair[1], pair[0]))
            .collect();

        Self {
            parsed,
            chosen,
            binders,
            previous_global,
            visiting: HashSet::new(),
            emitted: Vec::new(),
            done: HashSet::new(),
        }
    }

    fn visit(&mut self, idx: usize) {
        if self.done.contains(&idx) || !self.visiting.insert(idx) {
            return;
        }
        if let Some(&previous) = self.previous_global.get(&idx) {
            self.visit(previous);
        }
        for dep in self.prerequisites(idx) {
            self.visit(dep);
        }
        self.visiting.remove(&idx);
        self.done.insert(idx);
        self.emitted.push(idx);
    }

    /// Segments that must already have run when `idx` runs, in file order.
    ///
    /// A definition needs what its header reads. Module-level code also needs
    /// every definition reachable through the functions it references, and
    /// the earlier globals those functions read.
    fn prerequisites(&self, idx: usize) -> Vec<usize> {
        let definition = self.parsed.segment_definition(idx).is_some();
        let mut names: Vec<&str> = self
            .parsed
            .segment_statements(idx)
            .iter()
            .flat_map(|stmt| {
                let refs = if definition {
                    &stmt.eager_references
                } else {
                    &stmt.references
                };
                refs.iter().map(String::as_str)
            })
            .collect();

        let mut seen: HashSet<usize> = HashSet::from([idx]);
        let mut out = Vec::new();
        while let Some(name) = names.pop() {
            let Some(targets) = self.binders.get(name) else {
                continue;
            };
            for &target in targets {
                let target_is_definition = self.parsed.segment_definition(target).is_some();
                if !target_is_definition && !definition && target > idx {
                    continue;
                }
                if !seen.insert(target) {
                    continue;
                }
                out.push(target);
                if !definition && target_is_definition && self.chosen.contains(&target) {
                    for stmt in self.parsed.segment_statements(target) {
                        names.extend(stmt.references.iter().map(String::as_str));
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }
}
