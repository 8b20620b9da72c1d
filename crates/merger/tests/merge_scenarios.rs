use libmerge_merger::{merge, MergeConfig, MergeError, Merger, Resolution};
use libmerge_syntax::{ParsedSource, SymbolPolicy};
use std::collections::HashSet;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const BASIC: &str = r"def gcd(a, b):
    while b:
        a, b = b, a % b
    return a


def lcm(a, b):
    return a // gcd(a, b) * b
";

const FGH: &str = r"def f(x):
    return x + 1


def g(x):
    return x * 2


def h(x):
    return x - 3
";

struct Workspace {
    _temp: TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = fs::canonicalize(temp.path()).expect("canonical tempdir");
        let ws = Self { _temp: temp, root };
        ws.write("contest/lib/basic.py", BASIC);
        ws.write("contest/lib/fgh.py", FGH);
        ws
    }

    fn write(&self, relative: &str, text: &str) -> PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, text).unwrap();
        path
    }

    fn config(&self) -> MergeConfig {
        MergeConfig::new(&self.root, self.root.join("contest/lib"))
    }

    fn main(&self, text: &str) -> PathBuf {
        self.write("contest/abc123/a/a.py", text)
    }

    fn merge(&self, main: &Path) -> Result<String, MergeError> {
        merge(main, &self.config())
    }
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

/// Every module-level name read while the merged file runs top to bottom
/// must already be bound by an earlier statement
fn assert_runs_top_to_bottom(merged: &str) {
    let parsed = ParsedSource::parse(merged).expect("merged output parses");
    let defined: HashSet<&str> = parsed.bound_names().collect();
    let mut bound = HashSet::new();
    for stmt in parsed.statements() {
        for name in &stmt.eager_references {
            assert!(
                !defined.contains(name.as_str()) || bound.contains(name.as_str()),
                "`{name}` is read on line {} before it is bound:\n{merged}",
                stmt.line
            );
        }
        bound.extend(stmt.binds.iter().map(String::as_str));
    }
}

#[test]
fn named_import_is_replaced_by_the_definition() {
    let ws = Workspace::new();
    let main = ws.main(
        r#"from ..lib.basic import gcd


def solve():
    print(gcd(10, 5))


if __name__ == "__main__":
    solve()
"#,
    );

    let merged = ws.merge(&main).unwrap();
    assert_eq!(
        merged,
        r#"def gcd(a, b):
    while b:
        a, b = b, a % b
    return a

def solve():
    print(gcd(10, 5))

if __name__ == "__main__":
    solve()
"#
    );
    assert!(!merged.contains("import gcd"));
    assert!(!merged.contains("def lcm"));
}

#[test]
fn several_imports_from_several_modules() {
    let ws = Workspace::new();
    ws.write("contest/lib/modpow.py", "def pow_mod(a, e, m):\n    return pow(a, e, m)\n");
    let main = ws.main(
        "from ..lib.basic import gcd, lcm\nfrom ..lib.modpow import pow_mod\n\nprint(gcd(4, 6), lcm(4, 6), pow_mod(2, 10, 7))\n",
    );

    let merged = ws.merge(&main).unwrap();
    for def in ["def gcd", "def lcm", "def pow_mod"] {
        assert_eq!(count(&merged, def), 1, "{def} in:\n{merged}");
    }
    assert!(!merged.contains("from ..lib"));
    assert!(merged.trim_end().ends_with("print(gcd(4, 6), lcm(4, 6), pow_mod(2, 10, 7))"));
}

#[test]
fn library_modules_pull_in_their_own_imports() {
    let ws = Workspace::new();
    ws.write(
        "contest/lib/advanced.py",
        "from .basic import gcd\n\n\ndef gcd_many(xs):\n    out = 0\n    for x in xs:\n        out = gcd(out, x)\n    return out\n",
    );
    let main = ws.main("from ..lib.advanced import gcd_many\n\nprint(gcd_many([12, 18, 30]))\n");

    let outcome = Merger::new(ws.config())
        .unwrap()
        .merge_detailed(&main)
        .unwrap();
    let merged = &outcome.text;

    assert!(!merged.contains("from .basic"));
    assert!(merged.find("def gcd(").unwrap() < merged.find("def gcd_many").unwrap());
    assert_eq!(
        outcome.modules,
        vec![
            ws.root.join("contest/lib/basic.py"),
            ws.root.join("contest/lib/advanced.py"),
        ]
    );
    assert!(outcome.notes.is_empty());
}

#[test]
fn missing_library_names_the_module() {
    let ws = Workspace::new();
    let main = ws.main("from ..lib.missing import foo\n\nfoo()\n");

    let err = ws.merge(&main).unwrap_err();
    assert_eq!(err.missing_module(), Some("..lib.missing"));
    assert!(err.to_string().contains("..lib.missing"), "{err}");
    assert!(matches!(err, MergeError::MissingLibrary { line: 1, .. }));
}

#[test]
fn missing_name_in_existing_module_is_not_an_error() {
    let ws = Workspace::new();
    let main = ws.main("from ..lib.basic import nothing_here\n\nprint(1)\n");

    let merged = ws.merge(&main).unwrap();
    assert_eq!(merged, "print(1)\n");
}

#[test]
fn syntax_errors_fail_unless_the_file_is_a_lenient_fixture() {
    let ws = Workspace::new();
    let broken = "def broken(:\n    pass\n\n\n\nfrom ..lib.basic import gcd\n";
    let main = ws.write("contest/abc123/a/test_syntax_error.py", broken);

    let err = ws.merge(&main).unwrap_err();
    assert!(matches!(err, MergeError::Parse { .. }), "{err:?}");

    let lenient = Merger::new(ws.config().with_lenient_fixture("test_syntax_*.py")).unwrap();
    let outcome = lenient.merge_detailed(&main).unwrap();
    assert_eq!(outcome.text, broken);
    assert_eq!(outcome.notes.len(), 1);
}

#[test]
fn lenient_fixture_keeps_unresolved_import() {
    let ws = Workspace::new();
    let main = ws.write(
        "contest/abc123/a/test_missing_lib.py",
        "from ..lib.missing import foo\nfrom ..lib.basic import gcd\n\nprint(gcd(2, 4))\n",
    );
    let merger = Merger::new(ws.config().with_lenient_fixture("test_missing_*.py")).unwrap();

    let outcome = merger.merge_detailed(&main).unwrap();
    assert!(outcome.text.contains("from ..lib.missing import foo\n"));
    assert!(!outcome.text.contains("from ..lib.basic"));
    assert!(outcome.text.contains("def gcd"));
    assert_eq!(outcome.notes.len(), 1);
    assert!(outcome.notes[0].contains("..lib.missing"));
}

#[test]
fn diamond_dependency_is_included_once() {
    let ws = Workspace::new();
    ws.write("contest/lib/base.py", "def shared():\n    return 1\n");
    ws.write("contest/lib/left.py", "from .base import shared\n\ndef left():\n    return shared()\n");
    ws.write("contest/lib/right.py", "from .base import shared\n\ndef right():\n    return shared() + 1\n");
    let main = ws.main("from ..lib.left import left\nfrom ..lib.right import right\n\nprint(left() + right())\n");

    let merged = ws.merge(&main).unwrap();
    assert_eq!(count(&merged, "def shared"), 1, "{merged}");
    assert_eq!(count(&merged, "def left"), 1);
    assert_eq!(count(&merged, "def right"), 1);
    assert!(merged.find("def shared").unwrap() < merged.find("def left").unwrap());
}

#[test]
fn import_cycle_terminates_with_each_definition_once() {
    let ws = Workspace::new();
    ws.write(
        "contest/lib/ping.py",
        "from .pong import pong\n\ndef ping(n):\n    return 0 if n == 0 else pong(n - 1)\n",
    );
    ws.write(
        "contest/lib/pong.py",
        "from .ping import ping\n\ndef pong(n):\n    return 1 if n == 0 else ping(n - 1)\n",
    );
    let main = ws.main("from ..lib.ping import ping\n\nprint(ping(5))\n");

    let merged = ws.merge(&main).unwrap();
    assert_eq!(count(&merged, "def ping"), 1, "{merged}");
    assert_eq!(count(&merged, "def pong"), 1, "{merged}");
    assert!(!merged.contains("import ping") && !merged.contains("import pong"));
    assert!(merged.trim_end().ends_with("print(ping(5))"));
}

#[test]
fn module_importing_itself_terminates() {
    let ws = Workspace::new();
    ws.write("contest/lib/selfish.py", "from .selfish import other\n\ndef me():\n    return other()\n\ndef other():\n    return 2\n");
    let main = ws.main("from ..lib.selfish import me\n\nprint(me())\n");

    let merged = ws.merge(&main).unwrap();
    assert_eq!(count(&merged, "def me"), 1);
    assert_eq!(count(&merged, "def other"), 1);
}

#[test]
fn selective_import_leaves_out_unrequested_functions() {
    let ws = Workspace::new();
    let main = ws.main("from ..lib.fgh import f, h\n\nprint(f(1), h(2))\n");

    for policy in [SymbolPolicy::Exact, SymbolPolicy::WithDependencies] {
        let merged = merge(&main, &ws.config().with_symbol_policy(policy)).unwrap();
        assert!(merged.contains("def f(x):"));
        assert!(merged.contains("def h(x):"));
        assert!(!merged.contains("def g(x):"), "{policy:?}:\n{merged}");
    }
}

#[test]
fn dependency_policy_follows_same_module_calls() {
    let ws = Workspace::new();
    let main = ws.main("from ..lib.basic import lcm\n\nprint(lcm(4, 6))\n");

    let with_deps = ws.merge(&main).unwrap();
    assert!(with_deps.contains("def gcd"));

    let exact = merge(&main, &ws.config().with_symbol_policy(SymbolPolicy::Exact)).unwrap();
    assert!(!exact.contains("def gcd"));
    assert!(exact.contains("def lcm"));
}

#[test]
fn wildcard_import_inlines_every_function_verbatim() {
    let ws = Workspace::new();
    let main = ws.main("from ..lib.fgh import *\n\nprint(f(1) + g(2) + h(3))\n");

    let merged = ws.merge(&main).unwrap();
    for body in [
        "def f(x):\n    return x + 1\n",
        "def g(x):\n    return x * 2\n",
        "def h(x):\n    return x - 3\n",
    ] {
        assert!(merged.contains(body), "missing {body:?} in:\n{merged}");
    }
}

#[test]
fn merging_merged_output_is_stable() {
    let ws = Workspace::new();
    let main = ws.main("import sys\nfrom ..lib.basic import lcm\n\n\n\nprint(lcm(3, 4), file=sys.stderr)\n");

    let merged = ws.merge(&main).unwrap();
    let again = ws.write("contest/abc123/b/b.py", &merged);
    assert_eq!(ws.merge(&again).unwrap(), merged);
}

#[test]
fn foreign_imports_are_preserved_in_order() {
    let ws = Workspace::new();
    let main = ws.main(
        "import sys\nfrom collections import deque\nfrom ..lib.basic import gcd\nimport heapq\n\nprint(gcd(1, 2), deque(), heapq, sys)\n",
    );

    let merged = ws.merge(&main).unwrap();
    assert!(merged.contains("import sys\nfrom collections import deque\nimport heapq\n"), "{merged}");
    assert!(merged.find("def gcd").unwrap() < merged.find("import sys").unwrap());
}

#[test]
fn mixed_plain_import_keeps_only_foreign_modules() {
    let ws = Workspace::new();
    let main = ws.main("import sys, lib.basic\n\nprint(sys.argv)\n");

    let merged = ws.merge(&main).unwrap();
    assert!(merged.contains("import sys\n"));
    assert!(!merged.contains("lib.basic"));
    assert!(merged.contains("def gcd") && merged.contains("def lcm"));
}

#[test]
fn future_imports_are_hoisted_below_the_shebang() {
    let ws = Workspace::new();
    ws.write(
        "contest/lib/typed.py",
        "from __future__ import annotations\n\ndef typed(x: int) -> int:\n    return x\n",
    );
    let main = ws.main(
        "#!/usr/bin/env python3\nfrom __future__ import annotations\nfrom ..lib.typed import typed\n\nprint(typed(1))\n",
    );

    let merged = ws.merge(&main).unwrap();
    assert_eq!(
        merged,
        "#!/usr/bin/env python3\nfrom __future__ import annotations\n\ndef typed(x: int) -> int:\n    return x\n\nprint(typed(1))\n"
    );
}

#[test]
fn library_main_guards_are_stripped() {
    let ws = Workspace::new();
    ws.write(
        "contest/lib/runner.py",
        "def run():\n    return 42\n\nif __name__ == \"__main__\":\n    print(\"self-test\")\n",
    );
    let main = ws.main("from ..lib.runner import *\n\nif __name__ == \"__main__\":\n    print(run())\n");

    let merged = ws.merge(&main).unwrap();
    assert!(!merged.contains("self-test"));
    assert!(merged.contains("def run"));
    assert_eq!(count(&merged, "if __name__"), 1);
}

#[test]
fn aliased_import_binds_the_alias() {
    let ws = Workspace::new();
    let main = ws.main("from ..lib.basic import gcd as g\n\nprint(g(8, 12))\n");

    let merged = ws.merge(&main).unwrap();
    assert!(merged.contains("def gcd"));
    assert!(merged.contains("g = gcd\n"));
}

#[test]
fn library_rooted_absolute_import() {
    let ws = Workspace::new();
    let main = ws.main("from lib.basic import gcd\n\nprint(gcd(3, 9))\n");

    let merged = ws.merge(&main).unwrap();
    assert!(merged.contains("def gcd"));
    assert!(!merged.contains("from lib.basic"));
}

#[test]
fn unsupported_main_file_is_rejected() {
    let ws = Workspace::new();
    let notes = ws.write("contest/abc123/a/notes.txt", "hello\n");
    assert!(matches!(ws.merge(&notes), Err(MergeError::UnsupportedFile(_))));
}

#[test]
fn library_outside_workspace_is_invalid_config() {
    let ws = Workspace::new();
    let other = tempfile::tempdir().unwrap();
    let config = MergeConfig::new(&ws.root, other.path().join("lib"));
    assert!(matches!(Merger::new(config), Err(MergeError::InvalidConfig(_))));
}

#[test]
fn repeated_merges_do_not_share_state() {
    let ws = Workspace::new();
    let main = ws.main("from ..lib.basic import gcd\n\nprint(gcd(2, 3))\n");
    let merger = Merger::new(ws.config()).unwrap();

    let first = merger.merge(&main).unwrap();
    let second = merger.merge(&main).unwrap();
    assert_eq!(first, second);
    assert_eq!(count(&second, "def gcd"), 1);
}

#[test]
fn inspect_imports_reports_resolution() {
    let ws = Workspace::new();
    let main = ws.main("import os\nfrom ..lib.basic import gcd\n");
    let reports = Merger::new(ws.config()).unwrap().inspect_imports(&main).unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].resolution, Resolution::Foreign);
    assert_eq!(
        reports[1].resolution,
        Resolution::Library {
            path: ws.root.join("contest/lib/basic.py")
        }
    );
}

#[test]
fn base_class_is_defined_before_the_subclass() {
    let ws = Workspace::new();
    ws.write(
        "contest/lib/shapes.py",
        "class Base:\n    def area(self):\n        return 0\n\n\nclass Square(Base):\n    def __init__(self, side):\n        self.side = side\n\n    def area(self):\n        return self.side ** 2\n",
    );
    let main = ws.main("from ..lib.shapes import Square\n\nprint(Square(3).area())\n");

    let merged = ws.merge(&main).unwrap();
    assert!(merged.find("class Base:").unwrap() < merged.find("class Square(Base):").unwrap());
    assert_runs_top_to_bottom(&merged);
}

#[test]
fn decorator_is_defined_before_the_decorated_function() {
    let ws = Workspace::new();
    ws.write(
        "contest/lib/memo.py",
        "def memo(fn):\n    cache = {}\n\n    def inner(n):\n        if n not in cache:\n            cache[n] = fn(n)\n        return cache[n]\n\n    return inner\n\n\n@memo\ndef fib(n):\n    return n if n < 2 else fib(n - 1) + fib(n - 2)\n",
    );
    let main = ws.main("from ..lib.memo import fib\n\nprint(fib(30))\n");

    let merged = ws.merge(&main).unwrap();
    assert!(merged.find("def memo").unwrap() < merged.find("@memo").unwrap());
    assert_runs_top_to_bottom(&merged);
}

#[test]
fn default_argument_global_is_computed_before_use() {
    let ws = Workspace::new();
    ws.write(
        "contest/lib/limits.py",
        "def make(n):\n    return n * 10\n\n\nLIMIT = make(5)\n\n\ndef clamp(x, hi=LIMIT):\n    return min(x, hi)\n",
    );
    let main = ws.main("from ..lib.limits import clamp\n\nprint(clamp(100))\n");

    let merged = ws.merge(&main).unwrap();
    let make = merged.find("def make").unwrap();
    let limit = merged.find("LIMIT = make(5)").unwrap();
    let clamp = merged.find("def clamp").unwrap();
    assert!(make < limit && limit < clamp, "{merged}");
    assert_runs_top_to_bottom(&merged);
}

#[test]
fn global_built_from_library_functions_follows_them() {
    let ws = Workspace::new();
    ws.write(
        "contest/lib/table.py",
        "def square(x):\n    return x * x\n\n\ndef build(n):\n    return [square(i) for i in range(n)]\n\n\nTABLE = build(10)\n\n\ndef lookup(i):\n    return TABLE[i]\n",
    );
    let main = ws.main("from ..lib.table import lookup\n\nprint(lookup(3))\n");

    let merged = ws.merge(&main).unwrap();
    let table = merged.find("TABLE = build(10)").unwrap();
    assert!(merged.find("def square").unwrap() < table, "{merged}");
    assert!(merged.find("def build").unwrap() < table, "{merged}");
    assert!(merged.find("print(lookup(3))").unwrap() > table);
    assert_runs_top_to_bottom(&merged);
}

#[test]
fn attribute_names_do_not_pull_in_definitions() {
    let ws = Workspace::new();
    ws.write(
        "contest/lib/shapes.py",
        "def f(x):\n    return x.g\n\n\ndef g():\n    return 1\n\n\ndef h(x):\n    return sorted(x, key=len)\n\n\ndef key():\n    return 2\n",
    );
    let main = ws.main("from ..lib.shapes import f, h\n\nprint(f, h)\n");

    let merged = ws.merge(&main).unwrap();
    assert!(merged.contains("def f(x):") && merged.contains("def h(x):"));
    assert!(!merged.contains("def g"), "{merged}");
    assert!(!merged.contains("def key"), "{merged}");
}
