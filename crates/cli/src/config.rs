use anyhow::{Context, Result};
use libmerge_merger::MergeConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "libmerge.toml";

/// Contents of `libmerge.toml`
///
/// ```toml
/// contest_dir = "contest"
/// output_dir = ".temp"
///
/// [merge]
/// library_root = "contest/lib"
/// symbol_policy = "exact"
/// lenient_fixtures = ["test_syntax_*.py"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Root of `<contest>/<problem>/<problem>.<ext>` sources
    pub contest_dir: PathBuf,

    /// Where `bundle` writes merged files
    pub output_dir: PathBuf,

    pub merge: MergeConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            contest_dir: PathBuf::from("contest"),
            output_dir: PathBuf::from(".temp"),
            merge: MergeConfig::default(),
        }
    }
}

impl FileConfig {
    /// Load `explicit`, or `libmerge.toml` from `cwd` when present, or defaults.
    ///
    /// Relative `workspace_root`, `contest_dir` and `output_dir` are anchored at
    /// the directory holding the file (`cwd` for defaults). A relative
    /// `library_root` stays relative to the workspace root.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        let (config, base) = match explicit {
            Some(path) => {
                let path = absolutize(path, cwd);
                let config = Self::from_file(&path)?;
                let base = path.parent().map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);
                (config, base)
            }
            None => {
                let candidate = cwd.join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    log::debug!("Using {}", candidate.display());
                    (Self::from_file(&candidate)?, cwd.to_path_buf())
                } else {
                    (Self::default(), cwd.to_path_buf())
                }
            }
        };
        Ok(config.anchored(&base))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn anchored(mut self, base: &Path) -> Self {
        self.merge.workspace_root = absolutize(&self.merge.workspace_root, base);
        self.contest_dir = absolutize(&self.contest_dir, base);
        self.output_dir = absolutize(&self.output_dir, base);
        self
    }

    /// `<contest_dir>/<contest>/<problem>/<problem>.<ext>`
    pub fn problem_source(&self, contest: &str, problem: &str) -> PathBuf {
        self.contest_dir
            .join(contest)
            .join(problem)
            .join(format!("{problem}.{}", self.merge.extension))
    }

    /// `<output_dir>/<problem>.<ext>`
    pub fn bundle_output(&self, problem: &str) -> PathBuf {
        self.output_dir
            .join(format!("{problem}.{}", self.merge.extension))
    }
}

pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libmerge_syntax::SymbolPolicy;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = FileConfig::from_toml(
            r#"
output_dir = "out"

[merge]
symbol_policy = "exact"
lenient_fixtures = ["test_syntax_*.py"]
"#,
        )
        .unwrap();

        assert_eq!(config.contest_dir, PathBuf::from("contest"));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.merge.symbol_policy, SymbolPolicy::Exact);
        assert_eq!(config.merge.library_root, PathBuf::from("contest/lib"));
        assert_eq!(config.merge.lenient_fixtures, vec!["test_syntax_*.py".to_string()]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FileConfig::from_toml("lib_dir = \"x\"\n").is_err());
        assert!(FileConfig::from_toml("[merge]\nlib = \"x\"\n").is_err());
    }

    #[test]
    fn relative_paths_are_anchored() {
        let config = FileConfig::default().anchored(Path::new("/ws"));
        assert_eq!(config.merge.workspace_root, PathBuf::from("/ws/."));
        assert_eq!(config.contest_dir, PathBuf::from("/ws/contest"));
        assert_eq!(
            config.problem_source("abc123", "a"),
            PathBuf::from("/ws/contest/abc123/a/a.py")
        );
        assert_eq!(config.bundle_output("a"), PathBuf::from("/ws/.temp/a.py"));
    }
}
