use std::env;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Storage configuration.
///
/// Reads the output directory from the `WRIGHT_OUTPUT_DIR` environment
/// variable, falling back to `./out` when unset.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory that receives the generated project files.
    pub output_dir: PathBuf,
}

impl StoreConfig {
    /// The default output directory used when no environment variable is set.
    pub const DEFAULT_OUTPUT_DIR: &str = "out";

    /// Name of the bookkeeping directory inside the output directory.
    pub const STATE_DIR: &str = ".wright";

    /// Build a config from the environment.
    pub fn from_env() -> Self {
        let output_dir = env::var("WRIGHT_OUTPUT_DIR")
            .unwrap_or_else(|_| Self::DEFAULT_OUTPUT_DIR.to_owned());
        Self::new(output_dir)
    }

    /// Build a config from an explicit directory (useful for tests and CLI flags).
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Directory holding wright's own state (`<out>/.wright`).
    pub fn state_dir(&self) -> PathBuf {
        self.output_dir.join(Self::STATE_DIR)
    }

    /// Directory holding run logs.
    pub fn runs_dir(&self) -> PathBuf {
        self.state_dir().join("runs")
    }

    /// Path of the JSONL log for a given run.
    pub fn run_log_path(&self, run_id: Uuid) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.jsonl"))
    }

    /// Whether `path` (relative to the output directory) lies inside the
    /// bookkeeping directory. Generated files must never land there.
    pub fn is_state_path(path: &Path) -> bool {
        path.components()
            .next()
            .is_some_and(|c| c.as_os_str() == Self::STATE_DIR)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_new() {
        let cfg = StoreConfig::new("/tmp/project");
        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/project"));
        assert_eq!(cfg.state_dir(), PathBuf::from("/tmp/project/.wright"));
        assert_eq!(cfg.runs_dir(), PathBuf::from("/tmp/project/.wright/runs"));
    }

    #[test]
    fn run_log_path_uses_run_id() {
        let cfg = StoreConfig::new("out");
        let path = cfg.run_log_path(Uuid::nil());
        assert!(path.ends_with("00000000-0000-0000-0000-000000000000.jsonl"));
    }

    #[test]
    fn state_path_detection() {
        assert!(StoreConfig::is_state_path(Path::new(".wright/runs/x.jsonl")));
        assert!(!StoreConfig::is_state_path(Path::new("src/.wright")));
        assert!(!StoreConfig::is_state_path(Path::new("app.py")));
    }
}
