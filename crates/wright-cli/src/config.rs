//! Configuration file management for wright.
//!
//! Provides a TOML-based config file at `~/.config/wright/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use wright_core::PipelineConfig;
use wright_core::model::CommandModelConfig;
use wright_store::StoreConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Executable to run for each model call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Flag that carries the system prompt. Empty string disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_max: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_max_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl ConfigFile {
    /// A config file with every default spelled out, as written by
    /// `wright init`.
    pub fn with_defaults() -> Self {
        let model = CommandModelConfig::default();
        let pipeline = PipelineConfig::default();
        Self {
            model: ModelSection {
                name: Some(model.name),
                command: Some(model.program),
                args: Some(model.args),
                system_flag: model.system_flag,
                timeout_secs: Some(model.timeout.as_secs()),
            },
            pipeline: PipelineSection {
                retry_max: Some(pipeline.retry_max),
                max_concurrency: Some(pipeline.max_concurrency),
                task_timeout_secs: Some(pipeline.task_timeout.as_secs()),
                backoff_base_ms: Some(pipeline.backoff_base.as_millis() as u64),
                backoff_max_ms: Some(pipeline.backoff_max.as_millis() as u64),
                drain_timeout_secs: Some(pipeline.drain_timeout.as_secs()),
            },
            output: OutputSection {
                dir: Some(PathBuf::from(StoreConfig::DEFAULT_OUTPUT_DIR)),
            },
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the wright config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/wright` or `~/.config/wright`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("wright");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("wright")
}

/// Return the path to the wright config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns `Ok(None)` when there is none.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;
    Ok(path)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub output_dir: Option<PathBuf>,
    pub model_command: Option<String>,
    pub retry_max: Option<u32>,
    pub max_concurrency: Option<usize>,
    pub task_timeout_secs: Option<u64>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct WrightConfig {
    pub model: CommandModelConfig,
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
}

impl WrightConfig {
    /// Resolve against the real environment and config file.
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let file = load_config()?;
        Self::resolve_with(overrides, file.as_ref(), |key| std::env::var(key).ok())
    }

    /// Resolve using the chain: CLI flag > `WRIGHT_*` env var > config
    /// file > default.
    pub fn resolve_with(
        overrides: &Overrides,
        file: Option<&ConfigFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let empty = ConfigFile::default();
        let file = file.unwrap_or(&empty);
        let env_parsed = |key: &str| -> Result<Option<u64>> {
            env(key)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{key} must be a non-negative integer, got {v:?}"))
                })
                .transpose()
        };

        // Model.
        let mut model = CommandModelConfig::default();
        if let Some(name) = &file.model.name {
            model.name = name.clone();
        }
        model.program = overrides
            .model_command
            .clone()
            .or_else(|| env("WRIGHT_MODEL_COMMAND"))
            .or_else(|| file.model.command.clone())
            .unwrap_or(model.program);
        if let Some(args) = &file.model.args {
            model.args = args.clone();
        }
        if let Some(flag) = &file.model.system_flag {
            model.system_flag = (!flag.is_empty()).then(|| flag.clone());
        }
        if let Some(secs) = env_parsed("WRIGHT_MODEL_TIMEOUT_SECS")?.or(file.model.timeout_secs) {
            model.timeout = Duration::from_secs(secs);
        }

        // Pipeline.
        let section = &file.pipeline;
        let mut pipeline = PipelineConfig::default();
        pipeline.retry_max = match overrides.retry_max {
            Some(n) => n,
            None => match env_parsed("WRIGHT_RETRY_MAX")? {
                Some(n) => u32::try_from(n).context("WRIGHT_RETRY_MAX is too large")?,
                None => section.retry_max.unwrap_or(pipeline.retry_max),
            },
        };
        pipeline.max_concurrency = match overrides.max_concurrency {
            Some(n) => n,
            None => match env_parsed("WRIGHT_MAX_CONCURRENCY")? {
                Some(n) => usize::try_from(n).context("WRIGHT_MAX_CONCURRENCY is too large")?,
                None => section.max_concurrency.unwrap_or(pipeline.max_concurrency),
            },
        }
        .max(1);
        if let Some(secs) = overrides
            .task_timeout_secs
            .or(env_parsed("WRIGHT_TASK_TIMEOUT_SECS")?)
            .or(section.task_timeout_secs)
        {
            pipeline.task_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = section.backoff_base_ms {
            pipeline.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = section.backoff_max_ms {
            pipeline.backoff_max = Duration::from_millis(ms);
        }
        if let Some(secs) = section.drain_timeout_secs {
            pipeline.drain_timeout = Duration::from_secs(secs);
        }

        // Output directory.
        let output_dir = overrides
            .output_dir
            .clone()
            .or_else(|| env("WRIGHT_OUTPUT_DIR").map(PathBuf::from))
            .or_else(|| file.output.dir.clone())
            .unwrap_or_else(|| PathBuf::from(StoreConfig::DEFAULT_OUTPUT_DIR));

        Ok(Self {
            model,
            pipeline,
            store: StoreConfig::new(output_dir),
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn file() -> ConfigFile {
        ConfigFile {
            model: ModelSection {
                command: Some("file-model".to_string()),
                timeout_secs: Some(42),
                ..ModelSection::default()
            },
            pipeline: PipelineSection {
                retry_max: Some(7),
                max_concurrency: Some(2),
                ..PipelineSection::default()
            },
            output: OutputSection {
                dir: Some(PathBuf::from("from-file")),
            },
        }
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = WrightConfig::resolve_with(&Overrides::default(), None, env_of(&[])).unwrap();
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(config.model, CommandModelConfig::default());
        assert_eq!(config.store.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn config_file_overrides_defaults() {
        let config =
            WrightConfig::resolve_with(&Overrides::default(), Some(&file()), env_of(&[])).unwrap();
        assert_eq!(config.model.program, "file-model");
        assert_eq!(config.model.timeout, Duration::from_secs(42));
        assert_eq!(config.pipeline.retry_max, 7);
        assert_eq!(config.pipeline.max_concurrency, 2);
        assert_eq!(config.store.output_dir, PathBuf::from("from-file"));
    }

    #[test]
    fn env_var_overrides_config_file() {
        let env = env_of(&[
            ("WRIGHT_MODEL_COMMAND", "env-model"),
            ("WRIGHT_RETRY_MAX", "1"),
            ("WRIGHT_OUTPUT_DIR", "from-env"),
        ]);
        let config = WrightConfig::resolve_with(&Overrides::default(), Some(&file()), env).unwrap();
        assert_eq!(config.model.program, "env-model");
        assert_eq!(config.pipeline.retry_max, 1);
        assert_eq!(config.store.output_dir, PathBuf::from("from-env"));
    }

    #[test]
    fn cli_flag_overrides_all() {
        let overrides = Overrides {
            output_dir: Some(PathBuf::from("from-cli")),
            model_command: Some("cli-model".to_string()),
            retry_max: Some(0),
            max_concurrency: Some(4),
            task_timeout_secs: Some(9),
        };
        let env = env_of(&[("WRIGHT_RETRY_MAX", "1"), ("WRIGHT_MODEL_COMMAND", "env-model")]);
        let config = WrightConfig::resolve_with(&overrides, Some(&file()), env).unwrap();
        assert_eq!(config.model.program, "cli-model");
        assert_eq!(config.pipeline.retry_max, 0);
        assert_eq!(config.pipeline.max_concurrency, 4);
        assert_eq!(config.pipeline.task_timeout, Duration::from_secs(9));
        assert_eq!(config.store.output_dir, PathBuf::from("from-cli"));
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let overrides = Overrides {
            max_concurrency: Some(0),
            ..Overrides::default()
        };
        let config = WrightConfig::resolve_with(&overrides, None, env_of(&[])).unwrap();
        assert_eq!(config.pipeline.max_concurrency, 1);
    }

    #[test]
    fn bad_env_number_is_an_error() {
        let env = env_of(&[("WRIGHT_RETRY_MAX", "lots")]);
        let err = WrightConfig::resolve_with(&Overrides::default(), None, env).unwrap_err();
        assert!(err.to_string().contains("WRIGHT_RETRY_MAX"), "got: {err}");
    }

    #[test]
    fn empty_system_flag_disables_it() {
        let file = ConfigFile {
            model: ModelSection {
                system_flag: Some(String::new()),
                ..ModelSection::default()
            },
            ..ConfigFile::default()
        };
        let config =
            WrightConfig::resolve_with(&Overrides::default(), Some(&file), env_of(&[])).unwrap();
        assert_eq!(config.model.system_flag, None);
    }

    #[test]
    fn default_file_roundtrips_through_toml() {
        let original = ConfigFile::with_defaults();
        let text = toml::to_string_pretty(&original).unwrap();
        assert!(text.contains("[pipeline]"));
        assert!(text.contains("retry_max = 3"));
        let loaded: ConfigFile = toml::from_str(&text).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn partial_file_parses() {
        let loaded: ConfigFile = toml::from_str("[pipeline]\nmax_concurrency = 3\n").unwrap();
        assert_eq!(loaded.pipeline.max_concurrency, Some(3));
        assert_eq!(loaded.model, ModelSection::default());
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("wright/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
