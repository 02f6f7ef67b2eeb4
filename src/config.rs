//! CLI configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via PLACEFLOW_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub log: LogConfig,
    /// REPL configuration.
    pub repl: ReplConfig,
    /// Terminal output configuration.
    pub output: OutputConfig,
}

impl Config {
    /// Loads configuration from `path` if given, then applies environment
    /// variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.log.apply_overrides(&lookup);
        self.repl.apply_overrides(&lookup);
        self.output.apply_overrides(&lookup);
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `placeflow_core=debug`.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

impl LogConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(filter) = lookup("PLACEFLOW_LOG") {
            if !filter.is_empty() {
                self.filter = filter;
            }
        }
    }
}

/// REPL configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// History file. Defaults to `~/.placeflow_history`.
    pub history_file: Option<PathBuf>,
    /// Maximum number of history entries kept.
    pub history_size: usize,
    /// Identifier of the subject driven by the session.
    pub subject: String,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            history_file: None,
            history_size: 1000,
            subject: "subject".to_string(),
        }
    }
}

impl ReplConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("PLACEFLOW_HISTORY") {
            self.history_file = Some(PathBuf::from(path));
        }
    }

    /// Resolves the history file location.
    pub fn history_path(&self) -> PathBuf {
        if let Some(ref path) = self.history_file {
            return path.clone();
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".placeflow_history"))
            .unwrap_or_else(|_| ".placeflow_history".into())
    }
}

/// Terminal output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Colorize output.
    pub color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

impl OutputConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        // https://no-color.org: any non-empty value disables color.
        if lookup("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            self.color = false;
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log.filter, "warn");
        assert_eq!(config.repl.history_size, 1000);
        assert_eq!(config.repl.subject, "subject");
        assert!(config.output.color);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "log:\n  filter: placeflow_core=debug\nrepl:\n  history_size: 50\noutput:\n  color: false"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.log.filter, "placeflow_core=debug");
        assert_eq!(config.repl.history_size, 50);
        assert_eq!(config.repl.subject, "subject");
        assert!(!config.output.color);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("PLACEFLOW_LOG", "debug"),
            ("PLACEFLOW_HISTORY", "/tmp/history"),
            ("NO_COLOR", "1"),
        ]));

        assert_eq!(config.log.filter, "debug");
        assert_eq!(config.repl.history_path(), PathBuf::from("/tmp/history"));
        assert!(!config.output.color);
    }

    #[test]
    fn test_empty_no_color_keeps_color() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[("NO_COLOR", ""), ("PLACEFLOW_LOG", "")]));
        assert!(config.output.color);
        assert_eq!(config.log.filter, "warn");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
        assert!(err.to_string().contains("nope.yaml"));
    }

    #[test]
    fn test_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "repl:\n  history_size: lots").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse(..))
        ));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.repl.history_size, config.repl.history_size);
    }
}
