use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const CONFIG_ENV_VAR: &str = "MUTATION_INTERPRETER_CONFIG";

const DEFAULT_BASE_URL: &str = "http://localhost/";
const DEFAULT_USER_AGENT: &str = concat!("mutation-interpreter/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid base_url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Which scheduling primitives the host provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostCapabilities {
    pub idle_callback: bool,
    pub animation_frame: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            idle_callback: true,
            animation_frame: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Reject batches that leave nodes on the operand stack.
    pub strict_stack: bool,
    pub frame_interval_ms: u64,
    /// Delay before an idle callback runs when nothing else is queued.
    pub idle_delay_ms: u64,
    pub idle_budget_ms: u64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub base_url: String,
    pub capabilities: HostCapabilities,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            strict_stack: true,
            frame_interval_ms: 16,
            idle_delay_ms: 1,
            idle_budget_ms: 50,
            fetch_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            capabilities: HostCapabilities::default(),
        }
    }
}

impl InterpreterConfig {
    /// Resolution order: explicit path, `MUTATION_INTERPRETER_CONFIG`, the
    /// per-user config directory, then built-in defaults. Only an explicit
    /// path is required to exist.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::from_file(&path);
        }
        if let Some(path) = env::var_os(CONFIG_ENV_VAR).map(PathBuf::from) {
            if path.exists() {
                return Self::from_file(&path);
            }
            tracing::warn!(path = %path.display(), "{CONFIG_ENV_VAR} points at a missing file");
        }
        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&contents)?;
        tracing::debug!(path = %path.display(), "loaded interpreter config");
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.base_url()?;
        Ok(config)
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Ok(Url::parse(&self.base_url)?)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn idle_budget(&self) -> Duration {
        Duration::from_millis(self.idle_budget_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "mutation-interpreter", "mutation-interpreter")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_strict() {
        let config = InterpreterConfig::default();
        assert!(config.strict_stack);
        assert_eq!(config.frame_interval(), Duration::from_millis(16));
        assert!(config.capabilities.idle_callback);
    }

    #[test]
    fn loads_partial_yaml_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "strict_stack: false\nframe_interval_ms: 8\ncapabilities:\n  idle_callback: false"
        )
        .unwrap();
        let config = InterpreterConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert!(!config.strict_stack);
        assert_eq!(config.frame_interval_ms, 8);
        assert!(!config.capabilities.idle_callback);
        assert!(config.capabilities.animation_frame);
        assert_eq!(config.fetch_timeout_secs, 30);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = InterpreterConfig::load(Some(dir.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = InterpreterConfig::from_yaml("base_url: not a url").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }
}
