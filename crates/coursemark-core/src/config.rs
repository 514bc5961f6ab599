//! File configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::certification::DEFAULT_CODE_PREFIX;
use crate::engine::EngineConfig;
use crate::model::DEFAULT_PASSING_SCORE;

/// Top-level coursemark configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoursemarkConfig {
    /// Directory holding one JSON file per progress record.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// Passing threshold for exams that do not set one.
    #[serde(default = "default_passing_score")]
    pub default_passing_score: f64,
    /// Issue certificates as soon as a course is completed.
    #[serde(default)]
    pub auto_issue_certificates: bool,
    /// Prefix for certificate verification codes.
    #[serde(default = "default_code_prefix")]
    pub certificate_code_prefix: String,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./coursemark-data")
}
fn default_passing_score() -> f64 {
    DEFAULT_PASSING_SCORE
}
fn default_code_prefix() -> String {
    DEFAULT_CODE_PREFIX.to_string()
}

impl Default for CoursemarkConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            default_passing_score: default_passing_score(),
            auto_issue_certificates: false,
            certificate_code_prefix: default_code_prefix(),
        }
    }
}

impl CoursemarkConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            default_passing_score: self.default_passing_score,
            auto_issue_certificates: self.auto_issue_certificates,
            certificate_code_prefix: self.certificate_code_prefix.clone(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `coursemark.toml` in the current directory
/// 2. `~/.config/coursemark/config.toml`
///
/// `COURSEMARK_STORE_DIR` overrides the store directory.
pub fn load_config() -> Result<CoursemarkConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<CoursemarkConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("coursemark.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<CoursemarkConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => CoursemarkConfig::default(),
    };

    if let Ok(dir) = std::env::var("COURSEMARK_STORE_DIR") {
        config.store_dir = PathBuf::from(dir);
    }
    config.store_dir = PathBuf::from(resolve_env_vars(&config.store_dir.to_string_lossy()));

    anyhow::ensure!(
        (0.0..=100.0).contains(&config.default_passing_score),
        "default_passing_score must be between 0 and 100"
    );

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("coursemark"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_COURSEMARK_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_COURSEMARK_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_COURSEMARK_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        std::env::remove_var("_COURSEMARK_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = CoursemarkConfig::default();
        assert_eq!(config.default_passing_score, 85.0);
        assert!(!config.auto_issue_certificates);
        assert_eq!(config.certificate_code_prefix, "CM");
    }

    #[test]
    fn parse_partial_config() {
        let config: CoursemarkConfig = toml::from_str(
            r#"
store_dir = "/var/lib/coursemark"
auto_issue_certificates = true
"#,
        )
        .unwrap();
        assert_eq!(config.store_dir, PathBuf::from("/var/lib/coursemark"));
        assert!(config.engine_config().auto_issue_certificates);
        assert_eq!(config.engine_config().default_passing_score, 85.0);
    }

    #[test]
    fn explicit_path_must_exist() {
        let err = load_config_from(Some(Path::new("/nonexistent/coursemark.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn rejects_out_of_range_passing_score() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coursemark.toml");
        std::fs::write(&path, "default_passing_score = 140.0\n").unwrap();
        assert!(load_config_from(Some(&path)).is_err());
    }
}
