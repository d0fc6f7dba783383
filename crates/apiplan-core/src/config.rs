//! Project configuration for test plan runs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ErrorKind;

/// How many missing parameters one test step generates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterFill {
    /// Generate the first missing declared parameter and stop
    #[default]
    FirstMissing,
    /// Generate every missing declared parameter
    AllMissing,
}

impl std::str::FromStr for ParameterFill {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_missing" | "first-missing" => Ok(Self::FirstMissing),
            "all_missing" | "all-missing" => Ok(Self::AllMissing),
            other => Err(ConfigError::Parse(format!(
                "unknown parameter fill mode: {other}"
            ))),
        }
    }
}

/// Project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API document path (OpenAPI 3 or Swagger 2, JSON or YAML)
    pub spec: PathBuf,

    /// Test plan path
    #[serde(default = "default_plan")]
    pub plan: PathBuf,

    /// Server to test; overrides the URL declared by the document
    #[serde(default)]
    pub base_url: Option<String>,

    /// HTTP headers sent with every request (auth, API keys)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub parameter_fill: ParameterFill,

    /// RNG seed for reproducible parameter values
    #[serde(default)]
    pub seed: Option<u64>,

    /// Cases to run; empty runs every case in plan order
    #[serde(default)]
    pub cases: Vec<String>,

    /// Store objects found in JSON responses
    #[serde(default)]
    pub ingest_responses: bool,
}

fn default_plan() -> PathBuf {
    PathBuf::from("testplan.yml")
}

const fn default_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spec: PathBuf::from("openapi.yaml"),
            plan: default_plan(),
            base_url: None,
            headers: BTreeMap::new(),
            timeout_secs: default_timeout(),
            parameter_fill: ParameterFill::default(),
            seed: None,
            cases: Vec::new(),
            ingest_responses: false,
        }
    }
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from the first default location that exists (.apiplan.toml)
    ///
    /// # Errors
    ///
    /// Returns error if a config file exists but cannot be read or parsed
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_default_in(Path::new("."))
    }

    /// [`Config::load_default`] relative to `dir`.
    ///
    /// # Errors
    ///
    /// Returns error if a config file exists but cannot be read or parsed
    pub fn load_default_in(dir: &Path) -> Result<Self, ConfigError> {
        let candidates = [".apiplan.toml", ".apiplan.json", "apiplan.toml"];

        for name in candidates {
            let path = dir.join(name);
            if path.exists() {
                log::debug!("loading config from {}", path.display());
                return Self::load(&path);
            }
        }

        Ok(Self::default())
    }

    /// Example config file
    #[must_use]
    pub fn example() -> &'static str {
        r#"# apiplan configuration

# API document (OpenAPI 3 or Swagger 2, JSON or YAML)
spec = "openapi.yaml"

# Test plan (YAML documents separated by "---" lines)
plan = "testplan.yml"

# Server to test (defaults to the URL declared by the document)
# base_url = "http://localhost:8080"

# Request timeout in seconds
timeout_secs = 10

# Missing parameters generated per step: "first_missing" or "all_missing"
parameter_fill = "first_missing"

# Fixed RNG seed for reproducible runs
# seed = 42

# Cases to run (default: all, in plan order)
# cases = ["find pets"]

# Store objects found in JSON responses
# ingest_responses = true

# HTTP headers (auth, api keys)
[headers]
Authorization = "Bearer your-token-here"
# X-API-Key = "your-api-key"
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ConfigError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(..) => ErrorKind::NotFound,
            Self::Parse(_) => ErrorKind::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.spec, PathBuf::from("openapi.yaml"));
        assert_eq!(config.plan, PathBuf::from("testplan.yml"));
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.parameter_fill, ParameterFill::FirstMissing);
        assert!(!config.ingest_responses);
    }

    #[test]
    fn parse_toml() {
        let toml = r#"
spec = "petstore.json"
base_url = "http://localhost:3000"
parameter_fill = "all_missing"
seed = 7
cases = ["a", "b"]

[headers]
Authorization = "Bearer token123"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.spec, PathBuf::from("petstore.json"));
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(config.parameter_fill, ParameterFill::AllMissing);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.cases, vec!["a", "b"]);
        assert_eq!(
            config.headers.get("Authorization"),
            Some(&"Bearer token123".to_string())
        );
        assert_eq!(config.plan, PathBuf::from("testplan.yml"));
    }

    #[test]
    fn parse_json() {
        let json = r#"{"spec": "api.yaml", "timeout_secs": 3, "ingest_responses": true}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.timeout_secs, 3);
        assert!(config.ingest_responses);
        assert!(config.base_url.is_none());
    }

    #[test]
    fn unknown_fill_mode_is_error() {
        let toml = "spec = \"a.yaml\"\nparameter_fill = \"some\"\n";
        assert!(toml::from_str::<Config>(toml).is_err());
        assert!("some".parse::<ParameterFill>().is_err());
        assert_eq!(
            "all-missing".parse::<ParameterFill>().unwrap(),
            ParameterFill::AllMissing
        );
    }

    #[test]
    fn example_parses() {
        let config: Config = toml::from_str(Config::example()).unwrap();
        assert_eq!(config.spec, PathBuf::from("openapi.yaml"));
        assert!(config.headers.contains_key("Authorization"));
    }

    #[test]
    fn load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("cfg.json");
        std::fs::write(&json_path, r#"{"spec": "x.json", "seed": 1}"#).unwrap();
        assert_eq!(Config::load(&json_path).unwrap().seed, Some(1));

        let toml_path = dir.path().join("cfg.toml");
        std::fs::write(&toml_path, "spec = \"x.yaml\"\nseed = 2\n").unwrap();
        assert_eq!(Config::load(&toml_path).unwrap().seed, Some(2));
    }

    #[test]
    fn load_default_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_default_in(dir.path()).unwrap();
        assert_eq!(config.spec, PathBuf::from("openapi.yaml"));

        std::fs::write(dir.path().join("apiplan.toml"), "spec = \"third.yaml\"\n").unwrap();
        std::fs::write(dir.path().join(".apiplan.toml"), "spec = \"first.yaml\"\n").unwrap();
        let config = Config::load_default_in(dir.path()).unwrap();
        assert_eq!(config.spec, PathBuf::from("first.yaml"));
    }

    #[test]
    fn load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/apiplan.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
