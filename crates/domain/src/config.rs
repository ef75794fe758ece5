//! Layered configuration recognised by the core.
//!
//! Precedence, highest wins: explicit overrides passed at construction >
//! environment variables > config file > built-in defaults. This mirrors
//! the layering the provider credential resolver uses elsewhere in this
//! codebase, applied here to the handful of values the conversation core
//! itself understands (§6 of the specification).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaceConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub streaming: bool,
    pub reserve_tokens: u32,
    pub warning_threshold: f64,
    pub retry: RetryConfig,
    pub queue: QueueConfig,
    pub policy: PolicyConfig,
    pub working_directory: Option<PathBuf>,
}

impl Default for LaceConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            max_tokens: 100_000,
            streaming: true,
            reserve_tokens: 2_000,
            warning_threshold: 0.8,
            retry: RetryConfig::default(),
            queue: QueueConfig::default(),
            policy: PolicyConfig::default(),
            working_directory: None,
        }
    }
}

impl LaceConfig {
    /// Load from a TOML file, falling back to defaults for anything the
    /// file omits. A missing file is not an error — it is treated the
    /// same as an empty one.
    pub fn load_from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                toml::from_str(&contents).map_err(|e| crate::error::LaceError::Config(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply environment-variable overrides on top of whatever was
    /// loaded from the file. Only a handful of values are exposed this
    /// way, matching the core's narrow environment-input surface (§6).
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("LACE_MODEL") {
            self.model = Some(v);
        }
        if let Ok(v) = std::env::var("LACE_PROVIDER") {
            self.provider = Some(v);
        }
        if let Ok(v) = std::env::var("LACE_MAX_TOKENS") {
            if let Ok(n) = v.parse() {
                self.max_tokens = n;
            }
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            max_delay_ms: 20_000,
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_length: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_length: 256 }
    }
}

/// Snapshot consulted by `ApprovalPolicy::decide` (§4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub disable_all_tools: bool,
    pub disable_tools: Vec<String>,
    pub auto_approve_tools: Vec<String>,
    pub allow_non_destructive: bool,
    pub disable_all_guardrails: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = LaceConfig::default();
        assert_eq!(cfg.retry.max_attempts, 10);
        assert!((cfg.warning_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn load_from_missing_file_yields_defaults() {
        let cfg = LaceConfig::load_from_file(std::path::Path::new("/nonexistent/lace.toml")).unwrap();
        assert_eq!(cfg.max_tokens, 100_000);
    }

    #[test]
    fn load_from_file_parses_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lace.toml");
        std::fs::write(&path, "max_tokens = 5000\nmodel = \"test-model\"\n").unwrap();
        let cfg = LaceConfig::load_from_file(&path).unwrap();
        assert_eq!(cfg.max_tokens, 5000);
        assert_eq!(cfg.model.as_deref(), Some("test-model"));
    }
}
