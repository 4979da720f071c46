//! Configuration loaded from `taskpilot.toml`.
//!
//! [`PilotConfig`] holds every tunable. Missing fields fall back to defaults,
//! so a partial file is fine. The agent credential resolves with the usual
//! precedence: explicit override, then the `CODEX_API_KEY` environment
//! variable, then a locally cached credential file.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable carrying the agent credential.
pub const API_KEY_ENV: &str = "CODEX_API_KEY";

/// Fallback credential cache, relative to the working directory.
pub const API_KEY_CACHE: &str = ".cache/codex_api_key";

#[derive(Debug, Clone, Deserialize)]
pub struct PilotConfig {
    /// External agent binary.
    #[serde(default = "default_agent_bin")]
    pub agent_bin: String,

    /// Fixed safety flags passed before the prompt: non-interactive
    /// execution with a filesystem-write sandbox.
    #[serde(default = "default_agent_args")]
    pub agent_args: Vec<String>,

    /// Extension of catalog input documents.
    #[serde(default = "default_doc_ext")]
    pub doc_ext: String,

    /// Wall-clock limit per job, in seconds. Zero disables the limit.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on concurrent jobs in batch mode.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Pause between sequential jobs, in seconds.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,

    /// Agent credential; the environment variable takes precedence.
    #[serde(default)]
    pub api_key: String,

    /// Optional prompt template file used when a job has no template of
    /// its own.
    #[serde(default)]
    pub prompt_file: Option<PathBuf>,
}

fn default_agent_bin() -> String {
    "codex".to_string()
}

fn default_agent_args() -> Vec<String> {
    ["exec", "--skip-git-repo-check", "--sandbox", "workspace-write"]
        .map(String::from)
        .to_vec()
}

fn default_doc_ext() -> String {
    "tex".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_parallel() -> usize {
    100
}

fn default_delay_secs() -> u64 {
    5
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            agent_bin: default_agent_bin(),
            agent_args: default_agent_args(),
            doc_ext: default_doc_ext(),
            timeout_secs: default_timeout_secs(),
            max_parallel: default_max_parallel(),
            delay_secs: default_delay_secs(),
            api_key: String::new(),
            prompt_file: None,
        }
    }
}

impl PilotConfig {
    /// Load configuration from `taskpilot.toml` in the current directory,
    /// falling back to defaults when the file is absent.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("taskpilot.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<PilotConfig>(&contents)?
        } else {
            Self::default()
        };

        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.is_empty()
        {
            config.api_key = key;
        }

        Ok(config)
    }

    /// Resolve the credential to inject into the agent environment.
    ///
    /// Precedence: explicit override, loaded config (file or env), cached
    /// credential file. Returns `None` when no source yields a key.
    pub fn resolve_api_key(&self, override_key: Option<&str>) -> Option<String> {
        if let Some(key) = override_key
            && !key.is_empty()
        {
            return Some(key.to_string());
        }
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        let cache = Path::new(API_KEY_CACHE);
        if let Ok(text) = std::fs::read_to_string(cache) {
            let key = text.trim();
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = PilotConfig::default();
        assert_eq!(config.agent_bin, "codex");
        assert_eq!(
            config.agent_args,
            vec!["exec", "--skip-git-repo-check", "--sandbox", "workspace-write"]
        );
        assert_eq!(config.timeout_secs, 300);
        assert_eq!(config.max_parallel, 100);
        assert_eq!(config.delay_secs, 5);
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            agent_bin = "sh"
            timeout_secs = 60
        "#;
        let config: PilotConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.agent_bin, "sh");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.doc_ext, "tex");
        assert_eq!(config.max_parallel, 100);
    }

    #[test]
    fn override_key_wins() {
        let mut config = PilotConfig::default();
        config.api_key = "from-file".into();
        assert_eq!(
            config.resolve_api_key(Some("cli-key")).unwrap(),
            "cli-key"
        );
        assert_eq!(config.resolve_api_key(None).unwrap(), "from-file");
    }
}
