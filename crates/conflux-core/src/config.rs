use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfluxError, Result};

/// Top-level Conflux configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
    #[serde(default)]
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub systems: SystemsConfig,
}

/// Execution engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard ceiling on node visits per run. Guarded cycles are legal, so
    /// the validator cannot prove termination; this bounds runaways.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Buffered events per run on the broadcast bus.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_max_steps() -> usize { 256 }
fn default_event_capacity() -> usize { 256 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Optional static Bearer token. None = open access.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            token: None,
        }
    }
}

fn default_bind() -> String { "127.0.0.1:18790".to_string() }

/// Run/graph/event persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub path: String,
}

/// Endpoints for the four integrated systems. Each section is optional;
/// only configured systems get their tools registered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemsConfig {
    #[serde(default)]
    pub library: Option<RemoteSystemConfig>,
    #[serde(default)]
    pub search: Option<RemoteSystemConfig>,
    #[serde(default)]
    pub analysis: Option<RemoteSystemConfig>,
    #[serde(default)]
    pub proposal: Option<RemoteSystemConfig>,
}

/// Connection settings for one remote system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSystemConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Generous default: the analysis endpoints stream for minutes.
    #[serde(default = "default_system_timeout")]
    pub timeout_secs: u64,
}

fn default_system_timeout() -> u64 { 300 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfluxError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| ConfluxError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
