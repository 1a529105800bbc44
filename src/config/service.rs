//! Service-wide chat configuration loaded from TOML and the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ChatConfigOverride;
use crate::error::{ParleyError, Result};

pub const DEFAULT_MODEL: &str = "auto";

/// Service defaults applied beneath every agent's own configuration.
///
/// ```toml
/// defaultModel = "auto"
///
/// [agentDefaults]
/// maxSteps = 20
/// autoCompact = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatServiceConfig {
    /// Model name or pattern used when an agent has none.
    pub default_model: String,
    pub agent_defaults: ChatConfigOverride,
}

impl Default for ChatServiceConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            agent_defaults: ChatConfigOverride::default(),
        }
    }
}

impl ChatServiceConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.agent_defaults.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// `~/.parley/config.toml`, or a relative `.parley/config.toml` without a home dir.
    pub fn default_path() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".parley"))
            .unwrap_or_else(|| PathBuf::from(".parley"))
            .join("config.toml")
    }

    /// Load the default path if it exists, otherwise start from defaults.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `PARLEY_*` environment variables (after loading `.env` if present).
    pub fn with_env_overrides(mut self) -> Result<Self> {
        let _ = dotenvy::dotenv();

        if let Ok(model) = std::env::var("PARLEY_DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Some(v) = env_parsed::<usize>("PARLEY_MAX_STEPS")? {
            self.agent_defaults.max_steps = Some(v);
        }
        if let Some(v) = env_parsed::<bool>("PARLEY_AUTO_COMPACT")? {
            self.agent_defaults.auto_compact = Some(v);
        }
        if let Some(v) = env_parsed::<f64>("PARLEY_COMPACTION_THRESHOLD")? {
            self.agent_defaults.compaction_threshold = Some(v);
        }
        if let Some(v) = env_parsed::<bool>("PARLEY_PARALLEL_TOOLS")? {
            self.agent_defaults.parallel_tools = Some(v);
        }
        self.agent_defaults.validate()?;
        Ok(self)
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ParleyError::Configuration(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}
