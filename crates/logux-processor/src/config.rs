use serde::Deserialize;
use std::path::Path;

use anyhow::Context;

/// Protocol version spoken by default.
pub const DEFAULT_VERSION: u32 = 2;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProcessorSettings {
    /// Logux server control endpoint, e.g. `http://localhost:31338/`.
    pub control_url: String,
    /// Shared secret expected in inbound requests and sent on outbound ones.
    pub control_password: String,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Timeout for calls to the control endpoint.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProcessorSettings {
    pub fn new(control_url: impl Into<String>, control_password: impl Into<String>) -> Self {
        Self {
            control_url: control_url.into(),
            control_password: control_password.into(),
            version: DEFAULT_VERSION,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("invalid processor settings")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&contents)
    }
}

fn default_version() -> u32 {
    DEFAULT_VERSION
}

fn default_timeout_secs() -> u64 {
    10
}
