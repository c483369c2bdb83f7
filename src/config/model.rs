use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;
use super::duration::deserialize_opt;

/// Contents of the optional YAML settings file. Every field may be left
/// out; command line flags take precedence over anything set here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Number of attempts, `0` runs until interrupted.
    pub counter: Option<u32>,

    /// Per-attempt timeout, e.g. `5s`.
    #[serde(deserialize_with = "deserialize_opt")]
    pub timeout: Option<Duration>,

    /// Pause between attempts, e.g. `1s`.
    #[serde(deserialize_with = "deserialize_opt")]
    pub interval: Option<Duration>,

    /// Name servers used instead of the system resolver.
    pub dns_servers: Vec<String>,

    pub http_method: Option<String>,
    pub user_agent: Option<String>,

    /// Certificate details for TCP targets and phase timings for HTTP.
    pub meta: Option<bool>,

    pub proxy: Option<String>,

    /// Skip certificate verification for HTTPS targets.
    pub insecure: Option<bool>,
}

impl Settings {
    pub fn from_yaml(yaml: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml, path)
    }
}
