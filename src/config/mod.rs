//! Settings file, environment overrides and resolver construction.

pub mod app_config;
pub mod duration;
pub mod model;

use std::net::AddrParseError;
use std::path::PathBuf;

use thiserror::Error;

pub use app_config::{ProxyEnv, load_config, proxy_url, setup_resolver};
pub use duration::parse_duration;
pub use model::Settings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("invalid dns server {host:?}: {source}")]
    InvalidDnsServer {
        host: String,
        #[source]
        source: AddrParseError,
    },

    #[error("invalid proxy {proxy:?}: {source}")]
    InvalidProxy {
        proxy: String,
        #[source]
        source: url::ParseError,
    },
}
