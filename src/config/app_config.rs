use std::env;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use url::Url;

use super::{ConfigError, Settings};
use crate::pinger::Protocol;

pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";
pub const DNS_HOSTS_ENV: &str = "DNS_HOSTS";
pub const DEFAULT_CONFIG_FILE: &str = "oxyping.yml";

/// Load the settings for this run.
///
/// The file is taken from `explicit` (the `--config` flag), else from the
/// `CONFIG_FILE` environment variable; both must exist. Otherwise
/// `oxyping.yml` in the working directory is read if present. Name servers
/// missing from the file fall back to the comma separated `DNS_HOSTS`
/// environment variable.
pub fn load_config(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    load_from(
        explicit,
        env::var(CONFIG_FILE_ENV).ok(),
        env::var(DNS_HOSTS_ENV).ok(),
    )
}

fn load_from(
    explicit: Option<&Path>,
    env_file: Option<String>,
    env_dns_hosts: Option<String>,
) -> Result<Settings, ConfigError> {
    let (path, required) = match (explicit, env_file) {
        (Some(path), _) => (path.to_path_buf(), true),
        (None, Some(path)) => (PathBuf::from(path), true),
        (None, None) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    let mut settings = if required || path.exists() {
        log::info!("Using config file: {}", path.display());
        Settings::from_file(&path)?
    } else {
        Settings::default()
    };

    if settings.dns_servers.is_empty() {
        if let Some(hosts) = env_dns_hosts {
            settings.dns_servers = hosts
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
    if !settings.dns_servers.is_empty() {
        log::info!("Using DNS hosts: {:?}", settings.dns_servers);
    }
    Ok(settings)
}

/// Setup a DNS resolver querying `dns_hosts` on port 53 over UDP, with TCP
/// as fallback for truncated answers.
///
/// Nothing is cached: every attempt measures a real lookup.
pub fn setup_resolver(dns_hosts: &[String]) -> Result<TokioAsyncResolver, ConfigError> {
    let ips = dns_hosts
        .iter()
        .map(|host| {
            host.parse::<IpAddr>()
                .map_err(|source| ConfigError::InvalidDnsServer {
                    host: host.clone(),
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut opts = ResolverOpts::default();
    opts.attempts = 2;
    opts.timeout = Duration::from_secs(2);
    opts.cache_size = 0;

    let name_servers = NameServerConfigGroup::from_ips_clear(&ips, 53, true);
    let resolver_config = ResolverConfig::from_parts(None, vec![], name_servers);
    Ok(TokioAsyncResolver::tokio(resolver_config, opts))
}

/// Proxy variables from the environment, upper case winning over lower case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyEnv {
    pub http: Option<String>,
    pub https: Option<String>,
    pub no_proxy: Option<String>,
}

impl ProxyEnv {
    pub fn from_env() -> Self {
        Self {
            http: first_env(&["HTTP_PROXY", "http_proxy"]),
            https: first_env(&["HTTPS_PROXY", "https_proxy"]),
            no_proxy: first_env(&["NO_PROXY", "no_proxy"]),
        }
    }

    /// The proxy for `protocol` requests to `host`. Only HTTP and HTTPS are
    /// proxied; loopback hosts and `NO_PROXY` matches never are.
    pub fn proxy_for(&self, protocol: Protocol, host: &str) -> Option<String> {
        let proxy = match protocol {
            Protocol::Http => self.http.as_ref(),
            Protocol::Https => self.https.as_ref(),
            Protocol::Tcp | Protocol::Udp => None,
        }?;
        let host = host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_ascii_lowercase();
        if is_loopback(&host) || self.bypasses(&host) {
            return None;
        }
        Some(proxy.clone())
    }

    /// `NO_PROXY` entries: `*`, IP literals, or domains matching themselves
    /// and their subdomains (a leading `.` is ignored).
    fn bypasses(&self, host: &str) -> bool {
        let Some(no_proxy) = &self.no_proxy else {
            return false;
        };
        let host_ip = host.parse::<IpAddr>().ok();
        no_proxy
            .split(',')
            .map(|entry| entry.trim().to_ascii_lowercase())
            .filter(|entry| !entry.is_empty())
            .any(|entry| {
                if entry == "*" {
                    return true;
                }
                let entry = entry.trim_start_matches('[').trim_end_matches(']');
                if let Ok(ip) = entry.parse::<IpAddr>() {
                    return host_ip == Some(ip);
                }
                let domain = entry.trim_start_matches("*.").trim_start_matches('.');
                host == domain
                    || host
                        .strip_suffix(domain)
                        .is_some_and(|rest| rest.ends_with('.'))
            })
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

fn is_loopback(host: &str) -> bool {
    host == "localhost"
        || host.ends_with(".localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Parses a proxy address. A missing scheme means `http://`.
pub fn proxy_url(proxy: &str) -> Result<Url, ConfigError> {
    let raw = if proxy.contains("://") {
        proxy.to_string()
    } else {
        format!("http://{proxy}")
    };
    Url::parse(&raw).map_err(|source| ConfigError::InvalidProxy {
        proxy: proxy.to_string(),
        source,
    })
}
