use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use trust_dns_resolver::TokioAsyncResolver;
use url::Url;

use crate::probe::tls::CertSummary;
use crate::probe::trace::Trace;

pub mod cancel;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod stats;

pub use cancel::{AttemptContext, CancelToken};
pub use error::{ErrorKind, ProbeError, RunError};
pub use registry::{Factory, Registry};
pub use scheduler::{Pinger, RunOutcome};
pub use stats::RunningStats;

pub const DEFAULT_COUNTER: u32 = 4;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport or application protocol used to reach a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Http,
    Https,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Udp => "udp",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Tcp | Protocol::Http => 80,
            Protocol::Https => 443,
            Protocol::Udp => 53,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "udp" => Ok(Protocol::Udp),
            _ => Err(ProbeError::UnsupportedProtocol(s.to_string())),
        }
    }
}

/// Destination of a run together with its run-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// Path and query sent by HTTP probes.
    pub path: String,
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub counter: u32,
    pub interval: Duration,
}

impl Target {
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            path: "/".to_string(),
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
            counter: DEFAULT_COUNTER,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Parses `address` (`host`, `host:port` or `scheme://host[:port][/path]`).
    /// Addresses without a scheme are probed over TCP. `port` overrides any
    /// port found in the address.
    pub fn parse(address: &str, port: Option<u16>) -> Result<Self, ProbeError> {
        let raw = if address.contains("://") {
            address.to_string()
        } else {
            format!("tcp://{address}")
        };
        let url = Url::parse(&raw)
            .map_err(|e| ProbeError::InvalidTarget(format!("{address}: {e}")))?;
        let protocol: Protocol = url.scheme().parse()?;
        let host = match url.host() {
            Some(url::Host::Ipv6(ip)) => ip.to_string(),
            Some(host) => host.to_string(),
            None => return Err(ProbeError::InvalidTarget(format!("{address}: missing host"))),
        };
        let port = port
            .or_else(|| url.port())
            .unwrap_or_else(|| protocol.default_port());
        if port == 0 {
            return Err(ProbeError::InvalidTarget(format!("{address}: port 0")));
        }

        let mut target = Target::new(protocol, host, port);
        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        target.path = path;
        Ok(target)
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Full URL for HTTP(S) targets.
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.protocol, self.authority(), self.path)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::Http | Protocol::Https if self.path != "/" => f.write_str(&self.url()),
            _ => write!(f, "{}://{}", self.protocol, self.authority()),
        }
    }
}

/// Options shared, read-only, by every attempt of a run.
#[derive(Clone, Default)]
pub struct ProbeOptions {
    /// Per-attempt timeout applied inside the probe; zero means the default.
    pub timeout: Duration,
    pub resolver: Option<TokioAsyncResolver>,
    pub proxy: Option<Url>,
    pub user_agent: String,
    /// Skip certificate verification for HTTPS probes.
    pub insecure: bool,
}

impl ProbeOptions {
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }
}

impl fmt::Debug for ProbeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeOptions")
            .field("timeout", &self.timeout)
            .field("custom_resolver", &self.resolver.is_some())
            .field("proxy", &self.proxy.as_ref().map(Url::as_str))
            .field("user_agent", &self.user_agent)
            .field("insecure", &self.insecure)
            .finish()
    }
}

/// A single metadata value attached to a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    Int(u64),
    Text(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Int(v) => write!(f, "{v}"),
            MetaValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<u64> for MetaValue {
    fn from(v: u64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<u16> for MetaValue {
    fn from(v: u16) -> Self {
        MetaValue::Int(v.into())
    }
}

impl From<usize> for MetaValue {
    fn from(v: usize) -> Self {
        MetaValue::Int(v as u64)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

/// Metadata of one attempt, iterated in key order.
pub type Meta = BTreeMap<String, MetaValue>;

/// Renders metadata as space separated `key=value` pairs in key order.
pub fn format_meta(meta: &Meta) -> String {
    meta.iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Free-form detail printed below the per-attempt line.
#[derive(Debug, Clone)]
pub enum Extra {
    Certificate(CertSummary),
    Note(String),
    Trace(Trace),
}

impl fmt::Display for Extra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extra::Certificate(cert) => cert.fmt(f),
            Extra::Note(note) => f.write_str(note),
            Extra::Trace(trace) => trace.fmt(f),
        }
    }
}

/// Outcome of one attempt.
#[derive(Debug, Default)]
pub struct ProbeResult {
    pub connected: bool,
    pub error: Option<ProbeError>,
    pub duration: Duration,
    pub dns_duration: Duration,
    pub address: String,
    pub meta: Meta,
    pub extra: Option<Extra>,
}

impl ProbeResult {
    pub fn failed(error: ProbeError, duration: Duration) -> Self {
        Self {
            error: Some(error),
            duration,
            ..Default::default()
        }
    }

    pub fn format_meta(&self) -> String {
        format_meta(&self.meta)
    }
}

pub mod prelude {
    pub use super::{
        AttemptContext, CancelToken, Extra, Meta, MetaValue, Pinger, ProbeError, ProbeOptions,
        ProbeResult, Protocol, Registry, RunOutcome, Target,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parses_case_insensitively() {
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("Https".parse::<Protocol>().unwrap(), Protocol::Https);
        assert_eq!("udp".parse::<Protocol>().unwrap(), Protocol::Udp);
        let err = "icmp".parse::<Protocol>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedProtocol);
    }

    #[test]
    fn meta_renders_sorted() {
        let mut meta = Meta::new();
        meta.insert("b".into(), "2".into());
        meta.insert("a".into(), "1".into());
        assert_eq!(format_meta(&meta), "a=1 b=2");
        assert_eq!(format_meta(&Meta::new()), "");
    }

    #[test]
    fn parse_bare_host_defaults_to_tcp() {
        let target = Target::parse("example.com", None).unwrap();
        assert_eq!(target.protocol, Protocol::Tcp);
        assert_eq!(target.port, 80);
        assert_eq!(target.to_string(), "tcp://example.com:80");
    }

    #[test]
    fn parse_default_ports_and_override() {
        assert_eq!(Target::parse("https://example.com", None).unwrap().port, 443);
        assert_eq!(Target::parse("udp://8.8.8.8", None).unwrap().port, 53);
        assert_eq!(Target::parse("example.com:22", None).unwrap().port, 22);
        assert_eq!(Target::parse("example.com:22", Some(2222)).unwrap().port, 2222);
    }

    #[test]
    fn parse_keeps_http_path() {
        let target = Target::parse("http://example.com/health?full=1", None).unwrap();
        assert_eq!(target.path, "/health?full=1");
        assert_eq!(target.url(), "http://example.com:80/health?full=1");
    }

    #[test]
    fn parse_ipv6_literal() {
        let target = Target::parse("tcp://[::1]:8080", None).unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.authority(), "[::1]:8080");
    }

    #[test]
    fn parse_rejects_unknown_scheme() {
        let err = Target::parse("ftp://example.com", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedProtocol);
    }

    #[test]
    fn effective_timeout_defaults() {
        assert_eq!(ProbeOptions::default().effective_timeout(), DEFAULT_TIMEOUT);
        let options = ProbeOptions {
            timeout: Duration::from_millis(250),
            ..Default::default()
        };
        assert_eq!(options.effective_timeout(), Duration::from_millis(250));
    }
}
