//! Protocol specific probes behind one `attempt` contract.

use crate::pinger::{AttemptContext, ProbeResult};

pub mod http;
pub mod resolve;
pub mod tcp;
pub mod tls;
pub mod trace;
pub mod udp;

pub use http::{HttpProbe, HttpSettings};
pub use tcp::TcpProbe;
pub use udp::UdpProbe;

/// A configured probe for one target. Built once per run and reused for
/// every attempt; attempts never overlap.
#[derive(Debug)]
pub enum Probe {
    /// Plain TCP connect, optionally with a TLS handshake first.
    Tcp(TcpProbe),
    Udp(UdpProbe),
    Http(HttpProbe),
}

impl Probe {
    pub fn name(&self) -> &'static str {
        match self {
            Probe::Tcp(p) if p.tls() => "tls",
            Probe::Tcp(_) => "tcp",
            Probe::Udp(_) => "udp",
            Probe::Http(p) if p.tls() => "https",
            Probe::Http(_) => "http",
        }
    }

    /// Performs one attempt bounded by `ctx`. Failures are reported in the
    /// returned result, never as a panic.
    pub async fn attempt(&self, ctx: &AttemptContext) -> ProbeResult {
        let result = match self {
            Probe::Tcp(p) => p.attempt(ctx).await,
            Probe::Udp(p) => p.attempt(ctx).await,
            Probe::Http(p) => p.attempt(ctx).await,
        };
        log::debug!(
            "{} attempt finished: connected={} duration={:?} error={:?}",
            self.name(),
            result.connected,
            result.duration,
            result.error.as_ref().map(ToString::to_string),
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pinger::{ProbeOptions, Registry, Target};

    fn name_of(address: &str, tls: bool) -> &'static str {
        let target = Target::parse(address, None).unwrap();
        Registry::builtin(&HttpSettings::default(), tls)
            .build(&target, &ProbeOptions::default())
            .unwrap()
            .name()
    }

    #[test]
    fn names_follow_the_protocol() {
        assert_eq!(name_of("127.0.0.1:80", false), "tcp");
        assert_eq!(name_of("127.0.0.1:443", true), "tls");
        assert_eq!(name_of("udp://127.0.0.1:53", false), "udp");
        assert_eq!(name_of("http://example.com", false), "http");
        assert_eq!(name_of("https://example.com", false), "https");
    }
}
