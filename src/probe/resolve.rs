use std::io;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};

use super::trace::{Checkpoint, TraceHandle};
use crate::pinger::ProbeError;

/// Address picked for a host and the time the lookup took.
#[derive(Debug, Clone, Copy)]
pub struct Resolved {
    pub ip: IpAddr,
    /// Zero when the host was already a literal IP.
    pub elapsed: Duration,
}

/// Resolves `host` to its first address. Literal IPs skip the lookup
/// entirely. With a custom resolver the lookup goes to its name servers,
/// otherwise to the system resolver.
pub async fn resolve(
    host: &str,
    port: u16,
    resolver: Option<&TokioAsyncResolver>,
    trace: Option<&TraceHandle>,
) -> Result<Resolved, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(Resolved {
            ip,
            elapsed: Duration::ZERO,
        });
    }

    if let Some(trace) = trace {
        trace.mark(Checkpoint::DnsStart);
    }
    let start = Instant::now();
    let ip = match resolver {
        Some(resolver) => resolver
            .lookup_ip(host)
            .await
            .map_err(resolve_error)?
            .iter()
            .next(),
        None => tokio::net::lookup_host((host, port))
            .await
            .map_err(ProbeError::Resolution)?
            .next()
            .map(|addr| addr.ip()),
    };
    let elapsed = start.elapsed();
    if let Some(trace) = trace {
        trace.mark(Checkpoint::DnsDone);
    }

    let ip = ip.ok_or_else(|| {
        ProbeError::Resolution(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses found for {host}"),
        ))
    })?;
    log::debug!("resolved {host} to {ip} in {elapsed:?}");
    Ok(Resolved { ip, elapsed })
}

fn resolve_error(err: ResolveError) -> ProbeError {
    let kind = match err.kind() {
        ResolveErrorKind::Timeout => io::ErrorKind::TimedOut,
        ResolveErrorKind::NoRecordsFound { .. } => io::ErrorKind::NotFound,
        _ => io::ErrorKind::Other,
    };
    ProbeError::Resolution(io::Error::new(kind, err))
}
