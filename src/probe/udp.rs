use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;

use super::Probe;
use super::resolve::resolve;
use crate::pinger::{
    AttemptContext, ProbeError, ProbeOptions, ProbeResult, Protocol, Registry, Target,
};

const PAYLOAD: &[u8] = b"ping";

pub fn register(registry: &mut Registry) {
    registry.register(
        Protocol::Udp,
        Box::new(
            |target: &Target, options: &ProbeOptions| -> Result<Probe, ProbeError> {
                Ok(Probe::Udp(UdpProbe::new(
                    target.host.clone(),
                    target.port,
                    Arc::new(options.clone()),
                )))
            },
        ),
    );
}

/// Sends one datagram and waits for any reply. The payload of the reply is
/// not interpreted.
#[derive(Debug)]
pub struct UdpProbe {
    host: String,
    port: u16,
    options: Arc<ProbeOptions>,
}

impl UdpProbe {
    pub fn new(host: String, port: u16, options: Arc<ProbeOptions>) -> Self {
        Self {
            host,
            port,
            options,
        }
    }

    pub async fn attempt(&self, ctx: &AttemptContext) -> ProbeResult {
        let ctx = ctx.bounded(self.options.effective_timeout());
        let start = Instant::now();

        let resolved = ctx
            .run(
                "dns",
                resolve(&self.host, self.port, self.options.resolver.as_ref(), None),
            )
            .await;
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(err) => return ProbeResult::failed(err, start.elapsed()),
        };

        let addr = SocketAddr::new(resolved.ip, self.port);
        let mut result = ProbeResult {
            dns_duration: resolved.elapsed,
            address: addr.to_string(),
            ..Default::default()
        };

        match self.exchange(&ctx, addr, &mut result).await {
            Ok(()) => result.connected = true,
            Err(err) => result.error = Some(err),
        }
        result.duration = start.elapsed();
        result
    }

    async fn exchange(
        &self,
        ctx: &AttemptContext,
        addr: SocketAddr,
        result: &mut ProbeResult,
    ) -> Result<(), ProbeError> {
        let local: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await.map_err(ProbeError::Connect)?;
        socket.connect(addr).await.map_err(ProbeError::Connect)?;

        socket
            .send(PAYLOAD)
            .await
            .map_err(|source| ProbeError::Transfer {
                context: "write failed",
                source,
            })?;
        result.meta.insert("sent".into(), PAYLOAD.len().into());

        let mut buf = [0u8; 1024];
        let read = ctx
            .run("read", async {
                socket.recv(&mut buf).await.map_err(|source| ProbeError::Transfer {
                    context: "read failed",
                    source,
                })
            })
            .await;
        match read {
            Ok(_) => Ok(()),
            // No reply before the deadline is a read failure like any other.
            Err(ProbeError::Timeout(_)) => Err(ProbeError::Transfer {
                context: "read failed",
                source: io::Error::new(io::ErrorKind::TimedOut, "no reply before deadline"),
            }),
            Err(err) => Err(err),
        }
    }
}
