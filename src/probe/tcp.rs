use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::Probe;
use super::resolve::resolve;
use super::tls::{self, CertSummary};
use crate::pinger::{
    AttemptContext, Extra, ProbeError, ProbeOptions, ProbeResult, Protocol, Registry, Target,
};

/// Registers the TCP factory. With `tls` set every attempt tries a TLS
/// handshake first and reports the peer certificate.
pub fn register(registry: &mut Registry, tls: bool) {
    registry.register(
        Protocol::Tcp,
        Box::new(
            move |target: &Target, options: &ProbeOptions| -> Result<Probe, ProbeError> {
                let probe =
                    TcpProbe::new(target.host.clone(), target.port, Arc::new(options.clone()), tls)?;
                Ok(Probe::Tcp(probe))
            },
        ),
    );
}

/// Connectivity probe: the attempt ends once the connection is up.
#[derive(Debug)]
pub struct TcpProbe {
    host: String,
    port: u16,
    options: Arc<ProbeOptions>,
    tls: Option<Arc<ClientConfig>>,
}

impl TcpProbe {
    pub fn new(
        host: String,
        port: u16,
        options: Arc<ProbeOptions>,
        tls: bool,
    ) -> Result<Self, ProbeError> {
        let tls = if tls {
            // Certificates are reported, not judged.
            Some(Arc::new(tls::insecure_config(&[])?))
        } else {
            None
        };
        Ok(Self {
            host,
            port,
            options,
            tls,
        })
    }

    pub fn tls(&self) -> bool {
        self.tls.is_some()
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
        let outcome = match &self.tls {
            Some(config) => self.dial_tls(&ctx, addr, config.clone()).await,
            None => self.dial(&ctx, addr).await.map(|stream| (stream, None)),
        };

        let mut result = ProbeResult {
            duration: start.elapsed(),
            dns_duration: resolved.elapsed,
            address: addr.to_string(),
            ..Default::default()
        };
        match outcome {
            Ok((stream, extra)) => {
                result.connected = true;
                if let Ok(peer) = stream.peer_addr() {
                    result.address = peer.to_string();
                }
                result.extra = extra;
            }
            Err(err) => result.error = Some(err),
        }
        result
    }

    async fn dial(&self, ctx: &AttemptContext, addr: SocketAddr) -> Result<TcpStream, ProbeError> {
        ctx.run("connect", async {
            TcpStream::connect(addr).await.map_err(ProbeError::Connect)
        })
        .await
    }

    /// Dials and tries a TLS handshake within half of the time left. When the
    /// handshake fails, a fresh plain dial reports reachability instead.
    async fn dial_tls(
        &self,
        ctx: &AttemptContext,
        addr: SocketAddr,
        config: Arc<ClientConfig>,
    ) -> Result<(TcpStream, Option<Extra>), ProbeError> {
        let stream = self.dial(ctx, addr).await?;
        let handshake_ctx = ctx.bounded(ctx.remaining() / 2);
        match self.handshake(&handshake_ctx, stream, config).await {
            Ok((stream, cert)) => Ok((stream, cert.map(Extra::Certificate))),
            Err(ProbeError::Cancelled) => Err(ProbeError::Cancelled),
            Err(tls_err) => {
                log::debug!("tls to {addr} failed, falling back to tcp: {tls_err}");
                let stream = self.dial(ctx, addr).await?;
                let note = format!("TLS handshake failed, {}", tls_err.reason());
                Ok((stream, Some(Extra::Note(note))))
            }
        }
    }

    async fn handshake(
        &self,
        ctx: &AttemptContext,
        stream: TcpStream,
        config: Arc<ClientConfig>,
    ) -> Result<(TcpStream, Option<CertSummary>), ProbeError> {
        let server_name = tls::server_name(&self.host)?;
        let connector = TlsConnector::from(config);
        let stream = ctx
            .run("tls handshake", async {
                connector
                    .connect(server_name, stream)
                    .await
                    .map_err(ProbeError::Handshake)
            })
            .await?;

        let (_, session) = stream.get_ref();
        let cert = session
            .peer_certificates()
            .and_then(|certs| certs.first())
            .and_then(|der| {
                tls::summarize_certificate(&self.host, session.protocol_version(), der)
            });
        let (stream, _) = stream.into_inner();
        Ok((stream, cert))
    }
}
