use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http1;
use hyper::header::{CONNECTION, HOST, USER_AGENT};
use hyper::upgrade::Upgraded;
use hyper::{Method, Request, Uri};
use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

use super::Probe;
use super::resolve::resolve;
use super::tls;
use super::trace::{Checkpoint, TraceHandle};
use crate::pinger::{
    AttemptContext, Extra, ProbeError, ProbeOptions, ProbeResult, Protocol, Registry, Target,
};

const ALPN_HTTP1: &[u8] = b"http/1.1";

/// Settings only HTTP probes care about.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub method: String,
    /// Attach the per-phase breakdown to every result.
    pub trace: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            method: Method::GET.to_string(),
            trace: false,
        }
    }
}

/// Registers the same factory for HTTP and HTTPS.
pub fn register(registry: &mut Registry, settings: HttpSettings) {
    for protocol in [Protocol::Http, Protocol::Https] {
        let settings = settings.clone();
        registry.register(
            protocol,
            Box::new(
                move |target: &Target, options: &ProbeOptions| -> Result<Probe, ProbeError> {
                    let probe = HttpProbe::new(target, Arc::new(options.clone()), &settings)?;
                    Ok(Probe::Http(probe))
                },
            ),
        );
    }
}

/// One request per attempt over a fresh connection. Redirects are not
/// followed; any response counts as connected.
#[derive(Debug)]
pub struct HttpProbe {
    host: String,
    port: u16,
    default_port: bool,
    path: String,
    url: String,
    method: Method,
    trace: bool,
    options: Arc<ProbeOptions>,
    tls: Option<Arc<ClientConfig>>,
}

impl HttpProbe {
    pub fn new(
        target: &Target,
        options: Arc<ProbeOptions>,
        settings: &HttpSettings,
    ) -> Result<Self, ProbeError> {
        let method = if settings.method.is_empty() {
            Method::GET
        } else {
            Method::from_bytes(settings.method.as_bytes()).map_err(|e| {
                ProbeError::InvalidTarget(format!("invalid method {:?}: {e}", settings.method))
            })?
        };

        let url = target.url();
        url.parse::<Uri>()
            .map_err(|e| ProbeError::InvalidTarget(format!("{url}: {e}")))?;

        let tls = match target.protocol {
            Protocol::Https if options.insecure => Some(tls::insecure_config(&[ALPN_HTTP1])?),
            Protocol::Https => Some(tls::verifying_config(&[ALPN_HTTP1])?),
            Protocol::Http => None,
            other => return Err(ProbeError::UnsupportedProtocol(other.to_string())),
        };

        Ok(Self {
            host: target.host.clone(),
            port: target.port,
            default_port: target.port == target.protocol.default_port(),
            path: target.path.clone(),
            url,
            method,
            trace: settings.trace,
            options,
            tls: tls.map(Arc::new),
        })
    }

    pub fn tls(&self) -> bool {
        self.tls.is_some()
    }

    pub async fn attempt(&self, ctx: &AttemptContext) -> ProbeResult {
        let ctx = ctx.bounded(self.options.effective_timeout());
        let trace = TraceHandle::new();
        let start = Instant::now();

        let mut result = ProbeResult::default();
        if let Err(err) = self.exchange(&ctx, &trace, &mut result).await {
            result.connected = false;
            result.error = Some(err);
        }
        result.duration = start.elapsed();

        let trace = trace.snapshot();
        result.dns_duration = trace.dns();
        result.address = trace.address().to_string();
        if self.trace {
            result.extra = Some(Extra::Trace(trace));
        }
        result
    }

    async fn exchange(
        &self,
        ctx: &AttemptContext,
        trace: &TraceHandle,
        result: &mut ProbeResult,
    ) -> Result<(), ProbeError> {
        let proxy = self.options.proxy.as_ref();
        let (host, port) = match proxy {
            Some(proxy) => (
                proxy
                    .host_str()
                    .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
                    .ok_or_else(|| ProbeError::InvalidTarget(format!("proxy {proxy}: missing host")))?,
                proxy.port_or_known_default().unwrap_or(80),
            ),
            None => (self.host.as_str(), self.port),
        };

        let resolved = ctx
            .run(
                "dns",
                resolve(host, port, self.options.resolver.as_ref(), Some(trace)),
            )
            .await?;
        let addr = SocketAddr::new(resolved.ip, port);
        trace.with(|t| t.set_address(addr.to_string()));

        trace.mark(Checkpoint::ConnectStart);
        let stream = ctx
            .run("connect", async {
                TcpStream::connect(addr).await.map_err(ProbeError::Connect)
            })
            .await?;
        trace.mark(Checkpoint::ConnectDone);

        let Some(config) = &self.tls else {
            return self.send(ctx, trace, stream, proxy.is_some(), result).await;
        };
        if proxy.is_some() {
            let tunnel = ctx
                .run("proxy connect", tunnel(stream, &self.authority()))
                .await?;
            self.secure(ctx, trace, tunnel, config.clone(), result).await
        } else {
            self.secure(ctx, trace, stream, config.clone(), result).await
        }
    }

    /// TLS handshake, then the request inside the session.
    async fn secure<S>(
        &self,
        ctx: &AttemptContext,
        trace: &TraceHandle,
        stream: S,
        config: Arc<ClientConfig>,
        result: &mut ProbeResult,
    ) -> Result<(), ProbeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let server_name = tls::server_name(&self.host)?;
        let connector = TlsConnector::from(config);
        trace.mark(Checkpoint::TlsStart);
        let stream = ctx
            .run("tls handshake", async {
                connector
                    .connect(server_name, stream)
                    .await
                    .map_err(ProbeError::Handshake)
            })
            .await?;
        trace.mark(Checkpoint::TlsDone);
        self.send(ctx, trace, stream, false, result).await
    }

    async fn send<S>(
        &self,
        ctx: &AttemptContext,
        trace: &TraceHandle,
        stream: S,
        absolute_form: bool,
        result: &mut ProbeResult,
    ) -> Result<(), ProbeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(TracedIo::new(stream, trace.clone()));
        let (mut sender, conn) = ctx
            .run("handshake", async {
                http1::handshake::<_, Empty<Bytes>>(io).await.map_err(|source| ProbeError::Http {
                    context: "handshake failed",
                    source,
                })
            })
            .await?;
        let _conn = AbortOnDrop(tokio::spawn(async move {
            if let Err(err) = conn.await {
                log::debug!("http connection closed with error: {err}");
            }
        }));

        let request = self.request(absolute_form)?;
        let response = ctx
            .run("request", async {
                sender
                    .send_request(request)
                    .await
                    .map_err(|source| ProbeError::Http {
                        context: "request failed",
                        source,
                    })
            })
            .await?;
        result.connected = true;
        result
            .meta
            .insert("status".into(), response.status().as_u16().into());

        let body_start = Instant::now();
        let mut body = response.into_body();
        let mut bytes = 0usize;
        let read = ctx
            .run("read body", async {
                while let Some(frame) = body.frame().await {
                    let frame = frame.map_err(|source| ProbeError::Http {
                        context: "read body failed",
                        source,
                    })?;
                    if let Some(data) = frame.data_ref() {
                        bytes += data.len();
                    }
                }
                Ok(())
            })
            .await;
        trace.with(|t| t.set_body_duration(body_start.elapsed()));
        if bytes > 0 {
            result.meta.insert("bytes".into(), bytes.into());
        }
        read
    }

    fn request(&self, absolute_form: bool) -> Result<Request<Empty<Bytes>>, ProbeError> {
        let uri = if absolute_form { &self.url } else { &self.path };
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(uri.as_str())
            .header(HOST, self.host_header())
            .header(CONNECTION, "close");
        if !self.options.user_agent.is_empty() {
            builder = builder.header(USER_AGENT, self.options.user_agent.as_str());
        }
        builder
            .body(Empty::new())
            .map_err(|e| ProbeError::InvalidTarget(format!("{}: {e}", self.url)))
    }

    fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn host_header(&self) -> String {
        match (self.default_port, self.host.contains(':')) {
            (true, true) => format!("[{}]", self.host),
            (true, false) => self.host.clone(),
            (false, _) => self.authority(),
        }
    }
}

/// Opens a CONNECT tunnel through an HTTP proxy and hands back the raw
/// stream once the proxy answers 2xx.
async fn tunnel(stream: TcpStream, authority: &str) -> Result<TokioIo<Upgraded>, ProbeError> {
    let failed = |source: hyper::Error| ProbeError::Http {
        context: "proxy connect failed",
        source,
    };
    let (mut sender, conn) = http1::handshake::<_, Empty<Bytes>>(TokioIo::new(stream))
        .await
        .map_err(failed)?;
    let _conn = AbortOnDrop(tokio::spawn(async move {
        if let Err(err) = conn.with_upgrades().await {
            log::debug!("proxy connection closed with error: {err}");
        }
    }));

    let request = Request::builder()
        .method(Method::CONNECT)
        .uri(authority)
        .header(HOST, authority)
        .body(Empty::new())
        .map_err(|e| ProbeError::InvalidTarget(format!("{authority}: {e}")))?;
    let response = sender.send_request(request).await.map_err(failed)?;
    if !response.status().is_success() {
        return Err(ProbeError::Transfer {
            context: "proxy connect failed",
            source: io::Error::other(format!("proxy responded {}", response.status())),
        });
    }
    let upgraded = hyper::upgrade::on(response).await.map_err(failed)?;
    Ok(TokioIo::new(upgraded))
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Stream wrapper recording when the request went out and when the first
/// response byte came back.
struct TracedIo<S> {
    inner: S,
    trace: TraceHandle,
}

impl<S> TracedIo<S> {
    fn new(inner: S, trace: TraceHandle) -> Self {
        Self { inner, trace }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TracedIo<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if matches!(poll, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            this.trace.mark_once(Checkpoint::FirstResponseByte);
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TracedIo<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if matches!(poll, Poll::Ready(Ok(n)) if n > 0) {
            this.trace.mark(Checkpoint::WroteRequest);
        }
        poll
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if matches!(poll, Poll::Ready(Ok(n)) if n > 0) {
            this.trace.mark(Checkpoint::WroteRequest);
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use url::Url;

    use super::*;
    use crate::pinger::{ErrorKind, MetaValue};
    use crate::probe::tls::test_support::spawn_tls_server;

    const OK_RESPONSE: &[u8] =
        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello";

    /// Serves `response` to every connection and forwards the request head.
    async fn spawn_server(response: &'static [u8]) -> (u16, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 512];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let _ = tx.send(String::from_utf8_lossy(&head).into_owned());
                    let _ = stream.write_all(response).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        (port, rx)
    }

    fn options() -> ProbeOptions {
        ProbeOptions {
            timeout: Duration::from_secs(2),
            user_agent: "oxyping-test".into(),
            ..Default::default()
        }
    }

    fn probe(target: &Target, options: ProbeOptions, trace: bool) -> HttpProbe {
        let settings = HttpSettings {
            trace,
            ..Default::default()
        };
        HttpProbe::new(target, Arc::new(options), &settings).unwrap()
    }

    fn ctx() -> AttemptContext {
        AttemptContext::with_timeout(Duration::from_secs(3))
    }

    #[tokio::test]
    async fn records_status_and_body_size() {
        let (port, mut requests) = spawn_server(OK_RESPONSE).await;
        let target = Target::parse(&format!("http://127.0.0.1:{port}/health"), None).unwrap();
        let result = probe(&target, options(), false).attempt(&ctx()).await;

        assert!(result.connected, "{:?}", result.error);
        assert_eq!(result.meta.get("status"), Some(&MetaValue::Int(200)));
        assert_eq!(result.meta.get("bytes"), Some(&MetaValue::Int(5)));
        assert_eq!(result.address, format!("127.0.0.1:{port}"));
        assert!(result.extra.is_none());

        let head = requests.recv().await.unwrap();
        assert!(head.starts_with("GET /health HTTP/1.1\r\n"), "{head}");
        assert!(head.to_ascii_lowercase().contains("user-agent: oxyping-test"));
    }

    #[tokio::test]
    async fn error_status_still_counts_as_connected() {
        let (port, _requests) =
            spawn_server(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n").await;
        let target = Target::parse(&format!("http://127.0.0.1:{port}"), None).unwrap();
        let result = probe(&target, options(), false).attempt(&ctx()).await;
        assert!(result.connected);
        assert_eq!(result.meta.get("status"), Some(&MetaValue::Int(503)));
        assert!(!result.meta.contains_key("bytes"));
    }

    #[tokio::test]
    async fn truncated_body_is_a_failure() {
        let (port, _requests) =
            spawn_server(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhello").await;
        let target = Target::parse(&format!("http://127.0.0.1:{port}"), None).unwrap();
        let result = probe(&target, options(), false).attempt(&ctx()).await;
        assert!(!result.connected);
        assert_eq!(result.meta.get("status"), Some(&MetaValue::Int(200)));
        let err = result.error.expect("error");
        assert_eq!(err.kind(), ErrorKind::TransferFailure);
        assert!(err.to_string().starts_with("read body failed"));
    }

    #[tokio::test]
    async fn trace_extra_lists_phases() {
        let (port, _requests) = spawn_server(OK_RESPONSE).await;
        let target = Target::parse(&format!("http://127.0.0.1:{port}"), None).unwrap();
        let result = probe(&target, options(), true).attempt(&ctx()).await;
        assert!(result.connected, "{:?}", result.error);
        match result.extra {
            Some(Extra::Trace(trace)) => {
                assert!(!trace.tls_attempted());
                let text = trace.to_string();
                assert!(text.starts_with("connect="), "{text}");
                assert!(text.contains("request=") && text.contains("wait_response="));
                assert!(!text.contains("tls="));
            }
            other => panic!("expected trace, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let target = Target::parse(&format!("http://127.0.0.1:{port}"), None).unwrap();
        let result = probe(&target, options(), false).attempt(&ctx()).await;
        assert!(!result.connected);
        assert_eq!(result.error.expect("error").reason(), "connection refused");
    }

    #[tokio::test]
    async fn https_insecure_accepts_self_signed() {
        let addr = spawn_tls_server(OK_RESPONSE).await;
        let target = Target::parse(&format!("https://127.0.0.1:{}", addr.port()), None).unwrap();
        let options = ProbeOptions {
            insecure: true,
            ..options()
        };
        let result = probe(&target, options, true).attempt(&ctx()).await;
        assert!(result.connected, "{:?}", result.error);
        assert_eq!(result.meta.get("status"), Some(&MetaValue::Int(200)));
        match result.extra {
            Some(Extra::Trace(trace)) => assert!(trace.to_string().contains("tls=")),
            other => panic!("expected trace, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn https_rejects_self_signed_by_default() {
        let addr = spawn_tls_server(OK_RESPONSE).await;
        let target = Target::parse(&format!("https://127.0.0.1:{}", addr.port()), None).unwrap();
        let result = probe(&target, options(), false).attempt(&ctx()).await;
        assert!(!result.connected);
        assert_eq!(result.error.expect("error").kind(), ErrorKind::ConnectFailure);
    }

    #[tokio::test]
    async fn plain_http_through_proxy_uses_absolute_form() {
        let (proxy_port, mut requests) = spawn_server(OK_RESPONSE).await;
        let target = Target::parse("http://backend.test:8080/ping", None).unwrap();
        let options = ProbeOptions {
            proxy: Some(Url::parse(&format!("http://127.0.0.1:{proxy_port}")).unwrap()),
            ..options()
        };
        let result = probe(&target, options, false).attempt(&ctx()).await;
        assert!(result.connected, "{:?}", result.error);
        assert_eq!(result.address, format!("127.0.0.1:{proxy_port}"));

        let head = requests.recv().await.unwrap();
        assert!(
            head.starts_with("GET http://backend.test:8080/ping HTTP/1.1\r\n"),
            "{head}"
        );
        assert!(head.to_ascii_lowercase().contains("host: backend.test:8080"));
    }

    /// Minimal CONNECT proxy: answers 200 and splices the client onto
    /// `upstream`. Forwards each request head it sees.
    async fn spawn_connect_proxy(
        upstream: SocketAddr,
    ) -> (u16, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((mut client, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut byte = [0u8; 1];
                    while !head.ends_with(b"\r\n\r\n") {
                        match client.read(&mut byte).await {
                            Ok(0) | Err(_) => return,
                            Ok(_) => head.push(byte[0]),
                        }
                    }
                    let _ = tx.send(String::from_utf8_lossy(&head).into_owned());
                    let Ok(mut server) = TcpStream::connect(upstream).await else {
                        return;
                    };
                    if client
                        .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                        .await
                        .is_err()
                    {
                        return;
                    }
                    let _ = tokio::io::copy_bidirectional(&mut client, &mut server).await;
                });
            }
        });
        (port, rx)
    }

    #[tokio::test]
    async fn https_through_proxy_tunnels_with_connect() {
        let backend = spawn_tls_server(OK_RESPONSE).await;
        let (proxy_port, mut requests) = spawn_connect_proxy(backend).await;
        let target =
            Target::parse(&format!("https://127.0.0.1:{}/", backend.port()), None).unwrap();
        let options = ProbeOptions {
            proxy: Some(Url::parse(&format!("http://127.0.0.1:{proxy_port}")).unwrap()),
            insecure: true,
            ..options()
        };
        let result = probe(&target, options, true).attempt(&ctx()).await;
        assert!(result.connected, "{:?}", result.error);
        assert_eq!(result.meta.get("status"), Some(&MetaValue::Int(200)));
        assert_eq!(result.address, format!("127.0.0.1:{proxy_port}"));
        match result.extra {
            Some(Extra::Trace(trace)) => assert!(trace.tls_attempted()),
            other => panic!("expected trace, got {other:?}"),
        }

        let head = requests.recv().await.unwrap();
        assert!(
            head.starts_with(&format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\n", backend.port())),
            "{head}"
        );
    }

    #[tokio::test]
    async fn refused_connect_is_a_transfer_failure() {
        let (proxy_port, mut requests) =
            spawn_server(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n").await;
        let target = Target::parse("https://backend.test/", None).unwrap();
        let options = ProbeOptions {
            proxy: Some(Url::parse(&format!("http://127.0.0.1:{proxy_port}")).unwrap()),
            insecure: true,
            ..options()
        };
        let result = probe(&target, options, false).attempt(&ctx()).await;
        assert!(!result.connected);
        let err = result.error.expect("error");
        assert_eq!(err.kind(), ErrorKind::TransferFailure);
        assert_eq!(err.to_string(), "proxy connect failed: proxy responded 403 Forbidden");

        let head = requests.recv().await.unwrap();
        assert!(head.starts_with("CONNECT backend.test:443 HTTP/1.1\r\n"), "{head}");
    }

    #[tokio::test]
    async fn oversized_proxy_reply_is_rejected() {
        // Header block far beyond what the client will buffer.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream.write_all(b"HTTP/1.1 200 OK\r\n").await;
                    let filler = format!("X-Filler: {}\r\n", "a".repeat(1024));
                    for _ in 0..1024 {
                        if stream.write_all(filler.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        let target = Target::parse("https://backend.test/", None).unwrap();
        let options = ProbeOptions {
            proxy: Some(Url::parse(&format!("http://127.0.0.1:{proxy_port}")).unwrap()),
            insecure: true,
            ..options()
        };
        let result = probe(&target, options, false).attempt(&ctx()).await;
        assert!(!result.connected);
        let err = result.error.expect("error");
        assert_eq!(err.kind(), ErrorKind::TransferFailure);
        assert!(err.to_string().starts_with("proxy connect failed"), "{err}");
    }

    #[test]
    fn rejects_invalid_method() {
        let target = Target::parse("http://example.com", None).unwrap();
        let settings = HttpSettings {
            method: "BAD METHOD".into(),
            trace: false,
        };
        let err = HttpProbe::new(&target, Arc::new(ProbeOptions::default()), &settings).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);
    }

    #[test]
    fn host_header_drops_default_port() {
        let target = Target::parse("https://example.com/", None).unwrap();
        let https = probe(&target, ProbeOptions::default(), false);
        assert_eq!(https.host_header(), "example.com");
        let target = Target::parse("http://[::1]:8080/", None).unwrap();
        let v6 = probe(&target, ProbeOptions::default(), false);
        assert_eq!(v6.host_header(), "[::1]:8080");
    }
}
