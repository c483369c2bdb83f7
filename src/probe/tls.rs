use std::fmt;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ProtocolVersion, RootCertStore, SignatureScheme};
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;

use crate::pinger::ProbeError;

/// Subset of the peer certificate printed below a TLS attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertSummary {
    pub server_name: String,
    /// Negotiated version as an offset from TLS 1.0 (TLS 1.2 is `2`).
    pub version: u16,
    pub subject: String,
    pub dns_names: Vec<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
}

impl fmt::Display for CertSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "serverName={} version={} subject={} notBefore={} notAfter={} dnsNames={}",
            self.server_name,
            self.version,
            self.subject,
            format_time(self.not_before),
            format_time(self.not_after),
            self.dns_names.join(","),
        )
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "N/A".to_string())
}

/// Parses the end-entity certificate. Returns `None` if it is not valid DER.
pub fn summarize_certificate(
    server_name: &str,
    version: Option<ProtocolVersion>,
    der: &[u8],
) -> Option<CertSummary> {
    let (_, parsed) = parse_x509_certificate(der).ok()?;

    let subject = parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut dns_names = Vec::new();
    if let Ok(Some(san)) = parsed.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                dns_names.push(dns.to_string());
            }
        }
    }

    let validity = parsed.validity();
    Some(CertSummary {
        server_name: server_name.to_string(),
        version: version.map(version_offset).unwrap_or_default(),
        subject,
        dns_names,
        not_before: DateTime::from_timestamp(validity.not_before.timestamp(), 0),
        not_after: DateTime::from_timestamp(validity.not_after.timestamp(), 0),
    })
}

fn version_offset(version: ProtocolVersion) -> u16 {
    match version {
        ProtocolVersion::TLSv1_0 => 0,
        ProtocolVersion::TLSv1_1 => 1,
        ProtocolVersion::TLSv1_2 => 2,
        ProtocolVersion::TLSv1_3 => 3,
        _ => 0,
    }
}

pub fn server_name(host: &str) -> Result<ServerName<'static>, ProbeError> {
    match host.parse::<IpAddr>() {
        Ok(ip) => Ok(ServerName::IpAddress(ip.into())),
        Err(_) => ServerName::try_from(host.to_owned())
            .map_err(|e| ProbeError::InvalidTarget(format!("{host}: {e}"))),
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Client config that verifies the server against the Mozilla root set.
pub fn verifying_config(alpn: &[&[u8]]) -> Result<ClientConfig, ProbeError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let mut config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(tls_config_error)?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    Ok(config)
}

/// Client config that accepts any certificate. Handshake signatures are
/// still checked so the session keys are sound.
pub fn insecure_config(alpn: &[&[u8]]) -> Result<ClientConfig, ProbeError> {
    let provider = provider();
    let mut config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(tls_config_error)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    Ok(config)
}

fn tls_config_error(err: rustls::Error) -> ProbeError {
    ProbeError::Handshake(io::Error::other(err))
}

#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
