use std::error::Error as StdError;
use std::io;

use thiserror::Error;

/// Coarse classification of a [`ProbeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedProtocol,
    InvalidTarget,
    ResolutionFailure,
    ConnectFailure,
    TransferFailure,
    Timeout,
    RunCancelled,
}

/// Everything that can go wrong while building or running a single probe.
///
/// Probe failures never escape the probe: they are stored in
/// [`ProbeResult::error`](super::ProbeResult) and rendered through
/// [`ProbeError::reason`].
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("protocol not supported: {0}")]
    UnsupportedProtocol(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("dns lookup failed: {0}")]
    Resolution(#[source] io::Error),

    #[error("dial failed: {0}")]
    Connect(#[source] io::Error),

    #[error("tls handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("{context}: {source}")]
    Transfer {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: hyper::Error,
    },

    #[error("{0}: timeout")]
    Timeout(&'static str),

    #[error("operation cancelled")]
    Cancelled,
}

impl ProbeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::UnsupportedProtocol(_) => ErrorKind::UnsupportedProtocol,
            ProbeError::InvalidTarget(_) => ErrorKind::InvalidTarget,
            ProbeError::Resolution(_) => ErrorKind::ResolutionFailure,
            ProbeError::Connect(_) | ProbeError::Handshake(_) => ErrorKind::ConnectFailure,
            ProbeError::Transfer { .. } | ProbeError::Http { .. } => ErrorKind::TransferFailure,
            ProbeError::Timeout(_) => ErrorKind::Timeout,
            ProbeError::Cancelled => ErrorKind::RunCancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::RunCancelled
    }

    /// Short, user facing reason used in the per-attempt line.
    pub fn reason(&self) -> String {
        match self {
            ProbeError::Timeout(_) => "timeout".to_string(),
            ProbeError::Cancelled => "cancelled".to_string(),
            ProbeError::UnsupportedProtocol(_) | ProbeError::InvalidTarget(_) => self.to_string(),
            _ => classify(self),
        }
    }
}

/// Walks the source chain and maps the innermost cause to a phrase.
fn classify(err: &(dyn StdError + 'static)) -> String {
    let mut innermost: &(dyn StdError + 'static) = err;
    let mut current = err.source();
    while let Some(cause) = current {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if let Some(phrase) = io_phrase(io_err) {
                return phrase.to_string();
            }
        }
        if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
            if hyper_err.is_timeout() {
                return "timeout".to_string();
            }
        }
        innermost = cause;
        current = cause.source();
    }
    innermost.to_string()
}

fn io_phrase(err: &io::Error) -> Option<&'static str> {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Some("timeout"),
        io::ErrorKind::ConnectionRefused => Some("connection refused"),
        io::ErrorKind::ConnectionReset => Some("connection reset by peer"),
        io::ErrorKind::ConnectionAborted => Some("connection aborted"),
        io::ErrorKind::UnexpectedEof => Some("unexpected end of stream"),
        io::ErrorKind::AddrNotAvailable => Some("address not available"),
        _ => None,
    }
}

/// Failures of a scheduler run, as opposed to failures of a single attempt.
#[derive(Debug, Error)]
pub enum RunError {
    /// The run was cancelled by something other than [`Pinger::stop`](super::Pinger::stop).
    #[error("run cancelled")]
    Cancelled,

    #[error("writing output failed: {0}")]
    Output(#[from] io::Error),

    #[error("run task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
