//! Error types for the request engine.
//!
//! # Design
//! Every failure a call can produce is a variant of [`Error`], matched
//! explicitly by callers. `Http` carries the non-200 status and whatever
//! body the server sent; `Transport` covers everything below HTTP (DNS,
//! connect timeout, broken pipes) and reports [`TRANSPORT_ERROR_CODE`] from
//! [`Error::code`] so the two can be told apart by code alone.
//!
//! Trust failures get their own type, [`TrustFailure`], because they are
//! raised inside the TLS handshake and have to survive a trip through
//! rustls and reqwest before the executor can recover them.

use std::path::PathBuf;

use thiserror::Error;

/// Code reported by [`Error::code`] for anything that is not an HTTP status.
pub const TRANSPORT_ERROR_CODE: u16 = 0;

/// Errors returned by the request engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A form value is not text, a number, a file or a byte buffer.
    #[error("field `{field}` has unsupported type {type_name}; only text, number, file and bytes are accepted")]
    UnsupportedFieldType { field: String, type_name: String },

    /// The peer's certificate chain was rejected by the trust policy.
    #[error(transparent)]
    CertificateVerificationFailed(#[from] TrustFailure),

    /// The server answered with a status other than 200.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A non-200 answer whose body was a JSON object.
    #[error("HTTP {status}: {body}")]
    HttpJson { status: u16, body: serde_json::Value },

    /// Anything below HTTP: resolution, connect, TLS setup, broken streams.
    #[error("transport error ({code}): {message}")]
    Transport { code: u16, message: String },

    /// A file field could not be inspected while building the form.
    #[error("cannot read form file {}: {source}", .path.display())]
    InvalidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A success body could not be deserialized into the requested type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

// Stream failures while sending or reading are transport failures.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::transport(err.to_string())
    }
}

impl Error {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            code: TRANSPORT_ERROR_CODE,
            message: message.into(),
        }
    }

    /// HTTP status for HTTP-level errors, [`TRANSPORT_ERROR_CODE`] otherwise.
    pub fn code(&self) -> u16 {
        match self {
            Error::Http { status, .. } | Error::HttpJson { status, .. } => *status,
            Error::Transport { code, .. } => *code,
            _ => TRANSPORT_ERROR_CODE,
        }
    }
}

/// Which side of the handshake presented the rejected chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Server,
    Client,
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Peer::Server => f.write_str("server"),
            Peer::Client => f.write_str("client"),
        }
    }
}

/// Why a certificate chain was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustFailureReason {
    /// No chain was presented at all.
    ChainMissing,
    /// A chain was presented but no certificate carried the pinned serial.
    NoMatchingSerial,
    /// The leaf certificate is outside its validity window.
    NotTimeValid,
    /// The leaf certificate could not be parsed.
    Unparseable(String),
}

/// A rejected certificate chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{peer} certificate verification failed: {}", describe(.reason))]
pub struct TrustFailure {
    pub peer: Peer,
    pub reason: TrustFailureReason,
}

impl TrustFailure {
    pub(crate) fn new(peer: Peer, reason: TrustFailureReason) -> Self {
        Self { peer, reason }
    }

    /// True when the chain was absent rather than present-but-rejected.
    pub fn is_chain_missing(&self) -> bool {
        self.reason == TrustFailureReason::ChainMissing
    }
}

fn describe(reason: &TrustFailureReason) -> String {
    match reason {
        TrustFailureReason::ChainMissing => "certificate chain is missing".to_string(),
        TrustFailureReason::NoMatchingSerial => "no certificate matches the pinned serial number".to_string(),
        TrustFailureReason::NotTimeValid => "leaf certificate is not currently valid".to_string(),
        TrustFailureReason::Unparseable(msg) => format!("leaf certificate is unparseable: {msg}"),
    }
}
