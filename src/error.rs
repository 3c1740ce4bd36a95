/* src/error.rs */

use hickory_proto::op::ResponseCode;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Result of every public operation. `Ok` is the success outcome, `Err` the typed failure.
pub type UpdateResult<T = ()> = Result<T, Error>;

/// Flat classification of [`Error`], convenient for matching and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Configuration,
    InvalidKey,
    Network,
    Timeout,
    Authentication,
    Authorization,
    Conflict,
    Protocol,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Bad record syntax. Raised locally, never sent over the wire.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unusable TSIG key material. The message never contains the secret.
    #[error("invalid TSIG key: {0}")]
    InvalidKey(String),

    #[error("network error talking to {server}: {source}")]
    Network {
        server: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("no response from {server} within {timeout:?}")]
    Timeout { server: SocketAddr, timeout: Duration },

    /// The server's reply carried a TSIG record that failed verification.
    #[error("response failed TSIG verification: {0}")]
    Authentication(String),

    #[error("server rejected the request ({rcode})")]
    Authorization { rcode: ResponseCode },

    #[error("conflicting RRset ({rcode})")]
    Conflict { rcode: ResponseCode },

    #[error("protocol error: {reason}")]
    Protocol {
        reason: String,
        rcode: Option<ResponseCode>,
    },
}

impl Error {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Error::Protocol {
            reason: reason.into(),
            rcode: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::InvalidKey(_) => ErrorKind::InvalidKey,
            Error::Network { .. } => ErrorKind::Network,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::Authorization { .. } => ErrorKind::Authorization,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::Protocol { .. } => ErrorKind::Protocol,
        }
    }

    /// The raw response code the server answered with, if the failure came from the server.
    pub fn rcode(&self) -> Option<ResponseCode> {
        match self {
            Error::Authorization { rcode } | Error::Conflict { rcode } => Some(*rcode),
            Error::Protocol { rcode, .. } => *rcode,
            _ => None,
        }
    }

    /// Only transport failures are worth another attempt; ADD and DELETE are idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network { .. } | Error::Timeout { .. })
    }
}
