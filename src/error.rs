//! Error types for the TLS probe.
//!
//! Every failure that happens before a usable TLS session exists is a
//! [`ProbeError`]. None of them are retried: the probe reports the error and
//! the binary exits with [`ProbeError::exit_code`].

use std::fmt;
use std::io;
use std::time::Duration;

/// Exit code for a general connection or handshake failure.
pub const EXIT_CONNECTION_FAILED: i32 = 2;
/// Exit code for a connection attempt that timed out.
pub const EXIT_TIMED_OUT: i32 = 3;

/// Error type for a failed probe.
#[derive(Debug)]
pub enum ProbeError {
    /// The dial address could not be resolved (bad hostname or port text)
    DnsResolution {
        /// The `host:port` address that failed to resolve
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TCP connection failed to the target address
    ConnectionFailed {
        /// The address (host:port) that connection failed to
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TCP connection was not established within the connect timeout
    Timeout {
        /// The address (host:port) that timed out
        address: String,
        /// The configured bound
        timeout: Duration,
    },

    /// TLS handshake failed after the transport was connected
    HandshakeFailed {
        /// Details about why the handshake failed
        details: String,
        /// Whether the handshake stalled on a read/write timeout
        timed_out: bool,
    },

    /// Building the OpenSSL client context failed
    OpenSSLError {
        /// The underlying OpenSSL error
        details: String,
    },

    /// Invalid input provided to the API
    InvalidInput {
        /// Which field/parameter was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },

    /// Generic I/O error
    IoError {
        /// The underlying I/O error
        source: io::Error,
    },
}

impl ProbeError {
    /// Returns true when the failure was caused by the connect timeout.
    ///
    /// Structured indicators are checked first. OpenSSL failures only carry
    /// a message, so for those it falls back to looking for "timed out".
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { source, .. } | Self::IoError { source } => {
                is_timeout_kind(source.kind())
            }
            Self::HandshakeFailed { details, timed_out } => {
                *timed_out || mentions_timeout(details)
            }
            Self::OpenSSLError { details } => mentions_timeout(details),
            Self::DnsResolution { .. } | Self::InvalidInput { .. } => false,
        }
    }

    /// Process exit code the binary terminates with for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_timeout() {
            EXIT_TIMED_OUT
        } else {
            EXIT_CONNECTION_FAILED
        }
    }
}

fn mentions_timeout(message: &str) -> bool {
    message.to_lowercase().contains("timed out")
}

pub(crate) fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    // Sockets with SO_RCVTIMEO report an expired read as WouldBlock on unix.
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DnsResolution { address, source } => {
                write!(f, "Failed to resolve address {}: {}", address, source)
            }
            Self::ConnectionFailed { address, source } => {
                write!(f, "Failed to connect to {}: {}", address, source)
            }
            Self::Timeout { address, timeout } => {
                write!(
                    f,
                    "Connection to {} timed out after {}s",
                    address,
                    timeout.as_secs()
                )
            }
            Self::HandshakeFailed { details, .. } => {
                write!(f, "TLS handshake failed: {}", details)
            }
            Self::OpenSSLError { details } => {
                write!(f, "OpenSSL error: {}", details)
            }
            Self::InvalidInput { field, reason } => {
                write!(f, "Invalid input for '{}': {}", field, reason)
            }
            Self::IoError { source } => {
                write!(f, "I/O error: {}", source)
            }
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DnsResolution { source, .. } => Some(source),
            Self::ConnectionFailed { source, .. } => Some(source),
            Self::IoError { source } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for ProbeError {
    fn from(e: io::Error) -> Self {
        Self::IoError { source: e }
    }
}

impl From<openssl::error::ErrorStack> for ProbeError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::OpenSSLError {
            details: e.to_string(),
        }
    }
}

impl<S> From<openssl::ssl::HandshakeError<S>> for ProbeError {
    fn from(e: openssl::ssl::HandshakeError<S>) -> Self {
        use openssl::ssl::HandshakeError;
        use openssl::x509::X509VerifyResult;

        match e {
            HandshakeError::SetupFailure(stack) => Self::HandshakeFailed {
                details: format!("stream setup failed: {}", stack),
                timed_out: false,
            },
            // The stream is blocking, so WouldBlock only surfaces when the
            // read or write timeout fired.
            HandshakeError::WouldBlock(_) => Self::HandshakeFailed {
                details: "timed out waiting for the server".to_string(),
                timed_out: true,
            },
            HandshakeError::Failure(mid) => {
                let timed_out = mid
                    .error()
                    .io_error()
                    .map_or(false, |io| is_timeout_kind(io.kind()));
                let verify = mid.ssl().verify_result();
                let details = if verify != X509VerifyResult::OK {
                    format!("{}: {}", mid.error(), verify)
                } else {
                    mid.error().to_string()
                };
                Self::HandshakeFailed { details, timed_out }
            }
        }
    }
}
