//! TLS connectivity probe.
//!
//! Dials a single `host:port`, performs a TLS handshake with OpenSSL and
//! exposes the negotiated connection state and the peer certificate chain.
//!
//! ```no_run
//! use tlsprobe::config::ProbeConfig;
//!
//! let config = ProbeConfig::new("example.com", "443");
//! let session = tlsprobe::probe(&config)?;
//! for cert in session.state().peer_certificates {
//!     println!("{}", cert.subject);
//! }
//! # Ok::<(), tlsprobe::ProbeError>(())
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod report;
pub mod transport;

pub use config::{Config, OutputFormat, ProbeConfig};
pub use error::ProbeError;
pub use report::Reporter;
pub use transport::{Deadline, TimedStream};

use log::{debug, error, info};
use openssl::asn1::Asn1Time;
use openssl::ssl::{SslConnector, SslMethod, SslRef, SslStream, SslVerifyMode};
use openssl::x509::{X509NameRef, X509Ref};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::error::is_timeout_kind;

/// Read-only view of one certificate presented by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub subject: String,
    pub issuer: String,
    pub not_before: String,
    pub not_after: String,
    pub serial_number: String,
    pub days_remaining: i32,
    pub is_expired: bool,
}

impl Certificate {
    pub fn from_x509(cert: &X509Ref) -> Certificate {
        let (days_remaining, is_expired) = match Asn1Time::days_from_now(0) {
            Ok(now) => {
                let days = now.diff(cert.not_after()).map(|d| d.days).unwrap_or(0);
                (days, cert.not_after() < now)
            }
            Err(_) => (0, false),
        };

        Certificate {
            subject: format_name(cert.subject_name()),
            issuer: format_name(cert.issuer_name()),
            not_before: cert.not_before().to_string(),
            not_after: cert.not_after().to_string(),
            serial_number: cert
                .serial_number()
                .to_bn()
                .and_then(|bn| bn.to_hex_str().map(|hex| hex.to_string()))
                .unwrap_or_default(),
            days_remaining,
            is_expired,
        }
    }
}

/// Renders a distinguished name most-specific first, e.g. `CN=host,O=Org,C=US`.
fn format_name(name: &X509NameRef) -> String {
    let mut parts = name
        .entries()
        .map(|entry| {
            let key = entry
                .object()
                .nid()
                .short_name()
                .map(|s| s.to_string())
                .unwrap_or_else(|_| entry.object().to_string());
            let value = entry
                .data()
                .as_utf8()
                .map(|s| s.to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(entry.data().as_slice()).into_owned());
            format!("{}={}", key, value)
        })
        .collect::<Vec<_>>();
    parts.reverse();
    parts.join(",")
}

/// What the handshake negotiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub handshake_complete: bool,
    /// True when an offered ALPN protocol was accepted by the server.
    pub negotiated_protocol_is_mutual: bool,
    pub protocol_version: String,
    pub cipher: Option<String>,
    pub alpn_protocol: Option<String>,
    /// Leaf first, in the order the library returns the chain.
    pub peer_certificates: Vec<Certificate>,
}

impl ConnectionState {
    pub fn from_ssl(ssl: &SslRef, offered_alpn: bool) -> ConnectionState {
        let alpn_protocol = ssl
            .selected_alpn_protocol()
            .map(|proto| String::from_utf8_lossy(proto).to_string());
        let peer_certificates = ssl
            .peer_cert_chain()
            .map(|chain| chain.iter().map(Certificate::from_x509).collect())
            .unwrap_or_default();

        ConnectionState {
            handshake_complete: ssl.is_init_finished(),
            negotiated_protocol_is_mutual: offered_alpn && alpn_protocol.is_some(),
            protocol_version: ssl.version_str().to_string(),
            cipher: ssl.current_cipher().map(|cipher| cipher.name().to_string()),
            alpn_protocol,
            peer_certificates,
        }
    }
}

/// An established TLS session.
///
/// Dropping the session sends close_notify and releases the transport.
pub struct TlsSession<S: Read + Write> {
    stream: SslStream<S>,
    offered_alpn: bool,
}

impl<S: Read + Write> TlsSession<S> {
    pub fn ssl(&self) -> &SslRef {
        self.stream.ssl()
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_ssl(self.stream.ssl(), self.offered_alpn)
    }
}

impl<S: Read + Write> Drop for TlsSession<S> {
    fn drop(&mut self) {
        if let Err(e) = self.stream.shutdown() {
            debug!("close_notify not delivered: {}", e);
        }
    }
}

/// Client side of the probe, built once from a [`ProbeConfig`].
pub struct Connector {
    connector: SslConnector,
    address: String,
    sni: String,
    timeout: Duration,
    insecure: bool,
    offered_alpn: bool,
}

impl Connector {
    pub fn new(config: &ProbeConfig) -> Result<Connector, ProbeError> {
        let mut builder = SslConnector::builder(SslMethod::tls())?;
        if config.insecure {
            builder.set_verify(SslVerifyMode::NONE);
        }
        if let Some(ca_file) = &config.ca_file {
            builder.set_ca_file(ca_file)?;
        }
        if !config.alpn.is_empty() {
            builder.set_alpn_protos(&encode_alpn(&config.alpn)?)?;
        }

        Ok(Connector {
            connector: builder.build(),
            address: config.address(),
            sni: config.effective_sni().to_string(),
            timeout: config.timeout,
            insecure: config.insecure,
            offered_alpn: !config.alpn.is_empty(),
        })
    }

    /// Opens the TCP connection within a fresh connect timeout.
    pub fn dial(&self) -> Result<TcpStream, ProbeError> {
        self.dial_before(&Deadline::after(self.timeout))
    }

    /// Resolves the address and tries each socket address in turn, all
    /// before `deadline`. Each attempt only gets the time that is left.
    pub fn dial_before(&self, deadline: &Deadline) -> Result<TcpStream, ProbeError> {
        let addrs = self.resolve(deadline)?;

        let mut last_error = None;
        for addr in addrs {
            let left = match deadline.remaining() {
                Some(left) => left,
                None => return Err(self.timed_out()),
            };
            debug!("connecting to {} (time left {:?})", addr, left);
            match TcpStream::connect_timeout(&addr, left) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        let source = last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses found"));
        if is_timeout_kind(source.kind()) {
            Err(self.timed_out())
        } else {
            Err(ProbeError::ConnectionFailed {
                address: self.address.clone(),
                source,
            })
        }
    }

    /// Name lookup runs on a helper thread so a stalled resolver cannot
    /// outlive the deadline.
    fn resolve(&self, deadline: &Deadline) -> Result<Vec<SocketAddr>, ProbeError> {
        if let Ok(addr) = self.address.parse::<SocketAddr>() {
            return Ok(vec![addr]);
        }

        let address = self.address.clone();
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let result = address
                .to_socket_addrs()
                .map(|addrs| addrs.collect::<Vec<SocketAddr>>());
            let _ = sender.send(result);
        });

        let left = deadline.remaining().ok_or_else(|| self.timed_out())?;
        let addrs = match receiver.recv_timeout(left) {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => {
                return Err(ProbeError::DnsResolution {
                    address: self.address.clone(),
                    source: e,
                })
            }
            Err(RecvTimeoutError::Timeout) => return Err(self.timed_out()),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ProbeError::DnsResolution {
                    address: self.address.clone(),
                    source: io::Error::new(io::ErrorKind::Other, "resolver exited"),
                })
            }
        };

        if addrs.is_empty() {
            return Err(ProbeError::DnsResolution {
                address: self.address.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
            });
        }
        Ok(addrs)
    }

    fn timed_out(&self) -> ProbeError {
        ProbeError::Timeout {
            address: self.address.clone(),
            timeout: self.timeout,
        }
    }

    /// Runs the client handshake over an already connected transport.
    ///
    /// On failure the transport is dropped, closing it.
    pub fn handshake<S: Read + Write>(&self, stream: S) -> Result<TlsSession<S>, ProbeError> {
        let mut configuration = self.connector.configure()?;
        if self.insecure {
            configuration.set_verify_hostname(false);
        }

        debug!("starting TLS handshake with server name {}", self.sni);
        let stream = configuration.connect(&self.sni, stream)?;
        Ok(TlsSession {
            stream,
            offered_alpn: self.offered_alpn,
        })
    }
}

/// ALPN wire format: each protocol prefixed by its length.
fn encode_alpn(protocols: &[String]) -> Result<Vec<u8>, ProbeError> {
    let mut wire = Vec::new();
    for proto in protocols {
        let len = match u8::try_from(proto.len()) {
            Ok(len) if len > 0 => len,
            _ => {
                return Err(ProbeError::InvalidInput {
                    field: "alpn".to_string(),
                    reason: format!("protocol '{}' must be 1 to 255 bytes long", proto),
                })
            }
        };
        wire.push(len);
        wire.extend_from_slice(proto.as_bytes());
    }
    Ok(wire)
}

/// Dials `config.address()` and performs the TLS handshake.
///
/// Resolution, connect and handshake share one deadline of `config.timeout`.
pub fn probe(config: &ProbeConfig) -> Result<TlsSession<TimedStream>, ProbeError> {
    let deadline = Deadline::after(config.timeout);
    let connector = Connector::new(config)?;
    let stream = connector.dial_before(&deadline)?;
    let mut session = connector.handshake(TimedStream::new(stream, deadline))?;
    session.stream.get_mut().clear_deadline()?;
    Ok(session)
}

/// Runs one probe and writes the report, returning the process exit code.
///
/// Errors go to the log; the session is closed before this returns.
pub fn run<W: Write>(config: &ProbeConfig, reporter: &mut Reporter<W>) -> i32 {
    if let Err(e) = reporter.preamble(config) {
        error!("Failed to write report: {}", e);
        return error::EXIT_CONNECTION_FAILED;
    }

    let session = match probe(config) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to connect: {}", e);
            return e.exit_code();
        }
    };

    let state = session.state();
    info!(
        "connected to {} using {}",
        config.address(),
        state.protocol_version
    );
    match reporter.connection(&state) {
        Ok(()) => 0,
        Err(e) => {
            error!("Failed to write report: {}", e);
            error::EXIT_CONNECTION_FAILED
        }
    }
}
