//! Local TLS servers for the integration tests.

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{select_next_proto, AlpnError, NameType, SslAcceptor, SslMethod};
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const LEAF_CN: &str = "example.test";
pub const CA_CN: &str = "Probe Test CA";

fn key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn build_cert(
    cn: &str,
    serial: u32,
    key: &PKey<Private>,
    issuer: Option<(&X509, &PKey<Private>)>,
    ca: bool,
) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Probe Tests")
        .unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();
    if ca {
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
    } else {
        let san = SubjectAlternativeName::new()
            .dns(cn)
            .build(&builder.x509v3_context(issuer.map(|(cert, _)| &**cert), None))
            .unwrap();
        builder.append_extension(san).unwrap();
    }

    match issuer {
        Some((issuer_cert, issuer_key)) => {
            builder.set_issuer_name(issuer_cert.subject_name()).unwrap();
            builder.sign(issuer_key, MessageDigest::sha256()).unwrap();
        }
        None => {
            builder.set_issuer_name(&name).unwrap();
            builder.sign(key, MessageDigest::sha256()).unwrap();
        }
    }
    builder.build()
}

/// A TLS server on 127.0.0.1 that handles exactly one connection.
pub struct TestServer {
    pub port: u16,
    /// PEM of the CA that signed the leaf, for clients that should trust it
    pub ca_pem: Vec<u8>,
    servername: Arc<Mutex<Option<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Serves a leaf certificate for [`LEAF_CN`] signed by [`CA_CN`],
    /// sending both so the client sees a two certificate chain.
    pub fn start(alpn: Option<&'static [u8]>) -> TestServer {
        let ca_key = key();
        let ca = build_cert(CA_CN, 1, &ca_key, None, true);
        let leaf_key = key();
        let leaf = build_cert(LEAF_CN, 2, &leaf_key, Some((&ca, &ca_key)), false);

        let ca_pem = ca.to_pem().unwrap();

        let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
        acceptor.set_private_key(&leaf_key).unwrap();
        acceptor.set_certificate(&leaf).unwrap();
        acceptor.add_extra_chain_cert(ca).unwrap();
        acceptor.check_private_key().unwrap();
        if let Some(server_protos) = alpn {
            acceptor.set_alpn_select_callback(move |_, client| {
                select_next_proto(server_protos, client).ok_or(AlpnError::NOACK)
            });
        }
        let servername = Arc::new(Mutex::new(None));
        let seen = servername.clone();
        acceptor.set_servername_callback(move |ssl, _alert| {
            *seen.lock().unwrap() = ssl.servername(NameType::HOST_NAME).map(str::to_string);
            Ok(())
        });
        let acceptor = acceptor.build();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (stream, _) = match listener.accept() {
                Ok(conn) => conn,
                Err(_) => return,
            };
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            if let Ok(mut tls) = acceptor.accept(stream) {
                let mut buf = [0u8; 256];
                while let Ok(n) = tls.read(&mut buf) {
                    if n == 0 {
                        break;
                    }
                }
            }
        });

        TestServer {
            port,
            ca_pem,
            servername,
            handle: Some(handle),
        }
    }

    /// The SNI the client presented, if any.
    pub fn received_servername(&self) -> Option<String> {
        self.servername.lock().unwrap().clone()
    }

    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

/// Accepts TCP connections into the backlog but never speaks TLS.
pub struct SilentServer {
    pub port: u16,
    _listener: TcpListener,
}

impl SilentServer {
    pub fn start() -> SilentServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        SilentServer {
            port,
            _listener: listener,
        }
    }
}

/// Answers with a TLS record header promising a large handshake message,
/// then sends its body one byte every 500ms.
pub struct TricklingServer {
    pub port: u16,
}

impl TricklingServer {
    pub fn start() -> TricklingServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        thread::spawn(move || {
            let (mut stream, _) = match listener.accept() {
                Ok(conn) => conn,
                Err(_) => return,
            };
            // handshake record, TLS 1.2, 16000 bytes
            if stream.write_all(&[0x16, 0x03, 0x03, 0x3e, 0x80]).is_err() {
                return;
            }
            for _ in 0..40 {
                thread::sleep(Duration::from_millis(500));
                if stream.write_all(&[0x00]).is_err() {
                    return;
                }
            }
        });

        TricklingServer { port }
    }
}

/// A loopback port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}
