//! Human-readable probe report.
//!
//! The report is written to any [`Write`] sink: stdout in the binary, a
//! buffer in tests.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use std::io::{self, Write};

use crate::config::{OutputFormat, ProbeConfig};
use crate::{Certificate, ConnectionState};

/// Writes the report lines for one probe to `W`.
pub struct Reporter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> Reporter<W> {
    /// Reporter writing to `out` in the given style.
    pub fn new(out: W, format: OutputFormat) -> Self {
        Reporter { out, format }
    }

    /// Gives back the sink, e.g. to inspect a buffer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Connection parameters, printed before dialing.
    pub fn preamble(&mut self, config: &ProbeConfig) -> io::Result<()> {
        writeln!(self.out, "Connecting to:   {}", config.address())?;
        writeln!(self.out, "TLS server name: {}", config.effective_sni())?;
        writeln!(self.out, "Insecure TLS:    {}", config.insecure)?;
        self.out.flush()
    }

    /// Handshake summary followed by the peer certificate chain.
    pub fn connection(&mut self, state: &ConnectionState) -> io::Result<()> {
        writeln!(
            self.out,
            "TLS handshake complete: {}",
            state.handshake_complete
        )?;
        writeln!(
            self.out,
            "Mutual protocol negotiated: {}",
            state.negotiated_protocol_is_mutual
        )?;
        writeln!(self.out, "Protocol version: {}", state.protocol_version)?;
        writeln!(
            self.out,
            "Cipher: {}",
            state.cipher.as_deref().unwrap_or("none")
        )?;
        writeln!(
            self.out,
            "ALPN protocol: {}",
            state.alpn_protocol.as_deref().unwrap_or("none")
        )?;

        match self.format {
            OutputFormat::Text => {
                for (i, cert) in state.peer_certificates.iter().enumerate() {
                    self.certificate_lines(i + 1, cert)?;
                }
            }
            OutputFormat::Table => {
                if !state.peer_certificates.is_empty() {
                    writeln!(self.out, "{}", certificate_table(&state.peer_certificates))?;
                }
            }
        }
        self.out.flush()
    }

    fn certificate_lines(&mut self, index: usize, cert: &Certificate) -> io::Result<()> {
        writeln!(self.out, "Certificate {} Subject: {}", index, cert.subject)?;
        writeln!(self.out, "Certificate {} Issuer: {}", index, cert.issuer)?;
        writeln!(self.out, "Certificate {} Not before: {}", index, cert.not_before)?;
        writeln!(self.out, "Certificate {} Not after: {}", index, cert.not_after)?;
        writeln!(self.out, "Certificate {} Serial: {}", index, cert.serial_number)?;
        writeln!(
            self.out,
            "Certificate {} Days left: {}{}",
            index,
            cert.days_remaining,
            if cert.is_expired { " (expired)" } else { "" }
        )
    }
}

fn certificate_table(certs: &[Certificate]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "#",
            "Subject",
            "Issuer",
            "Not before",
            "Not after",
            "Days left",
        ]);

    for (i, cert) in certs.iter().enumerate() {
        let days = if cert.is_expired {
            format!("{} (expired)", cert.days_remaining)
        } else {
            cert.days_remaining.to_string()
        };
        table.add_row(vec![
            (i + 1).to_string(),
            cert.subject.clone(),
            cert.issuer.clone(),
            cert.not_before.clone(),
            cert.not_after.clone(),
            days,
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(cn: &str, issuer: &str) -> Certificate {
        Certificate {
            subject: format!("CN={}", cn),
            issuer: format!("CN={}", issuer),
            not_before: "Jan  1 00:00:00 2025 GMT".to_string(),
            not_after: "Jan  1 00:00:00 2026 GMT".to_string(),
            serial_number: "01".to_string(),
            days_remaining: 30,
            is_expired: false,
        }
    }

    fn state(certs: Vec<Certificate>) -> ConnectionState {
        ConnectionState {
            handshake_complete: true,
            negotiated_protocol_is_mutual: false,
            protocol_version: "TLSv1.3".to_string(),
            cipher: Some("TLS_AES_256_GCM_SHA384".to_string()),
            alpn_protocol: None,
            peer_certificates: certs,
        }
    }

    fn render(format: OutputFormat, state: &ConnectionState) -> String {
        let mut reporter = Reporter::new(Vec::new(), format);
        reporter.connection(state).unwrap();
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn test_preamble_lines() {
        let mut config = ProbeConfig::new("example.test", "8443");
        config.servername = "sni.example.test".to_string();
        config.insecure = true;

        let mut reporter = Reporter::new(Vec::new(), OutputFormat::Text);
        reporter.preamble(&config).unwrap();
        let out = String::from_utf8(reporter.into_inner()).unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Connecting to:   example.test:8443",
                "TLS server name: sni.example.test",
                "Insecure TLS:    true",
            ]
        );
    }

    #[test]
    fn test_certificates_in_chain_order() {
        let out = render(
            OutputFormat::Text,
            &state(vec![cert("leaf.test", "Intermediate"), cert("Intermediate", "Root")]),
        );

        let leaf = out.find("Certificate 1 Subject: CN=leaf.test").unwrap();
        let intermediate = out.find("Certificate 2 Subject: CN=Intermediate").unwrap();
        assert!(leaf < intermediate);
        assert_eq!(out.matches("Subject:").count(), 2);
        assert!(out.contains("Certificate 2 Issuer: CN=Root"));
    }

    #[test]
    fn test_empty_chain_still_prints_summary() {
        let out = render(OutputFormat::Text, &state(Vec::new()));

        assert!(out.contains("TLS handshake complete: true"));
        assert!(out.contains("Mutual protocol negotiated: false"));
        assert!(out.contains("ALPN protocol: none"));
        assert!(!out.contains("Certificate 1"));
    }

    #[test]
    fn test_table_lists_every_certificate() {
        let mut expired = cert("old.test", "Root");
        expired.is_expired = true;
        expired.days_remaining = -3;

        let out = render(OutputFormat::Table, &state(vec![cert("leaf.test", "Root"), expired]));

        assert!(out.contains("CN=leaf.test"));
        assert!(out.contains("CN=old.test"));
        assert!(out.contains("-3 (expired)"));
    }
}
