//! Configuration management for tlsprobe.
//!
//! Handles loading and merging settings from an optional TOML file and the
//! command line, and turns the result into the immutable [`ProbeConfig`] the
//! probe runs with.
//!
//! # Configuration Precedence
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (tlsprobe.toml or specified with --config)
//! 3. Command-line arguments (highest priority)
//!
//! # Example Configuration File
//!
//! ```toml
//! host = "example.com"
//! port = "8443"
//! servername = "api.example.com"
//! insecure = false
//! timeout = 5
//! alpn = ["h2", "http/1.1"]
//! ca_file = "/etc/ssl/internal-ca.pem"
//! output = "text"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use strum_macros::{Display, EnumString};

/// Config file picked up from the working directory when --config is absent.
pub const DEFAULT_CONFIG_FILE: &str = "tlsprobe.toml";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: &str = "443";
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// How the report is rendered. Both styles are meant for people, not parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// One `label: value` line per field
    Text,
    /// Certificate chain rendered as a table
    Table,
}

/// Layered configuration as read from a file or the command line.
///
/// All fields are optional to support partial configuration and merging.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Target hostname or IP address
    pub host: Option<String>,
    /// Target TCP port, kept as text
    pub port: Option<String>,
    /// SNI override; empty means "use host"
    pub servername: Option<String>,
    /// Skip certificate chain and hostname verification
    pub insecure: Option<bool>,
    /// Connect timeout in seconds
    pub timeout: Option<u64>,
    /// ALPN protocols offered during the handshake
    pub alpn: Option<Vec<String>>,
    /// Extra PEM file of trusted CA certificates
    pub ca_file: Option<PathBuf>,
    /// Output style: text, table
    pub output: Option<String>,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use tlsprobe::config::Config;
    /// let config = Config::from_file("tlsprobe.toml")?;
    /// # Ok::<(), tlsprobe::config::ConfigError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Loads the file layer: `path` when given, else [`DEFAULT_CONFIG_FILE`]
    /// if it exists, else an empty layer.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Config::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Config::from_file(DEFAULT_CONFIG_FILE)
            }
            None => Ok(Config::empty()),
        }
    }

    /// Creates the configuration holding the built-in defaults.
    ///
    /// # Default Values
    ///
    /// - `host`: "localhost"
    /// - `port`: "443"
    /// - `servername`: "" (falls back to host)
    /// - `insecure`: false
    /// - `timeout`: 5
    /// - `alpn`: none offered
    /// - `ca_file`: none, system trust store only
    /// - `output`: "text"
    pub fn default() -> Self {
        Config {
            host: Some(DEFAULT_HOST.to_string()),
            port: Some(DEFAULT_PORT.to_string()),
            servername: Some(String::new()),
            insecure: Some(false),
            timeout: Some(DEFAULT_TIMEOUT_SECS),
            alpn: Some(Vec::new()),
            ca_file: None,
            output: Some(OutputFormat::Text.to_string()),
        }
    }

    /// An empty layer: merging it changes nothing.
    pub fn empty() -> Self {
        Config {
            host: None,
            port: None,
            servername: None,
            insecure: None,
            timeout: None,
            alpn: None,
            ca_file: None,
            output: None,
        }
    }

    /// Merges this configuration with another, prioritizing the other's values.
    ///
    /// For each field, a `Some` in `other` overrides this config's value.
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.servername.is_some() {
            self.servername = other.servername;
        }
        if other.insecure.is_some() {
            self.insecure = other.insecure;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.alpn.is_some() {
            self.alpn = other.alpn;
        }
        if other.ca_file.is_some() {
            self.ca_file = other.ca_file;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        self
    }

    /// Creates a Config from command-line arguments for merging.
    ///
    /// Only provided arguments (Some values) will override other layers.
    #[allow(clippy::too_many_arguments)]
    pub fn from_cli_args(
        host: Option<String>,
        port: Option<String>,
        servername: Option<String>,
        insecure: Option<bool>,
        timeout: Option<u64>,
        alpn: Option<Vec<String>>,
        ca_file: Option<PathBuf>,
        output: Option<String>,
    ) -> Self {
        Config {
            host,
            port,
            servername,
            insecure,
            timeout,
            alpn,
            ca_file,
            output,
        }
    }

    /// Resolves the merged layers into the immutable probe configuration.
    ///
    /// Missing fields take their defaults. Fails on a zero timeout or an
    /// unknown output style; the port is deliberately not validated here.
    pub fn into_probe_config(self) -> Result<(ProbeConfig, OutputFormat), ConfigError> {
        let merged = Config::default().merge_with(self);

        let timeout = merged.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout == 0 {
            return Err(ConfigError::Validation(
                "timeout must be at least 1 second".to_string(),
            ));
        }

        let output = merged.output.unwrap_or_default();
        let output = OutputFormat::from_str(&output).map_err(|_| {
            ConfigError::Validation(format!(
                "unknown output '{}', expected text or table",
                output
            ))
        })?;

        let alpn = merged
            .alpn
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>();
        if let Some(long) = alpn.iter().find(|p| p.len() > 255) {
            return Err(ConfigError::Validation(format!(
                "ALPN protocol '{}' is longer than 255 bytes",
                long
            )));
        }

        let probe = ProbeConfig {
            host: merged.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: merged.port.unwrap_or_else(|| DEFAULT_PORT.to_string()),
            servername: merged.servername.unwrap_or_default(),
            insecure: merged.insecure.unwrap_or(false),
            timeout: Duration::from_secs(timeout),
            alpn,
            ca_file: merged.ca_file,
        };
        Ok((probe, output))
    }

    /// Generates an example configuration file in TOML format.
    pub fn example_toml() -> String {
        let example = Config {
            host: Some("example.com".to_string()),
            port: Some("443".to_string()),
            servername: Some("www.example.com".to_string()),
            insecure: Some(false),
            timeout: Some(DEFAULT_TIMEOUT_SECS),
            alpn: Some(vec!["h2".to_string(), "http/1.1".to_string()]),
            ca_file: None,
            output: Some(OutputFormat::Text.to_string()),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Parameters of a single probe. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub host: String,
    pub port: String,
    /// SNI override, may be empty
    pub servername: String,
    pub insecure: bool,
    pub timeout: Duration,
    pub alpn: Vec<String>,
    /// Extra trusted CA certificates, used unless `insecure` is set
    pub ca_file: Option<PathBuf>,
}

impl ProbeConfig {
    /// Probe configuration for `host:port` with every other field defaulted.
    pub fn new(host: &str, port: &str) -> Self {
        ProbeConfig {
            host: host.to_string(),
            port: port.to_string(),
            servername: String::new(),
            insecure: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            alpn: Vec::new(),
            ca_file: None,
        }
    }

    /// The server name presented in the handshake: the override when set,
    /// otherwise the host.
    pub fn effective_sni(&self) -> &str {
        if self.servername.is_empty() {
            &self.host
        } else {
            &self.servername
        }
    }

    /// The dial address. IPv6 literals are bracketed; the port is not checked.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (invalid values)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
