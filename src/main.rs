use clap::Parser;
use log::error;
use std::io;
use std::path::PathBuf;
use std::process::exit;
use tlsprobe::config::Config;
use tlsprobe::logging::init_logger;
use tlsprobe::Reporter;

/// Exit code for an unreadable or invalid configuration.
const EXIT_CONFIG_ERROR: i32 = 1;

/// Dial a TLS endpoint, run the handshake and print the peer certificate chain.
#[derive(Parser, Debug)]
#[command(name = "tlsprobe", version, about, long_about = None)]
struct Cli {
    /// Target hostname or IP address [default: localhost]
    #[arg(long)]
    host: Option<String>,

    /// Target TCP port [default: 443]
    #[arg(long)]
    port: Option<String>,

    /// SNI server name (defaults to host)
    #[arg(long)]
    servername: Option<String>,

    /// Skip TLS certificate verification (not recommended)
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    insecure: Option<bool>,

    /// Connect timeout in seconds [default: 5]
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// ALPN protocols to offer, comma separated or repeated
    #[arg(long, value_delimiter = ',')]
    alpn: Option<Vec<String>>,

    /// PEM file with extra CA certificates to trust
    #[arg(long = "cafile", value_name = "FILE")]
    ca_file: Option<PathBuf>,

    /// Report style [default: text]
    #[arg(long, value_parser = ["text", "table"])]
    output: Option<String>,

    /// Configuration file (tlsprobe.toml is used when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long)]
    generate_config: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    init_logger(&cli.log_level);

    if cli.generate_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    let file_config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            exit(EXIT_CONFIG_ERROR);
        }
    };

    let cli_config = Config::from_cli_args(
        cli.host,
        cli.port,
        cli.servername,
        cli.insecure,
        cli.timeout,
        cli.alpn,
        cli.ca_file,
        cli.output,
    );

    let (probe_config, output) = match file_config.merge_with(cli_config).into_probe_config() {
        Ok(resolved) => resolved,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            exit(EXIT_CONFIG_ERROR);
        }
    };

    let stdout = io::stdout();
    let mut reporter = Reporter::new(stdout.lock(), output);
    let code = tlsprobe::run(&probe_config, &mut reporter);
    exit(code);
}
