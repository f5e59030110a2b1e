//! Harbor daemon.
//!
//! Loads configuration, starts the listener supervisor and serves until the
//! process is killed.

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use harbor::config::{ConfigLoader, DEFAULT_ENV_PREFIX};
use harbor::server::Supervisor;
use harbor::telemetry::init_logging;

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("harbord {}", harbor::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"harbord - supervised connection server

USAGE:
    harbord [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    HARBOR__SERVER__PORT        Listening port (default: 80)
    HARBOR__SERVER__HOST        Bind host (default: 0.0.0.0)
    HARBOR__SERVER__TLS_CERT    PEM certificate chain
    HARBOR__SERVER__TLS_KEY     PEM private key
    HARBOR__POOL__SIZE          Worker threads, 0 to 32 (default: 3)
    HARBOR__LOGGING__LEVEL      Log filter (default: info)
    HARBOR__LOGGING__FORMAT     json, pretty or compact (default: json)

Variables may also be placed in a .env file.

EXAMPLES:
    harbord --config /etc/harbor/harbor.toml
    HARBOR__SERVER__PORT=8080 HARBOR__LOGGING__FORMAT=pretty harbord
"
    );
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_dotenv()?;
    if let Some(path) = &args.config {
        loader = loader
            .with_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }
    let config = loader
        .with_env_prefix(DEFAULT_ENV_PREFIX)
        .load()
        .context("invalid configuration")?;

    init_logging(&config.to_log_config()?)?;

    let server_config = config.to_server_config()?;
    let transport = server_config.tcp_transport();
    info!(
        version = harbor::VERSION,
        host = server_config.host(),
        port = server_config.port(),
        workers = server_config.pool_size(),
        tls = server_config.tls().is_some(),
        "starting harbord"
    );

    let supervisor = Supervisor::new(server_config, transport, harbor::no_content)?;
    supervisor.start()?;

    loop {
        std::thread::park();
    }
}
