use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tftp_rs::config::Config;

/// A TFTP (RFC 1350) read/write file-transfer server.
#[derive(Parser, Debug)]
#[command(name = "tftp-rs", version, about)]
struct Cli {
    /// UDP port to listen on.
    #[arg(short, long, default_value_t = 6969)]
    port: u16,

    /// Address to bind the listener to.
    #[arg(short, long, default_value = "0.0.0.0")]
    address: IpAddr,

    /// Directory to serve files from and write uploads into.
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Log every datagram sent or received, direction-tagged, to stderr.
    #[arg(long)]
    trace: bool,
}

fn init_logging(trace: bool) {
    let default_level = if trace { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    // DEBUG=1 attaches source-file annotation to log records, no other
    // behavioural effect.
    if std::env::var("DEBUG").as_deref() == Ok("1") {
        builder.with_file(true).with_line_number(true).init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.trace);

    let dir = std::fs::canonicalize(&cli.dir)?;

    let cfg = Config {
        address: cli.address,
        port: cli.port,
        dir,
        trace: cli.trace,
        ..Config::default()
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::select! {
        result = tftp_rs::server::run(cfg, shutdown_rx) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            let _ = shutdown_tx.send(true);
        }
    }

    Ok(())
}
