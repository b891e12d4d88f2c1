//! b1b - keep bridged MACs reachable across bond failovers.
//!
//! Watches mode-1 bonds that are ports of a Linux or Open vSwitch
//! bridge; on every bonding failover it replays the bridge's forwarding
//! database as gratuitous ARPs so upstream switches relearn each MAC on
//! the newly active slave.

mod logging;

use clap::Parser;
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "b1b", version)]
#[command(about = "Refresh bridge FDB learning after bond failovers", long_about = None)]
struct Cli {
    /// Enable debug logging.
    #[arg(short = 'd', long)]
    debug: bool,

    /// Always prefix log lines with <N> syslog priority tags.
    #[arg(short = 'l', long, conflicts_with = "stderr")]
    syslog: bool,

    /// Never prefix log lines with syslog priority tags.
    #[arg(short = 'e', long)]
    stderr: bool,

    /// Bond interfaces to monitor (default: auto-detect).
    interfaces: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help/--version land here too; only real errors exit 1.
            let fatal = e.use_stderr();
            let _ = e.print();
            std::process::exit(if fatal { 1 } else { 0 });
        }
    };

    logging::init(cli.debug, cli.syslog, cli.stderr);
    debug!("b1b {} starting", env!("CARGO_PKG_VERSION"));

    let config = b1b::daemon::Config {
        interfaces: cli.interfaces,
    };

    if let Err(e) = b1b::daemon::run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
