//! Entry point for `tdma_station`.
//!
//! Parses CLI arguments into an immutable [`Config`] and runs one station
//! until it fails or is asked to terminate. `main.rs` owns only process setup
//! (logging, signal handling, argument parsing, exit status).

use std::future::Future;
use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tdma_station::core::{DEFAULT_BASE_PORT, DEFAULT_GROUP, DEFAULT_SINK_CAPACITY, DEFAULT_TEAM};
use tdma_station::network::MulticastSocket;
use tdma_station::station::{CounterSource, EventSink};
use tdma_station::time::SystemClock;
use tdma_station::{Config, PortMode, Result, Station};

/// Coordinator-free TDMA beacon station.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Station number
    #[arg(long, default_value_t = 1)]
    station: u32,

    /// Team number
    #[arg(long, default_value_t = DEFAULT_TEAM)]
    team: u32,

    /// Multicast group to join
    #[arg(long, default_value_t = DEFAULT_GROUP)]
    group: Ipv4Addr,

    /// Fixed UDP port; overrides --base-port
    #[arg(long)]
    port: Option<u16>,

    /// Base UDP port, the team number is added to it
    #[arg(long, default_value_t = DEFAULT_BASE_PORT)]
    base_port: u16,

    /// Directory for the event sink log
    #[arg(long, default_value = "../log/")]
    log_dir: PathBuf,

    /// Seed for slot selection; derived from the station number when unset
    #[arg(long)]
    seed: Option<u64>,

    /// Consecutive failed receives tolerated before giving up
    #[arg(long, default_value_t = 0)]
    max_transport_errors: u32,

    /// Buffered event sink lines
    #[arg(long, default_value_t = DEFAULT_SINK_CAPACITY)]
    sink_capacity: usize,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            station: self.station,
            team: self.team,
            group: self.group,
            port: match self.port {
                Some(port) => PortMode::Fixed(port),
                None => PortMode::PerTeam {
                    base: self.base_port,
                },
            },
            log_dir: self.log_dir,
            seed: self.seed,
            max_consecutive_transport_errors: self.max_transport_errors,
            sink_capacity: self.sink_capacity,
        }
    }
}

fn init_tracing(station: u32) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tdma_station=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(station, version = tdma_station::VERSION, "starting");
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.station);

    let config = cli.into_config();
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "station stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let termination = termination()?;
    let mut sink =
        EventSink::open(&config.log_dir, config.team, config.station, config.sink_capacity).await?;

    let channel = match MulticastSocket::join(config.group, config.port()?).await {
        Ok(channel) => channel,
        Err(e) => {
            sink.stop().await?;
            return Err(e);
        }
    };

    let source = CounterSource::new(config.team, config.station);
    let mut station = Station::new(config, channel, SystemClock, source, sink);

    let result = station
        .run_until(async move {
            let signal = termination.await;
            info!(signal, "termination requested");
        })
        .await;

    if let Err(e) = station.close() {
        warn!(error = %e, "failed to leave multicast group");
    }

    result
}

/// Installs the termination handlers and returns a future naming the first
/// signal received
///
/// Handlers are in place when this returns, so a signal arriving before the
/// future is polled is not lost.
#[cfg(unix)]
fn termination() -> io::Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
        }
    })
}

#[cfg(not(unix))]
fn termination() -> io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        "Ctrl-C"
    })
}
