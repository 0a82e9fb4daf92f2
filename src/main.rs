use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use dhcp_agent::core::config::{self, ConfigSnapshot};
use dhcp_agent::core::dispatcher::Dispatcher;
use dhcp_agent::netio::port::SysAdapters;
use dhcp_agent::utils::logger::init_logger;

/// Run the DHCP agent.
#[derive(Parser, Debug)]
#[command(about = "DHCPv4 intercepting agent for bridge interfaces")]
struct Cli {
    /// File containing the agent config when running in mock mode;
    /// re-read on SIGUSR1
    #[arg(long, value_name = "FILE")]
    file: Option<PathBuf>,
    /// Verbosity level, 0 = errors only, 4 and up = trace
    #[arg(long, default_value_t = 2)]
    verbose: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logger("dhcp_agent", cli.verbose) {
        eprintln!("failed to initialise logging: {}", err);
        return ExitCode::FAILURE;
    }

    let initial = match &cli.file {
        Some(path) => match config::load_mock(path) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::error!("failed to load config {}: {}", path.display(), err);
                return ExitCode::FAILURE;
            }
        },
        None => ConfigSnapshot::default(),
    };
    let (config_tx, config_rx) = watch::channel(initial);

    if let Some(path) = cli.file.clone() {
        tokio::spawn(async move {
            let mut usr1 = match signal(SignalKind::user_defined1()) {
                Ok(stream) => stream,
                Err(err) => {
                    log::error!("failed to install SIGUSR1 handler: {}", err);
                    return;
                }
            };
            while usr1.recv().await.is_some() {
                log::debug!("rereading config");
                match config::load_mock(&path) {
                    Ok(snapshot) => {
                        if config_tx.send(snapshot).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        log::error!("failed to reload config {}: {}", path.display(), err)
                    }
                }
            }
        });
    }

    let dispatcher = match Dispatcher::new(config_rx, Box::new(SysAdapters)).await {
        Ok(dispatcher) => dispatcher,
        Err(err) => {
            log::error!("failed to start dispatcher: {}", err);
            return ExitCode::FAILURE;
        }
    };
    match dispatcher.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("dispatcher failed: {}", err);
            ExitCode::FAILURE
        }
    }
}
