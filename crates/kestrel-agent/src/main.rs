// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod adapters;
mod bus_resident;
mod config;
mod domainmgr;
mod heartbeat;
mod launcher;
mod logging;
mod nim;
mod portprobe;
mod zedagent;

use clap::Parser;
use config::Config;
use kestrel_bus::Bus;
use kestrel_reconcile::adapter::AdapterRegistry;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[derive(Parser)]
#[command(name = "kestrel-agent", version, about = "Edge device reconciliation agent.")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(clap::Subcommand)]
enum Subcommand {
    /// PKI bootstrap and the secure-channel deferred-send resident.
    Bus {
        #[arg(long, env = "KESTREL_CONTROLLER_URL")]
        controller_url: String,
    },
    /// Per-AppInstance reconciler.
    Zedagent,
    /// Per-domain worker supervisor.
    Domainmgr {
        /// Allow USB adapters to move into PCI-back state.
        #[arg(long, env = "KESTREL_USB_ACCESS")]
        usb_access: bool,
    },
    /// Network port verification loop.
    Nim {
        #[arg(long, env = "KESTREL_CONTROLLER_URL")]
        controller_url: String,
    },
    /// Print the current adapter reservation table.
    Adapters,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = cli.config;

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    logging::init_tracing(&config);

    let result = run(config, cli.subcommand).await;
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(config: Config, subcommand: Subcommand) -> anyhow::Result<()> {
    let bus = Bus::new(Some(config.state_dir.clone()));
    let shutdown = CancellationToken::new();

    let heartbeat_name = match &subcommand {
        Subcommand::Bus { .. } => "bus",
        Subcommand::Zedagent => "zedagent",
        Subcommand::Domainmgr { .. } => "domainmgr",
        Subcommand::Nim { .. } => "nim",
        Subcommand::Adapters => "adapters",
    };
    let heartbeat_shutdown = shutdown.clone();
    let heartbeat_dir = config.state_dir.clone();
    let heartbeat_task =
        tokio::spawn(async move { heartbeat::run(heartbeat_name, &heartbeat_dir, heartbeat_shutdown).await });

    let outcome = match subcommand {
        Subcommand::Bus { controller_url } => {
            bus_resident::run(config.state_dir.clone(), controller_url, shutdown.clone()).await
        }
        Subcommand::Zedagent => zedagent::run(bus, config.state_dir.clone(), shutdown.clone()).await,
        Subcommand::Domainmgr { usb_access } => {
            let adapters = AdapterRegistry::new(Vec::new());
            domainmgr::run(bus, adapters, usb_access).await
        }
        Subcommand::Nim { controller_url } => {
            let probe = portprobe::NetworkProbe::new(config.state_dir.clone(), controller_url)?;
            nim::run(bus, probe).await
        }
        Subcommand::Adapters => {
            let adapters = AdapterRegistry::new(Vec::new());
            adapters::run(adapters).await
        }
    };

    shutdown.cancel();
    let _ = heartbeat_task.await;
    outcome
}
