use std::env;
use std::fs::File;
use std::process::ExitCode;

use anyhow::{Result, anyhow};
use crossbeam::channel::bounded;
use log::{Level, error, info};

use guestnet::logger::init_logger;
use guestnet::network::NetManager;
use guestnet::settings::Networks;

fn main() -> ExitCode {
    if let Err(e) = run() {
        // eprintln! in case the logger did not initialize.
        eprintln!("Failed to set up networking: {:#}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run() -> Result<()> {
    init_logger(Level::Info).map_err(|e| anyhow!("unable to initialize logger: {}", e))?;

    let path = env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: netsetup <network-settings.json>"))?;
    let file = File::open(&path).map_err(|e| anyhow!("unable to open {}: {}", path, e))?;
    let networks: Networks =
        serde_json::from_reader(file).map_err(|e| anyhow!("unable to parse {}: {}", path, e))?;

    let manager = NetManager::host();
    let (tx, rx) = bounded(1);
    manager.setup_networking(&networks, Some(tx))?;

    // Wait for the address announcement so the broadcast thread is not torn
    // down mid-send when the process exits. On the preconfigured path no
    // broadcast is dispatched and the channel just closes.
    if let Ok(result) = rx.recv()
        && let Err(e) = result
    {
        error!("address broadcast failed: {:#}", e);
    }

    info!("networking configured");
    Ok(())
}
