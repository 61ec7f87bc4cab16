//! fire_eye_dashboard - interactive detection console
//!
//! This daemon:
//! 1. Loads the detector
//! 2. Serves the dashboard page and the detection endpoint
//! 3. Speaks a summary per image when the page's voice toggle is on

use anyhow::{anyhow, Result};
use std::sync::mpsc;

use fire_eye::dashboard::{DashboardConfig, DashboardServer};
use fire_eye::detect::build_registry;
use fire_eye::render::Annotator;
use fire_eye::speech::CommandSpeaker;
use fire_eye::{FireEyeConfig, Inspector};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = FireEyeConfig::load()?;
    let registry = build_registry(&cfg)?;
    let detector = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;
    {
        let mut guard = detector
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))?;
        log::info!(
            "detector backend '{}' ({} classes)",
            guard.name(),
            guard.class_names().len()
        );
        guard.warm_up()?;
    }

    let inspector = Inspector::new(
        detector,
        Annotator::new(&cfg.render)?,
        Box::new(CommandSpeaker::new(&cfg.voice)),
    );
    let handle = DashboardServer::new(DashboardConfig::from(&cfg), inspector).spawn()?;
    log::info!("dashboard listening on http://{}", handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("fire_eye_dashboard waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping dashboard...");
    handle.stop()?;

    Ok(())
}
