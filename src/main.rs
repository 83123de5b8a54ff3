use anyhow::Result;
use lampyris::Config;
use lampyris::supervisor::{MeterSupervisor, RunOutcome};
use std::os::unix::process::CommandExt;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    lampyris::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let mut supervisor = MeterSupervisor::from_config(config)
        .map_err(|e| anyhow::anyhow!("Failed to create supervisor: {}", e))?;

    info!(
        "Lampyris energy beacon logger {} starting up",
        env!("APP_VERSION")
    );

    // Request a clean stop on Ctrl-C
    let shutdown = supervisor.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(());
        }
    });

    match supervisor.run().await {
        Ok(RunOutcome::Shutdown) => {
            info!("Lampyris shutdown complete");
            Ok(())
        }
        Ok(RunOutcome::Restart) => {
            info!("Watchdog requested restart, re-executing process");
            lampyris::logging::shutdown();
            let err = reexec();
            Err(anyhow::anyhow!("Failed to re-execute process: {}", err))
        }
        Err(e) => {
            error!("Supervisor failed with error: {}", e);
            Err(anyhow::anyhow!("Supervisor error: {}", e))
        }
    }
}

/// Replace the current process with a fresh copy of itself, preserving
/// the original arguments. Only returns when exec fails.
fn reexec() -> std::io::Error {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => return e,
    };
    std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .exec()
}
