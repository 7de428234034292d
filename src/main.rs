use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use dpi_core::autostart;
use dpi_core::config::settings::DEFAULT_SETTINGS_PATH;
use dpi_core::config::{AppContext, Settings};
use dpi_core::ipc::IPCServer;
use dpi_core::service::{ScBackend, ServiceController};
use dpi_core::shutdown::ShutdownCoordinator;
use dpi_core::supervisor::{ConsoleBuffer, OutputFilter, ProcessSupervisor};

const SETTINGS_ENV: &str = "DPI_CORE_SETTINGS";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    tracing::info!("dpi-core {} starting", env!("CARGO_PKG_VERSION"));
    if autostart::launched_from_startup_flag() {
        tracing::info!("Launched at logon");
    }

    let settings_path = std::env::var_os(SETTINGS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    let settings = Settings::load(&settings_path)?;
    let ctx = Arc::new(AppContext::new(settings));
    tracing::info!("Base folder: {}", ctx.base_folder().display());

    let profile_path = ctx.default_config_path();
    match ctx.reload_profiles(&profile_path) {
        Ok(profiles) => tracing::info!("Loaded {} profile(s) from {}", profiles.len(), profile_path.display()),
        Err(e) => tracing::warn!("Starting without profiles: {}", e),
    }

    let console = Arc::new(ConsoleBuffer::new());
    let supervisor = Arc::new(
        ProcessSupervisor::new(OutputFilter::from_settings(&ctx.settings.output), console.clone())
            .with_orphan_sweep(ctx.settings.orphan_process.clone()),
    );
    let services = Arc::new(ServiceController::new(
        Arc::new(ScBackend),
        ctx.placeholders().service_required_files(),
    ));
    let shutdown = Arc::new(ShutdownCoordinator::new(
        ctx.settings.service_name.clone(),
        services.clone(),
        supervisor.clone(),
    ));

    // Graceful shutdown: Ctrl+C runs the full teardown before exiting
    let shutdown_on_signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received, cleaning up...");
        let report = shutdown_on_signal.execute().await;
        for step in report.steps.iter().filter(|s| !s.ok) {
            tracing::warn!("[Shutdown] {:?}: {}", step.step, step.detail);
        }
        tracing::info!("Cleanup complete, exiting");
        std::process::exit(0);
    });

    let ipc_server = IPCServer::new(ctx, supervisor, services, shutdown, console);
    if let Err(e) = ipc_server.start().await {
        tracing::error!("IPC server error: {}", e);
    }

    tracing::info!("dpi-core shutting down");
    Ok(())
}
