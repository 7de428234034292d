//! Local HTTP control API for front-ends.
//!
//! ## Endpoints
//! - `GET    /api/profiles`                loaded launch profiles
//! - `POST   /api/profiles/reload`         load a profile INI (keeps old set on failure)
//! - `POST   /api/profile/:name/start`     start a profile in a role
//! - `POST   /api/process/:role/stop`      terminate one role
//! - `POST   /api/process/:role/acknowledge` clear an exited role slot
//! - `POST   /api/stop`                    full shutdown sequence
//! - `GET    /api/status`                  role slots and service state
//! - `GET    /api/console`                 polled event log
//! - `GET    /api/service`, `DELETE /api/service`
//! - `POST   /api/service/install`, `POST /api/service/stop`
//! - `GET|PUT|DELETE /api/autostart`
//! - `POST   /api/command/convert`         script line to INI section
//! - `POST   /api/updates/:name`           fetch and place a configured update

pub mod error;
pub mod handlers;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};

use crate::autostart::Autostart;
use crate::config::AppContext;
use crate::service::ServiceController;
use crate::shutdown::ShutdownCoordinator;
use crate::supervisor::{ConsoleBuffer, ProcessSupervisor};

pub use error::ApiError;

/// IPC Server State
#[derive(Clone)]
pub struct IPCServer {
    pub ctx: Arc<AppContext>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub services: Arc<ServiceController>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub console: Arc<ConsoleBuffer>,
    pub autostart: Autostart,
    pub http: reqwest::Client,
    pub listen_addr: String,
}

impl IPCServer {
    pub fn new(
        ctx: Arc<AppContext>,
        supervisor: Arc<ProcessSupervisor>,
        services: Arc<ServiceController>,
        shutdown: Arc<ShutdownCoordinator>,
        console: Arc<ConsoleBuffer>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("dpi-core/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            autostart: Autostart::new(ctx.settings.autostart_value.clone()),
            listen_addr: ctx.settings.listen_addr.clone(),
            ctx,
            supervisor,
            services,
            shutdown,
            console,
            http,
        }
    }

    pub fn router(&self) -> Router {
        use handlers::{profile, service, updates};

        Router::new()
            .route("/api/profiles", get(profile::list_profiles))
            .route("/api/profiles/reload", post(profile::reload_profiles))
            .route("/api/profile/:name/start", post(profile::start_profile))
            .route("/api/process/:role/stop", post(profile::stop_role))
            .route("/api/process/:role/acknowledge", post(profile::acknowledge_role))
            .route("/api/stop", post(profile::stop_all))
            .route("/api/status", get(profile::status))
            .route("/api/console", get(profile::console))
            .route("/api/command/convert", post(profile::convert_command))
            .route("/api/service", get(service::service_status).delete(service::delete_service))
            .route("/api/service/install", post(service::install_service))
            .route("/api/service/stop", post(service::stop_service))
            .route(
                "/api/autostart",
                get(service::autostart_status)
                    .put(service::enable_autostart)
                    .delete(service::disable_autostart),
            )
            .route("/api/updates/:name", post(updates::apply_update))
            .with_state(self.clone())
    }

    pub async fn start(self) -> Result<()> {
        tracing::info!("IPC HTTP server starting on {}", self.listen_addr);
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("IPC listening on http://{}", self.listen_addr);

        axum::serve(listener, router).await?;
        Ok(())
    }
}
