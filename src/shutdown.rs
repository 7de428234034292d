//! Orderly teardown: stop the service, then the primary process, then the
//! auxiliary one. Every step runs even when an earlier one fails.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::service::ServiceController;
use crate::supervisor::{ProcessSupervisor, Role, TerminateOutcome};
use crate::updater::PreUpdateHook;

#[async_trait]
pub trait ServiceStop: Send + Sync {
    async fn stop_service(&self, name: &str) -> Result<(), String>;
}

#[async_trait]
pub trait ProcessTerminate: Send + Sync {
    async fn terminate_role(&self, role: Role) -> TerminateOutcome;
}

#[async_trait]
impl ServiceStop for ServiceController {
    async fn stop_service(&self, name: &str) -> Result<(), String> {
        self.stop(name).await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ProcessTerminate for ProcessSupervisor {
    async fn terminate_role(&self, role: Role) -> TerminateOutcome {
        self.terminate(role).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownStep {
    StopService,
    TerminatePrimary,
    TerminateAuxiliary,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: ShutdownStep,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    pub steps: Vec<StepOutcome>,
}

impl ShutdownReport {
    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }
}

pub struct ShutdownCoordinator {
    service_name: String,
    services: Arc<dyn ServiceStop>,
    processes: Arc<dyn ProcessTerminate>,
}

impl ShutdownCoordinator {
    pub fn new(
        service_name: impl Into<String>,
        services: Arc<dyn ServiceStop>,
        processes: Arc<dyn ProcessTerminate>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            services,
            processes,
        }
    }

    pub async fn execute(&self) -> ShutdownReport {
        let mut steps = Vec::with_capacity(3);

        steps.push(match self.services.stop_service(&self.service_name).await {
            Ok(()) => StepOutcome {
                step: ShutdownStep::StopService,
                ok: true,
                detail: format!("service '{}' stopped", self.service_name),
            },
            Err(e) => {
                tracing::warn!("Shutdown: service stop failed: {}", e);
                StepOutcome {
                    step: ShutdownStep::StopService,
                    ok: false,
                    detail: e,
                }
            }
        });

        for (step, role) in [
            (ShutdownStep::TerminatePrimary, Role::Primary),
            (ShutdownStep::TerminateAuxiliary, Role::Auxiliary),
        ] {
            let outcome = self.processes.terminate_role(role).await;
            let detail = match &outcome {
                TerminateOutcome::NotRunning => format!("{} not running", role),
                TerminateOutcome::Graceful => format!("{} stopped", role),
                TerminateOutcome::Killed => format!("{} killed", role),
                TerminateOutcome::Failed(msg) => {
                    tracing::warn!("Shutdown: terminating {} failed: {}", role, msg);
                    msg.clone()
                }
            };
            steps.push(StepOutcome {
                step,
                ok: outcome.is_ok(),
                detail,
            });
        }

        let report = ShutdownReport { steps };
        if report.all_succeeded() {
            tracing::info!("Shutdown complete");
        } else {
            tracing::warn!("Shutdown finished with failures");
        }
        report
    }
}

#[async_trait]
impl PreUpdateHook for ShutdownCoordinator {
    async fn before_update(&self) -> anyhow::Result<()> {
        let report = self.execute().await;
        if report.all_succeeded() {
            Ok(())
        } else {
            let failed: Vec<String> = report
                .steps
                .iter()
                .filter(|s| !s.ok)
                .map(|s| s.detail.clone())
                .collect();
            anyhow::bail!("shutdown before update incomplete: {}", failed.join("; "))
        }
    }
}
