//! Remediation policy: decides whether a report warrants a restart.
//!
//! | report                         | auto-restart | action  | status                       |
//! |--------------------------------|--------------|---------|------------------------------|
//! | healthy                        | any          | none    | `healthy`                    |
//! | not deployed / no containers   | any          | none    | `no_containers`              |
//! | probe error                    | any          | none    | `probe_error`                |
//! | unhealthy                      | off          | none    | `unhealthy`                  |
//! | unhealthy                      | on           | restart | `healed` / `remediation_failed` |
//!
//! At most one restart is attempted per stack per call. A stack that is still
//! unhealthy is simply retried on the next cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::adapter::StackController;
use crate::types::{HealthReport, ProbeFailure, RemediationOutcome, RemediationStatus};

#[derive(Clone)]
pub struct RemediationPolicy {
    controller: Arc<dyn StackController>,
    restart_timeout: Duration,
}

impl RemediationPolicy {
    #[must_use]
    pub fn new(controller: Arc<dyn StackController>, restart_timeout: Duration) -> Self {
        Self {
            controller,
            restart_timeout,
        }
    }

    /// Apply the policy to `report`, restarting the stack when warranted.
    pub async fn apply(&self, report: &HealthReport, auto_restart: bool) -> RemediationOutcome {
        let status = match classify(report) {
            Some(status) => status,
            None if !auto_restart => RemediationStatus::Unhealthy,
            None => return self.restart(report).await,
        };
        outcome(report, status, None)
    }

    async fn restart(&self, report: &HealthReport) -> RemediationOutcome {
        let key = &report.stack_key;
        info!(stack = %key, issues = ?report.issues, "Restarting unhealthy stack");

        let result = tokio::time::timeout(self.restart_timeout, self.controller.restart(key)).await;
        match result {
            Ok(Ok(())) => {
                info!(stack = %key, "Restart succeeded");
                outcome(report, RemediationStatus::Healed, None)
            }
            Ok(Err(e)) => {
                warn!(stack = %key, error = %e, "Restart failed");
                outcome(report, RemediationStatus::RemediationFailed, Some(e.to_string()))
            }
            Err(_) => {
                let cause = format!("restart timed out after {}s", self.restart_timeout.as_secs());
                warn!(stack = %key, "{cause}");
                outcome(report, RemediationStatus::RemediationFailed, Some(cause))
            }
        }
    }
}

/// Status for reports that never warrant a restart; `None` means unhealthy.
fn classify(report: &HealthReport) -> Option<RemediationStatus> {
    match report.failure {
        Some(ProbeFailure::NotDeployed) => return Some(RemediationStatus::NoContainers),
        Some(ProbeFailure::ProbeError) => return Some(RemediationStatus::ProbeError),
        None => {}
    }
    if report.containers.is_empty() {
        Some(RemediationStatus::NoContainers)
    } else if report.healthy {
        Some(RemediationStatus::Healthy)
    } else {
        None
    }
}

fn outcome(
    report: &HealthReport,
    status: RemediationStatus,
    restart_error: Option<String>,
) -> RemediationOutcome {
    RemediationOutcome {
        stack_key: report.stack_key.clone(),
        timestamp: Utc::now(),
        status,
        issues: report.issues.clone(),
        restart_error,
    }
}
