//! Health prober: reduces raw container state into a [`HealthReport`].
//!
//! Probing never fails from the caller's point of view. Adapter errors and
//! timeouts become a `probe_error` report, a missing deployment becomes a
//! `not deployed` report.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::adapter::StackController;
use crate::config::ResourceThresholds;
use crate::resources::{self, ResourceSampler};
use crate::types::{ContainerObservation, HealthReport, HealthState, RunState, StackKey};

/// Fallback restart-loop detection on the human-readable status column.
static RESTART_LOOP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\brestarting\b").unwrap());

/// Issue recorded when a deployed stack reports zero containers.
pub const NO_CONTAINERS_ISSUE: &str = "no containers found";

/// Probes stacks through a [`StackController`].
#[derive(Clone)]
pub struct HealthProber {
    controller: Arc<dyn StackController>,
    sampler: Arc<dyn ResourceSampler>,
    thresholds: ResourceThresholds,
    timeout: Duration,
}

impl HealthProber {
    #[must_use]
    pub fn new(
        controller: Arc<dyn StackController>,
        sampler: Arc<dyn ResourceSampler>,
        thresholds: ResourceThresholds,
        timeout: Duration,
    ) -> Self {
        Self {
            controller,
            sampler,
            thresholds,
            timeout,
        }
    }

    /// Probe one stack.
    pub async fn probe(&self, key: &StackKey) -> HealthReport {
        let display_name = self.controller.display_name(key).await;

        match tokio::time::timeout(self.timeout, self.controller.is_deployed(key)).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(stack = %key, "Stack is not deployed");
                return HealthReport::not_deployed(key.clone(), display_name);
            }
            Err(_) => {
                return self.timed_out(key, display_name);
            }
        }

        let containers =
            match tokio::time::timeout(self.timeout, self.controller.list_containers(key)).await {
                Ok(Ok(containers)) => containers,
                Ok(Err(e)) => {
                    warn!(stack = %key, error = %e, "Container listing failed");
                    return HealthReport::probe_error(key.clone(), display_name, &e.to_string());
                }
                Err(_) => {
                    return self.timed_out(key, display_name);
                }
            };

        if containers.is_empty() {
            return HealthReport::observed(
                key.clone(),
                display_name,
                containers,
                vec![NO_CONTAINERS_ISSUE.to_string()],
                Vec::new(),
            );
        }

        let mut issues = container_issues(&containers);
        let findings = resources::evaluate(self.sampler.sample().await, &self.thresholds);
        issues.extend(findings.issues);

        HealthReport::observed(key.clone(), display_name, containers, issues, findings.warnings)
    }

    fn timed_out(&self, key: &StackKey, display_name: String) -> HealthReport {
        let cause = format!("timed out after {}s", self.timeout.as_secs());
        warn!(stack = %key, "Probe {cause}");
        HealthReport::probe_error(key.clone(), display_name, &cause)
    }
}

/// Issues raised by the containers themselves, in container order.
#[must_use]
pub fn container_issues(containers: &[ContainerObservation]) -> Vec<String> {
    let mut issues = Vec::new();
    for c in containers {
        if c.run_state != RunState::Running {
            issues.push(format!("{} is {}", c.name, c.run_state));
        }
        if is_restart_loop(c) {
            issues.push(format!("{} restart loop", c.name));
        }
        if c.health_state == HealthState::Unhealthy {
            issues.push(format!("{} health check failing", c.name));
        }
    }
    issues
}

/// Structured state first; the status text is only consulted when the
/// adapter could not classify the container.
fn is_restart_loop(c: &ContainerObservation) -> bool {
    match c.run_state {
        RunState::Restarting => true,
        RunState::Unknown => RESTART_LOOP_PATTERN.is_match(&c.status_text),
        _ => false,
    }
}
