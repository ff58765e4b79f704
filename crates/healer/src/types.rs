//! Core data model for stack health evaluation.
//!
//! Everything here is plain data: observations are produced fresh by the
//! adapter on every probe, reports and outcomes are derived from them, and
//! only [`HistoryEntry`] values outlive a cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::InvalidStackKey;

/// Opaque identifier of a deployed stack (the directory name under the data root).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackKey(String);

impl StackKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Accept `key` only if it names a single path component.
    ///
    /// Keys coming from outside the process (API paths, CLI arguments) go
    /// through here before they reach the controller.
    pub fn parse(key: &str) -> Result<Self, InvalidStackKey> {
        let reason = if key.is_empty() {
            Some("empty")
        } else if key == "." || key == ".." {
            Some("relative path component")
        } else if key.contains(['/', '\\']) {
            Some("contains a path separator")
        } else if key.contains('\0') {
            Some("contains NUL")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(InvalidStackKey {
                key: key.to_string(),
                reason,
            }),
            None => Ok(Self(key.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StackKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for StackKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Lifecycle state of a single container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Exited,
    Restarting,
    Created,
    Paused,
    Dead,
    #[serde(other)]
    Unknown,
}

impl RunState {
    /// Parse the `State` column reported by the container tool.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "exited" => Self::Exited,
            "restarting" => Self::Restarting,
            "created" => Self::Created,
            "paused" => Self::Paused,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Restarting => "restarting",
            Self::Created => "created",
            Self::Paused => "paused",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Result of the container's own health check, if it defines one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    None,
    Starting,
    Healthy,
    Unhealthy,
}

impl HealthState {
    /// Parse the `Health` column reported by the container tool.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "healthy" => Self::Healthy,
            "unhealthy" => Self::Unhealthy,
            "starting" => Self::Starting,
            _ => Self::None,
        }
    }
}

/// One container of a stack at one probe instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerObservation {
    pub name: String,
    pub run_state: RunState,
    #[serde(default)]
    pub health_state: HealthState,
    /// Human-readable status column, e.g. `Up 3 minutes (healthy)`.
    #[serde(default)]
    pub status_text: String,
    /// Restart counter, when the adapter can observe it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ContainerObservation {
    /// Convenience constructor for an observation without structured extras.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        run_state: RunState,
        health_state: HealthState,
        status_text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            run_state,
            health_state,
            status_text: status_text.into(),
            restart_count: None,
            exit_code: None,
        }
    }
}

/// Why a report carries no observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailure {
    /// The stack has no deployment definition.
    NotDeployed,
    /// The adapter call failed or timed out.
    ProbeError,
}

/// Dashboard roll-up of container run states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunSummary {
    Running,
    Partial,
    Stopped,
}

impl RunSummary {
    fn of(containers: &[ContainerObservation]) -> Self {
        let running = containers
            .iter()
            .filter(|c| c.run_state == RunState::Running)
            .count();
        if running > 0 && running == containers.len() {
            Self::Running
        } else if running > 0 {
            Self::Partial
        } else {
            Self::Stopped
        }
    }
}

/// Health of one stack at one probe instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub stack_key: StackKey,
    pub display_name: String,
    pub timestamp: DateTime<Utc>,
    pub containers: Vec<ContainerObservation>,
    pub issues: Vec<String>,
    /// Advisory findings (soft resource thresholds) that do not affect health.
    #[serde(default)]
    pub warnings: Vec<String>,
    pub healthy: bool,
    pub summary: RunSummary,
    #[serde(default)]
    pub failure: Option<ProbeFailure>,
}

impl HealthReport {
    /// Build a report from observed containers and the issues raised about them.
    ///
    /// `healthy` is derived here and nowhere else.
    #[must_use]
    pub fn observed(
        stack_key: StackKey,
        display_name: String,
        containers: Vec<ContainerObservation>,
        issues: Vec<String>,
        warnings: Vec<String>,
    ) -> Self {
        let healthy = !containers.is_empty()
            && containers.iter().all(|c| c.run_state == RunState::Running)
            && !containers
                .iter()
                .any(|c| c.health_state == HealthState::Unhealthy)
            && issues.is_empty();
        let summary = RunSummary::of(&containers);
        Self {
            stack_key,
            display_name,
            timestamp: Utc::now(),
            containers,
            issues,
            warnings,
            healthy,
            summary,
            failure: None,
        }
    }

    /// Report for a stack with no deployment definition.
    #[must_use]
    pub fn not_deployed(stack_key: StackKey, display_name: String) -> Self {
        Self::failed(
            stack_key,
            display_name,
            ProbeFailure::NotDeployed,
            "not deployed".to_string(),
        )
    }

    /// Report for a probe whose adapter call failed.
    #[must_use]
    pub fn probe_error(stack_key: StackKey, display_name: String, cause: &str) -> Self {
        Self::failed(
            stack_key,
            display_name,
            ProbeFailure::ProbeError,
            format!("probe_error: {cause}"),
        )
    }

    fn failed(
        stack_key: StackKey,
        display_name: String,
        failure: ProbeFailure,
        issue: String,
    ) -> Self {
        Self {
            stack_key,
            display_name,
            timestamp: Utc::now(),
            containers: Vec::new(),
            issues: vec![issue],
            warnings: Vec::new(),
            healthy: false,
            summary: RunSummary::Stopped,
            failure: Some(failure),
        }
    }
}

/// Status assigned to a stack after the remediation policy ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStatus {
    Healthy,
    Unhealthy,
    Healed,
    RemediationFailed,
    NoContainers,
    ProbeError,
}

impl RemediationStatus {
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Healed => "healed",
            Self::RemediationFailed => "remediation_failed",
            Self::NoContainers => "no_containers",
            Self::ProbeError => "probe_error",
        }
    }
}

impl fmt::Display for RemediationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying the remediation policy to one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationOutcome {
    pub stack_key: StackKey,
    pub timestamp: DateTime<Utc>,
    pub status: RemediationStatus,
    pub issues: Vec<String>,
    /// Cause of a failed restart attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_error: Option<String>,
}

/// One scheduler cycle across all stacks, ordered by stack key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub reports: Vec<HealthReport>,
    #[serde(default)]
    pub outcomes: Vec<RemediationOutcome>,
}

impl HistoryEntry {
    /// Status recorded for `key` in this cycle, if it was probed.
    #[must_use]
    pub fn status_of(&self, key: &StackKey) -> Option<RemediationStatus> {
        self.outcomes
            .iter()
            .find(|o| &o.stack_key == key)
            .map(|o| o.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(name: &str) -> ContainerObservation {
        ContainerObservation::new(name, RunState::Running, HealthState::Healthy, "Up 5 minutes")
    }

    #[test]
    fn test_stack_key_parse_rejects_paths() {
        assert_eq!(StackKey::parse("alpha").unwrap().as_str(), "alpha");
        assert_eq!(StackKey::parse(".hidden").unwrap().as_str(), ".hidden");
        for bad in ["", ".", "..", "../outside", "a/b", "a\\b", "nul\0"] {
            let err = StackKey::parse(bad).unwrap_err();
            assert_eq!(err.key, bad);
        }
    }

    #[test]
    fn test_empty_container_set_is_never_healthy() {
        let report =
            HealthReport::observed("alpha".into(), "alpha".into(), vec![], vec![], vec![]);
        assert!(!report.healthy);
        assert_eq!(report.summary, RunSummary::Stopped);
    }

    #[test]
    fn test_healthy_requires_no_issues() {
        let report = HealthReport::observed(
            "alpha".into(),
            "alpha".into(),
            vec![running("c1")],
            vec!["memory usage critical: 95%".to_string()],
            vec![],
        );
        assert!(!report.healthy);
    }

    #[test]
    fn test_warnings_do_not_flip_health() {
        let report = HealthReport::observed(
            "alpha".into(),
            "alpha".into(),
            vec![running("c1")],
            vec![],
            vec!["disk usage warning: 85%".to_string()],
        );
        assert!(report.healthy);
        assert_eq!(report.summary, RunSummary::Running);
    }

    #[test]
    fn test_summary_partial() {
        let mut exited = running("c2");
        exited.run_state = RunState::Exited;
        let report = HealthReport::observed(
            "alpha".into(),
            "alpha".into(),
            vec![running("c1"), exited],
            vec!["c2 is exited".to_string()],
            vec![],
        );
        assert_eq!(report.summary, RunSummary::Partial);
    }

    #[test]
    fn test_run_state_parse() {
        assert_eq!(RunState::parse("running"), RunState::Running);
        assert_eq!(RunState::parse("Exited"), RunState::Exited);
        assert_eq!(RunState::parse("removing"), RunState::Unknown);
        assert_eq!(HealthState::parse(""), HealthState::None);
        assert_eq!(HealthState::parse("unhealthy"), HealthState::Unhealthy);
    }

    #[test]
    fn test_probe_error_report() {
        let report = HealthReport::probe_error("beta".into(), "Beta".into(), "timed out");
        assert_eq!(report.issues, vec!["probe_error: timed out".to_string()]);
        assert_eq!(report.failure, Some(ProbeFailure::ProbeError));
        assert!(!report.healthy);
    }
}
