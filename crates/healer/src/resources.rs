//! Host resource pressure checks folded into every health report.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::adapter::command::run_checked;
use crate::config::ResourceThresholds;

/// Point-in-time host usage, in percent. `None` when it could not be sampled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    pub disk_percent: Option<u8>,
    pub memory_percent: Option<u8>,
}

/// Source of host resource usage.
#[async_trait]
pub trait ResourceSampler: Send + Sync {
    async fn sample(&self) -> ResourceUsage;
}

/// Samples the local host: disk usage of `/` and memory from `/proc/meminfo`.
#[derive(Debug, Clone)]
pub struct HostResourceSampler {
    timeout: Duration,
}

impl HostResourceSampler {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn disk_percent(&self) -> Option<u8> {
        let output = run_checked("df", &["--output=pcent", "/"], Path::new("/"), self.timeout)
            .await
            .map_err(|e| debug!(error = %e, "Disk usage sample failed"))
            .ok()?;
        parse_df_percent(&String::from_utf8_lossy(&output.stdout))
    }

    async fn memory_percent() -> Option<u8> {
        let meminfo = tokio::fs::read_to_string("/proc/meminfo")
            .await
            .map_err(|e| debug!(error = %e, "Memory usage sample failed"))
            .ok()?;
        parse_meminfo_percent(&meminfo)
    }
}

#[async_trait]
impl ResourceSampler for HostResourceSampler {
    async fn sample(&self) -> ResourceUsage {
        let (disk_percent, memory_percent) =
            tokio::join!(self.disk_percent(), Self::memory_percent());
        ResourceUsage {
            disk_percent,
            memory_percent,
        }
    }
}

/// Sampler that never reports pressure.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResourceSampler;

#[async_trait]
impl ResourceSampler for NoResourceSampler {
    async fn sample(&self) -> ResourceUsage {
        ResourceUsage::default()
    }
}

/// Findings from comparing usage against thresholds.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResourceFindings {
    /// Hard-threshold breaches; these make a stack unhealthy.
    pub issues: Vec<String>,
    /// Soft-threshold breaches; advisory only.
    pub warnings: Vec<String>,
}

/// Compare sampled usage against thresholds.
#[must_use]
pub fn evaluate(usage: ResourceUsage, thresholds: &ResourceThresholds) -> ResourceFindings {
    let mut findings = ResourceFindings::default();

    if let Some(disk) = usage.disk_percent {
        if disk > thresholds.disk_critical_percent {
            findings
                .issues
                .push(format!("disk usage critical: {disk}%"));
        } else if disk > thresholds.disk_warn_percent {
            findings
                .warnings
                .push(format!("disk usage warning: {disk}%"));
        }
    }
    if let Some(memory) = usage.memory_percent {
        if memory > thresholds.memory_critical_percent {
            findings
                .issues
                .push(format!("memory usage critical: {memory}%"));
        }
    }

    findings
}

/// Parse the output of `df --output=pcent <path>`.
fn parse_df_percent(stdout: &str) -> Option<u8> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())?
        .trim_end_matches('%')
        .trim()
        .parse()
        .ok()
}

/// Used memory percentage from `/proc/meminfo` (`MemTotal - MemAvailable`).
fn parse_meminfo_percent(meminfo: &str) -> Option<u8> {
    let field = |name: &str| -> Option<u64> {
        meminfo
            .lines()
            .find(|l| l.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(available);
    Some(((used * 100 + total / 2) / total).min(100) as u8)
}
