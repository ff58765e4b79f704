//! Periodic driver: probe, remediate, record, alert.
//!
//! One cycle runs at a time. Ticks that fire while a cycle is still running
//! are skipped rather than queued, and on-demand checks share the same lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::StackController;
use crate::alert::AlertDispatcher;
use crate::config::MonitorConfig;
use crate::error::AdapterError;
use crate::history::HistoryStore;
use crate::probe::HealthProber;
use crate::remediation::RemediationPolicy;
use crate::resources::ResourceSampler;
use crate::types::{
    HealthReport, HistoryEntry, ProbeFailure, RemediationOutcome, RemediationStatus, StackKey,
};

/// Latest known state of one stack.
#[derive(Debug, Clone, Serialize)]
pub struct StackSnapshot {
    #[serde(flatten)]
    pub report: HealthReport,
    pub status: RemediationStatus,
}

pub struct Scheduler {
    config: MonitorConfig,
    controller: Arc<dyn StackController>,
    prober: HealthProber,
    policy: RemediationPolicy,
    alerts: AlertDispatcher,
    history: Mutex<HistoryStore>,
    latest: RwLock<BTreeMap<StackKey, StackSnapshot>>,
    cycle_lock: Mutex<()>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        config: MonitorConfig,
        controller: Arc<dyn StackController>,
        sampler: Arc<dyn ResourceSampler>,
        history: HistoryStore,
        alerts: AlertDispatcher,
    ) -> Self {
        let prober = HealthProber::new(
            controller.clone(),
            sampler,
            config.thresholds,
            config.probe_timeout,
        );
        let policy = RemediationPolicy::new(controller.clone(), config.restart_timeout);
        Self {
            config,
            controller,
            prober,
            policy,
            alerts,
            history: Mutex::new(history),
            latest: RwLock::new(BTreeMap::new()),
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run cycles until `cancel` fires. The first cycle starts immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.probe_interval.as_secs(),
            auto_restart = self.config.auto_restart,
            alerts = self.alerts.is_enabled(),
            "Scheduler started"
        );

        let mut ticker = tokio::time::interval(self.config.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.run_cycle(&cancel).await;
        }

        info!("Scheduler stopped");
    }

    /// One scheduled cycle over every deployed stack.
    ///
    /// Returns `None` when the cycle was skipped or interrupted; nothing is
    /// recorded in that case.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Option<HistoryEntry> {
        let _cycle = self.cycle_lock.lock().await;

        let keys = match self.enumerate().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Stack enumeration failed, skipping cycle");
                return None;
            }
        };

        let entry = self.evaluate(keys, cancel).await?;
        self.record(&entry).await;
        self.alerts.notify(&entry.outcomes).await;
        Some(entry)
    }

    /// One-shot cycle over `stack`, or every deployed stack when `None`.
    ///
    /// The result is recorded in history but not alerted on.
    pub async fn check_once(&self, stack: Option<StackKey>) -> Result<HistoryEntry, AdapterError> {
        let _cycle = self.cycle_lock.lock().await;

        let keys = match stack {
            Some(key) => vec![key],
            None => self.enumerate().await?,
        };
        let entry = self
            .evaluate(keys, &CancellationToken::new())
            .await
            .unwrap_or_else(|| HistoryEntry {
                timestamp: Utc::now(),
                reports: Vec::new(),
                outcomes: Vec::new(),
            });
        self.record(&entry).await;
        Ok(entry)
    }

    /// Probe and remediate one stack on demand.
    ///
    /// Updates the latest-report map but not history. A stack that is not
    /// deployed is dropped from the map instead of being added to it.
    pub async fn check_stack(&self, key: &StackKey) -> RemediationOutcome {
        let _cycle = self.cycle_lock.lock().await;

        let (report, outcome) = self.evaluate_stack(key).await;
        let mut latest = self.latest.write().await;
        if report.failure == Some(ProbeFailure::NotDeployed) {
            latest.remove(key);
        } else {
            latest.insert(
                key.clone(),
                StackSnapshot {
                    report,
                    status: outcome.status,
                },
            );
        }
        outcome
    }

    /// Latest snapshot of every stack seen in the last cycle, sorted by key.
    pub async fn latest_reports(&self) -> Vec<StackSnapshot> {
        self.latest.read().await.values().cloned().collect()
    }

    pub async fn latest_report(&self, key: &StackKey) -> Option<StackSnapshot> {
        self.latest.read().await.get(key).cloned()
    }

    /// Up to `n` most recent history entries, newest last.
    pub async fn recent_history(&self, n: usize) -> Vec<HistoryEntry> {
        self.history.lock().await.recent(n)
    }

    async fn enumerate(&self) -> Result<Vec<StackKey>, AdapterError> {
        let timeout = self.config.probe_timeout;
        tokio::time::timeout(timeout, self.controller.enumerate_deployed_stacks())
            .await
            .map_err(|_| AdapterError::Timeout {
                command: "enumerate deployed stacks".to_string(),
                secs: timeout.as_secs(),
            })?
    }

    async fn evaluate_stack(&self, key: &StackKey) -> (HealthReport, RemediationOutcome) {
        let report = self.prober.probe(key).await;
        let outcome = self.policy.apply(&report, self.config.auto_restart).await;
        if outcome.status.is_healthy() {
            debug!(stack = %key, "Stack healthy");
        } else {
            warn!(stack = %key, status = %outcome.status, issues = ?outcome.issues, "Stack not healthy");
        }
        (report, outcome)
    }

    /// Probe `keys` with bounded parallelism. `None` if cancelled part-way.
    async fn evaluate(&self, keys: Vec<StackKey>, cancel: &CancellationToken) -> Option<HistoryEntry> {
        let timestamp = Utc::now();
        let total = keys.len();

        let results: Vec<Option<(HealthReport, RemediationOutcome)>> = stream::iter(keys)
            .map(move |key| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(self.evaluate_stack(&key).await)
            })
            .buffer_unordered(self.config.probe_concurrency.max(1))
            .collect()
            .await;

        let mut results: Vec<_> = results.into_iter().flatten().collect();
        if results.len() < total {
            info!(
                probed = results.len(),
                total, "Cycle interrupted by shutdown, discarding results"
            );
            return None;
        }

        results.sort_by(|a, b| a.0.stack_key.cmp(&b.0.stack_key));
        let (reports, outcomes): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        Some(HistoryEntry {
            timestamp,
            reports,
            outcomes,
        })
    }

    async fn record(&self, entry: &HistoryEntry) {
        {
            let mut latest = self.latest.write().await;
            latest.clear();
            for (report, outcome) in entry.reports.iter().zip(&entry.outcomes) {
                latest.insert(
                    report.stack_key.clone(),
                    StackSnapshot {
                        report: report.clone(),
                        status: outcome.status,
                    },
                );
            }
        }

        let mut history = self.history.lock().await;
        history.append(entry.clone());
        if let Err(e) = history.flush().await {
            warn!(error = %e, "Failed to persist history");
        }

        let problems = entry
            .outcomes
            .iter()
            .filter(|o| !o.status.is_healthy())
            .count();
        info!(
            stacks = entry.outcomes.len(),
            problems,
            history = history.len(),
            "Cycle recorded"
        );
    }
}
