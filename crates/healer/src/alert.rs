//! Batched alerting for problem stacks.

use std::sync::Arc;

use chrono::Utc;
use forge_notify::{Notifier, NotifyChannel, NotifyEvent, Severity, WebhookChannel};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::types::{RemediationOutcome, RemediationStatus};

/// Sends one message per cycle covering every non-healthy stack.
///
/// Delivery fails soft: errors are logged and dropped, and the next cycle
/// reports again if the condition persists.
pub struct AlertDispatcher {
    notifier: Notifier,
}

impl AlertDispatcher {
    #[must_use]
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }

    /// Dispatcher posting to the configured webhook, or a silent one when none is set.
    #[must_use]
    pub fn from_config(config: &MonitorConfig) -> Self {
        let Some(url) = config.webhook_url.as_deref() else {
            debug!("No alert webhook configured");
            return Self::new(Notifier::disabled());
        };
        match WebhookChannel::new(url, config.webhook_timeout) {
            Ok(channel) => {
                let channels: Vec<Arc<dyn NotifyChannel>> = vec![Arc::new(channel)];
                Self::new(Notifier::with_channels(channels))
            }
            Err(e) => {
                warn!(error = %e, "Alert webhook unusable, alerts disabled");
                Self::new(Notifier::disabled())
            }
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.notifier.has_channels()
    }

    /// Alert on the non-healthy outcomes of one cycle.
    pub async fn notify(&self, outcomes: &[RemediationOutcome]) {
        let Some(event) = compose_event(outcomes) else {
            debug!("All stacks healthy, no alert");
            return;
        };
        if !self.is_enabled() {
            debug!("Alerting disabled, dropping alert");
            return;
        }

        for (channel, result) in self.notifier.notify_and_wait(event).await {
            match result {
                Ok(()) => info!(channel = %channel, "Alert delivered"),
                Err(e) => warn!(channel = %channel, error = %e, "Alert delivery failed"),
            }
        }
    }
}

/// Build the batched alert, or `None` when every stack is healthy.
#[must_use]
pub fn compose_event(outcomes: &[RemediationOutcome]) -> Option<NotifyEvent> {
    let problems: Vec<&RemediationOutcome> = outcomes
        .iter()
        .filter(|o| !o.status.is_healthy())
        .collect();
    if problems.is_empty() {
        return None;
    }

    let severity = if problems
        .iter()
        .all(|o| o.status == RemediationStatus::Healed)
    {
        Severity::Warning
    } else {
        Severity::Critical
    };

    Some(NotifyEvent::StackHealth {
        severity,
        lines: problems.iter().map(|o| alert_line(o)).collect(),
        timestamp: Utc::now(),
    })
}

/// `"<key>: <issues> <action>"`, e.g. `alpha: c2 is exited (auto-restarted)`.
#[must_use]
pub fn alert_line(outcome: &RemediationOutcome) -> String {
    let action = match outcome.status {
        RemediationStatus::Healed => "(auto-restarted)",
        RemediationStatus::RemediationFailed => "(auto-restart failed)",
        RemediationStatus::ProbeError => "(probe failed)",
        _ => "(needs attention)",
    };
    if outcome.issues.is_empty() {
        format!("{}: {} {action}", outcome.stack_key, outcome.status)
    } else {
        format!("{}: {} {action}", outcome.stack_key, outcome.issues.join(", "))
    }
}
