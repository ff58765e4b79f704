//! Notification event types for AgentForge stack monitoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity levels for alerts and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Warning - something needed attention but was handled
    Warning,
    /// Critical - immediate action required
    Critical,
}

impl Severity {
    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    /// One or more stacks were found in a non-healthy state during a cycle.
    ///
    /// `lines` holds one pre-formatted line per problem stack; the whole
    /// batch is delivered as a single message.
    StackHealth {
        severity: Severity,
        lines: Vec<String>,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Get the title for this event.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::StackHealth { .. } => "AgentForge Monitor Alert".to_string(),
        }
    }

    /// Get the severity of this event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::StackHealth { severity, .. } => *severity,
        }
    }

    /// Get the timestamp of this event.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::StackHealth { timestamp, .. } => *timestamp,
        }
    }

    /// Render the event body as plain markdown text.
    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Self::StackHealth { lines, .. } => lines.join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_health_serializes_with_type_tag() {
        let event = NotifyEvent::StackHealth {
            severity: Severity::Critical,
            lines: vec!["alpha: c2 is exited (needs attention)".to_string()],
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stack_health");
        assert_eq!(json["severity"], "critical");
    }

    #[test]
    fn test_body_joins_lines() {
        let event = NotifyEvent::StackHealth {
            severity: Severity::Warning,
            lines: vec!["a".to_string(), "b".to_string()],
            timestamp: Utc::now(),
        };
        assert_eq!(event.body(), "a\nb");
        assert_eq!(event.severity(), Severity::Warning);
    }
}
