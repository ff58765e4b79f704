//! Notification system for AgentForge stack health alerts.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use forge_notify::{Notifier, NotifyEvent, Severity, WebhookChannel};
//!
//! # async fn demo() -> Result<(), forge_notify::ChannelError> {
//! let webhook = WebhookChannel::new("https://example.invalid/hook", Duration::from_secs(10))?;
//! let channels: Vec<Arc<dyn forge_notify::NotifyChannel>> = vec![Arc::new(webhook)];
//! let notifier = Notifier::with_channels(channels);
//!
//! let results = notifier
//!     .notify_and_wait(NotifyEvent::StackHealth {
//!         severity: Severity::Critical,
//!         lines: vec!["alpha: c2 is exited (needs attention)".to_string()],
//!         timestamp: chrono::Utc::now(),
//!     })
//!     .await;
//! # let _ = results;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`NotifyChannel`] trait defines the interface for notification channels
//! - [`WebhookChannel`] posts to a single incoming-webhook URL
//! - [`Notifier`] dispatches events to all enabled channels

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod events;

pub use channels::webhook::WebhookChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{NotifyEvent, Severity};

use std::sync::Arc;
use tracing::debug;

/// Central notification dispatcher.
///
/// The `Notifier` owns the configured channels and delivers each event to
/// every enabled one, returning the per-channel result to the caller.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
}

impl Notifier {
    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a disabled notifier (no webhook configured).
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: vec![],
            disabled: true,
        }
    }

    /// Check if any notification channels are enabled.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && self.channels.iter().any(|c| c.enabled())
    }

    /// Send a notification and wait for all channels to complete.
    ///
    /// Each channel is attempted exactly once; errors are collected and
    /// returned, never retried here.
    pub async fn notify_and_wait(
        &self,
        event: NotifyEvent,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        if self.disabled || self.channels.is_empty() {
            debug!("No channels configured, skipping event");
            return vec![];
        }

        let mut results = vec![];

        for channel in &self.channels {
            if !channel.enabled() {
                debug!(channel = channel.name(), "Channel disabled, skipping");
                continue;
            }
            let channel_name = channel.name().to_string();
            let result = channel.send(&event).await;
            results.push((channel_name, result));
        }

        results
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::disabled()
    }
}
