//! Self-healing monitor for AgentForge agent stacks.
//!
//! Each cycle the [`Scheduler`] enumerates deployed stacks, probes them with
//! the [`HealthProber`], lets the [`RemediationPolicy`] restart unhealthy
//! ones, records the cycle in the [`HistoryStore`] and sends one batched
//! alert through the [`AlertDispatcher`].
//!
//! All container tooling sits behind [`StackController`]; the production
//! implementation is [`ComposeController`].

pub mod adapter;
pub mod alert;
pub mod config;
pub mod error;
pub mod history;
pub mod probe;
pub mod remediation;
pub mod resources;
pub mod scheduler;
pub mod server;
pub mod types;

pub use adapter::{ComposeController, StackController};
pub use alert::AlertDispatcher;
pub use config::MonitorConfig;
pub use history::HistoryStore;
pub use probe::HealthProber;
pub use remediation::RemediationPolicy;
pub use scheduler::Scheduler;
pub use types::{
    ContainerObservation, HealthReport, HealthState, HistoryEntry, RemediationOutcome,
    RemediationStatus, RunState, StackKey,
};
