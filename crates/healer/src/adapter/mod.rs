//! Stack controller adapter.
//!
//! The monitor never talks to the container tooling directly; it goes through
//! the [`StackController`] capability so probing and remediation can be tested
//! against fakes and the tooling can be swapped.

pub mod command;
pub mod compose;

pub use compose::ComposeController;

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::types::{ContainerObservation, StackKey};

/// Capability over an external container-orchestration tool.
#[async_trait]
pub trait StackController: Send + Sync {
    /// Keys of every stack currently deployed, sorted.
    async fn enumerate_deployed_stacks(&self) -> Result<Vec<StackKey>, AdapterError>;

    /// Whether the stack has a deployment definition.
    async fn is_deployed(&self, key: &StackKey) -> bool;

    /// Current containers of the stack, parsed into typed observations.
    async fn list_containers(
        &self,
        key: &StackKey,
    ) -> Result<Vec<ContainerObservation>, AdapterError>;

    /// Bring the stack back up.
    async fn restart(&self, key: &StackKey) -> Result<(), AdapterError>;

    /// Human-facing name of the stack.
    async fn display_name(&self, key: &StackKey) -> String {
        key.to_string()
    }
}
