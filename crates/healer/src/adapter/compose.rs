//! Docker Compose implementation of [`StackController`].
//!
//! Layout under the data root:
//!
//! ```text
//! <data_root>/
//!   backups/                 ignored
//!   <key>/docker-compose.yml one deployed stack
//!   <key>/agent.json         optional {"name": "..."} metadata
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::command::run_checked;
use super::StackController;
use crate::error::{AdapterError, InvalidStackKey};
use crate::types::{ContainerObservation, HealthState, RunState, StackKey};

/// File whose presence marks a directory as a deployed stack.
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// Optional per-stack metadata file.
const METADATA_FILE: &str = "agent.json";

/// Directories under the data root that are never stacks.
const RESERVED_DIRS: &[&str] = &["backups"];

/// Controls stacks through the `docker compose` CLI.
#[derive(Debug, Clone)]
pub struct ComposeController {
    data_root: PathBuf,
    docker_bin: String,
    list_timeout: Duration,
    restart_timeout: Duration,
}

impl ComposeController {
    #[must_use]
    pub fn new(
        data_root: impl Into<PathBuf>,
        list_timeout: Duration,
        restart_timeout: Duration,
    ) -> Self {
        Self {
            data_root: data_root.into(),
            docker_bin: "docker".to_string(),
            list_timeout,
            restart_timeout,
        }
    }

    /// Use a different docker binary (e.g. `podman` or an absolute path).
    #[must_use]
    pub fn with_docker_bin(mut self, docker_bin: impl Into<String>) -> Self {
        self.docker_bin = docker_bin.into();
        self
    }

    /// Directory of `key`, which must be a stack name directly under the data root.
    fn stack_dir(&self, key: &StackKey) -> Result<PathBuf, AdapterError> {
        let key = StackKey::parse(key.as_str())?;
        if RESERVED_DIRS.contains(&key.as_str()) {
            return Err(InvalidStackKey {
                key: key.to_string(),
                reason: "reserved directory",
            }
            .into());
        }
        Ok(self.data_root.join(key.as_str()))
    }
}

#[async_trait]
impl StackController for ComposeController {
    async fn enumerate_deployed_stacks(&self) -> Result<Vec<StackKey>, AdapterError> {
        let mut entries = match tokio::fs::read_dir(&self.data_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(AdapterError::Io {
                    path: self.data_root.clone(),
                    source,
                })
            }
        };

        let mut keys = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(AdapterError::Io {
                        path: self.data_root.clone(),
                        source,
                    })
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if RESERVED_DIRS.contains(&name.as_str()) {
                continue;
            }
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            if is_dir && file_exists(&entry.path().join(COMPOSE_FILE)).await {
                keys.push(StackKey::new(name));
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn is_deployed(&self, key: &StackKey) -> bool {
        match self.stack_dir(key) {
            Ok(dir) => file_exists(&dir.join(COMPOSE_FILE)).await,
            Err(_) => false,
        }
    }

    async fn list_containers(
        &self,
        key: &StackKey,
    ) -> Result<Vec<ContainerObservation>, AdapterError> {
        let dir = self.stack_dir(key)?;
        let args = ["compose", "ps", "--all", "--format", "json"];
        let output = run_checked(&self.docker_bin, &args, &dir, self.list_timeout).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ps_output(&stdout).map_err(|reason| AdapterError::Parse {
            command: format!("{} {}", self.docker_bin, args.join(" ")),
            reason,
        })
    }

    async fn restart(&self, key: &StackKey) -> Result<(), AdapterError> {
        let dir = self.stack_dir(key)?;
        run_checked(
            &self.docker_bin,
            &["compose", "up", "-d"],
            &dir,
            self.restart_timeout,
        )
        .await
        .map(|_| ())
    }

    async fn display_name(&self, key: &StackKey) -> String {
        let Ok(dir) = self.stack_dir(key) else {
            return key.to_string();
        };
        let Ok(raw) = tokio::fs::read_to_string(dir.join(METADATA_FILE)).await else {
            return key.to_string();
        };
        match serde_json::from_str::<StackMetadata>(&raw) {
            Ok(StackMetadata { name: Some(name) }) if !name.trim().is_empty() => name,
            Ok(_) => key.to_string(),
            Err(e) => {
                debug!(stack = %key, error = %e, "Ignoring unreadable stack metadata");
                key.to_string()
            }
        }
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

#[derive(Debug, Deserialize)]
struct StackMetadata {
    #[serde(default)]
    name: Option<String>,
}

/// One row of `docker compose ps --format json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ComposePsRecord {
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    health: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    exit_code: Option<i32>,
    #[serde(default)]
    restart_count: Option<u32>,
}

impl From<ComposePsRecord> for ContainerObservation {
    fn from(record: ComposePsRecord) -> Self {
        Self {
            run_state: RunState::parse(&record.state),
            health_state: HealthState::parse(&record.health),
            name: record.name,
            status_text: record.status,
            restart_count: record.restart_count,
            exit_code: record.exit_code,
        }
    }
}

/// Parse compose `ps` output.
///
/// Current compose releases print one JSON object per line; older ones print
/// a single JSON array. Individual unreadable lines are skipped, but output
/// where no line parses is an error.
pub fn parse_ps_output(stdout: &str) -> Result<Vec<ContainerObservation>, String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        let records: Vec<ComposePsRecord> =
            serde_json::from_str(trimmed).map_err(|e| e.to_string())?;
        return Ok(records.into_iter().map(Into::into).collect());
    }

    let mut observations = Vec::new();
    let mut last_error = None;
    for line in trimmed.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<ComposePsRecord>(line) {
            Ok(record) => observations.push(record.into()),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable compose ps line");
                last_error = Some(e.to_string());
            }
        }
    }

    match last_error {
        Some(reason) if observations.is_empty() => Err(reason),
        _ => Ok(observations),
    }
}
