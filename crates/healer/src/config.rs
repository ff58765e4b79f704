//! Monitor configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

const ENV_HOME: &str = "AGENTFORGE_HOME";
const ENV_INTERVAL: &str = "MONITOR_INTERVAL";
const ENV_AUTO_RESTART: &str = "AGENTFORGE_AUTO_RESTART";
const ENV_WEBHOOK: &str = "AGENTFORGE_WEBHOOK";
const ENV_HISTORY_FILE: &str = "AGENTFORGE_HISTORY_FILE";
const ENV_HISTORY_CAPACITY: &str = "AGENTFORGE_HISTORY_CAPACITY";
const ENV_HISTORY_STRICT: &str = "AGENTFORGE_HISTORY_STRICT";
const ENV_PROBE_TIMEOUT: &str = "AGENTFORGE_PROBE_TIMEOUT";
const ENV_RESTART_TIMEOUT: &str = "AGENTFORGE_RESTART_TIMEOUT";
const ENV_WEBHOOK_TIMEOUT: &str = "AGENTFORGE_WEBHOOK_TIMEOUT";
const ENV_PROBE_CONCURRENCY: &str = "AGENTFORGE_PROBE_CONCURRENCY";
const ENV_DISK_WARN: &str = "AGENTFORGE_DISK_WARN";
const ENV_DISK_CRITICAL: &str = "AGENTFORGE_DISK_CRITICAL";
const ENV_MEMORY_CRITICAL: &str = "AGENTFORGE_MEMORY_CRITICAL";
const ENV_API_ADDR: &str = "AGENTFORGE_API_ADDR";
const ENV_TOKEN: &str = "AGENTFORGE_TOKEN";

/// Default probe interval in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
/// Default number of history entries kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
/// Default status API bind address (the dashboard port).
pub const DEFAULT_API_ADDR: &str = "127.0.0.1:9090";

/// Host resource thresholds, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceThresholds {
    /// Disk usage above this adds an advisory warning.
    pub disk_warn_percent: u8,
    /// Disk usage above this makes every stack unhealthy.
    pub disk_critical_percent: u8,
    /// Memory usage above this makes every stack unhealthy.
    pub memory_critical_percent: u8,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            disk_warn_percent: 80,
            disk_critical_percent: 90,
            memory_critical_percent: 90,
        }
    }
}

/// Process-wide monitor configuration. Immutable once built.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Directory holding one sub-directory per deployed stack.
    pub data_root: PathBuf,
    pub probe_interval: Duration,
    pub auto_restart: bool,
    pub webhook_url: Option<String>,
    pub history_path: PathBuf,
    pub history_capacity: usize,
    /// Refuse to start when the history location is unusable.
    pub history_strict: bool,
    pub probe_timeout: Duration,
    pub restart_timeout: Duration,
    pub webhook_timeout: Duration,
    /// Maximum stacks probed in parallel within one cycle.
    pub probe_concurrency: usize,
    pub thresholds: ResourceThresholds,
    pub api_addr: SocketAddr,
    pub api_token: Option<String>,
}

impl MonitorConfig {
    /// Configuration rooted at `data_root` with every other value at its default.
    #[must_use]
    pub fn with_data_root(data_root: impl Into<PathBuf>) -> Self {
        let data_root = data_root.into();
        Self {
            history_path: data_root.join("health.json"),
            data_root,
            probe_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            auto_restart: true,
            webhook_url: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_strict: false,
            probe_timeout: Duration::from_secs(15),
            restart_timeout: Duration::from_secs(60),
            webhook_timeout: Duration::from_secs(10),
            probe_concurrency: 4,
            thresholds: ResourceThresholds::default(),
            api_addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
            api_token: None,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_root = match get(ENV_HOME) {
            Some(home) => PathBuf::from(home),
            None => get("HOME")
                .map(|home| PathBuf::from(home).join(".agentforge"))
                .ok_or(ConfigError::NoDataRoot)?,
        };

        let mut config = Self::with_data_root(data_root);

        if let Some(raw) = get(ENV_INTERVAL) {
            config.probe_interval = Duration::from_secs(parse_positive(ENV_INTERVAL, &raw)?);
        }
        if let Some(raw) = get(ENV_AUTO_RESTART) {
            let raw = raw.trim().to_ascii_lowercase();
            config.auto_restart = !(raw == "false" || raw == "0");
        }
        config.webhook_url = get(ENV_WEBHOOK).map(|v| v.trim().to_string());
        if let Some(raw) = get(ENV_HISTORY_FILE) {
            config.history_path = PathBuf::from(raw);
        }
        if let Some(raw) = get(ENV_HISTORY_CAPACITY) {
            config.history_capacity = parse_positive(ENV_HISTORY_CAPACITY, &raw)? as usize;
        }
        if let Some(raw) = get(ENV_HISTORY_STRICT) {
            let raw = raw.trim().to_ascii_lowercase();
            config.history_strict = raw == "true" || raw == "1";
        }
        if let Some(raw) = get(ENV_PROBE_TIMEOUT) {
            config.probe_timeout = Duration::from_secs(parse_positive(ENV_PROBE_TIMEOUT, &raw)?);
        }
        if let Some(raw) = get(ENV_RESTART_TIMEOUT) {
            config.restart_timeout =
                Duration::from_secs(parse_positive(ENV_RESTART_TIMEOUT, &raw)?);
        }
        if let Some(raw) = get(ENV_WEBHOOK_TIMEOUT) {
            config.webhook_timeout =
                Duration::from_secs(parse_positive(ENV_WEBHOOK_TIMEOUT, &raw)?);
        }
        if let Some(raw) = get(ENV_PROBE_CONCURRENCY) {
            config.probe_concurrency = parse_positive(ENV_PROBE_CONCURRENCY, &raw)? as usize;
        }
        if let Some(raw) = get(ENV_DISK_WARN) {
            config.thresholds.disk_warn_percent = parse_percent(ENV_DISK_WARN, &raw)?;
        }
        if let Some(raw) = get(ENV_DISK_CRITICAL) {
            config.thresholds.disk_critical_percent = parse_percent(ENV_DISK_CRITICAL, &raw)?;
        }
        if let Some(raw) = get(ENV_MEMORY_CRITICAL) {
            config.thresholds.memory_critical_percent = parse_percent(ENV_MEMORY_CRITICAL, &raw)?;
        }
        if config.thresholds.disk_warn_percent > config.thresholds.disk_critical_percent {
            return Err(ConfigError::Invalid {
                var: ENV_DISK_WARN,
                expected: "at most AGENTFORGE_DISK_CRITICAL",
                value: config.thresholds.disk_warn_percent.to_string(),
            });
        }
        if let Some(raw) = get(ENV_API_ADDR) {
            config.api_addr = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: ENV_API_ADDR,
                expected: "a socket address such as 127.0.0.1:9090",
                value: raw.clone(),
            })?;
        }
        config.api_token = get(ENV_TOKEN);

        Ok(config)
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            expected: "a positive integer",
            value: raw.to_string(),
        }),
    }
}

fn parse_percent(var: &'static str, raw: &str) -> Result<u8, ConfigError> {
    match raw.trim().parse::<u8>() {
        Ok(n) if n <= 100 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            expected: "a percentage between 0 and 100",
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<MonitorConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        MonitorConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults_from_home() {
        let config = load(&[("HOME", "/home/op")]).unwrap();
        assert_eq!(config.data_root, PathBuf::from("/home/op/.agentforge"));
        assert_eq!(
            config.history_path,
            PathBuf::from("/home/op/.agentforge/health.json")
        );
        assert_eq!(config.probe_interval, Duration::from_secs(60));
        assert!(config.auto_restart);
        assert!(config.webhook_url.is_none());
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.api_addr.to_string(), DEFAULT_API_ADDR);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("AGENTFORGE_HOME", "/srv/forge"),
            ("MONITOR_INTERVAL", "15"),
            ("AGENTFORGE_AUTO_RESTART", "false"),
            ("AGENTFORGE_WEBHOOK", "https://hooks.example/abc"),
            ("AGENTFORGE_HISTORY_CAPACITY", "5"),
            ("AGENTFORGE_API_ADDR", "0.0.0.0:8088"),
        ])
        .unwrap();
        assert_eq!(config.data_root, PathBuf::from("/srv/forge"));
        assert_eq!(config.probe_interval, Duration::from_secs(15));
        assert!(!config.auto_restart);
        assert_eq!(
            config.webhook_url.as_deref(),
            Some("https://hooks.example/abc")
        );
        assert_eq!(config.history_capacity, 5);
        assert_eq!(config.api_addr.port(), 8088);
    }

    #[test]
    fn test_auto_restart_only_disabled_by_false() {
        let config = load(&[("HOME", "/h"), ("AGENTFORGE_AUTO_RESTART", "no")]).unwrap();
        assert!(config.auto_restart);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = load(&[("HOME", "/h"), ("MONITOR_INTERVAL", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "MONITOR_INTERVAL",
                ..
            }
        ));
    }

    #[test]
    fn test_warn_above_critical_rejected() {
        let err = load(&[
            ("HOME", "/h"),
            ("AGENTFORGE_DISK_WARN", "95"),
            ("AGENTFORGE_DISK_CRITICAL", "90"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_missing_home() {
        assert!(matches!(load(&[]), Err(ConfigError::NoDataRoot)));
    }
}
