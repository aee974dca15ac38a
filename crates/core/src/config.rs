use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

// ── Top-level config ──────────────────────────────────────────

/// Server configuration, parsed from `beast.toml`.
///
/// Every section has defaults so an empty file is a valid config. Environment
/// variables of the form `BEAST_<SECTION>_<KEY>` override file values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeastConfig {
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    /// Named delivery adaptors; route recipients refer to these names.
    #[serde(default)]
    pub adaptors: HashMap<String, AdaptorConfig>,
}

/// Message manager worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Number of concurrent dispatch workers.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// How long `shutdown()` waits for in-flight work before aborting it.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_pool_size() -> usize {
    10
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl ManagerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Cron trigger scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between due-checks.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

fn default_tick_millis() -> u64 {
    1000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            jobs: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}

/// A scheduled trigger: fires `Trigger { job }` on every cron tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub id: u64,
    /// Route name the trigger is addressed to.
    pub job: String,
    /// 5- or 6-field cron expression.
    pub cron: String,
}

/// Where route definitions are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    #[serde(default = "default_routes_dir")]
    pub dir: String,
}

fn default_routes_dir() -> String {
    "data/routes".into()
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            dir: default_routes_dir(),
        }
    }
}

/// Adaptor section, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdaptorConfig {
    /// Posts JSON payloads to an HTTP endpoint.
    Http {
        url: String,
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

// ── Loading ───────────────────────────────────────────────────

impl BeastConfig {
    /// Parse config from a TOML string, apply env overrides, and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "reading config file");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply environment variable overrides.
    ///
    /// - `BEAST_MANAGER_POOL_SIZE` -> `manager.pool_size`
    /// - `BEAST_MANAGER_SHUTDOWN_GRACE_SECS` -> `manager.shutdown_grace_secs`
    /// - `BEAST_SCHEDULER_TICK_MILLIS` -> `scheduler.tick_millis`
    /// - `BEAST_ROUTES_DIR` -> `routes.dir`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(n) = lookup("BEAST_MANAGER_POOL_SIZE").and_then(|v| v.parse().ok()) {
            self.manager.pool_size = n;
        }
        if let Some(n) = lookup("BEAST_MANAGER_SHUTDOWN_GRACE_SECS").and_then(|v| v.parse().ok()) {
            self.manager.shutdown_grace_secs = n;
        }
        if let Some(n) = lookup("BEAST_SCHEDULER_TICK_MILLIS").and_then(|v| v.parse().ok()) {
            self.scheduler.tick_millis = n;
        }
        if let Some(dir) = lookup("BEAST_ROUTES_DIR").filter(|v| !v.is_empty()) {
            self.routes.dir = dir;
        }
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manager.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "manager.pool_size must be at least 1".into(),
            ));
        }
        if self.scheduler.tick_millis == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.tick_millis must be at least 1".into(),
            ));
        }
        for (name, adaptor) in &self.adaptors {
            match adaptor {
                AdaptorConfig::Http { url, .. } if url.trim().is_empty() => {
                    return Err(ConfigError::Invalid(format!(
                        "adaptor '{name}' has an empty url"
                    )));
                }
                AdaptorConfig::Http { .. } => {}
            }
        }
        let mut seen = std::collections::HashSet::new();
        for job in &self.scheduler.jobs {
            if !seen.insert(job.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate scheduler job id {}",
                    job.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: BeastConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.manager.pool_size, 10);
        assert_eq!(cfg.manager.shutdown_grace(), Duration::from_secs(10));
        assert_eq!(cfg.scheduler.tick(), Duration::from_secs(1));
        assert_eq!(cfg.routes.dir, "data/routes");
        assert!(cfg.adaptors.is_empty());
        cfg.validate().unwrap();
    }

    #[test]
    fn parse_full_toml() {
        let cfg: BeastConfig = toml::from_str(
            r#"
[manager]
pool_size = 4
shutdown_grace_secs = 2

[scheduler]
tick_millis = 250

[[scheduler.jobs]]
id = 1
job = "nightly-cleanup"
cron = "0 3 * * *"

[routes]
dir = "/var/lib/beast/routes"

[adaptors.dex]
type = "http"
url = "http://localhost:8080/BaltradDex/post"
timeout_secs = 5
headers = { "X-Node" = "nodeA" }
"#,
        )
        .unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.manager.pool_size, 4);
        assert_eq!(cfg.scheduler.jobs.len(), 1);
        assert_eq!(cfg.scheduler.jobs[0].job, "nightly-cleanup");
        assert_eq!(cfg.routes.dir, "/var/lib/beast/routes");
        match &cfg.adaptors["dex"] {
            AdaptorConfig::Http { url, timeout_secs, headers, method } => {
                assert!(url.ends_with("/post"));
                assert_eq!(*timeout_secs, Some(5));
                assert_eq!(headers["X-Node"], "nodeA");
                assert!(method.is_none());
            }
        }
    }

    #[test]
    fn zero_pool_size_rejected() {
        let cfg: BeastConfig = toml::from_str("[manager]\npool_size = 0\n").unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_adaptor_url_rejected() {
        let cfg: BeastConfig =
            toml::from_str("[adaptors.a]\ntype = \"http\"\nurl = \" \"\n").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn duplicate_job_ids_rejected() {
        let cfg: BeastConfig = toml::from_str(
            r#"
[[scheduler.jobs]]
id = 1
job = "a"
cron = "* * * * *"

[[scheduler.jobs]]
id = 1
job = "b"
cron = "* * * * *"
"#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = BeastConfig::default();
        cfg.apply_overrides(|key| match key {
            "BEAST_MANAGER_POOL_SIZE" => Some("3".into()),
            "BEAST_ROUTES_DIR" => Some("/tmp/routes".into()),
            "BEAST_SCHEDULER_TICK_MILLIS" => Some("not-a-number".into()),
            _ => None,
        });
        assert_eq!(cfg.manager.pool_size, 3);
        assert_eq!(cfg.routes.dir, "/tmp/routes");
        assert_eq!(cfg.scheduler.tick_millis, 1000);
    }
}
