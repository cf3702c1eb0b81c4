//! Server configuration types
//!
//! Contains all configuration structures for the regquery server.

use regquery_core::scheduler::{
    Payload, RetentionPolicy, ScheduleKind, ScheduleParams, SchedulerConfig, SchedulerError,
    TaskDescriptor, BACKGROUND, RETENTION_HANDLER,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduler: SchedulerAppConfig,
    #[serde(default)]
    pub retention: RetentionAppConfig,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            logging: LoggingConfig::default(),
            scheduler: SchedulerAppConfig::default(),
            retention: RetentionAppConfig::default(),
            catalog: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Directory holding every SQLite file
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Core scheduler configuration
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new()
            .with_data_dir(self.data_path())
            .with_backends(self.scheduler.backends.iter().cloned())
            .with_max_concurrent(self.scheduler.max_concurrent)
            .with_max_idle(self.scheduler.max_idle_secs)
            .with_shutdown_timeout(self.scheduler.shutdown_timeout_secs)
    }

    /// Static catalog, plus the daily retention sweep when enabled
    pub fn catalog(&self) -> Result<Vec<TaskDescriptor>, SchedulerError> {
        let mut descriptors = self
            .catalog
            .iter()
            .map(CatalogEntry::to_descriptor)
            .collect::<Result<Vec<_>, _>>()?;
        if self.retention.enabled {
            descriptors.push(self.retention.descriptor());
        }
        Ok(descriptors)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerAppConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_backends")]
    pub backends: Vec<String>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_idle")]
    pub max_idle_secs: u64,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerAppConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backends: default_backends(),
            max_concurrent: default_max_concurrent(),
            max_idle_secs: default_max_idle(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_backends() -> Vec<String> {
    vec![BACKGROUND.to_string()]
}
fn default_max_concurrent() -> usize {
    4
}
fn default_max_idle() -> u64 {
    60
}
fn default_shutdown_timeout() -> u64 {
    30
}

/// Execution record retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionAppConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
    #[serde(default)]
    pub max_rows: Option<u64>,
    #[serde(default = "default_retention_hour")]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
}

impl Default for RetentionAppConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_days: default_max_age_days(),
            max_rows: None,
            hour: default_retention_hour(),
            minute: 0,
        }
    }
}

fn default_max_age_days() -> u64 {
    30
}
fn default_retention_hour() -> u32 {
    3
}

/// Id of the daily retention sweep descriptor
pub const RETENTION_TASK_ID: &str = "scheduler-retention-daily";

impl RetentionAppConfig {
    /// Limits handed to the retention handler
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age_days: Some(self.max_age_days),
            max_rows: self.max_rows,
        }
    }

    fn descriptor(&self) -> TaskDescriptor {
        let params = json!({
            "hour": self.hour.to_string(),
            "minute": self.minute.to_string(),
        });
        TaskDescriptor::new(
            "execution record retention",
            ScheduleKind::Cron,
            params.as_object().cloned().unwrap_or_default(),
            Payload::new(RETENTION_HANDLER),
        )
        .with_id(RETENTION_TASK_ID)
        .with_task_type("maintenance")
    }
}

/// One static catalog entry as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: ScheduleParams,
    pub handler: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl CatalogEntry {
    /// Convert to a descriptor, rejecting an unknown kind
    pub fn to_descriptor(&self) -> Result<TaskDescriptor, SchedulerError> {
        let payload = Payload {
            handler: self.handler.clone(),
            args: self.args.clone(),
            details: self.details.clone(),
        };
        let mut descriptor =
            TaskDescriptor::new(&self.name, self.kind.parse()?, self.params.clone(), payload)
                .with_id(&self.id)
                .with_active(self.active);
        if let Some(task_type) = &self.task_type {
            descriptor = descriptor.with_task_type(task_type);
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::loader::DEFAULT_CONFIG;
    use config::{Config, File, FileFormat};

    fn parse(toml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config_parses() {
        let config = parse(DEFAULT_CONFIG);
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.backends, vec![BACKGROUND.to_string()]);

        let catalog = config.catalog().unwrap();
        assert!(catalog.iter().any(|d| d.id == RETENTION_TASK_ID));
    }

    #[test]
    fn test_catalog_entry_to_descriptor() {
        let config = parse(
            r#"
            [retention]
            enabled = false

            [[catalog]]
            id = "enrich-nightly"
            name = "metadata enrichment"
            kind = "cron"
            handler = "audit.log_request"
            active = false
            task_type = "enrichment"

            [catalog.params]
            hour = "2"
            minute = "30"
            "#,
        );

        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        let descriptor = &catalog[0];
        assert_eq!(descriptor.id, "enrich-nightly");
        assert_eq!(descriptor.schedule_kind, ScheduleKind::Cron);
        assert_eq!(descriptor.schedule_params["hour"], json!("2"));
        assert_eq!(descriptor.task_type, "enrichment");
        assert!(!descriptor.is_active);
    }

    #[test]
    fn test_catalog_rejects_unknown_kind() {
        let config = parse(
            r#"
            [[catalog]]
            id = "x"
            name = "x"
            kind = "weekly"
            handler = "noop"
            "#,
        );
        assert!(matches!(
            config.catalog(),
            Err(SchedulerError::UnsupportedKind(_))
        ));
    }
}
