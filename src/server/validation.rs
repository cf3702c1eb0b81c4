//! Configuration validation
//!
//! Rejects settings the scheduler cannot run with before any store is opened.

use super::config::{AppConfig, RETENTION_TASK_ID};
use anyhow::{bail, Result};
use std::collections::HashSet;
use tracing::warn;

/// Validate a loaded configuration
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let scheduler = &config.scheduler;

    if scheduler.backends.is_empty() {
        bail!("[scheduler] backends must name at least one backend");
    }
    let mut names = HashSet::new();
    for name in &scheduler.backends {
        if name.trim().is_empty() {
            bail!("[scheduler] backends contains an empty name");
        }
        if !names.insert(name.as_str()) {
            bail!("[scheduler] backend '{}' is listed twice", name);
        }
    }
    if scheduler.max_concurrent == 0 {
        bail!("[scheduler] max_concurrent must be at least 1");
    }
    if scheduler.shutdown_timeout_secs == 0 {
        warn!("[scheduler] shutdown_timeout_secs = 0, in-flight firings will not be awaited");
    }

    let retention = &config.retention;
    if retention.hour > 23 || retention.minute > 59 {
        bail!(
            "[retention] hour/minute {}:{} is not a time of day",
            retention.hour,
            retention.minute
        );
    }

    let mut ids = HashSet::new();
    for entry in &config.catalog {
        if entry.id.trim().is_empty() {
            bail!("[[catalog]] entry '{}' has an empty id", entry.name);
        }
        if retention.enabled && entry.id == RETENTION_TASK_ID {
            bail!(
                "[[catalog]] id '{}' is reserved for the retention sweep",
                RETENTION_TASK_ID
            );
        }
        if !ids.insert(entry.id.as_str()) {
            bail!("[[catalog]] id '{}' is used more than once", entry.id);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::loader::DEFAULT_CONFIG;
    use config::{Config, File, FileFormat};

    fn parse(extra: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(extra, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&parse("")).is_ok());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let config = parse("[scheduler]\nmax_concurrent = 0\n");
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("max_concurrent"));
    }

    #[test]
    fn test_rejects_bad_retention_time() {
        let config = parse("[retention]\nhour = 24\n");
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_duplicate_backends_and_catalog_ids() {
        let mut config = parse("");
        config.scheduler.backends = vec!["background".to_string(), "background".to_string()];
        assert!(validate_config(&config).is_err());

        let mut config = parse("");
        let entry = config.catalog[0].clone();
        config.catalog.push(entry);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("more than once"));

        let mut config = parse("");
        config.catalog[0].id = RETENTION_TASK_ID.to_string();
        assert!(validate_config(&config).is_err());
    }
}
