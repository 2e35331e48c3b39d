//! Scheduler configuration file
//!
//! ```yaml
//! cleaner:
//!   purgeEntitiesOlderThan: 168h
//!   cleanerInterval: 30m
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use reconciler_common::{Error, Result};
use reconciler_scheduler::CleanerConfig;

/// Configuration of the scheduler components
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Retention cleaner settings
    pub cleaner: CleanerConfig,
}

impl SchedulerConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| Error::serialization(format!("invalid scheduler config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::internal_with_context(
                "load_config",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        let config = Self::from_yaml(&content)?;
        debug!(path = %path.display(), ?config, "scheduler config loaded");
        Ok(config)
    }

    /// Replace file values with the ones given on the command line
    pub fn with_overrides(
        mut self,
        cleaner_interval: Option<Duration>,
        purge_older_than: Option<Duration>,
    ) -> Result<Self> {
        if let Some(interval) = cleaner_interval {
            self.cleaner.cleaner_interval = interval;
        }
        if let Some(retention) = purge_older_than {
            self.cleaner.purge_entities_older_than = retention;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.cleaner.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_from_yaml() {
        let config = SchedulerConfig::from_yaml(
            "cleaner:\n  purgeEntitiesOlderThan: 168h\n  cleanerInterval: 30m\n",
        )
        .unwrap();
        assert_eq!(config.cleaner.purge_entities_older_than, 168 * HOUR);
        assert_eq!(config.cleaner.cleaner_interval, Duration::from_secs(1800));
    }

    #[test]
    fn test_missing_duration_is_rejected() {
        let err = SchedulerConfig::from_yaml("cleaner:\n  cleanerInterval: 30m\n").unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn test_unparsable_duration_is_rejected() {
        let err = SchedulerConfig::from_yaml(
            "cleaner:\n  purgeEntitiesOlderThan: forever\n  cleanerInterval: 30m\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let err = SchedulerConfig::from_yaml(
            "cleaner:\n  purgeEntitiesOlderThan: 168h\n  cleanerInterval: 0s\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let config = SchedulerConfig::from_yaml(
            "cleaner:\n  purgeEntitiesOlderThan: 168h\n  cleanerInterval: 30m\n",
        )
        .unwrap()
        .with_overrides(Some(HOUR), None)
        .unwrap();
        assert_eq!(config.cleaner.cleaner_interval, HOUR);
        assert_eq!(config.cleaner.purge_entities_older_than, 168 * HOUR);

        let zero = config.with_overrides(None, Some(Duration::ZERO));
        assert!(zero.is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cleaner:").unwrap();
        writeln!(file, "  purgeEntitiesOlderThan: 7days").unwrap();
        writeln!(file, "  cleanerInterval: 1h").unwrap();

        let config = SchedulerConfig::load(file.path()).await.unwrap();
        assert_eq!(config.cleaner.purge_entities_older_than, 168 * HOUR);
        assert_eq!(config.cleaner.cleaner_interval, HOUR);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = SchedulerConfig::load(&dir.path().join("absent.yaml")).await;
        assert!(result.is_err());
    }
}
