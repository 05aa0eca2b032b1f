//! Configuration for the session registry.
//!
//! ```toml
//! [session]
//! max_idle_secs = 3600
//! gc_interval_secs = 60
//! duplicate_policy = "reject"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default idle lifetime: sessions untouched for an hour are collectable.
pub const DEFAULT_MAX_IDLE_SECS: i64 = 3600;

/// Default suggested interval between GC passes.
pub const DEFAULT_GC_INTERVAL_SECS: u64 = 60;

/// What `init` does when the id is already live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail with [`Error::DuplicateSession`] and leave the live session alone.
    #[default]
    Reject,
    /// Drop the live session and start a fresh one under the same id.
    Replace,
}

/// Configuration for the session registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Idle lifetime in seconds used by [`SessionRegistry::sweep`](crate::SessionRegistry::sweep).
    pub max_idle_secs: i64,

    /// How often the caller should run GC. The registry owns no timer;
    /// this is only read back by whoever schedules the sweeps.
    pub gc_interval_secs: u64,

    /// Behavior of `init` on an id that is already live.
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_idle_secs: DEFAULT_MAX_IDLE_SECS,
            gc_interval_secs: DEFAULT_GC_INTERVAL_SECS,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

/// On-disk layout: registry settings live under `[session]`.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    session: RegistryConfig,
}

impl RegistryConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle lifetime used by `sweep`.
    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle_secs = i64::try_from(max_idle.as_secs()).unwrap_or(i64::MAX);
        self
    }

    /// Set the suggested GC interval.
    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval_secs = interval.as_secs();
        self
    }

    /// Set how `init` treats an id that is already live.
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Idle lifetime as a `Duration` (negative values clamp to zero).
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.max_idle_secs).unwrap_or(0))
    }

    /// Suggested interval between GC passes.
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    /// Reject values the registry cannot use.
    pub fn validate(&self) -> Result<()> {
        if self.max_idle_secs < 0 {
            return Err(Error::InvalidConfig(format!(
                "max_idle_secs must be non-negative, got {}",
                self.max_idle_secs
            )));
        }
        if self.gc_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "gc_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse the `[session]` table of a TOML document. A missing table or
    /// missing keys fall back to defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        file.session.validate()?;
        Ok(file.session)
    }

    /// Load from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::ReadConfig {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

/// Anything that can configure a registry.
///
/// Lets a larger application config hand its session settings to
/// [`SessionRegistry::from_session_config`](crate::SessionRegistry::from_session_config)
/// without the registry knowing the application's config layout.
pub trait HasSessionConfig {
    /// Idle lifetime after which sessions are collectable.
    fn max_idle(&self) -> Duration;

    /// Suggested interval between GC passes.
    fn gc_interval(&self) -> Duration {
        Duration::from_secs(DEFAULT_GC_INTERVAL_SECS)
    }

    /// How `init` treats an id that is already live.
    fn duplicate_policy(&self) -> DuplicatePolicy {
        DuplicatePolicy::Reject
    }
}

impl HasSessionConfig for RegistryConfig {
    fn max_idle(&self) -> Duration {
        RegistryConfig::max_idle(self)
    }

    fn gc_interval(&self) -> Duration {
        RegistryConfig::gc_interval(self)
    }

    fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.max_idle_secs, 3600);
        assert_eq!(config.gc_interval(), Duration::from_secs(60));
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::new()
            .with_max_idle(Duration::from_secs(90))
            .with_gc_interval(Duration::from_secs(5))
            .with_duplicate_policy(DuplicatePolicy::Replace);

        assert_eq!(config.max_idle_secs, 90);
        assert_eq!(config.max_idle(), Duration::from_secs(90));
        assert_eq!(config.gc_interval_secs, 5);
        assert_eq!(config.gc_interval(), Duration::from_secs(5));
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Replace);
        assert_eq!(
            HasSessionConfig::duplicate_policy(&config),
            DuplicatePolicy::Replace
        );
    }

    #[test]
    fn test_from_toml_full() {
        let config = RegistryConfig::from_toml_str(
            r#"
            [session]
            max_idle_secs = 120
            gc_interval_secs = 10
            duplicate_policy = "replace"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_idle_secs, 120);
        assert_eq!(config.gc_interval_secs, 10);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Replace);
    }

    #[test]
    fn test_from_toml_partial_and_empty() {
        let config = RegistryConfig::from_toml_str("[session]\nmax_idle_secs = 30\n").unwrap();
        assert_eq!(config.max_idle_secs, 30);
        assert_eq!(config.gc_interval_secs, DEFAULT_GC_INTERVAL_SECS);

        let config = RegistryConfig::from_toml_str("").unwrap();
        assert_eq!(config, RegistryConfig::default());
    }

    #[test]
    fn test_from_toml_rejects_bad_values() {
        let result = RegistryConfig::from_toml_str("[session]\nmax_idle_secs = -1\n");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = RegistryConfig::from_toml_str("[session]\ngc_interval_secs = 0\n");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = RegistryConfig::from_toml_str("[session]\nduplicate_policy = \"merge\"\n");
        assert!(matches!(result, Err(Error::ParseConfig(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\nmax_idle_secs = 45").unwrap();

        let config = RegistryConfig::load(file.path()).unwrap();
        assert_eq!(config.max_idle_secs, 45);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = RegistryConfig::load(dir.path().join("nope.toml"));
        assert!(matches!(result, Err(Error::ReadConfig { .. })));
    }
}
