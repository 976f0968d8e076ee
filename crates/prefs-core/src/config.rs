//! Store configuration
//!
//! Usually built in code with the `with_*` methods; can also be read from a
//! TOML table:
//!
//! ```toml
//! name = "launcher_prefs"
//! legacy_name = "launcher"
//! current_version = 200
//! density = 2.0
//! thread_policy = "owner_only"
//! ```

use crate::error::{PrefError, PrefResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default schema version targeted by the version gate
pub const DEFAULT_CURRENT_VERSION: i32 = 200;

/// Which threads may read and write cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPolicy {
    /// Only the thread that constructed the store (asserted on every call)
    #[default]
    OwnerOnly,
    /// Any thread; callers synchronize externally
    Unchecked,
}

/// Preference store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// Store document name (file stem for file-backed stores)
    pub name: String,
    /// Previous document name, renamed to `name` once on open
    pub legacy_name: Option<String>,
    /// Directory holding the store document
    pub directory: Option<PathBuf>,
    /// Schema version the version gate migrates to
    pub current_version: i32,
    /// Key holding the stored schema version
    pub version_key: String,
    /// Key of the "restored from backup" marker
    pub restore_key: String,
    /// Pixels per density-independent unit, for dimension cells
    pub density: f32,
    /// Thread-affinity enforcement
    pub thread_policy: ThreadPolicy,
}

impl PreferencesConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With store name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// With legacy name to migrate from
    #[inline]
    #[must_use]
    pub fn with_legacy_name(mut self, legacy: impl Into<String>) -> Self {
        self.legacy_name = Some(legacy.into());
        self
    }

    /// With store directory
    #[inline]
    #[must_use]
    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    /// With target schema version
    #[inline]
    #[must_use]
    pub fn with_current_version(mut self, version: i32) -> Self {
        self.current_version = version;
        self
    }

    /// With display density
    #[inline]
    #[must_use]
    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    /// With thread policy
    #[inline]
    #[must_use]
    pub fn with_thread_policy(mut self, policy: ThreadPolicy) -> Self {
        self.thread_policy = policy;
        self
    }

    /// Parse from TOML text; absent fields keep their defaults
    ///
    /// # Errors
    /// Returns `PrefError::Config` on invalid TOML or field types.
    pub fn from_toml_str(text: &str) -> PrefResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| PrefError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns `PrefError::Config` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> PrefResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PrefError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns `PrefError::Config` for an empty name, empty version key or a
    /// non-positive density.
    pub fn validate(&self) -> PrefResult<()> {
        if self.name.trim().is_empty() {
            return Err(PrefError::Config("name must not be empty".to_string()));
        }
        if self.version_key.trim().is_empty() {
            return Err(PrefError::Config("version_key must not be empty".to_string()));
        }
        if !(self.density.is_finite() && self.density > 0.0) {
            return Err(PrefError::Config(format!(
                "density must be positive, got {}",
                self.density
            )));
        }
        Ok(())
    }
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            name: "preferences".to_string(),
            legacy_name: None,
            directory: None,
            current_version: DEFAULT_CURRENT_VERSION,
            version_key: "config_version".to_string(),
            restore_key: "pref_restoreSuccess".to_string(),
            density: 1.0,
            thread_policy: ThreadPolicy::OwnerOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PreferencesConfig::new();
        assert_eq!(config.current_version, DEFAULT_CURRENT_VERSION);
        assert_eq!(config.version_key, "config_version");
        assert_eq!(config.thread_policy, ThreadPolicy::OwnerOnly);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_chain() {
        let config = PreferencesConfig::new()
            .with_name("launcher")
            .with_legacy_name("old_launcher")
            .with_density(2.5)
            .with_thread_policy(ThreadPolicy::Unchecked);

        assert_eq!(config.name, "launcher");
        assert_eq!(config.legacy_name.as_deref(), Some("old_launcher"));
        assert_eq!(config.density, 2.5);
        assert_eq!(config.thread_policy, ThreadPolicy::Unchecked);
    }

    #[test]
    fn toml_partial_table() {
        let config = PreferencesConfig::from_toml_str(
            r#"
            name = "launcher_prefs"
            current_version = 201
            thread_policy = "unchecked"
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "launcher_prefs");
        assert_eq!(config.current_version, 201);
        assert_eq!(config.thread_policy, ThreadPolicy::Unchecked);
        assert_eq!(config.density, 1.0);
    }

    #[test]
    fn toml_rejects_bad_density() {
        let result = PreferencesConfig::from_toml_str("density = 0.0");
        assert!(matches!(result, Err(PrefError::Config(_))));
    }

    #[test]
    fn load_reports_missing_file() {
        let result = PreferencesConfig::load("/definitely/not/here.toml");
        assert!(matches!(result, Err(PrefError::Config(_))));
    }
}
