//! Read-only configuration consumed by the context
//!
//! The context only ever asks for string values by key. [`MapProperties`]
//! covers tests and embedded use; [`ConfigProperties`] loads a file plus
//! `TRELLIS`-prefixed environment variables through the `config` crate.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use config::{Config, Environment, File};

use crate::error::ContextResult;

/// Display name of the application.
pub const APPLICATION_NAME: &str = "application.name";
pub const DEFAULT_APPLICATION_NAME: &str = "Trellis Application";
/// `"true"` skips auto-wiring and function injection during start.
pub const INJECT_DISABLE: &str = "inject.disable";
/// `"off"` or `"false"` replaces the event processor with a disabled one.
pub const EVENT_MODE: &str = "application.eventMode";
/// Path to a banner file printed on start.
pub const BANNER: &str = "application.banner";
/// `"off"` or `"false"` prints only the version line.
pub const BANNER_MODE: &str = "application.bannerMode";
/// Seconds an [`Application`](crate::Application) waits for the context to close.
pub const QUIT_TIMEOUT_SEC: &str = "application.quit.timeoutSec";
pub const DEFAULT_QUIT_TIMEOUT_SEC: u64 = 3;

/// Prefix for environment overrides read by [`ConfigProperties`].
pub const ENV_PREFIX: &str = "TRELLIS";

/// String-keyed property lookup.
pub trait Properties: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }
}

/// `"off"` and `"false"`, in any case.
pub(crate) fn is_switched_off(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    value == "off" || value == "false"
}

/// In-memory properties.
#[derive(Debug, Clone, Default)]
pub struct MapProperties {
    values: HashMap<String, String>,
}

impl MapProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl Properties for MapProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl<K, V> FromIterator<(K, V)> for MapProperties
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut properties = MapProperties::new();
        for (key, value) in iter {
            properties.insert(key, value);
        }
        properties
    }
}

/// Properties backed by `config::Config`.
pub struct ConfigProperties {
    config: Config,
}

impl ConfigProperties {
    /// Load `path` (format picked by extension, missing file allowed) and
    /// layer environment variables over it.
    pub fn load(path: impl AsRef<Path>) -> ContextResult<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Self::environment())
            .build()?;
        Ok(Self { config })
    }

    /// Environment variables only.
    pub fn from_env() -> ContextResult<Self> {
        let config = Config::builder().add_source(Self::environment()).build()?;
        Ok(Self { config })
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX).separator("__")
    }
}

impl Properties for ConfigProperties {
    fn get(&self, key: &str) -> Option<String> {
        // Sources may store keys lowercased.
        self.config
            .get_string(key)
            .or_else(|_| self.config.get_string(&key.to_ascii_lowercase()))
            .ok()
    }
}

impl fmt::Debug for ConfigProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigProperties").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_map_properties_defaults() {
        let properties = MapProperties::new().with(APPLICATION_NAME, "demo");
        assert_eq!(properties.get(APPLICATION_NAME).as_deref(), Some("demo"));
        assert_eq!(properties.get(INJECT_DISABLE), None);
        assert_eq!(properties.get_or(INJECT_DISABLE, "false"), "false");
    }

    #[test]
    fn test_map_properties_from_iter() {
        let properties: MapProperties = [(EVENT_MODE, "off"), (BANNER_MODE, "on")].into_iter().collect();
        assert_eq!(properties.get(EVENT_MODE).as_deref(), Some("off"));
        assert_eq!(properties.get(BANNER_MODE).as_deref(), Some("on"));
    }

    #[test]
    fn test_switched_off_values() {
        assert!(is_switched_off("off"));
        assert!(is_switched_off("FALSE"));
        assert!(is_switched_off(" Off "));
        assert!(!is_switched_off("on"));
        assert!(!is_switched_off(""));
    }

    #[test]
    fn test_config_properties_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[application]\nname = \"from-file\"\n\n[inject]\ndisable = \"true\"").unwrap();

        let properties = ConfigProperties::load(file.path()).unwrap();
        assert_eq!(properties.get(APPLICATION_NAME).as_deref(), Some("from-file"));
        assert_eq!(properties.get(INJECT_DISABLE).as_deref(), Some("true"));
        assert_eq!(properties.get("application.missing"), None);
    }

    #[test]
    fn test_config_properties_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let properties = ConfigProperties::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(properties.get_or(APPLICATION_NAME, DEFAULT_APPLICATION_NAME), DEFAULT_APPLICATION_NAME);
    }
}
