//! Layered configuration loading
//!
//! Priority (highest to lowest):
//! 1. Environment variables with the given prefix (`__` separates nested keys)
//! 2. Configuration file (format picked from its extension)
//! 3. `Default` values of the target type

use crate::{Error, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Build the figment for `T` without extracting it
///
/// A missing file is not an error for figment's file providers, but an
/// unknown extension is rejected here so typos do not silently fall back
/// to defaults.
pub fn figment_for<T>(file: Option<&Path>, env_prefix: &str) -> Result<Figment>
where
    T: Serialize + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(path) = file {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::config("Config file must have an extension"))?;

        figment = match extension {
            "toml" => figment.merge(Toml::file(path)),
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            "json" => figment.merge(Json::file(path)),
            _ => {
                return Err(Error::Config(format!(
                    "Unsupported config file format: {}",
                    extension
                )))
            },
        };
        debug!("Config file layered: {}", path.display());
    }

    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Load configuration from defaults, an optional file and the environment
pub fn load_config<T>(file: Option<&Path>, env_prefix: &str) -> Result<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Default,
{
    figment_for::<T>(file, env_prefix)?
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}

/// Render configuration as YAML, e.g. for `config` subcommands
pub fn to_yaml<T: Serialize>(config: &T) -> Result<String> {
    Ok(serde_yaml::to_string(config)?)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    #[serde(default)]
    struct TestConfig {
        port: String,
        baud_rate: u32,
        nested: NestedConfig,
    }

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    #[serde(default)]
    struct NestedConfig {
        enabled: bool,
        value: i32,
    }

    impl Default for TestConfig {
        fn default() -> Self {
            Self {
                port: "/dev/ttyACM0".to_string(),
                baud_rate: 57600,
                nested: NestedConfig::default(),
            }
        }
    }

    impl Default for NestedConfig {
        fn default() -> Self {
            Self {
                enabled: false,
                value: 10,
            }
        }
    }

    #[test]
    fn test_defaults_without_file() {
        let loaded: TestConfig = load_config(None, "COMMON_TEST_NONE_").unwrap();
        assert_eq!(loaded, TestConfig::default());
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("scope.yaml");
        std::fs::write(&path, "baud_rate: 115200\nnested:\n  enabled: true\n").unwrap();

        let loaded: TestConfig = load_config(Some(&path), "COMMON_TEST_YAML_").unwrap();
        assert_eq!(loaded.baud_rate, 115200);
        assert!(loaded.nested.enabled);
        // untouched keys keep their defaults
        assert_eq!(loaded.port, "/dev/ttyACM0");
        assert_eq!(loaded.nested.value, 10);
    }

    #[test]
    fn test_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("scope.toml");
        std::fs::write(&path, "port = \"COM3\"\n").unwrap();

        let loaded: TestConfig = load_config(Some(&path), "COMMON_TEST_TOML_").unwrap();
        assert_eq!(loaded.port, "COM3");
    }

    #[test]
    fn test_unsupported_extension() {
        let result: Result<TestConfig> =
            load_config(Some(Path::new("scope.ini")), "COMMON_TEST_INI_");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_to_yaml() {
        let yaml = to_yaml(&TestConfig::default()).unwrap();
        assert!(yaml.contains("baud_rate: 57600"));
    }
}
