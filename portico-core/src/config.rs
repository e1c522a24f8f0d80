//! Configuration loading from portico.yml

use portico_types::{parse_endpoint_list, Endpoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration for adapter `{adapter}`: {reason}")]
    Invalid { adapter: String, reason: String },
}

/// Main configuration struct matching the portico.yml schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PorticoConfig {
    /// Per-adapter properties, keyed by adapter name
    #[serde(default)]
    pub adapters: BTreeMap<String, AdapterProperties>,

    /// Path of the file this configuration was read from
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Properties of one named adapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterProperties {
    /// Listening endpoints, `:`-separated
    pub endpoints: String,

    /// Endpoints embedded in direct proxies; computed when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_endpoints: Option<String>,

    /// Host replacing the host of every published endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_host: Option<String>,

    /// Id registered with the locator registry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<String>,

    /// Replica group this adapter belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_group_id: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl AdapterProperties {
    pub fn adapter_id(&self) -> Option<&str> {
        non_empty(&self.adapter_id)
    }

    pub fn replica_group_id(&self) -> Option<&str> {
        non_empty(&self.replica_group_id)
    }

    pub fn published_host(&self) -> Option<&str> {
        non_empty(&self.published_host)
    }

    pub fn published_endpoints(&self) -> Option<&str> {
        non_empty(&self.published_endpoints)
    }

    /// Parse the listening endpoints
    pub fn parsed_endpoints(&self) -> Result<Vec<Endpoint>, portico_types::ParseError> {
        parse_endpoint_list(&self.endpoints)
    }

    /// Check the properties of the adapter `name`
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            adapter: name.to_string(),
            reason,
        };

        if self.replica_group_id().is_some() && self.adapter_id().is_none() {
            return Err(invalid(
                "replica_group_id requires adapter_id to be set".to_string(),
            ));
        }

        self.parsed_endpoints()
            .map_err(|e| invalid(format!("endpoints: {}", e)))?;
        if let Some(published) = self.published_endpoints() {
            parse_endpoint_list(published)
                .map_err(|e| invalid(format!("published_endpoints: {}", e)))?;
        }

        Ok(())
    }
}

impl PorticoConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&contents)?;

        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: PorticoConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every adapter entry
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, properties) in &self.adapters {
            properties.validate(name)?;
        }
        Ok(())
    }

    /// Properties of the adapter `name`; unknown names get empty properties
    pub fn adapter(&self, name: &str) -> AdapterProperties {
        self.adapters.get(name).cloned().unwrap_or_default()
    }

    /// Set the properties of an adapter
    pub fn with_adapter(mut self, name: impl Into<String>, properties: AdapterProperties) -> Self {
        self.adapters.insert(name.into(), properties);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_adapters() {
        let yaml = r#"
adapters:
  Hello:
    endpoints: "tcp -h * -p 4061"
    published_host: hello.example.com
    adapter_id: HelloAdapter
    replica_group_id: HelloGroup
  Plain:
    endpoints: "tcp -p 10000"
"#;
        let config = PorticoConfig::from_yaml_str(yaml).unwrap();
        let hello = config.adapter("Hello");
        assert_eq!(hello.adapter_id(), Some("HelloAdapter"));
        assert_eq!(hello.replica_group_id(), Some("HelloGroup"));
        assert_eq!(hello.published_host(), Some("hello.example.com"));
        assert_eq!(hello.parsed_endpoints().unwrap()[0].port, 4061);

        let plain = config.adapter("Plain");
        assert_eq!(plain.adapter_id(), None);
        assert!(plain.published_endpoints().is_none());
    }

    #[test]
    fn test_unknown_adapter_gets_defaults() {
        let config = PorticoConfig::default();
        let properties = config.adapter("Nope");
        assert_eq!(properties, AdapterProperties::default());
        assert!(properties.parsed_endpoints().unwrap().is_empty());
    }

    #[test]
    fn test_replica_group_requires_adapter_id() {
        let yaml = r#"
adapters:
  Broken:
    replica_group_id: G
"#;
        assert!(matches!(
            PorticoConfig::from_yaml_str(yaml),
            Err(ConfigError::Invalid { adapter, .. }) if adapter == "Broken"
        ));
    }

    #[test]
    fn test_invalid_endpoints_rejected() {
        let yaml = r#"
adapters:
  Broken:
    endpoints: "tcp -p notaport"
"#;
        assert!(matches!(
            PorticoConfig::from_yaml_str(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_empty_strings_are_unset() {
        let properties = AdapterProperties {
            adapter_id: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(properties.adapter_id(), None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "adapters:\n  A:\n    adapter_id: A1").unwrap();

        let config = PorticoConfig::from_file(file.path()).unwrap();
        assert_eq!(config.adapter("A").adapter_id(), Some("A1"));
        assert_eq!(config.config_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            PorticoConfig::from_file("/nonexistent/portico.yml"),
            Err(ConfigError::ReadError(_))
        ));
    }
}
