//! Configuration management

use std::{path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::capability::{DEFAULT_URI_PREFIX, RouteClassifier, RouteMapConfig};
use crate::registry::{DuplicatePolicy, MountOptions};
use crate::{Error, Result};

/// Environment variable prefix (`MCP_CAPABILITIES_OPENAPI__BASE_URL=...`)
pub const ENV_PREFIX: &str = "MCP_CAPABILITIES_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Registry construction
    pub registry: RegistryConfig,
    /// Default mount separators
    pub mount: MountOptions,
    /// `OpenAPI` import
    pub openapi: OpenApiConfig,
}

/// Registry construction settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry name (used in logs)
    pub name: String,
    /// Policy for duplicate tool names
    pub on_duplicate_tools: DuplicatePolicy,
    /// Policy for duplicate resource URIs and templates
    pub on_duplicate_resources: DuplicatePolicy,
    /// Policy for duplicate prompt names
    pub on_duplicate_prompts: DuplicatePolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name: "mcp-capabilities".to_string(),
            on_duplicate_tools: DuplicatePolicy::Warn,
            on_duplicate_resources: DuplicatePolicy::Warn,
            on_duplicate_prompts: DuplicatePolicy::Warn,
        }
    }
}

/// `OpenAPI` import settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenApiConfig {
    /// Path to the YAML or JSON document
    pub spec: Option<PathBuf>,
    /// Backend base URL; defaults to the document's first server
    pub base_url: Option<String>,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Ordered route rules, tried before the default classification
    pub route_maps: Vec<RouteMapConfig>,
    /// Tags added to every generated capability
    pub tags: Vec<String>,
    /// URI prefix of generated resources
    pub uri_prefix: String,
}

impl Default for OpenApiConfig {
    fn default() -> Self {
        Self {
            spec: None,
            base_url: None,
            timeout: Duration::from_secs(30),
            route_maps: Vec::new(),
            tags: Vec::new(),
            uri_prefix: DEFAULT_URI_PREFIX.to_string(),
        }
    }
}

impl OpenApiConfig {
    /// Compile the configured route rules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid pattern.
    pub fn classifier(&self) -> Result<RouteClassifier> {
        RouteClassifier::from_config(&self.route_maps)
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file is missing, a value has the
    /// wrong shape, or a route pattern does not compile.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialization alone cannot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        self.openapi.classifier()?;
        for (field, value) in [
            ("mount.tool_separator", &self.mount.tool_separator),
            ("mount.resource_separator", &self.mount.resource_separator),
            ("mount.prompt_separator", &self.mount.prompt_separator),
        ] {
            if value.is_empty() {
                return Err(Error::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::RouteKind;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.registry.on_duplicate_tools, DuplicatePolicy::Warn);
        assert_eq!(config.mount.resource_separator, "+");
        assert_eq!(config.openapi.timeout, Duration::from_secs(30));
        assert_eq!(config.openapi.uri_prefix, "resource://openapi");
    }

    #[test]
    fn loads_yaml_file() {
        let file = write_config(
            r#"
registry:
  name: petstore
  on_duplicate_tools: error
  on_duplicate_resources: replace
mount:
  resource_separator: "/"
openapi:
  spec: petstore.yaml
  base_url: http://localhost:8080
  timeout: 5s
  tags: [generated]
  route_maps:
    - methods: [GET]
      pattern: "/admin/.*"
      kind: exclude
"#,
        );

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.registry.name, "petstore");
        assert_eq!(config.registry.on_duplicate_tools, DuplicatePolicy::Error);
        assert_eq!(config.registry.on_duplicate_resources, DuplicatePolicy::Replace);
        assert_eq!(config.registry.on_duplicate_prompts, DuplicatePolicy::Warn);
        assert_eq!(config.mount.resource_separator, "/");
        assert_eq!(config.mount.tool_separator, "_");
        assert_eq!(config.openapi.timeout, Duration::from_secs(5));
        assert_eq!(config.openapi.route_maps[0].kind, RouteKind::Exclude);
        assert_eq!(config.openapi.tags, ["generated"]);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/mcp-capabilities.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("not found")));
    }

    #[test]
    fn invalid_route_pattern_is_rejected_at_load() {
        let file = write_config(
            r#"
openapi:
  route_maps:
    - pattern: "("
      kind: tool
"#,
        );
        assert!(matches!(Config::load(Some(file.path())), Err(Error::Config(_))));
    }

    #[test]
    fn empty_separator_is_rejected() {
        let file = write_config("mount:\n  tool_separator: \"\"\n");
        assert!(Config::load(Some(file.path())).is_err());
    }
}
