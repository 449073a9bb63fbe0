//! Loads task and service definition files.
//!
//! Files are JSON or YAML, go through template expansion first, and may be
//! wrapped the way `describe-*` output is (`{"taskDefinition": {...}}`).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::aws::types::{Service, TaskDefinition};
use crate::error::{ConfigError, Result};

use super::template;

/// Resolves environment variables for templates.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads definition files.
#[derive(Clone)]
pub struct DefinitionLoader {
    lookup: EnvLookup,
}

impl fmt::Debug for DefinitionLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefinitionLoader").finish_non_exhaustive()
    }
}

impl Default for DefinitionLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionLoader {
    /// Creates a loader reading the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lookup: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Creates a loader with a custom variable lookup.
    #[must_use]
    pub fn with_lookup(lookup: EnvLookup) -> Self {
        Self { lookup }
    }

    /// Loads a task definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, a template fails, or the
    /// content is not a task definition.
    pub fn load_task_definition(&self, path: &Path) -> Result<TaskDefinition> {
        let td: TaskDefinition = self.load(path, "taskDefinition")?;
        if td.family.is_empty() {
            return Err(ConfigError::validation(
                format!("{}: family is required", path.display()),
                "family",
            )
            .into());
        }
        debug!(
            "Loaded task definition {} with {} containers",
            td.family,
            td.container_definitions.len()
        );
        Ok(td)
    }

    /// Loads a service definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, a template fails, or the
    /// content is not a service definition.
    pub fn load_service_definition(&self, path: &Path) -> Result<Service> {
        let service: Service = self.load(path, "service")?;
        debug!("Loaded service definition from {}", path.display());
        Ok(service)
    }

    fn load<T: DeserializeOwned>(&self, path: &Path, wrapper: &str) -> Result<T> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        let location = path.display().to_string();
        let raw = std::fs::read_to_string(path)?;
        let content = template::expand(&raw, &location, |name| (self.lookup)(name))?;

        let mut value = parse_document(&content, path)
            .map_err(|message| ConfigError::parse(message, &location))?;

        if let Value::Object(map) = &mut value {
            if let Some(inner) = map.remove(wrapper) {
                value = inner;
            }
        }

        serde_json::from_value(value)
            .map_err(|e| ConfigError::parse(format!("Invalid definition: {e}"), location).into())
    }
}

/// Parses JSON or YAML: JSON for `.json` files and for content that looks
/// like a JSON object, YAML otherwise.
fn parse_document(content: &str, path: &Path) -> std::result::Result<Value, String> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        || content.trim_start().starts_with('{');

    if is_json {
        serde_json::from_str(content).map_err(|e| format!("JSON parse error: {e}"))
    } else {
        serde_yaml::from_str(content).map_err(|e| format!("YAML parse error: {e}"))
    }
}
