//! Configuration module.
//!
//! This module handles all configuration-related functionality:
//! - Parsing `ecs-rollout.yaml` and applying environment overrides
//! - Validating the configuration and the definitions it references
//! - Loading task and service definition files, with templating

mod loader;
mod parser;
mod spec;
mod template;
mod validator;

pub use loader::{DefinitionLoader, EnvLookup};
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{AppSpecConfig, CodeDeployConfig, DEFAULT_TIMEOUT_SECS, RolloutConfig};
pub use template::expand;
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
