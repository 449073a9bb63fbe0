//! Validation of the configuration and the definitions it points to.
//!
//! Errors stop an operation before any remote call; warnings are reported
//! and ignored.

use std::collections::HashSet;

use tracing::debug;

use crate::aws::types::{Service, TaskDefinition};
use crate::error::{ConfigError, Result};

use super::spec::RolloutConfig;

/// Lifecycle events an ECS AppSpec may hook.
const APPSPEC_HOOK_EVENTS: &[&str] = &[
    "BeforeInstall",
    "AfterInstall",
    "AfterAllowTestTraffic",
    "BeforeAllowTraffic",
    "AfterAllowTraffic",
];

/// Network modes ECS accepts.
const NETWORK_MODES: &[&str] = &["awsvpc", "bridge", "host", "none"];

/// Validator for configurations and definitions.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, config: &RolloutConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();
        Self::validate_config(config, &mut result);
        result.into_result()
    }

    /// Validates a configuration together with its loaded definitions.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate_all(
        &self,
        config: &RolloutConfig,
        task_definition: &TaskDefinition,
        service_definition: Option<&Service>,
    ) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();
        Self::validate_config(config, &mut result);
        Self::validate_task_definition(task_definition, &mut result);
        if let Some(service) = service_definition {
            Self::validate_service_definition(service, task_definition, &mut result);
        }
        result.into_result()
    }

    fn validate_config(config: &RolloutConfig, result: &mut ValidationResult) {
        if config.cluster.is_empty() {
            result.error("cluster", "Cluster cannot be empty");
        }

        if config.service.is_empty() {
            result.error("service", "Service cannot be empty");
        } else if !is_valid_service_name(&config.service) {
            result.error(
                "service",
                format!(
                    "Service name '{}' is invalid. Use up to 255 letters, digits, hyphens and underscores.",
                    config.service
                ),
            );
        }

        if config.task_definition.as_os_str().is_empty() {
            result.error("task_definition", "Task definition path cannot be empty");
        }

        if config.timeout_secs == 0 {
            result.error("timeout_secs", "Timeout must be at least 1 second");
        }

        if config.service_definition.is_none() {
            result.warnings.push(String::from(
                "service_definition: not set; create, diff and --update-service are unavailable",
            ));
        }

        if let Some(region) = &config.region {
            if !is_plausible_region(region) {
                result
                    .warnings
                    .push(format!("region: '{region}' does not look like an AWS region"));
            }
        }

        if let Some(codedeploy) = &config.codedeploy {
            if codedeploy.application_name.is_empty() {
                result.error(
                    "codedeploy.application_name",
                    "CodeDeploy application name cannot be empty",
                );
            }
            if codedeploy.deployment_group_name.is_empty() {
                result.error(
                    "codedeploy.deployment_group_name",
                    "CodeDeploy deployment group name cannot be empty",
                );
            }
        }

        if let Some(appspec) = &config.appspec {
            for (i, hook) in appspec.hooks.iter().enumerate() {
                let field = format!("appspec.hooks[{i}]");
                if hook.len() != 1 {
                    result.error(&field, "Each hook must map exactly one event to a function");
                    continue;
                }
                for (event, function) in hook {
                    if !APPSPEC_HOOK_EVENTS.contains(&event.as_str()) {
                        result.error(&field, format!("Unknown lifecycle event '{event}'"));
                    }
                    if function.is_empty() {
                        result.error(&field, format!("Hook '{event}' has no function"));
                    }
                }
            }
        }
    }

    fn validate_task_definition(td: &TaskDefinition, result: &mut ValidationResult) {
        if td.family.is_empty() {
            result.error("taskDefinition.family", "Family cannot be empty");
        }

        if let Some(mode) = &td.network_mode {
            if !NETWORK_MODES.contains(&mode.as_str()) {
                result.error(
                    "taskDefinition.networkMode",
                    format!("Unknown network mode '{mode}'"),
                );
            }
        }

        if td.container_definitions.is_empty() {
            result.error(
                "taskDefinition.containerDefinitions",
                "At least one container is required",
            );
        }

        let mut seen_names = HashSet::new();
        for (i, container) in td.container_definitions.iter().enumerate() {
            let prefix = format!("taskDefinition.containerDefinitions[{i}]");

            if container.name.is_empty() {
                result.error(format!("{prefix}.name"), "Container name cannot be empty");
            } else if !seen_names.insert(container.name.as_str()) {
                result.error(
                    format!("{prefix}.name"),
                    format!("Duplicate container name: {}", container.name),
                );
            }

            match container.image.as_deref() {
                None | Some("") => {
                    result.error(format!("{prefix}.image"), "Container image cannot be empty");
                }
                Some(image) if image.ends_with(":latest") => result.warnings.push(format!(
                    "{prefix}.image: Using ':latest' tag makes rollbacks unreliable"
                )),
                Some(_) => {}
            }

            let mut seen_env = HashSet::new();
            for env in &container.environment {
                if !seen_env.insert(env.name.as_str()) {
                    result.warnings.push(format!(
                        "{prefix}.environment: '{}' is set more than once",
                        env.name
                    ));
                }
            }
        }

        if td.is_awsvpc() {
            for (i, container) in td.container_definitions.iter().enumerate() {
                for mapping in &container.port_mappings {
                    if mapping.host_port.is_some() && mapping.host_port != mapping.container_port {
                        result.error(
                            format!("taskDefinition.containerDefinitions[{i}].portMappings"),
                            "Under awsvpc hostPort must equal containerPort",
                        );
                    }
                }
            }
        }
    }

    fn validate_service_definition(
        service: &Service,
        td: &TaskDefinition,
        result: &mut ValidationResult,
    ) {
        let controller = service.controller_type();
        if !matches!(controller, "ECS" | "CODE_DEPLOY") {
            result.error(
                "service.deploymentController.type",
                format!("Unsupported deployment controller type: {controller}"),
            );
        }

        if td.is_awsvpc()
            && service
                .network_configuration
                .as_ref()
                .and_then(|n| n.awsvpc_configuration.as_ref())
                .is_none()
        {
            result.error(
                "service.networkConfiguration",
                "awsvpc tasks need networkConfiguration.awsvpcConfiguration",
            );
        }

        for (i, lb) in service.load_balancers.iter().enumerate() {
            if let Some(name) = &lb.container_name {
                if !td.container_definitions.iter().any(|c| &c.name == name) {
                    result.error(
                        format!("service.loadBalancers[{i}].containerName"),
                        format!("Container '{name}' is not in the task definition"),
                    );
                }
            }
        }

        if controller == "CODE_DEPLOY" && service.load_balancers.len() > 1 {
            result.warnings.push(String::from(
                "service.loadBalancers: only the first binding is used for blue/green rollouts",
            ));
        }
    }
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn into_result(self) -> Result<Self> {
        match self.errors.first() {
            None => {
                debug!("Validation passed with {} warnings", self.warnings.len());
                Ok(self)
            }
            Some(first) => Err(ConfigError::validation(
                format!("{}: {}", first.field, first.message),
                first.field.clone(),
            )
            .into()),
        }
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Service names are 1-255 letters, digits, hyphens and underscores.
fn is_valid_service_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Regions look like `us-east-1` or `ap-northeast-1`.
fn is_plausible_region(region: &str) -> bool {
    let parts: Vec<_> = region.split('-').collect();
    parts.len() >= 3
        && parts.iter().all(|p| !p.is_empty())
        && parts
            .last()
            .is_some_and(|p| p.chars().all(|c| c.is_ascii_digit()))
}
