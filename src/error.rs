//! Error types for the rollout engine.
//!
//! This module provides the error hierarchy for every stage of an operation:
//! configuration and definition loading, lookups that may legitimately come
//! back empty, remote API calls, and stability waits.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the rollout engine.
#[derive(Debug, Error)]
pub enum RolloutError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A resource the operation depends on does not exist.
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// Remote API errors.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Stability wait errors.
    #[error("Wait failed: {0}")]
    Wait(#[from] WaitError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration or definition file was not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The file could not be parsed.
    #[error("Failed to parse {}: {message}", location.as_deref().unwrap_or("input"))]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// A template expression could not be evaluated.
    #[error("Template error in {location}: {message}")]
    TemplateError {
        /// Description of the template error.
        message: String,
        /// File the template came from.
        location: String,
    },

    /// Validation failed.
    #[error("Validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// The live service uses a deployment controller this engine cannot drive.
    #[error("Unsupported deployment controller type: {controller}")]
    UnsupportedDeploymentController {
        /// Controller type reported by the control plane.
        controller: String,
    },

    /// A blue/green service has no usable CodeDeploy deployment group.
    #[error("No CodeDeploy deployment group for service {service}: {hint}")]
    MissingDeploymentGroup {
        /// Service name.
        service: String,
        /// What to configure.
        hint: String,
    },
}

/// Lookups that found nothing.
///
/// Some of these are benign (a missing scalable target only produces a
/// warning) so they are kept apart from hard failures.
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// The service does not exist in the cluster.
    #[error("service {service} in cluster {cluster}")]
    Service {
        /// Cluster name.
        cluster: String,
        /// Service name.
        service: String,
    },

    /// No scalable target registered for the resource.
    #[error("scalable target for {resource_id}")]
    ScalableTarget {
        /// Application Auto Scaling resource id.
        resource_id: String,
    },

    /// No in-progress CodeDeploy deployment for the group.
    #[error("in-progress deployment for {application}/{deployment_group}")]
    InProgressDeployment {
        /// CodeDeploy application name.
        application: String,
        /// CodeDeploy deployment group name.
        deployment_group: String,
    },

    /// No revision older than the current one can be deployed.
    #[error("rollback target older than {current}")]
    RollbackTarget {
        /// Task definition currently deployed.
        current: String,
    },

    /// Task definition could not be described.
    #[error("task definition {task_definition}")]
    TaskDefinition {
        /// Family, family:revision or ARN.
        task_definition: String,
    },
}

/// Remote API errors, wrapped with the operation that failed.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API returned an error response.
    #[error("{operation} failed: {code}: {message}")]
    RequestFailed {
        /// API operation name (e.g. `ecs:UpdateService`).
        operation: String,
        /// AWS error code (`ClientException`, `ThrottlingException`, ...).
        code: String,
        /// Error message from the API.
        message: String,
    },

    /// Credentials or region could not be resolved, or the request could
    /// not be built.
    #[error("{operation}: credentials error: {message}")]
    Credentials {
        /// API operation name.
        operation: String,
        /// Description of the problem.
        message: String,
    },

    /// Network error.
    #[error("{operation}: network error: {message}")]
    Network {
        /// API operation name.
        operation: String,
        /// Description of the network error.
        message: String,
    },

    /// The response body did not match the expected shape.
    #[error("{operation}: invalid response: {message}")]
    InvalidResponse {
        /// API operation name.
        operation: String,
        /// Description of the response issue.
        message: String,
    },
}

/// Stability wait errors.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The deadline passed before the target became stable. The rollout
    /// was submitted but is not confirmed.
    #[error("timed out after {waited_secs}s waiting for {target}")]
    TimedOut {
        /// What was being waited for.
        target: String,
        /// Configured timeout in seconds.
        waited_secs: u64,
    },

    /// The rollout reached a failed or stopped terminal state.
    #[error("{target} finished with status {status}: {reason}")]
    Failed {
        /// What was being waited for.
        target: String,
        /// Terminal status.
        status: String,
        /// Reason reported by the control plane.
        reason: String,
    },

    /// The caller cancelled the wait.
    #[error("wait for {target} was cancelled")]
    Cancelled {
        /// What was being waited for.
        target: String,
    },

    /// More than one deployment matched where exactly one was required.
    #[error("{message}")]
    Ambiguous {
        /// Description of the ambiguity.
        message: String,
    },
}

/// Result type alias for rollout operations.
pub type Result<T> = std::result::Result<T, RolloutError>;

impl RolloutError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true for not-found conditions.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true when a rollout was submitted but its outcome is unknown.
    #[must_use]
    pub const fn is_unconfirmed(&self) -> bool {
        matches!(
            self,
            Self::Wait(WaitError::TimedOut { .. } | WaitError::Cancelled { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a parse error tied to a source location.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: Some(location.into()),
        }
    }
}

impl ApiError {
    /// Creates an API request error.
    #[must_use]
    pub fn request_failed(
        operation: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RequestFailed {
            operation: operation.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns the AWS error code, if the API produced one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::RequestFailed { code, .. } => Some(code),
            _ => None,
        }
    }
}
