//! AppSpec manifests for CodeDeploy ECS deployments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aws::types::LoadBalancer;
use crate::error::{ConfigError, Result};

/// Resource type of an ECS service in an AppSpec.
const ECS_SERVICE_TYPE: &str = "AWS::ECS::Service";

/// Lifecycle hooks: each entry maps one event name to a Lambda function.
pub type Hooks = Vec<BTreeMap<String, String>>;

/// An AppSpec document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSpec {
    /// Format version, always `0.0`.
    pub version: f64,
    /// Exactly one target service.
    #[serde(rename = "Resources")]
    pub resources: Vec<AppSpecResource>,
    /// Lifecycle hooks.
    #[serde(rename = "Hooks", default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Hooks,
}

/// Entry of the `Resources` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpecResource {
    /// The service receiving the new task set.
    #[serde(rename = "TargetService")]
    pub target_service: TargetService,
}

/// Target service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TargetService {
    /// Always `AWS::ECS::Service`.
    #[serde(rename = "Type")]
    pub resource_type: String,
    /// Replacement task set settings.
    pub properties: TargetProperties,
}

/// Replacement task set settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TargetProperties {
    /// Task definition ARN.
    pub task_definition: String,
    /// Container that receives production traffic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_info: Option<LoadBalancerInfo>,
    /// Fargate platform version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_version: Option<String>,
}

/// Container that receives production traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancerInfo {
    /// Container name.
    pub container_name: String,
    /// Container port.
    pub container_port: i32,
}

impl AppSpec {
    /// Builds a manifest for `task_definition_arn`.
    ///
    /// Only the first load balancer binding of the service is carried over.
    #[must_use]
    pub fn new(task_definition_arn: impl Into<String>, load_balancers: &[LoadBalancer]) -> Self {
        let load_balancer_info = load_balancers.first().and_then(|lb| {
            Some(LoadBalancerInfo {
                container_name: lb.container_name.clone()?,
                container_port: lb.container_port?,
            })
        });

        Self {
            version: 0.0,
            resources: vec![AppSpecResource {
                target_service: TargetService {
                    resource_type: ECS_SERVICE_TYPE.to_string(),
                    properties: TargetProperties {
                        task_definition: task_definition_arn.into(),
                        load_balancer_info,
                        platform_version: None,
                    },
                },
            }],
            hooks: Vec::new(),
        }
    }

    /// Sets the platform version of the replacement task set.
    #[must_use]
    pub fn with_platform_version(mut self, platform_version: Option<String>) -> Self {
        for resource in &mut self.resources {
            resource
                .target_service
                .properties
                .platform_version
                .clone_from(&platform_version);
        }
        self
    }

    /// Sets the lifecycle hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Renders the manifest as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::parse(format!("Failed to render AppSpec: {e}"), "appspec").into())
    }
}
