//! Application Auto Scaling client.
//!
//! Only ECS service desired-count targets are handled.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_applicationautoscaling::Client;
use aws_sdk_applicationautoscaling::types::{ScalableDimension, ServiceNamespace};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

use super::convert::{count, flag, named, owned, slice};
use super::sdk::api_error;

/// Service namespace of ECS scalable targets.
pub const ECS_NAMESPACE: &str = "ecs";

/// Scalable dimension of an ECS service.
pub const DESIRED_COUNT_DIMENSION: &str = "ecs:service:DesiredCount";

/// Returns the resource id of a service (`service/<cluster>/<service>`).
#[must_use]
pub fn service_resource_id(cluster: &str, service: &str) -> String {
    format!(
        "service/{}/{}",
        super::types::short_name(cluster),
        super::types::short_name(service)
    )
}

/// A registered scalable target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalableTarget {
    /// Service namespace.
    #[serde(default)]
    pub service_namespace: String,
    /// Resource id.
    #[serde(default)]
    pub resource_id: String,
    /// Scalable dimension.
    #[serde(default)]
    pub scalable_dimension: String,
    /// Minimum capacity.
    #[serde(default)]
    pub min_capacity: i32,
    /// Maximum capacity.
    #[serde(default)]
    pub max_capacity: i32,
    /// Suspension flags.
    #[serde(default)]
    pub suspended_state: SuspendedState,
}

/// Which scaling activities are suspended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SuspendedState {
    /// Scale-in by target tracking and step policies.
    #[serde(default)]
    pub dynamic_scaling_in_suspended: bool,
    /// Scale-out by target tracking and step policies.
    #[serde(default)]
    pub dynamic_scaling_out_suspended: bool,
    /// Scheduled actions.
    #[serde(default)]
    pub scheduled_scaling_suspended: bool,
}

impl SuspendedState {
    /// All three activities set to `suspended`.
    #[must_use]
    pub const fn all(suspended: bool) -> Self {
        Self {
            dynamic_scaling_in_suspended: suspended,
            dynamic_scaling_out_suspended: suspended,
            scheduled_scaling_suspended: suspended,
        }
    }
}

/// `RegisterScalableTarget` input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterScalableTargetRequest {
    /// Service namespace.
    pub service_namespace: String,
    /// Resource id.
    pub resource_id: String,
    /// Scalable dimension.
    pub scalable_dimension: String,
    /// Minimum capacity.
    pub min_capacity: Option<i32>,
    /// Maximum capacity.
    pub max_capacity: Option<i32>,
    /// Suspension flags.
    pub suspended_state: Option<SuspendedState>,
}

/// Operations the engine needs from the auto-scaling service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScalingRegistry: Send + Sync {
    /// Returns the desired-count target of `resource_id`, if registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn describe_scalable_target(&self, resource_id: &str) -> Result<Option<ScalableTarget>>;

    /// Registers (or re-registers) a scalable target.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn register_scalable_target(&self, request: &RegisterScalableTargetRequest) -> Result<()>;
}

/// Application Auto Scaling client over the AWS SDK.
#[derive(Debug, Clone)]
pub struct AutoScalingClient {
    client: Client,
}

impl AutoScalingClient {
    /// Creates a client from a loaded SDK configuration.
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        Self::with_client(Client::new(config))
    }

    /// Wraps an existing SDK client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ScalingRegistry for AutoScalingClient {
    async fn describe_scalable_target(&self, resource_id: &str) -> Result<Option<ScalableTarget>> {
        debug!("Describing scalable target {resource_id}");
        let output = self
            .client
            .describe_scalable_targets()
            .service_namespace(ServiceNamespace::from(ECS_NAMESPACE))
            .resource_ids(resource_id)
            .scalable_dimension(ScalableDimension::from(DESIRED_COUNT_DIMENSION))
            .send()
            .await
            .map_err(|e| api_error("application-autoscaling:DescribeScalableTargets", &e))?;

        Ok(slice(output.scalable_targets())
            .iter()
            .map(|target| ScalableTarget {
                service_namespace: named(target.service_namespace()).unwrap_or_default(),
                resource_id: owned(target.resource_id()).unwrap_or_default(),
                scalable_dimension: named(target.scalable_dimension()).unwrap_or_default(),
                min_capacity: count(target.min_capacity()).unwrap_or_default(),
                max_capacity: count(target.max_capacity()).unwrap_or_default(),
                suspended_state: target
                    .suspended_state()
                    .map(|state| SuspendedState {
                        dynamic_scaling_in_suspended: flag(state.dynamic_scaling_in_suspended())
                            .unwrap_or_default(),
                        dynamic_scaling_out_suspended: flag(state.dynamic_scaling_out_suspended())
                            .unwrap_or_default(),
                        scheduled_scaling_suspended: flag(state.scheduled_scaling_suspended())
                            .unwrap_or_default(),
                    })
                    .unwrap_or_default(),
            })
            .find(|t| t.resource_id == resource_id))
    }

    async fn register_scalable_target(&self, request: &RegisterScalableTargetRequest) -> Result<()> {
        debug!("Registering scalable target {}", request.resource_id);
        let suspended_state = request.suspended_state.map(|state| {
            aws_sdk_applicationautoscaling::types::SuspendedState::builder()
                .dynamic_scaling_in_suspended(state.dynamic_scaling_in_suspended)
                .dynamic_scaling_out_suspended(state.dynamic_scaling_out_suspended)
                .scheduled_scaling_suspended(state.scheduled_scaling_suspended)
                .build()
        });
        self.client
            .register_scalable_target()
            .service_namespace(ServiceNamespace::from(request.service_namespace.as_str()))
            .resource_id(&request.resource_id)
            .scalable_dimension(ScalableDimension::from(request.scalable_dimension.as_str()))
            .set_min_capacity(request.min_capacity)
            .set_max_capacity(request.max_capacity)
            .set_suspended_state(suspended_state)
            .send()
            .await
            .map_err(|e| api_error("application-autoscaling:RegisterScalableTarget", &e))?;
        Ok(())
    }
}
