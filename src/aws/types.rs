//! ECS API types and data structures.
//!
//! These mirror the JSON shapes of the ECS API, which is also the format of
//! the definition files. Fields the engine reasons about are modelled
//! explicitly; everything else is carried through the flattened `extra` map
//! so declared settings survive a round trip and still take part in diffs.
//! `convert` maps them to and from the SDK types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Pass-through JSON fields.
pub type Extra = Map<String, Value>;

/// An ECS task definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    /// Family name.
    #[serde(default)]
    pub family: String,
    /// Task IAM role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_role_arn: Option<String>,
    /// Execution IAM role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_role_arn: Option<String>,
    /// Network mode (`awsvpc`, `bridge`, `host`, `none`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    /// Containers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_definitions: Vec<ContainerDefinition>,
    /// Task placement constraints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placement_constraints: Vec<Value>,
    /// Launch types this definition is validated against.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_compatibilities: Vec<String>,

    /// Full ARN (assigned by the control plane).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_definition_arn: Option<String>,
    /// Revision number (assigned by the control plane).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
    /// `ACTIVE`, `INACTIVE` or `DELETE_IN_PROGRESS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Attributes the control plane derived from the containers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_attributes: Option<Vec<Value>>,
    /// Launch types the definition turned out to be compatible with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibilities: Option<Vec<String>>,
    /// Registration time (epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<f64>,
    /// Principal that registered the revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_by: Option<String>,
    /// Deregistration time (epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deregistered_at: Option<f64>,

    /// Every other field (cpu, memory, volumes, tags, ...).
    #[serde(flatten)]
    pub extra: Extra,
}

/// A container inside a task definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefinition {
    /// Container name.
    #[serde(default)]
    pub name: String,
    /// Image reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// CPU units reserved for the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<i64>,
    /// Whether the task stops when this container stops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,
    /// Environment variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<KeyValuePair>,
    /// Port mappings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<PortMapping>,
    /// Mount points.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mount_points: Vec<MountPoint>,
    /// Secrets injected from Secrets Manager or SSM.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<Secret>,
    /// Volumes shared from other containers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes_from: Vec<VolumeFrom>,
    /// Every other field (logConfiguration, command, healthCheck, ...).
    #[serde(flatten)]
    pub extra: Extra,
}

/// Environment variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    /// Variable name.
    #[serde(default)]
    pub name: String,
    /// Variable value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Container port mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    /// Port inside the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_port: Option<i32>,
    /// Port on the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<i32>,
    /// `tcp` or `udp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Every other field (name, appProtocol, ...).
    #[serde(flatten)]
    pub extra: Extra,
}

/// Volume mount inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountPoint {
    /// Task volume name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_volume: Option<String>,
    /// Path in the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_path: Option<String>,
    /// Read-only mount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

/// Secret reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    /// Environment variable name.
    #[serde(default)]
    pub name: String,
    /// ARN or parameter name.
    #[serde(default)]
    pub value_from: String,
}

/// Volumes mounted from another container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeFrom {
    /// Source container name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_container: Option<String>,
    /// Read-only mount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

/// An ECS service, used both for the declared service definition and for
/// the live service returned by `DescribeServices`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Service ARN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_arn: Option<String>,
    /// Service name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Cluster ARN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_arn: Option<String>,
    /// `ACTIVE`, `DRAINING` or `INACTIVE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Desired task count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_count: Option<i32>,
    /// Running task count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_count: Option<i32>,
    /// Pending task count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_count: Option<i32>,
    /// `EC2`, `FARGATE` or `EXTERNAL`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_type: Option<String>,
    /// Fargate platform version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_version: Option<String>,
    /// Task definition ARN the primary deployment runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_definition: Option<String>,
    /// Rolling update percentages and circuit breaker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_configuration: Option<DeploymentConfiguration>,
    /// Deployment controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_controller: Option<DeploymentControllerSpec>,
    /// Scheduling strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_strategy: Option<SchedulingStrategy>,
    /// Grace period before load balancer health checks count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_grace_period_seconds: Option<i32>,
    /// awsvpc network configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_configuration: Option<NetworkConfiguration>,
    /// Load balancer bindings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_balancers: Vec<LoadBalancer>,
    /// Placement constraints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placement_constraints: Vec<Value>,
    /// Placement strategy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placement_strategy: Vec<Value>,
    /// Capacity provider strategy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capacity_provider_strategy: Vec<Value>,

    /// Service-linked role ARN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    /// Deployments currently tracked by the service.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployments: Vec<Deployment>,
    /// Recent service events, newest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<ServiceEvent>,
    /// Task sets (external and CodeDeploy controllers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_sets: Option<Vec<Value>>,
    /// Creation time (epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
    /// Principal that created the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Every other field (tags, propagateTags, serviceRegistries, ...).
    #[serde(flatten)]
    pub extra: Extra,
}

/// Rolling update configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfiguration {
    /// Upper bound of running tasks, in percent of the desired count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_percent: Option<i32>,
    /// Lower bound of healthy tasks, in percent of the desired count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_healthy_percent: Option<i32>,
    /// Deployment circuit breaker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_circuit_breaker: Option<CircuitBreaker>,
    /// Every other field (alarms, ...).
    #[serde(flatten)]
    pub extra: Extra,
}

/// Deployment circuit breaker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    /// Whether the breaker is enabled.
    #[serde(default)]
    pub enable: bool,
    /// Whether a tripped breaker rolls back.
    #[serde(default)]
    pub rollback: bool,
}

/// Deployment controller as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentControllerSpec {
    /// `ECS`, `CODE_DEPLOY` or `EXTERNAL`.
    #[serde(rename = "type")]
    pub controller_type: String,
}

/// Rolling deployments driven by ECS itself.
pub const CONTROLLER_ECS: &str = "ECS";

/// Blue/green deployments driven by CodeDeploy.
pub const CONTROLLER_CODE_DEPLOY: &str = "CODE_DEPLOY";

/// `extra` service keys that are control-plane state or identity, never a
/// declared setting.
pub const RUNTIME_SERVICE_KEYS: &[&str] = &[
    "platformFamily",
    "currentServiceDeployment",
    "currentServiceRevisions",
    "resourceManagementType",
    "cluster",
];

/// Service scheduling strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulingStrategy {
    /// Maintain a desired count of tasks.
    #[default]
    Replica,
    /// One task per container instance.
    Daemon,
}

/// Network configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfiguration {
    /// awsvpc settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awsvpc_configuration: Option<AwsVpcConfiguration>,
}

/// awsvpc settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsVpcConfiguration {
    /// Subnet ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<String>,
    /// Security group ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,
    /// `ENABLED` or `DISABLED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_public_ip: Option<String>,
}

/// Load balancer binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    /// Target group ARN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group_arn: Option<String>,
    /// Classic load balancer name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_name: Option<String>,
    /// Container receiving traffic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Container port receiving traffic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_port: Option<i32>,
}

/// One rollout tracked by a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Deployment id.
    #[serde(default)]
    pub id: String,
    /// `PRIMARY`, `ACTIVE` or `INACTIVE`.
    #[serde(default)]
    pub status: String,
    /// Task definition ARN.
    #[serde(default)]
    pub task_definition: String,
    /// Desired task count.
    #[serde(default)]
    pub desired_count: i32,
    /// Pending task count.
    #[serde(default)]
    pub pending_count: i32,
    /// Running task count.
    #[serde(default)]
    pub running_count: i32,
    /// Tasks that failed to launch.
    #[serde(default)]
    pub failed_tasks: i32,
    /// `IN_PROGRESS`, `COMPLETED` or `FAILED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_state: Option<String>,
    /// Why the rollout is in its current state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_state_reason: Option<String>,
    /// Creation time (epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
    /// Last update time (epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<f64>,
}

/// Service event message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEvent {
    /// Event id.
    #[serde(default)]
    pub id: String,
    /// Event time (epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
    /// Event message.
    #[serde(default)]
    pub message: String,
}

/// `UpdateService` input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateServiceRequest {
    /// Cluster name or ARN.
    pub cluster: String,
    /// Service name.
    pub service: String,
    /// Task definition to roll out.
    pub task_definition: Option<String>,
    /// Desired count.
    pub desired_count: Option<i32>,
    /// Start a new deployment even without definition changes.
    pub force_new_deployment: bool,
    /// Rolling update configuration.
    pub deployment_configuration: Option<DeploymentConfiguration>,
    /// Network configuration.
    pub network_configuration: Option<NetworkConfiguration>,
    /// Fargate platform version.
    pub platform_version: Option<String>,
    /// Health check grace period.
    pub health_check_grace_period_seconds: Option<i32>,
    /// Capacity provider strategy.
    pub capacity_provider_strategy: Option<Vec<Value>>,
    /// Placement constraints.
    pub placement_constraints: Option<Vec<Value>>,
    /// Placement strategy.
    pub placement_strategy: Option<Vec<Value>>,
}

impl UpdateServiceRequest {
    /// Creates an update request that changes nothing yet.
    #[must_use]
    pub fn new(cluster: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            service: service.into(),
            ..Self::default()
        }
    }

    /// Copies the settings the control plane expects to be re-submitted
    /// with every update.
    #[must_use]
    pub fn with_settings_from(mut self, source: &Service) -> Self {
        self.deployment_configuration
            .clone_from(&source.deployment_configuration);
        self.network_configuration
            .clone_from(&source.network_configuration);
        self.platform_version.clone_from(&source.platform_version);
        self.health_check_grace_period_seconds = source.health_check_grace_period_seconds;
        self.capacity_provider_strategy = non_empty(&source.capacity_provider_strategy);
        self.placement_constraints = non_empty(&source.placement_constraints);
        self.placement_strategy = non_empty(&source.placement_strategy);
        self
    }
}

fn non_empty(values: &[Value]) -> Option<Vec<Value>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

/// `CreateService` input: the declared definition plus identity fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateServiceRequest {
    /// Cluster name or ARN.
    pub cluster: String,
    /// Service name.
    pub service_name: String,
    /// Task definition ARN.
    pub task_definition: String,
    /// Desired count (omitted for daemon services).
    pub desired_count: Option<i32>,
    /// Remaining declared settings.
    pub definition: Service,
}

impl CreateServiceRequest {
    /// Builds a create request from a declared service definition.
    ///
    /// Identity and runtime fields of the definition are cleared so they
    /// cannot collide with the explicit ones.
    #[must_use]
    pub fn from_definition(
        cluster: impl Into<String>,
        service_name: impl Into<String>,
        task_definition: impl Into<String>,
        desired_count: Option<i32>,
        mut definition: Service,
    ) -> Self {
        definition.service_name = None;
        definition.desired_count = None;
        definition.task_definition = None;
        definition.clear_runtime_fields();
        definition.extra.remove("cluster");
        Self {
            cluster: cluster.into(),
            service_name: service_name.into(),
            task_definition: task_definition.into(),
            desired_count,
            definition,
        }
    }
}

impl Service {
    /// Returns the deployment controller type, defaulting to `ECS`.
    #[must_use]
    pub fn controller_type(&self) -> &str {
        self.deployment_controller
            .as_ref()
            .map_or(CONTROLLER_ECS, |c| c.controller_type.as_str())
    }

    /// Returns the scheduling strategy, defaulting to `REPLICA`.
    #[must_use]
    pub fn scheduling(&self) -> SchedulingStrategy {
        self.scheduling_strategy.unwrap_or_default()
    }

    /// Returns the `PRIMARY` deployment, if any.
    #[must_use]
    pub fn primary_deployment(&self) -> Option<&Deployment> {
        self.deployments.iter().find(|d| d.status == "PRIMARY")
    }

    /// Returns true when the service has converged: a single deployment
    /// whose running count matches the desired count.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.deployments.len() == 1 && self.running_count == self.desired_count
    }

    /// Removes every field populated only by the control plane.
    pub fn clear_runtime_fields(&mut self) {
        self.service_arn = None;
        self.cluster_arn = None;
        self.status = None;
        self.running_count = None;
        self.pending_count = None;
        self.role_arn = None;
        self.deployments.clear();
        self.events.clear();
        self.task_sets = None;
        self.created_at = None;
        self.created_by = None;
    }
}

impl TaskDefinition {
    /// Removes every field populated only by the control plane.
    pub fn clear_runtime_fields(&mut self) {
        self.task_definition_arn = None;
        self.revision = None;
        self.status = None;
        self.requires_attributes = None;
        self.compatibilities = None;
        self.registered_at = None;
        self.registered_by = None;
        self.deregistered_at = None;
    }

    /// Returns the definition as `RegisterTaskDefinition` input.
    #[must_use]
    pub fn to_register_input(&self) -> Self {
        let mut input = self.clone();
        input.clear_runtime_fields();
        input
    }

    /// Returns `family:revision`, or the family when no revision is known.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.revision.map_or_else(
            || self.family.clone(),
            |revision| format!("{}:{revision}", self.family),
        )
    }

    /// Returns true when the task uses awsvpc networking.
    #[must_use]
    pub fn is_awsvpc(&self) -> bool {
        self.network_mode.as_deref() == Some("awsvpc")
    }
}

/// Splits a task definition reference (`family:revision` or a full ARN)
/// into its family and revision.
#[must_use]
pub fn parse_task_definition_ref(reference: &str) -> Option<(&str, u32)> {
    let name = reference.rsplit('/').next().unwrap_or(reference);
    let (family, revision) = name.rsplit_once(':')?;
    let revision = revision.parse().ok()?;
    if family.is_empty() {
        return None;
    }
    Some((family, revision))
}

/// Returns the short name of a cluster or service given its name or ARN.
#[must_use]
pub fn short_name(name_or_arn: &str) -> &str {
    name_or_arn.rsplit('/').next().unwrap_or(name_or_arn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_definition_arn() {
        let arn = "arn:aws:ecs:ap-northeast-1:123456789012:task-definition/web:45";
        assert_eq!(parse_task_definition_ref(arn), Some(("web", 45)));
        assert_eq!(parse_task_definition_ref("web:3"), Some(("web", 3)));
        assert_eq!(parse_task_definition_ref("web"), None);
        assert_eq!(parse_task_definition_ref(":3"), None);
    }

    #[test]
    fn test_service_deserializes_unknown_fields_into_extra() {
        let json = r#"{
            "serviceName": "web",
            "desiredCount": 2,
            "deploymentController": {"type": "CODE_DEPLOY"},
            "propagateTags": "SERVICE",
            "enableECSManagedTags": true
        }"#;
        let service: Service = serde_json::from_str(json).unwrap();
        assert_eq!(service.controller_type(), CONTROLLER_CODE_DEPLOY);
        assert_eq!(service.desired_count, Some(2));
        assert_eq!(service.extra["propagateTags"], "SERVICE");
        assert_eq!(service.extra["enableECSManagedTags"], true);
        assert_eq!(service.scheduling(), SchedulingStrategy::Replica);
    }

    #[test]
    fn test_update_request_copies_resubmitted_settings() {
        let declared = Service {
            platform_version: Some(String::from("1.4.0")),
            health_check_grace_period_seconds: Some(30),
            placement_strategy: vec![serde_json::json!({"type": "spread", "field": "attribute:ecs.availability-zone"})],
            launch_type: Some(String::from("FARGATE")),
            ..Service::default()
        };
        let request = UpdateServiceRequest::new("default", "web").with_settings_from(&declared);
        assert_eq!(request.platform_version.as_deref(), Some("1.4.0"));
        assert_eq!(request.health_check_grace_period_seconds, Some(30));
        assert_eq!(request.placement_strategy.as_ref().map(Vec::len), Some(1));
        assert!(request.placement_constraints.is_none());
        assert!(request.task_definition.is_none());
    }

    #[test]
    fn test_create_request_does_not_duplicate_identity() {
        let mut definition = Service {
            service_name: Some(String::from("ignored")),
            desired_count: Some(9),
            launch_type: Some(String::from("FARGATE")),
            ..Service::default()
        };
        definition.extra.insert(String::from("cluster"), serde_json::json!("other"));
        let request = CreateServiceRequest::from_definition(
            "default",
            "web",
            "arn:aws:ecs:us-east-1:1:task-definition/web:1",
            Some(2),
            definition,
        );
        assert_eq!(request.service_name, "web");
        assert_eq!(request.desired_count, Some(2));
        assert!(request.definition.service_name.is_none());
        assert!(request.definition.desired_count.is_none());
        assert!(!request.definition.extra.contains_key("cluster"));
        assert_eq!(request.definition.launch_type.as_deref(), Some("FARGATE"));
    }

    #[test]
    fn test_is_stable() {
        let mut service = Service {
            desired_count: Some(2),
            running_count: Some(2),
            deployments: vec![Deployment::default()],
            ..Service::default()
        };
        assert!(service.is_stable());

        service.deployments.push(Deployment::default());
        assert!(!service.is_stable());
    }
}
