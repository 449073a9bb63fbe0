//! Rollout strategy selection and execution.
//!
//! A service is either updated in place by ECS (rolling) or handed to
//! CodeDeploy for a blue/green rollout. The strategy is chosen once per
//! operation from the live deployment controller, before anything mutates.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::aws::codedeploy::{CreateDeploymentRequest, DeploymentCoordinator, DeploymentGroupRef, console_url};
use crate::aws::ecs::ControlPlane;
use crate::aws::types::{CONTROLLER_CODE_DEPLOY, CONTROLLER_ECS, Service, UpdateServiceRequest, short_name};
use crate::error::{ConfigError, Result};

use super::appspec::{AppSpec, Hooks};

/// How a rollout is carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutStrategy {
    /// In-place update driven by ECS.
    Rolling,
    /// Blue/green deployment driven by CodeDeploy.
    BlueGreen(DeploymentGroupRef),
}

impl fmt::Display for RolloutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rolling => write!(f, "rolling"),
            Self::BlueGreen(group) => write!(f, "blue/green ({group})"),
        }
    }
}

impl RolloutStrategy {
    /// Selects the strategy for a live service.
    ///
    /// For CodeDeploy services the configured group is used; when none is
    /// configured the coordinator is asked for the group managing the
    /// service.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnsupportedDeploymentController` for controllers
    /// other than `ECS` and `CODE_DEPLOY`, and
    /// `ConfigError::MissingDeploymentGroup` when no group can be found.
    pub async fn select(
        cluster: &str,
        live: &Service,
        configured: Option<&DeploymentGroupRef>,
        coordinator: &dyn DeploymentCoordinator,
    ) -> Result<Self> {
        match live.controller_type() {
            CONTROLLER_ECS => Ok(Self::Rolling),
            CONTROLLER_CODE_DEPLOY => {
                if let Some(group) = configured {
                    return Ok(Self::BlueGreen(group.clone()));
                }
                let service = live.service_name.as_deref().unwrap_or_default();
                debug!("No CodeDeploy settings configured, discovering group for {service}");
                coordinator
                    .find_deployment_group(cluster, service)
                    .await?
                    .map(Self::BlueGreen)
                    .ok_or_else(|| {
                        ConfigError::MissingDeploymentGroup {
                            service: service.to_string(),
                            hint: String::from(
                                "set codedeploy.application_name and codedeploy.deployment_group_name",
                            ),
                        }
                        .into()
                    })
            }
            other => Err(ConfigError::UnsupportedDeploymentController {
                controller: other.to_string(),
            }
            .into()),
        }
    }
}

/// What a rollout produced, for the stability waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentHandle {
    /// Wait for the service itself to settle.
    Service {
        /// Cluster name or ARN.
        cluster: String,
        /// Service name.
        service: String,
    },
    /// Wait for a CodeDeploy deployment.
    CodeDeploy {
        /// Deployment group.
        group: DeploymentGroupRef,
        /// Deployment id; `None` means "the one currently in progress".
        deployment_id: Option<String>,
    },
}

impl fmt::Display for DeploymentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service { service, .. } => write!(f, "service {service}"),
            Self::CodeDeploy {
                deployment_id: Some(id),
                ..
            } => write!(f, "deployment {id}"),
            Self::CodeDeploy { group, .. } => write!(f, "deployment group {group}"),
        }
    }
}

/// One rollout to perform.
#[derive(Debug, Clone)]
pub struct RolloutRequest<'a> {
    /// Cluster name or ARN.
    pub cluster: &'a str,
    /// Live service.
    pub live: &'a Service,
    /// Task definition ARN to roll out.
    pub task_definition_arn: &'a str,
    /// Resolved desired count.
    pub desired_count: Option<i32>,
    /// Start new tasks even without definition changes.
    pub force_new_deployment: bool,
    /// Declared service whose settings replace the live ones.
    pub declared: Option<&'a Service>,
}

impl RolloutRequest<'_> {
    fn service_name(&self) -> &str {
        self.live
            .service_name
            .as_deref()
            .map_or("", short_name)
    }
}

/// Carries out a rollout.
#[async_trait]
pub trait RolloutExecutor: Send + Sync {
    /// Submits the rollout and returns without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns an error if any remote call fails.
    async fn execute(&self, request: &RolloutRequest<'_>) -> Result<DeploymentHandle>;
}

/// Rolling update through a single `UpdateService` call.
#[derive(Clone)]
pub struct RollingExecutor {
    control_plane: Arc<dyn ControlPlane>,
}

impl RollingExecutor {
    /// Creates a new rolling executor.
    #[must_use]
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self { control_plane }
    }
}

#[async_trait]
impl RolloutExecutor for RollingExecutor {
    async fn execute(&self, request: &RolloutRequest<'_>) -> Result<DeploymentHandle> {
        let service = request.service_name().to_string();
        let settings = request.declared.unwrap_or(request.live);

        let mut update = UpdateServiceRequest::new(request.cluster, service.clone())
            .with_settings_from(settings);
        update.task_definition = Some(request.task_definition_arn.to_string());
        update.desired_count = request.desired_count;
        update.force_new_deployment = request.force_new_deployment;

        info!(
            "Updating service {service}: task definition {}, desired count {}",
            request.task_definition_arn,
            request
                .desired_count
                .map_or_else(|| String::from("-"), |n| n.to_string())
        );
        self.control_plane.update_service(&update).await?;

        Ok(DeploymentHandle::Service {
            cluster: request.cluster.to_string(),
            service,
        })
    }
}

/// Blue/green rollout submitted to CodeDeploy.
#[derive(Clone)]
pub struct BlueGreenExecutor {
    control_plane: Arc<dyn ControlPlane>,
    coordinator: Arc<dyn DeploymentCoordinator>,
    group: DeploymentGroupRef,
    region: String,
    hooks: Hooks,
}

impl BlueGreenExecutor {
    /// Creates a new blue/green executor for `group`.
    #[must_use]
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        coordinator: Arc<dyn DeploymentCoordinator>,
        group: DeploymentGroupRef,
        region: impl Into<String>,
    ) -> Self {
        Self {
            control_plane,
            coordinator,
            group,
            region: region.into(),
            hooks: Vec::new(),
        }
    }

    /// Adds lifecycle hooks to every manifest.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }
}

#[async_trait]
impl RolloutExecutor for BlueGreenExecutor {
    async fn execute(&self, request: &RolloutRequest<'_>) -> Result<DeploymentHandle> {
        let service = request.service_name().to_string();

        if request.desired_count.is_some() && request.desired_count != request.live.desired_count {
            let mut update = UpdateServiceRequest::new(request.cluster, service.clone());
            update.desired_count = request.desired_count;
            info!(
                "Updating desired count of {service} to {}",
                request.desired_count.unwrap_or_default()
            );
            self.control_plane.update_service(&update).await?;
        }

        let appspec = AppSpec::new(request.task_definition_arn, &request.live.load_balancers)
            .with_platform_version(request.live.platform_version.clone())
            .with_hooks(self.hooks.clone())
            .to_yaml()?;
        debug!("AppSpec:\n{appspec}");

        let create = CreateDeploymentRequest::inline(&self.group, appspec)
            .with_description(format!("ecs-rollout: {}", request.task_definition_arn));
        let deployment_id = self.coordinator.create_deployment(&create).await?;

        info!(
            "Deployment {deployment_id} created: {}",
            console_url(&self.region, &deployment_id)
        );

        Ok(DeploymentHandle::CodeDeploy {
            group: self.group.clone(),
            deployment_id: Some(deployment_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::types::{DeploymentControllerSpec, LoadBalancer};
    use crate::engine::testing::{FakeControlPlane, FakeCoordinator};
    use crate::error::RolloutError;

    fn live_service(controller: &str) -> Service {
        Service {
            service_name: Some(String::from("web")),
            desired_count: Some(2),
            deployment_controller: Some(DeploymentControllerSpec {
                controller_type: controller.to_string(),
            }),
            ..Service::default()
        }
    }

    fn group() -> DeploymentGroupRef {
        DeploymentGroupRef::new("AppECS-default-web", "DgpECS-default-web")
    }

    #[tokio::test]
    async fn test_select_rolling() {
        let coordinator = FakeCoordinator::default();
        let strategy = RolloutStrategy::select("default", &live_service("ECS"), None, &coordinator)
            .await
            .expect("select");
        assert_eq!(strategy, RolloutStrategy::Rolling);
    }

    #[tokio::test]
    async fn test_select_blue_green_prefers_configured_group() {
        let coordinator = FakeCoordinator::default();
        let strategy = RolloutStrategy::select(
            "default",
            &live_service("CODE_DEPLOY"),
            Some(&group()),
            &coordinator,
        )
        .await
        .expect("select");
        assert_eq!(strategy, RolloutStrategy::BlueGreen(group()));
        assert_eq!(coordinator.calls().len(), 0);
    }

    #[tokio::test]
    async fn test_select_blue_green_discovers_group() {
        let coordinator = FakeCoordinator::default().with_group(group());
        let strategy =
            RolloutStrategy::select("default", &live_service("CODE_DEPLOY"), None, &coordinator)
                .await
                .expect("select");
        assert_eq!(strategy, RolloutStrategy::BlueGreen(group()));

        let coordinator = FakeCoordinator::default();
        let err =
            RolloutStrategy::select("default", &live_service("CODE_DEPLOY"), None, &coordinator)
                .await
                .expect_err("no group");
        assert!(matches!(
            err,
            RolloutError::Config(ConfigError::MissingDeploymentGroup { .. })
        ));
    }

    #[tokio::test]
    async fn test_select_unsupported_controller() {
        let coordinator = FakeCoordinator::default();
        let err = RolloutStrategy::select("default", &live_service("EXTERNAL"), None, &coordinator)
            .await
            .expect_err("unsupported");
        assert!(matches!(
            err,
            RolloutError::Config(ConfigError::UnsupportedDeploymentController { ref controller })
                if controller == "EXTERNAL"
        ));
    }

    #[tokio::test]
    async fn test_rolling_executor_copies_declared_settings() {
        let control_plane = Arc::new(FakeControlPlane::default());
        let executor = RollingExecutor::new(control_plane.clone());
        let live = live_service("ECS");
        let declared = Service {
            health_check_grace_period_seconds: Some(30),
            ..Service::default()
        };

        let handle = executor
            .execute(&RolloutRequest {
                cluster: "default",
                live: &live,
                task_definition_arn: "arn:aws:ecs:us-east-1:1:task-definition/web:5",
                desired_count: Some(2),
                force_new_deployment: true,
                declared: Some(&declared),
            })
            .await
            .expect("execute");

        assert_eq!(
            handle,
            DeploymentHandle::Service {
                cluster: String::from("default"),
                service: String::from("web"),
            }
        );
        let updates = control_plane.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].health_check_grace_period_seconds, Some(30));
        assert!(updates[0].force_new_deployment);
        assert_eq!(
            updates[0].task_definition.as_deref(),
            Some("arn:aws:ecs:us-east-1:1:task-definition/web:5")
        );
    }

    #[tokio::test]
    async fn test_blue_green_updates_count_before_deployment() {
        let control_plane = Arc::new(FakeControlPlane::default());
        let coordinator = Arc::new(FakeCoordinator::default());
        let executor = BlueGreenExecutor::new(
            control_plane.clone(),
            coordinator.clone(),
            group(),
            "us-east-1",
        );
        let mut live = live_service("CODE_DEPLOY");
        live.load_balancers = vec![LoadBalancer {
            container_name: Some(String::from("app")),
            container_port: Some(80),
            ..LoadBalancer::default()
        }];

        let handle = executor
            .execute(&RolloutRequest {
                cluster: "default",
                live: &live,
                task_definition_arn: "arn:aws:ecs:us-east-1:1:task-definition/web:5",
                desired_count: Some(4),
                force_new_deployment: false,
                declared: None,
            })
            .await
            .expect("execute");

        let updates = control_plane.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].desired_count, Some(4));
        assert_eq!(updates[0].task_definition, None);

        let created = coordinator.created();
        assert_eq!(created.len(), 1);
        assert!(created[0].appspec.contains("ContainerPort: 80"));

        match handle {
            DeploymentHandle::CodeDeploy { deployment_id, .. } => {
                assert_eq!(deployment_id.as_deref(), Some("d-0000001"));
            }
            other => panic!("unexpected handle: {other}"),
        }
    }

    #[tokio::test]
    async fn test_blue_green_skips_count_update_when_unchanged() {
        let control_plane = Arc::new(FakeControlPlane::default());
        let coordinator = Arc::new(FakeCoordinator::default());
        let executor =
            BlueGreenExecutor::new(control_plane.clone(), coordinator, group(), "us-east-1");
        let live = live_service("CODE_DEPLOY");

        executor
            .execute(&RolloutRequest {
                cluster: "default",
                live: &live,
                task_definition_arn: "arn:aws:ecs:us-east-1:1:task-definition/web:5",
                desired_count: Some(2),
                force_new_deployment: false,
                declared: None,
            })
            .await
            .expect("execute");

        assert!(control_plane.updates().is_empty());
    }
}
