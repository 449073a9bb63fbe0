//! Top-level operations on one service.
//!
//! Every operation reads the live service first and picks the rollout
//! strategy before anything mutates, so a dry run surfaces the same
//! configuration errors a real run would. Dry runs stop short of every
//! mutating call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aws::autoscaling::{ScalableTarget, ScalingRegistry, service_resource_id};
use crate::aws::codedeploy::DeploymentCoordinator;
use crate::aws::ecs::ControlPlane;
use crate::aws::types::{CreateServiceRequest, Service, TaskDefinition, UpdateServiceRequest};
use crate::aws::{AutoScalingClient, CodeDeployClient, EcsClient, load_sdk_config};
use crate::config::{ConfigValidator, DefinitionLoader, RolloutConfig, ValidationResult};
use crate::engine::count::{self, DesiredCountPolicy};
use crate::engine::{
    AutoScalingCoordinator, AutoScalingPolicy, BlueGreenExecutor, DeploymentHandle, DiffEngine,
    DiffReport, ProgressSink, RollbackResolver, RollingExecutor, RolloutExecutor, RolloutRequest,
    RolloutStrategy, StabilityWaiter, TracingProgress,
};
use crate::error::{ConfigError, Result, RolloutError};

/// Options for `deploy`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    /// Run every read-only step and skip every mutating call.
    pub dry_run: bool,
    /// Return once the rollout is submitted.
    pub no_wait: bool,
    /// Desired count to roll out with.
    pub desired_count: DesiredCountPolicy,
    /// Start new tasks even when nothing changed.
    pub force_new_deployment: bool,
    /// Apply the declared service settings along with the new revision.
    pub update_service: bool,
    /// Keep the task definition the service runs now.
    pub skip_task_definition: bool,
    /// Use the latest active revision of the family instead of registering.
    pub latest_task_definition: bool,
    /// Auto-scaling changes applied before the rollout.
    pub auto_scaling: AutoScalingPolicy,
}

/// Options for `scale`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleOptions {
    /// Run every read-only step and skip every mutating call.
    pub dry_run: bool,
    /// Return once the update is submitted.
    pub no_wait: bool,
    /// New desired count.
    pub desired_count: DesiredCountPolicy,
    /// Auto-scaling changes applied before the update.
    pub auto_scaling: AutoScalingPolicy,
}

/// Options for `refresh`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshOptions {
    /// Run every read-only step and skip every mutating call.
    pub dry_run: bool,
    /// Return once the rollout is submitted.
    pub no_wait: bool,
}

/// Options for `rollback`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackOptions {
    /// Run every read-only step and skip every mutating call.
    pub dry_run: bool,
    /// Return once the rollback is submitted.
    pub no_wait: bool,
    /// Deregister the rolled-from revision once the rollback is stable.
    pub deregister_task_definition: bool,
}

/// Options for `create`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    /// Run every read-only step and skip every mutating call.
    pub dry_run: bool,
    /// Return once the service is created.
    pub no_wait: bool,
    /// Desired count; `Keep` takes the declared one.
    pub desired_count: DesiredCountPolicy,
}

/// What a deploy, scale, refresh or create did.
#[derive(Debug, Clone)]
pub struct RolloutOutcome {
    /// Service name.
    pub service: String,
    /// Strategy used; `None` for service creation.
    pub strategy: Option<RolloutStrategy>,
    /// Task definition rolled out. In a dry run, the family of a revision
    /// that would have been registered.
    pub task_definition: String,
    /// Desired count submitted.
    pub desired_count: Option<i32>,
    /// What the rollout produced; `None` in a dry run.
    pub handle: Option<DeploymentHandle>,
    /// Whether stability was confirmed.
    pub waited: bool,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// What a rollback did.
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    /// Service name.
    pub service: String,
    /// Revision rolled back from.
    pub from: String,
    /// Revision rolled back to.
    pub to: String,
    /// What the rollback produced; `None` in a dry run.
    pub handle: Option<DeploymentHandle>,
    /// Whether stability was confirmed.
    pub waited: bool,
    /// Whether `from` was deregistered.
    pub deregistered: bool,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// Live state of the service.
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// The service as described by the control plane.
    pub service: Service,
    /// Its scalable target, when registered and readable.
    pub scalable_target: Option<ScalableTarget>,
}

/// Drives operations for the service named in a [`RolloutConfig`].
pub struct Deployer {
    config: RolloutConfig,
    region: String,
    control_plane: Arc<dyn ControlPlane>,
    coordinator: Arc<dyn DeploymentCoordinator>,
    scaling: Arc<dyn ScalingRegistry>,
    loader: DefinitionLoader,
    sink: Arc<dyn ProgressSink>,
    diff_engine: DiffEngine,
}

impl Deployer {
    /// Creates a deployer over explicit collaborators.
    #[must_use]
    pub fn new(
        config: RolloutConfig,
        region: impl Into<String>,
        control_plane: Arc<dyn ControlPlane>,
        coordinator: Arc<dyn DeploymentCoordinator>,
        scaling: Arc<dyn ScalingRegistry>,
    ) -> Self {
        Self {
            config,
            region: region.into(),
            control_plane,
            coordinator,
            scaling,
            loader: DefinitionLoader::new(),
            sink: Arc::new(TracingProgress),
            diff_engine: DiffEngine::new(),
        }
    }

    /// Creates a deployer talking to AWS, resolving credentials and region
    /// from the configuration and the default provider chain.
    ///
    /// # Errors
    ///
    /// Returns an error if no region or credentials can be resolved.
    pub async fn connect(config: RolloutConfig) -> Result<Self> {
        let sdk_config = load_sdk_config(config.region.as_deref()).await?;
        let region = sdk_config
            .region()
            .map(ToString::to_string)
            .unwrap_or_default();
        Ok(Self::new(
            config,
            region,
            Arc::new(EcsClient::new(&sdk_config)),
            Arc::new(CodeDeployClient::new(&sdk_config)),
            Arc::new(AutoScalingClient::new(&sdk_config)),
        ))
    }

    /// Replaces the definition loader.
    #[must_use]
    pub fn with_loader(mut self, loader: DefinitionLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Replaces the progress sink used while waiting.
    #[must_use]
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RolloutConfig {
        &self.config
    }

    /// Rolls out the declared task definition.
    ///
    /// # Errors
    ///
    /// Returns an error if a definition cannot be loaded, the service's
    /// controller is unsupported, a remote call fails, or the wait fails.
    pub async fn deploy(
        &self,
        options: &DeployOptions,
        cancel: &CancellationToken,
    ) -> Result<RolloutOutcome> {
        let started_at = Utc::now();
        info!("Starting deploy{}", dry_run_suffix(options.dry_run));

        let live = self.live_service().await?;
        let strategy = self.select_strategy(&live).await?;
        info!("Deployment controller {}: {strategy}", live.controller_type());

        let declared = if options.update_service {
            Some(self.declared_service()?.ok_or_else(|| {
                ConfigError::validation(
                    "updating the service needs service_definition",
                    "service_definition",
                )
            })?)
        } else {
            None
        };

        let desired_count = count::resolve(live.desired_count, live.scheduling(), options.desired_count);

        let task_definition = if options.skip_task_definition || options.latest_task_definition {
            self.existing_task_definition(&live, options.latest_task_definition)
                .await?
        } else {
            let td = self.declared_task_definition()?;
            ConfigValidator::new().validate_all(&self.config, &td, declared.as_ref())?;
            self.register_definition(&td, live.task_definition.as_deref(), options.dry_run)
                .await?
        };

        if let Some(declared) = &declared {
            self.log_service_diff(&live, declared);
        }

        let mut outcome = RolloutOutcome {
            service: self.config.service.clone(),
            strategy: Some(strategy.clone()),
            task_definition,
            desired_count,
            handle: None,
            waited: false,
            dry_run: options.dry_run,
        };

        if options.dry_run {
            info!("DRY RUN OK");
            return Ok(outcome);
        }

        self.apply_auto_scaling(options.auto_scaling).await?;

        let request = RolloutRequest {
            cluster: &self.config.cluster,
            live: &live,
            task_definition_arn: &outcome.task_definition,
            desired_count,
            force_new_deployment: options.force_new_deployment,
            declared: declared.as_ref(),
        };
        let handle = self.execute(&strategy, &request).await?;

        outcome.waited = self.settle(options.no_wait, &handle, started_at, cancel).await?;
        outcome.handle = Some(handle);
        info!("Deploy finished");
        Ok(outcome)
    }

    /// Changes the desired count without touching the task definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the service's controller is unsupported, a remote
    /// call fails, or the wait fails.
    pub async fn scale(
        &self,
        options: &ScaleOptions,
        cancel: &CancellationToken,
    ) -> Result<RolloutOutcome> {
        let started_at = Utc::now();
        info!("Starting scale{}", dry_run_suffix(options.dry_run));

        let live = self.live_service().await?;
        let strategy = self.select_strategy(&live).await?;
        let desired_count = count::resolve(live.desired_count, live.scheduling(), options.desired_count);

        let mut outcome = RolloutOutcome {
            service: self.config.service.clone(),
            strategy: Some(strategy),
            task_definition: live.task_definition.clone().unwrap_or_default(),
            desired_count,
            handle: None,
            waited: false,
            dry_run: options.dry_run,
        };

        if options.dry_run {
            info!(
                "Desired count {} -> {}",
                format_count(live.desired_count),
                format_count(desired_count)
            );
            info!("DRY RUN OK");
            return Ok(outcome);
        }

        self.apply_auto_scaling(options.auto_scaling).await?;

        if desired_count.is_some() && desired_count != live.desired_count {
            let mut update = UpdateServiceRequest::new(&self.config.cluster, &self.config.service);
            update.desired_count = desired_count;
            info!("Updating desired count to {}", format_count(desired_count));
            self.control_plane.update_service(&update).await?;
        } else {
            info!("Desired count unchanged ({})", format_count(live.desired_count));
        }

        let handle = self.service_handle();
        outcome.waited = self.settle(options.no_wait, &handle, started_at, cancel).await?;
        outcome.handle = Some(handle);
        Ok(outcome)
    }

    /// Restarts every task on the current task definition.
    ///
    /// # Errors
    ///
    /// Same as [`Deployer::deploy`].
    pub async fn refresh(
        &self,
        options: &RefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<RolloutOutcome> {
        let deploy = DeployOptions {
            dry_run: options.dry_run,
            no_wait: options.no_wait,
            force_new_deployment: true,
            skip_task_definition: true,
            ..DeployOptions::default()
        };
        self.deploy(&deploy, cancel).await
    }

    /// Rolls the service back to the previous active revision.
    ///
    /// The rolled-from revision is deregistered only after the rollback is
    /// confirmed stable.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError::RollbackTarget` when no older revision exists,
    /// or an error if a remote call or the wait fails.
    pub async fn rollback(
        &self,
        options: &RollbackOptions,
        cancel: &CancellationToken,
    ) -> Result<RollbackOutcome> {
        let started_at = Utc::now();
        info!("Starting rollback{}", dry_run_suffix(options.dry_run));

        let live = self.live_service().await?;
        let strategy = self.select_strategy(&live).await?;
        let current = live
            .task_definition
            .clone()
            .ok_or_else(|| RolloutError::internal("service reports no task definition"))?;

        let target = RollbackResolver::new(Arc::clone(&self.control_plane))
            .find_rollback_target(&current)
            .await?;
        info!("Rolling back from {current} to {target}");

        if options.deregister_task_definition && options.no_wait {
            warn!("{current} is kept: deregistration needs a confirmed rollback");
        }

        let mut outcome = RollbackOutcome {
            service: self.config.service.clone(),
            from: current,
            to: target,
            handle: None,
            waited: false,
            deregistered: false,
            dry_run: options.dry_run,
        };

        if options.dry_run {
            info!("DRY RUN OK");
            return Ok(outcome);
        }

        let request = RolloutRequest {
            cluster: &self.config.cluster,
            live: &live,
            task_definition_arn: &outcome.to,
            desired_count: count::resolve(
                live.desired_count,
                live.scheduling(),
                DesiredCountPolicy::Keep,
            ),
            force_new_deployment: false,
            declared: None,
        };
        let handle = self.execute(&strategy, &request).await?;
        outcome.waited = self.settle(options.no_wait, &handle, started_at, cancel).await?;
        outcome.handle = Some(handle);

        if options.deregister_task_definition && outcome.waited {
            info!("Deregistering {}", outcome.from);
            self.control_plane
                .deregister_task_definition(&outcome.from)
                .await?;
            outcome.deregistered = true;
        }

        info!("Rollback finished");
        Ok(outcome)
    }

    /// Diffs the declared definitions against the live ones.
    ///
    /// Without a service definition only the task definition is compared.
    ///
    /// # Errors
    ///
    /// Returns an error if a definition cannot be loaded or a remote call
    /// fails.
    pub async fn diff(&self) -> Result<DiffReport> {
        let live = match self.live_service().await {
            Ok(service) => Some(service),
            Err(e) if e.is_not_found() => {
                info!("Service {} does not exist yet", self.config.service);
                None
            }
            Err(e) => return Err(e),
        };

        let declared_td = self.declared_task_definition()?;
        let live_td = match live.as_ref().and_then(|s| s.task_definition.as_deref()) {
            Some(arn) => Some(self.control_plane.describe_task_definition(arn).await?),
            None => None,
        };

        let declared_service = self.declared_service()?;
        if declared_service.is_none() {
            debug!("No service definition configured, comparing task definitions only");
        }

        Ok(self.diff_engine.compute_diff(
            live.as_ref(),
            declared_service.as_ref(),
            live_td.as_ref(),
            &declared_td,
        ))
    }

    /// Creates the service from its declared definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if the service already exists, a definition cannot
    /// be loaded, a remote call fails, or the wait fails.
    pub async fn create(
        &self,
        options: &CreateOptions,
        cancel: &CancellationToken,
    ) -> Result<RolloutOutcome> {
        let started_at = Utc::now();
        info!("Starting create{}", dry_run_suffix(options.dry_run));

        match self.live_service().await {
            Ok(service) if service.status.as_deref() != Some("INACTIVE") => {
                return Err(ConfigError::validation(
                    format!(
                        "service {} already exists in cluster {}",
                        self.config.service, self.config.cluster
                    ),
                    "service",
                )
                .into());
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let declared = self.declared_service()?.ok_or_else(|| {
            ConfigError::validation("creating a service needs service_definition", "service_definition")
        })?;
        let td = self.declared_task_definition()?;
        ConfigValidator::new().validate_all(&self.config, &td, Some(&declared))?;

        let desired_count = count::resolve(
            declared.desired_count,
            declared.scheduling(),
            options.desired_count,
        );
        let task_definition = self.register_definition(&td, None, options.dry_run).await?;

        let mut outcome = RolloutOutcome {
            service: self.config.service.clone(),
            strategy: None,
            task_definition,
            desired_count,
            handle: None,
            waited: false,
            dry_run: options.dry_run,
        };

        if options.dry_run {
            info!("DRY RUN OK");
            return Ok(outcome);
        }

        let request = CreateServiceRequest::from_definition(
            &self.config.cluster,
            &self.config.service,
            &outcome.task_definition,
            desired_count,
            declared,
        );
        info!("Creating service {}", self.config.service);
        self.control_plane.create_service(&request).await?;

        let handle = self.service_handle();
        outcome.waited = self.settle(options.no_wait, &handle, started_at, cancel).await?;
        outcome.handle = Some(handle);
        Ok(outcome)
    }

    /// Registers the declared task definition and returns its ARN.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition cannot be loaded or registration
    /// fails.
    pub async fn register(&self, dry_run: bool) -> Result<String> {
        let td = self.declared_task_definition()?;
        ConfigValidator::new().validate_all(&self.config, &td, None)?;
        let latest = match self.control_plane.describe_task_definition(&td.family).await {
            Ok(latest) => latest.task_definition_arn,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        self.register_definition(&td, latest.as_deref(), dry_run).await
    }

    /// Waits for whatever rollout is in flight to settle.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be read or the wait fails.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        let started_at = Utc::now();
        let live = self.live_service().await?;
        let handle = match self.select_strategy(&live).await? {
            RolloutStrategy::Rolling => self.service_handle(),
            RolloutStrategy::BlueGreen(group) => DeploymentHandle::CodeDeploy {
                group,
                deployment_id: None,
            },
        };
        self.settle(false, &handle, started_at, cancel).await?;
        Ok(())
    }

    /// Reads the live service and its scalable target.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be described.
    pub async fn status(&self) -> Result<StatusReport> {
        let service = self.live_service().await?;
        let resource_id = service_resource_id(&self.config.cluster, &self.config.service);
        let scalable_target = match self.scaling.describe_scalable_target(&resource_id).await {
            Ok(target) => target,
            Err(e) => {
                warn!("Cannot read scalable target of {resource_id}: {e}");
                None
            }
        };
        Ok(StatusReport {
            service,
            scalable_target,
        })
    }

    /// Loads and validates the configuration and both definitions.
    ///
    /// # Errors
    ///
    /// Returns the first validation error, or an error if a definition
    /// cannot be loaded.
    pub fn validate(&self) -> Result<ValidationResult> {
        let td = self.declared_task_definition()?;
        let service = self.declared_service()?;
        ConfigValidator::new().validate_all(&self.config, &td, service.as_ref())
    }

    async fn live_service(&self) -> Result<Service> {
        self.control_plane
            .describe_service(&self.config.cluster, &self.config.service)
            .await
    }

    async fn select_strategy(&self, live: &Service) -> Result<RolloutStrategy> {
        RolloutStrategy::select(
            &self.config.cluster,
            live,
            self.config.deployment_group().as_ref(),
            self.coordinator.as_ref(),
        )
        .await
    }

    fn declared_task_definition(&self) -> Result<TaskDefinition> {
        self.loader
            .load_task_definition(&self.config.task_definition_path())
    }

    fn declared_service(&self) -> Result<Option<Service>> {
        self.config
            .service_definition_path()
            .map(|path| self.loader.load_service_definition(&path))
            .transpose()
    }

    /// The running revision, or the newest active one of its family.
    async fn existing_task_definition(&self, live: &Service, latest: bool) -> Result<String> {
        let current = live
            .task_definition
            .clone()
            .ok_or_else(|| RolloutError::internal("service reports no task definition"))?;
        if !latest {
            info!("Keeping task definition {current}");
            return Ok(current);
        }

        let family = self
            .control_plane
            .describe_task_definition(&current)
            .await?
            .family;
        let newest = self.control_plane.describe_task_definition(&family).await?;
        let arn = newest
            .task_definition_arn
            .ok_or_else(|| RolloutError::internal(format!("no ARN for latest revision of {family}")))?;
        info!("Using latest task definition {arn}");
        Ok(arn)
    }

    /// Registers `td`, or in a dry run logs how it differs from `compare_to`
    /// and returns its family.
    async fn register_definition(
        &self,
        td: &TaskDefinition,
        compare_to: Option<&str>,
        dry_run: bool,
    ) -> Result<String> {
        if dry_run {
            if let Some(arn) = compare_to {
                let live = self.control_plane.describe_task_definition(arn).await?;
                let diff = self.diff_engine.diff_task_definition(&live, td, arn);
                if diff.is_empty() {
                    info!("Task definition {} unchanged", live.display_name());
                } else {
                    info!("Task definition changes:\n{diff}");
                }
            }
            info!("Would register a new revision of {}", td.family);
            return Ok(td.family.clone());
        }

        let registered = self.control_plane.register_task_definition(td).await?;
        let name = registered.display_name();
        info!("Registered task definition {name}");
        registered
            .task_definition_arn
            .ok_or_else(|| RolloutError::internal(format!("no ARN returned for {name}")))
    }

    fn log_service_diff(&self, live: &Service, declared: &Service) {
        let label = live.service_arn.as_deref().unwrap_or(&self.config.service);
        let diff = self.diff_engine.diff_service(live, declared, label);
        if diff.is_empty() {
            info!("Service definition unchanged");
        } else {
            info!("Service definition changes:\n{diff}");
        }
    }

    async fn apply_auto_scaling(&self, policy: AutoScalingPolicy) -> Result<()> {
        let resource_id = service_resource_id(&self.config.cluster, &self.config.service);
        AutoScalingCoordinator::new(Arc::clone(&self.scaling))
            .apply(&resource_id, policy)
            .await?;
        Ok(())
    }

    async fn execute(
        &self,
        strategy: &RolloutStrategy,
        request: &RolloutRequest<'_>,
    ) -> Result<DeploymentHandle> {
        match strategy {
            RolloutStrategy::Rolling => {
                RollingExecutor::new(Arc::clone(&self.control_plane))
                    .execute(request)
                    .await
            }
            RolloutStrategy::BlueGreen(group) => {
                if request.declared.is_some() {
                    warn!("CodeDeploy owns the service settings; only the desired count is applied");
                }
                BlueGreenExecutor::new(
                    Arc::clone(&self.control_plane),
                    Arc::clone(&self.coordinator),
                    group.clone(),
                    self.region.clone(),
                )
                .with_hooks(self.config.hooks())
                .execute(request)
                .await
            }
        }
    }

    /// Waits for `handle` unless `no_wait`; returns whether it waited.
    async fn settle(
        &self,
        no_wait: bool,
        handle: &DeploymentHandle,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if no_wait {
            info!("Not waiting for {handle}");
            return Ok(false);
        }
        StabilityWaiter::new(
            Arc::clone(&self.control_plane),
            Arc::clone(&self.coordinator),
            Arc::clone(&self.sink),
        )
        .wait(handle, started_at, self.config.timeout(), cancel)
        .await?;
        info!("{handle} is stable");
        Ok(true)
    }

    fn service_handle(&self) -> DeploymentHandle {
        DeploymentHandle::Service {
            cluster: self.config.cluster.clone(),
            service: self.config.service.clone(),
        }
    }
}

fn dry_run_suffix(dry_run: bool) -> &'static str {
    if dry_run { " (dry run)" } else { "" }
}

fn format_count(count: Option<i32>) -> String {
    count.map_or_else(|| String::from("-"), |n| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::aws::autoscaling::{MockScalingRegistry, SuspendedState};
    use crate::aws::codedeploy::DeploymentGroupRef;
    use crate::aws::types::DeploymentControllerSpec;
    use crate::config::ConfigParser;
    use crate::engine::testing::{FakeControlPlane, FakeCoordinator, task_definition_arn};
    use crate::error::{ConfigError, NotFoundError};

    const TASK_DEFINITION: &str = r#"{
  "family": "web",
  "networkMode": "awsvpc",
  "containerDefinitions": [
    {"name": "app", "image": "nginx:1.27", "portMappings": [{"containerPort": 80}]}
  ]
}"#;

    const SERVICE_DEFINITION: &str = r#"{
  "launchType": "FARGATE",
  "desiredCount": 3,
  "networkConfiguration": {
    "awsvpcConfiguration": {"subnets": ["subnet-1"], "securityGroups": ["sg-1"]}
  }
}"#;

    struct Fixture {
        _dir: TempDir,
        config: RolloutConfig,
    }

    fn fixture(extra_yaml: &str, with_service_definition: bool) -> Fixture {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("ecs-task-def.json"), TASK_DEFINITION).expect("write");
        let mut yaml = String::from("cluster: default\nservice: web\ntask_definition: ecs-task-def.json\n");
        if with_service_definition {
            std::fs::write(dir.path().join("ecs-service-def.json"), SERVICE_DEFINITION)
                .expect("write");
            yaml.push_str("service_definition: ecs-service-def.json\n");
        }
        yaml.push_str(extra_yaml);

        let mut config = ConfigParser::new().parse_yaml(&yaml, None).expect("parse");
        config.base_dir = dir.path().to_path_buf();
        Fixture { _dir: dir, config }
    }

    fn live_service(controller: &str, revision: u32) -> Service {
        Service {
            service_name: Some(String::from("web")),
            status: Some(String::from("ACTIVE")),
            desired_count: Some(2),
            running_count: Some(2),
            task_definition: Some(task_definition_arn("web", revision)),
            deployment_controller: Some(DeploymentControllerSpec {
                controller_type: controller.to_string(),
            }),
            ..Service::default()
        }
    }

    fn idle_scaling() -> Arc<MockScalingRegistry> {
        let mut registry = MockScalingRegistry::new();
        registry.expect_describe_scalable_target().never();
        registry.expect_register_scalable_target().never();
        Arc::new(registry)
    }

    fn deployer(
        fixture: &Fixture,
        control_plane: &Arc<FakeControlPlane>,
        coordinator: &Arc<FakeCoordinator>,
        scaling: Arc<MockScalingRegistry>,
    ) -> Deployer {
        Deployer::new(
            fixture.config.clone(),
            "us-east-1",
            Arc::clone(control_plane) as Arc<dyn ControlPlane>,
            Arc::clone(coordinator) as Arc<dyn DeploymentCoordinator>,
            scaling,
        )
        .with_loader(DefinitionLoader::with_lookup(Arc::new(|_| None)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_rolling_registers_updates_and_waits() {
        let fixture = fixture("", false);
        let cp = Arc::new(
            FakeControlPlane::default()
                .with_service(live_service("ECS", 1))
                .with_revisions("web", 1)
                .with_stable_after(Duration::from_secs(1)),
        );
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let outcome = deployer
            .deploy(&DeployOptions::default(), &CancellationToken::new())
            .await
            .expect("deploy");

        assert_eq!(outcome.task_definition, task_definition_arn("web", 2));
        assert_eq!(outcome.desired_count, Some(2));
        assert_eq!(outcome.strategy, Some(RolloutStrategy::Rolling));
        assert!(outcome.waited);
        assert_eq!(
            cp.mutations(),
            [
                String::from("RegisterTaskDefinition:web"),
                format!("UpdateService:{}", task_definition_arn("web", 2)),
            ]
        );
        assert!(cp.calls().contains(&String::from("WaitServicesStable")));
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_mutations() {
        let fixture = fixture("", true);
        let cp = Arc::new(
            FakeControlPlane::default()
                .with_service(live_service("ECS", 1))
                .with_revisions("web", 1),
        );
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let options = DeployOptions {
            dry_run: true,
            update_service: true,
            desired_count: DesiredCountPolicy::Exactly(5),
            auto_scaling: AutoScalingPolicy {
                suspend: Some(true),
                ..AutoScalingPolicy::default()
            },
            ..DeployOptions::default()
        };
        let outcome = deployer
            .deploy(&options, &CancellationToken::new())
            .await
            .expect("dry run");

        assert!(outcome.dry_run);
        assert!(outcome.handle.is_none());
        assert_eq!(outcome.task_definition, "web");
        assert_eq!(outcome.desired_count, Some(5));
        assert!(cp.mutations().is_empty());
        assert!(coordinator.created().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_rejects_unsupported_controller() {
        let fixture = fixture("", false);
        let cp = Arc::new(
            FakeControlPlane::default()
                .with_service(live_service("EXTERNAL", 1))
                .with_revisions("web", 1),
        );
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let options = DeployOptions {
            dry_run: true,
            ..DeployOptions::default()
        };
        let err = deployer
            .deploy(&options, &CancellationToken::new())
            .await
            .expect_err("unsupported");

        assert!(matches!(
            err,
            RolloutError::Config(ConfigError::UnsupportedDeploymentController { ref controller })
                if controller == "EXTERNAL"
        ));
        assert_eq!(cp.calls(), ["DescribeServices"]);
    }

    #[tokio::test]
    async fn test_update_service_requires_service_definition() {
        let fixture = fixture("", false);
        let cp = Arc::new(FakeControlPlane::default().with_service(live_service("ECS", 1)));
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let options = DeployOptions {
            update_service: true,
            ..DeployOptions::default()
        };
        let err = deployer
            .deploy(&options, &CancellationToken::new())
            .await
            .expect_err("no service definition");
        assert!(matches!(err, RolloutError::Config(ConfigError::ValidationError { .. })));
        assert!(cp.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_blue_green_deploy_waits_for_created_deployment() {
        let fixture = fixture(
            "codedeploy:\n  application_name: AppECS-default-web\n  deployment_group_name: DgpECS-default-web\n",
            false,
        );
        let cp = Arc::new(
            FakeControlPlane::default()
                .with_service(live_service("CODE_DEPLOY", 1))
                .with_revisions("web", 1),
        );
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let outcome = deployer
            .deploy(&DeployOptions::default(), &CancellationToken::new())
            .await
            .expect("deploy");

        assert_eq!(
            outcome.strategy,
            Some(RolloutStrategy::BlueGreen(DeploymentGroupRef::new(
                "AppECS-default-web",
                "DgpECS-default-web"
            )))
        );
        assert_eq!(coordinator.created().len(), 1);
        assert_eq!(coordinator.waited(), ["d-0000001"]);
        // Desired count unchanged, so only the registration mutates ECS.
        assert_eq!(cp.mutations(), ["RegisterTaskDefinition:web"]);
    }

    #[tokio::test]
    async fn test_refresh_forces_new_deployment_on_current_revision() {
        let fixture = fixture("", false);
        let cp = Arc::new(
            FakeControlPlane::default()
                .with_service(live_service("ECS", 4))
                .with_revisions("web", 4),
        );
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let options = RefreshOptions {
            no_wait: true,
            ..RefreshOptions::default()
        };
        let outcome = deployer
            .refresh(&options, &CancellationToken::new())
            .await
            .expect("refresh");

        assert!(!outcome.waited);
        let updates = cp.updates();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].force_new_deployment);
        assert_eq!(
            updates[0].task_definition.as_deref(),
            Some(task_definition_arn("web", 4).as_str())
        );
        assert_eq!(cp.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_scale_applies_auto_scaling_then_count() {
        let fixture = fixture("", false);
        let cp = Arc::new(FakeControlPlane::default().with_service(live_service("ECS", 1)));
        let coordinator = Arc::new(FakeCoordinator::default());

        let mut registry = MockScalingRegistry::new();
        registry
            .expect_describe_scalable_target()
            .withf(|id| id == "service/default/web")
            .times(1)
            .returning(|id| {
                Ok(Some(ScalableTarget {
                    resource_id: id.to_string(),
                    min_capacity: 1,
                    max_capacity: 4,
                    ..ScalableTarget::default()
                }))
            });
        registry
            .expect_register_scalable_target()
            .withf(|request| {
                request.max_capacity == Some(8)
                    && request.suspended_state == Some(SuspendedState::all(false))
            })
            .times(1)
            .returning(|_| Ok(()));

        let deployer = deployer(&fixture, &cp, &coordinator, Arc::new(registry));
        let options = ScaleOptions {
            no_wait: true,
            desired_count: DesiredCountPolicy::Exactly(6),
            auto_scaling: AutoScalingPolicy {
                suspend: Some(false),
                max: Some(8),
                ..AutoScalingPolicy::default()
            },
            ..ScaleOptions::default()
        };
        let outcome = deployer
            .scale(&options, &CancellationToken::new())
            .await
            .expect("scale");

        assert_eq!(outcome.desired_count, Some(6));
        let updates = cp.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].desired_count, Some(6));
        assert!(updates[0].task_definition.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_deregisters_after_stable() {
        let fixture = fixture("", false);
        let cp = Arc::new(
            FakeControlPlane::default()
                .with_service(live_service("ECS", 3))
                .with_revisions("web", 3)
                .with_stable_after(Duration::from_secs(1)),
        );
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let options = RollbackOptions {
            deregister_task_definition: true,
            ..RollbackOptions::default()
        };
        let outcome = deployer
            .rollback(&options, &CancellationToken::new())
            .await
            .expect("rollback");

        assert_eq!(outcome.to, task_definition_arn("web", 2));
        assert!(outcome.deregistered);
        assert_eq!(
            cp.mutations(),
            [
                format!("UpdateService:{}", task_definition_arn("web", 2)),
                format!("DeregisterTaskDefinition:{}", task_definition_arn("web", 3)),
            ]
        );
        let calls = cp.calls();
        let waited = calls.iter().position(|c| c == "WaitServicesStable").expect("waited");
        let deregistered = calls
            .iter()
            .position(|c| c.starts_with("DeregisterTaskDefinition"))
            .expect("deregistered");
        assert!(waited < deregistered);
        assert_eq!(cp.status_of("web", 3).as_deref(), Some("INACTIVE"));
        assert!(!cp.updates()[0].force_new_deployment);
    }

    #[tokio::test]
    async fn test_rollback_without_wait_keeps_revision() {
        let fixture = fixture("", false);
        let cp = Arc::new(
            FakeControlPlane::default()
                .with_service(live_service("ECS", 3))
                .with_revisions("web", 3),
        );
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let options = RollbackOptions {
            no_wait: true,
            deregister_task_definition: true,
            ..RollbackOptions::default()
        };
        let outcome = deployer
            .rollback(&options, &CancellationToken::new())
            .await
            .expect("rollback");

        assert!(!outcome.deregistered);
        assert_eq!(cp.status_of("web", 3).as_deref(), Some("ACTIVE"));
    }

    #[tokio::test]
    async fn test_rollback_single_revision_is_not_found() {
        let fixture = fixture("", false);
        let cp = Arc::new(
            FakeControlPlane::default()
                .with_service(live_service("ECS", 1))
                .with_revisions("web", 1),
        );
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let err = deployer
            .rollback(&RollbackOptions::default(), &CancellationToken::new())
            .await
            .expect_err("nothing to roll back to");
        assert!(matches!(err, RolloutError::NotFound(NotFoundError::RollbackTarget { .. })));
        assert!(cp.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_blue_green_rollback_submits_previous_revision() {
        let fixture = fixture(
            "codedeploy:\n  application_name: AppECS-default-web\n  deployment_group_name: DgpECS-default-web\n",
            false,
        );
        let cp = Arc::new(
            FakeControlPlane::default()
                .with_service(live_service("CODE_DEPLOY", 2))
                .with_revisions("web", 2),
        );
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let options = RollbackOptions {
            no_wait: true,
            ..RollbackOptions::default()
        };
        deployer
            .rollback(&options, &CancellationToken::new())
            .await
            .expect("rollback");

        let created = coordinator.created();
        assert_eq!(created.len(), 1);
        assert!(
            created[0]
                .appspec
                .contains(&task_definition_arn("web", 1))
        );
        assert!(cp.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_diff_without_service_definition() {
        let fixture = fixture("", false);
        let cp = Arc::new(
            FakeControlPlane::default()
                .with_service(live_service("ECS", 1))
                .with_revisions("web", 1),
        );
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let report = deployer.diff().await.expect("diff");
        assert!(report.service.is_empty());
        assert!(report.task_definition.contains("+      \"image\": \"nginx:1.27\""));
        assert!(cp.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_diff_without_service_definition_or_live_service() {
        let fixture = fixture("", false);
        let cp = Arc::new(FakeControlPlane::default());
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let report = deployer.diff().await.expect("diff");
        assert_eq!(report.service, "");
        assert!(report.task_definition.contains("+  \"family\": \"web\""));
        assert!(cp.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_create_registers_and_creates_service() {
        let fixture = fixture("", true);
        let cp = Arc::new(FakeControlPlane::default());
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let options = CreateOptions {
            no_wait: true,
            ..CreateOptions::default()
        };
        let outcome = deployer
            .create(&options, &CancellationToken::new())
            .await
            .expect("create");

        assert_eq!(outcome.desired_count, Some(3));
        let created = cp.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].service_name, "web");
        assert_eq!(created[0].task_definition, task_definition_arn("web", 1));
        assert_eq!(created[0].desired_count, Some(3));
    }

    #[tokio::test]
    async fn test_create_refuses_existing_service() {
        let fixture = fixture("", true);
        let cp = Arc::new(FakeControlPlane::default().with_service(live_service("ECS", 1)));
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let err = deployer
            .create(&CreateOptions::default(), &CancellationToken::new())
            .await
            .expect_err("exists");
        assert!(err.to_string().contains("already exists"));
        assert!(cp.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_wait_resolves_in_progress_blue_green_deployment() {
        let fixture = fixture("", false);
        let group = DeploymentGroupRef::new("AppECS-default-web", "DgpECS-default-web");
        let cp = Arc::new(FakeControlPlane::default().with_service(live_service("CODE_DEPLOY", 1)));
        let coordinator = Arc::new(
            FakeCoordinator::default()
                .with_group(group)
                .with_in_progress(&["d-ABCDEFG"]),
        );
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        deployer.wait(&CancellationToken::new()).await.expect("wait");
        assert_eq!(coordinator.waited(), ["d-ABCDEFG"]);
        assert_eq!(
            coordinator.calls(),
            ["FindDeploymentGroup", "ListDeployments"]
        );
    }

    #[tokio::test]
    async fn test_status_tolerates_scaling_errors() {
        let fixture = fixture("", false);
        let cp = Arc::new(FakeControlPlane::default().with_service(live_service("ECS", 1)));
        let coordinator = Arc::new(FakeCoordinator::default());
        let mut registry = MockScalingRegistry::new();
        registry
            .expect_describe_scalable_target()
            .returning(|_| Err(RolloutError::internal("access denied")));

        let deployer = deployer(&fixture, &cp, &coordinator, Arc::new(registry));
        let report = deployer.status().await.expect("status");
        assert_eq!(report.service.desired_count, Some(2));
        assert!(report.scalable_target.is_none());
    }

    #[test]
    fn test_validate_loads_both_definitions() {
        let fixture = fixture("", true);
        let cp = Arc::new(FakeControlPlane::default());
        let coordinator = Arc::new(FakeCoordinator::default());
        let deployer = deployer(&fixture, &cp, &coordinator, idle_scaling());

        let result = deployer.validate().expect("valid");
        assert!(result.is_valid());
        assert!(cp.calls().is_empty());
    }
}
