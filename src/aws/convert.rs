//! Conversions between the definition-file model and the ECS SDK types.
//!
//! Modelled fields map one to one. A fixed set of `extra` keys is carried
//! across as well; any other declared key is logged and left out of the
//! request. SDK getters differ in whether they return `Option`, so the
//! readers below take `impl Into<Option<_>>`.

use std::collections::HashMap;

use aws_sdk_ecs::error::BuildError;
use aws_sdk_ecs::operation::create_service::builders::CreateServiceFluentBuilder;
use aws_sdk_ecs::operation::register_task_definition::builders::RegisterTaskDefinitionFluentBuilder;
use aws_sdk_ecs::operation::update_service::builders::UpdateServiceFluentBuilder;
use aws_sdk_ecs::primitives::DateTime;
use aws_sdk_ecs::types as ecs;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ConfigError, Result};

use super::types::{
    AwsVpcConfiguration, CircuitBreaker, ContainerDefinition, CreateServiceRequest, Deployment,
    DeploymentConfiguration, DeploymentControllerSpec, Extra, KeyValuePair, LoadBalancer,
    MountPoint, NetworkConfiguration, PortMapping, RUNTIME_SERVICE_KEYS, SchedulingStrategy,
    Secret, Service, ServiceEvent, TaskDefinition, UpdateServiceRequest, VolumeFrom,
};

const TASK_DEFINITION_KEYS: &[&str] = &[
    "cpu",
    "memory",
    "volumes",
    "tags",
    "runtimePlatform",
    "pidMode",
    "ipcMode",
];

const CONTAINER_KEYS: &[&str] = &[
    "memory",
    "memoryReservation",
    "command",
    "entryPoint",
    "workingDirectory",
    "user",
    "hostname",
    "logConfiguration",
    "healthCheck",
    "dependsOn",
    "ulimits",
    "environmentFiles",
    "stopTimeout",
    "startTimeout",
    "readonlyRootFilesystem",
    "privileged",
    "interactive",
    "pseudoTerminal",
    "dockerLabels",
    "repositoryCredentials",
];

const SERVICE_KEYS: &[&str] = &[
    "serviceRegistries",
    "tags",
    "propagateTags",
    "enableECSManagedTags",
    "enableExecuteCommand",
    "role",
];

// Declared definition -> SDK request

/// Fills a `RegisterTaskDefinition` call from a declared definition.
///
/// # Errors
///
/// Returns a validation error when a nested setting lacks a required field.
pub fn register_task_definition(
    request: RegisterTaskDefinitionFluentBuilder,
    definition: &TaskDefinition,
) -> Result<RegisterTaskDefinitionFluentBuilder> {
    let extra = &definition.extra;
    warn_unsupported(
        &format!("task definition {}", definition.family),
        extra,
        &[TASK_DEFINITION_KEYS],
    );

    let containers = definition
        .container_definitions
        .iter()
        .map(container_definition)
        .collect::<Result<Vec<_>>>()?;

    Ok(request
        .family(&definition.family)
        .set_task_role_arn(definition.task_role_arn.clone())
        .set_execution_role_arn(definition.execution_role_arn.clone())
        .set_network_mode(definition.network_mode.as_deref().map(ecs::NetworkMode::from))
        .set_container_definitions(Some(containers))
        .set_placement_constraints(non_empty(
            definition
                .placement_constraints
                .iter()
                .map(task_placement_constraint)
                .collect(),
        ))
        .set_requires_compatibilities(non_empty(
            definition
                .requires_compatibilities
                .iter()
                .map(|c| ecs::Compatibility::from(c.as_str()))
                .collect(),
        ))
        .set_cpu(number_text(extra.get("cpu")))
        .set_memory(number_text(extra.get("memory")))
        .set_pid_mode(text(extra.get("pidMode")).map(|m| ecs::PidMode::from(m.as_str())))
        .set_ipc_mode(text(extra.get("ipcMode")).map(|m| ecs::IpcMode::from(m.as_str())))
        .set_runtime_platform(extra.get("runtimePlatform").map(runtime_platform))
        .set_volumes(each(objects(extra.get("volumes")), volume)?)
        .set_tags(tags(extra.get("tags"))))
}

/// Fills a `CreateService` call.
///
/// # Errors
///
/// Returns a validation error when a nested setting lacks a required field.
pub fn create_service(
    request: CreateServiceFluentBuilder,
    input: &CreateServiceRequest,
) -> Result<CreateServiceFluentBuilder> {
    let definition = &input.definition;
    let extra = &definition.extra;
    warn_unsupported(
        &format!("service {}", input.service_name),
        extra,
        &[SERVICE_KEYS, RUNTIME_SERVICE_KEYS],
    );

    Ok(request
        .cluster(&input.cluster)
        .service_name(&input.service_name)
        .task_definition(&input.task_definition)
        .set_desired_count(input.desired_count)
        .set_launch_type(definition.launch_type.as_deref().map(ecs::LaunchType::from))
        .set_platform_version(definition.platform_version.clone())
        .set_deployment_configuration(
            definition
                .deployment_configuration
                .as_ref()
                .map(deployment_configuration)
                .transpose()?,
        )
        .set_deployment_controller(
            definition
                .deployment_controller
                .as_ref()
                .map(deployment_controller)
                .transpose()?,
        )
        .set_scheduling_strategy(definition.scheduling_strategy.map(scheduling_strategy))
        .set_health_check_grace_period_seconds(definition.health_check_grace_period_seconds)
        .set_network_configuration(
            definition
                .network_configuration
                .as_ref()
                .map(network_configuration)
                .transpose()?,
        )
        .set_load_balancers(non_empty(
            definition.load_balancers.iter().map(load_balancer).collect(),
        ))
        .set_placement_constraints(non_empty(
            definition
                .placement_constraints
                .iter()
                .map(placement_constraint)
                .collect(),
        ))
        .set_placement_strategy(non_empty(
            definition
                .placement_strategy
                .iter()
                .map(placement_strategy)
                .collect(),
        ))
        .set_capacity_provider_strategy(each(
            &definition.capacity_provider_strategy,
            capacity_provider,
        )?)
        .set_service_registries(non_empty(
            objects(extra.get("serviceRegistries"))
                .iter()
                .map(service_registry)
                .collect(),
        ))
        .set_tags(tags(extra.get("tags")))
        .set_propagate_tags(
            text(extra.get("propagateTags")).map(|p| ecs::PropagateTags::from(p.as_str())),
        )
        .set_enable_ecs_managed_tags(boolean(extra.get("enableECSManagedTags")))
        .set_enable_execute_command(boolean(extra.get("enableExecuteCommand")))
        .set_role(text(extra.get("role"))))
}

/// Fills an `UpdateService` call.
///
/// # Errors
///
/// Returns a validation error when a nested setting lacks a required field.
pub fn update_service(
    request: UpdateServiceFluentBuilder,
    input: &UpdateServiceRequest,
) -> Result<UpdateServiceFluentBuilder> {
    let capacity_provider_strategy = input
        .capacity_provider_strategy
        .as_deref()
        .map(|items| items.iter().map(capacity_provider).collect::<Result<Vec<_>>>())
        .transpose()?;

    Ok(request
        .cluster(&input.cluster)
        .service(&input.service)
        .set_task_definition(input.task_definition.clone())
        .set_desired_count(input.desired_count)
        .force_new_deployment(input.force_new_deployment)
        .set_deployment_configuration(
            input
                .deployment_configuration
                .as_ref()
                .map(deployment_configuration)
                .transpose()?,
        )
        .set_network_configuration(
            input
                .network_configuration
                .as_ref()
                .map(network_configuration)
                .transpose()?,
        )
        .set_platform_version(input.platform_version.clone())
        .set_health_check_grace_period_seconds(input.health_check_grace_period_seconds)
        .set_capacity_provider_strategy(capacity_provider_strategy)
        .set_placement_constraints(
            input
                .placement_constraints
                .as_deref()
                .map(|items| items.iter().map(placement_constraint).collect()),
        )
        .set_placement_strategy(
            input
                .placement_strategy
                .as_deref()
                .map(|items| items.iter().map(placement_strategy).collect()),
        ))
}

fn container_definition(container: &ContainerDefinition) -> Result<ecs::ContainerDefinition> {
    let extra = &container.extra;
    warn_unsupported(&format!("container {}", container.name), extra, &[CONTAINER_KEYS]);

    let secrets = container
        .secrets
        .iter()
        .map(|s| {
            built(
                "secrets",
                ecs::Secret::builder()
                    .name(&s.name)
                    .value_from(&s.value_from)
                    .build(),
            )
        })
        .collect::<Result<Vec<_>>>()?;
    let log_configuration = extra
        .get("logConfiguration")
        .map(log_configuration)
        .transpose()?;
    let health_check = extra.get("healthCheck").map(health_check).transpose()?;
    let repository_credentials = extra
        .get("repositoryCredentials")
        .map(|value| {
            built(
                "repositoryCredentials",
                ecs::RepositoryCredentials::builder()
                    .set_credentials_parameter(text(value.get("credentialsParameter")))
                    .build(),
            )
        })
        .transpose()?;

    Ok(ecs::ContainerDefinition::builder()
        .name(&container.name)
        .set_image(container.image.clone())
        .set_cpu(container.cpu.and_then(|cpu| i32::try_from(cpu).ok()))
        .set_essential(container.essential)
        .set_environment(non_empty(
            container
                .environment
                .iter()
                .map(|kv| {
                    ecs::KeyValuePair::builder()
                        .name(&kv.name)
                        .set_value(kv.value.clone())
                        .build()
                })
                .collect(),
        ))
        .set_port_mappings(non_empty(
            container.port_mappings.iter().map(port_mapping).collect(),
        ))
        .set_mount_points(non_empty(
            container
                .mount_points
                .iter()
                .map(|m| {
                    ecs::MountPoint::builder()
                        .set_source_volume(m.source_volume.clone())
                        .set_container_path(m.container_path.clone())
                        .set_read_only(m.read_only)
                        .build()
                })
                .collect(),
        ))
        .set_volumes_from(non_empty(
            container
                .volumes_from
                .iter()
                .map(|v| {
                    ecs::VolumeFrom::builder()
                        .set_source_container(v.source_container.clone())
                        .set_read_only(v.read_only)
                        .build()
                })
                .collect(),
        ))
        .set_secrets(non_empty(secrets))
        .set_memory(int(extra.get("memory")))
        .set_memory_reservation(int(extra.get("memoryReservation")))
        .set_command(texts(extra.get("command")))
        .set_entry_point(texts(extra.get("entryPoint")))
        .set_working_directory(text(extra.get("workingDirectory")))
        .set_user(text(extra.get("user")))
        .set_hostname(text(extra.get("hostname")))
        .set_stop_timeout(int(extra.get("stopTimeout")))
        .set_start_timeout(int(extra.get("startTimeout")))
        .set_readonly_root_filesystem(boolean(extra.get("readonlyRootFilesystem")))
        .set_privileged(boolean(extra.get("privileged")))
        .set_interactive(boolean(extra.get("interactive")))
        .set_pseudo_terminal(boolean(extra.get("pseudoTerminal")))
        .set_docker_labels(text_map(extra.get("dockerLabels")))
        .set_log_configuration(log_configuration)
        .set_health_check(health_check)
        .set_depends_on(each(objects(extra.get("dependsOn")), container_dependency)?)
        .set_ulimits(each(objects(extra.get("ulimits")), ulimit)?)
        .set_environment_files(each(objects(extra.get("environmentFiles")), environment_file)?)
        .set_repository_credentials(repository_credentials)
        .build())
}

fn port_mapping(mapping: &PortMapping) -> ecs::PortMapping {
    let extra = &mapping.extra;
    ecs::PortMapping::builder()
        .set_container_port(mapping.container_port)
        .set_host_port(mapping.host_port)
        .set_protocol(mapping.protocol.as_deref().map(ecs::TransportProtocol::from))
        .set_name(text(extra.get("name")))
        .set_app_protocol(
            text(extra.get("appProtocol")).map(|p| ecs::ApplicationProtocol::from(p.as_str())),
        )
        .set_container_port_range(text(extra.get("containerPortRange")))
        .build()
}

fn log_configuration(value: &Value) -> Result<ecs::LogConfiguration> {
    let secret_options = each(objects(value.get("secretOptions")), |option| {
        built(
            "logConfiguration.secretOptions",
            ecs::Secret::builder()
                .set_name(text(option.get("name")))
                .set_value_from(text(option.get("valueFrom")))
                .build(),
        )
    })?;
    built(
        "logConfiguration",
        ecs::LogConfiguration::builder()
            .set_log_driver(text(value.get("logDriver")).map(|d| ecs::LogDriver::from(d.as_str())))
            .set_options(text_map(value.get("options")))
            .set_secret_options(secret_options)
            .build(),
    )
}

fn health_check(value: &Value) -> Result<ecs::HealthCheck> {
    built(
        "healthCheck",
        ecs::HealthCheck::builder()
            .set_command(texts(value.get("command")))
            .set_interval(int(value.get("interval")))
            .set_timeout(int(value.get("timeout")))
            .set_retries(int(value.get("retries")))
            .set_start_period(int(value.get("startPeriod")))
            .build(),
    )
}

fn container_dependency(value: &Value) -> Result<ecs::ContainerDependency> {
    built(
        "dependsOn",
        ecs::ContainerDependency::builder()
            .set_container_name(text(value.get("containerName")))
            .set_condition(
                text(value.get("condition")).map(|c| ecs::ContainerCondition::from(c.as_str())),
            )
            .build(),
    )
}

fn ulimit(value: &Value) -> Result<ecs::Ulimit> {
    built(
        "ulimits",
        ecs::Ulimit::builder()
            .set_name(text(value.get("name")).map(|n| ecs::UlimitName::from(n.as_str())))
            .set_soft_limit(int(value.get("softLimit")))
            .set_hard_limit(int(value.get("hardLimit")))
            .build(),
    )
}

fn environment_file(value: &Value) -> Result<ecs::EnvironmentFile> {
    let mut file = ecs::EnvironmentFile::builder().set_value(text(value.get("value")));
    if let Some(kind) = value.get("type").and_then(Value::as_str) {
        file = file.r#type(ecs::EnvironmentFileType::from(kind));
    }
    built("environmentFiles", file.build())
}

fn volume(value: &Value) -> Result<ecs::Volume> {
    let efs = value
        .get("efsVolumeConfiguration")
        .map(|efs| {
            built(
                "volumes.efsVolumeConfiguration",
                ecs::EfsVolumeConfiguration::builder()
                    .set_file_system_id(text(efs.get("fileSystemId")))
                    .set_root_directory(text(efs.get("rootDirectory")))
                    .set_transit_encryption(
                        text(efs.get("transitEncryption"))
                            .map(|t| ecs::EfsTransitEncryption::from(t.as_str())),
                    )
                    .build(),
            )
        })
        .transpose()?;

    Ok(ecs::Volume::builder()
        .set_name(text(value.get("name")))
        .set_host(value.get("host").map(|host| {
            ecs::HostVolumeProperties::builder()
                .set_source_path(text(host.get("sourcePath")))
                .build()
        }))
        .set_efs_volume_configuration(efs)
        .build())
}

fn runtime_platform(value: &Value) -> ecs::RuntimePlatform {
    ecs::RuntimePlatform::builder()
        .set_cpu_architecture(
            text(value.get("cpuArchitecture")).map(|a| ecs::CpuArchitecture::from(a.as_str())),
        )
        .set_operating_system_family(
            text(value.get("operatingSystemFamily")).map(|f| ecs::OsFamily::from(f.as_str())),
        )
        .build()
}

fn task_placement_constraint(value: &Value) -> ecs::TaskDefinitionPlacementConstraint {
    let mut constraint = ecs::TaskDefinitionPlacementConstraint::builder()
        .set_expression(text(value.get("expression")));
    if let Some(kind) = value.get("type").and_then(Value::as_str) {
        constraint = constraint.r#type(ecs::TaskDefinitionPlacementConstraintType::from(kind));
    }
    constraint.build()
}

fn tags(value: Option<&Value>) -> Option<Vec<ecs::Tag>> {
    non_empty(
        objects(value)
            .iter()
            .map(|tag| {
                ecs::Tag::builder()
                    .set_key(text(tag.get("key")))
                    .set_value(text(tag.get("value")))
                    .build()
            })
            .collect(),
    )
}

fn deployment_configuration(
    configuration: &DeploymentConfiguration,
) -> Result<ecs::DeploymentConfiguration> {
    let alarms = configuration
        .extra
        .get("alarms")
        .map(|alarms| {
            built(
                "deploymentConfiguration.alarms",
                ecs::DeploymentAlarms::builder()
                    .set_alarm_names(texts(alarms.get("alarmNames")))
                    .enable(boolean(alarms.get("enable")).unwrap_or_default())
                    .rollback(boolean(alarms.get("rollback")).unwrap_or_default())
                    .build(),
            )
        })
        .transpose()?;

    Ok(ecs::DeploymentConfiguration::builder()
        .set_maximum_percent(configuration.maximum_percent)
        .set_minimum_healthy_percent(configuration.minimum_healthy_percent)
        .set_deployment_circuit_breaker(configuration.deployment_circuit_breaker.map(|breaker| {
            ecs::DeploymentCircuitBreaker::builder()
                .enable(breaker.enable)
                .rollback(breaker.rollback)
                .build()
        }))
        .set_alarms(alarms)
        .build())
}

fn deployment_controller(controller: &DeploymentControllerSpec) -> Result<ecs::DeploymentController> {
    built(
        "deploymentController",
        ecs::DeploymentController::builder()
            .r#type(ecs::DeploymentControllerType::from(
                controller.controller_type.as_str(),
            ))
            .build(),
    )
}

fn scheduling_strategy(strategy: SchedulingStrategy) -> ecs::SchedulingStrategy {
    match strategy {
        SchedulingStrategy::Replica => ecs::SchedulingStrategy::from("REPLICA"),
        SchedulingStrategy::Daemon => ecs::SchedulingStrategy::from("DAEMON"),
    }
}

fn network_configuration(network: &NetworkConfiguration) -> Result<ecs::NetworkConfiguration> {
    let awsvpc = network
        .awsvpc_configuration
        .as_ref()
        .map(|vpc| {
            built(
                "networkConfiguration.awsvpcConfiguration",
                ecs::AwsVpcConfiguration::builder()
                    .set_subnets(Some(vpc.subnets.clone()))
                    .set_security_groups(non_empty(vpc.security_groups.clone()))
                    .set_assign_public_ip(
                        vpc.assign_public_ip
                            .as_deref()
                            .map(ecs::AssignPublicIp::from),
                    )
                    .build(),
            )
        })
        .transpose()?;
    Ok(ecs::NetworkConfiguration::builder()
        .set_awsvpc_configuration(awsvpc)
        .build())
}

fn load_balancer(lb: &LoadBalancer) -> ecs::LoadBalancer {
    ecs::LoadBalancer::builder()
        .set_target_group_arn(lb.target_group_arn.clone())
        .set_load_balancer_name(lb.load_balancer_name.clone())
        .set_container_name(lb.container_name.clone())
        .set_container_port(lb.container_port)
        .build()
}

fn placement_constraint(value: &Value) -> ecs::PlacementConstraint {
    let mut constraint =
        ecs::PlacementConstraint::builder().set_expression(text(value.get("expression")));
    if let Some(kind) = value.get("type").and_then(Value::as_str) {
        constraint = constraint.r#type(ecs::PlacementConstraintType::from(kind));
    }
    constraint.build()
}

fn placement_strategy(value: &Value) -> ecs::PlacementStrategy {
    let mut strategy = ecs::PlacementStrategy::builder().set_field(text(value.get("field")));
    if let Some(kind) = value.get("type").and_then(Value::as_str) {
        strategy = strategy.r#type(ecs::PlacementStrategyType::from(kind));
    }
    strategy.build()
}

fn capacity_provider(value: &Value) -> Result<ecs::CapacityProviderStrategyItem> {
    built(
        "capacityProviderStrategy",
        ecs::CapacityProviderStrategyItem::builder()
            .set_capacity_provider(text(value.get("capacityProvider")))
            .set_weight(int(value.get("weight")))
            .set_base(int(value.get("base")))
            .build(),
    )
}

fn service_registry(value: &Value) -> ecs::ServiceRegistry {
    ecs::ServiceRegistry::builder()
        .set_registry_arn(text(value.get("registryArn")))
        .set_port(int(value.get("port")))
        .set_container_name(text(value.get("containerName")))
        .set_container_port(int(value.get("containerPort")))
        .build()
}

fn built<T>(field: &str, result: std::result::Result<T, BuildError>) -> Result<T> {
    result.map_err(|e| ConfigError::validation(format!("invalid {field}: {e}"), field).into())
}

fn warn_unsupported(owner: &str, extra: &Extra, supported: &[&[&str]]) {
    for key in extra.keys() {
        if !supported.iter().any(|keys| keys.contains(&key.as_str())) {
            warn!("{owner}: {key} is not supported and is left out of the request");
        }
    }
}

fn each<T>(values: &[Value], convert: impl Fn(&Value) -> Result<T>) -> Result<Option<Vec<T>>> {
    let converted = values.iter().map(convert).collect::<Result<Vec<_>>>()?;
    Ok(non_empty(converted))
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    if values.is_empty() { None } else { Some(values) }
}

fn objects(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn text(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

/// Task-level cpu and memory are strings on the wire but often written as
/// numbers.
fn number_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int(value: Option<&Value>) -> Option<i32> {
    match value? {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn boolean(value: Option<&Value>) -> Option<bool> {
    value.and_then(Value::as_bool)
}

fn texts(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    )
}

fn text_map(value: Option<&Value>) -> Option<HashMap<String, String>> {
    let object = value?.as_object()?;
    Some(
        object
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect(),
    )
}

// SDK response -> definition model

impl From<&ecs::TaskDefinition> for TaskDefinition {
    fn from(td: &ecs::TaskDefinition) -> Self {
        let mut extra = Extra::new();
        put(&mut extra, "cpu", owned(td.cpu()).map(Value::from));
        put(&mut extra, "memory", owned(td.memory()).map(Value::from));
        put(&mut extra, "pidMode", named(td.pid_mode()).map(Value::from));
        put(&mut extra, "ipcMode", named(td.ipc_mode()).map(Value::from));
        put(
            &mut extra,
            "runtimePlatform",
            td.runtime_platform().map(|platform| {
                object([
                    ("cpuArchitecture", named(platform.cpu_architecture()).map(Value::from)),
                    (
                        "operatingSystemFamily",
                        named(platform.operating_system_family()).map(Value::from),
                    ),
                ])
            }),
        );
        put(&mut extra, "volumes", array(slice(td.volumes()).iter().map(volume_value)));

        Self {
            family: owned(td.family()).unwrap_or_default(),
            task_role_arn: owned(td.task_role_arn()),
            execution_role_arn: owned(td.execution_role_arn()),
            network_mode: named(td.network_mode()),
            container_definitions: slice(td.container_definitions())
                .iter()
                .map(ContainerDefinition::from)
                .collect(),
            placement_constraints: slice(td.placement_constraints())
                .iter()
                .map(|c| {
                    object([
                        ("type", named(c.r#type()).map(Value::from)),
                        ("expression", owned(c.expression()).map(Value::from)),
                    ])
                })
                .collect(),
            requires_compatibilities: slice(td.requires_compatibilities())
                .iter()
                .filter_map(|c| named(c))
                .collect(),
            task_definition_arn: owned(td.task_definition_arn()),
            revision: count(td.revision())
                .and_then(|r| u32::try_from(r).ok())
                .filter(|r| *r > 0),
            status: named(td.status()),
            requires_attributes: non_empty(
                slice(td.requires_attributes())
                    .iter()
                    .map(|a| {
                        object([
                            ("name", owned(a.name()).map(Value::from)),
                            ("value", owned(a.value()).map(Value::from)),
                        ])
                    })
                    .collect(),
            ),
            compatibilities: non_empty(
                slice(td.compatibilities())
                    .iter()
                    .filter_map(|c| named(c))
                    .collect(),
            ),
            registered_at: epoch(td.registered_at()),
            registered_by: owned(td.registered_by()),
            deregistered_at: epoch(td.deregistered_at()),
            extra,
        }
    }
}

/// Adds tags returned next to a described task definition.
pub fn with_tags(mut definition: TaskDefinition, tags: &[ecs::Tag]) -> TaskDefinition {
    put(&mut definition.extra, "tags", tag_values(tags));
    definition
}

impl From<&ecs::ContainerDefinition> for ContainerDefinition {
    fn from(container: &ecs::ContainerDefinition) -> Self {
        let mut extra = Extra::new();
        put(&mut extra, "memory", count(container.memory()).map(Value::from));
        put(
            &mut extra,
            "memoryReservation",
            count(container.memory_reservation()).map(Value::from),
        );
        put(&mut extra, "command", strings(slice(container.command())));
        put(&mut extra, "entryPoint", strings(slice(container.entry_point())));
        put(
            &mut extra,
            "workingDirectory",
            owned(container.working_directory()).map(Value::from),
        );
        put(&mut extra, "user", owned(container.user()).map(Value::from));
        put(&mut extra, "hostname", owned(container.hostname()).map(Value::from));
        put(&mut extra, "stopTimeout", count(container.stop_timeout()).map(Value::from));
        put(&mut extra, "startTimeout", count(container.start_timeout()).map(Value::from));
        put(
            &mut extra,
            "readonlyRootFilesystem",
            flag(container.readonly_root_filesystem()).map(Value::from),
        );
        put(&mut extra, "privileged", flag(container.privileged()).map(Value::from));
        put(&mut extra, "interactive", flag(container.interactive()).map(Value::from));
        put(&mut extra, "pseudoTerminal", flag(container.pseudo_terminal()).map(Value::from));
        put(&mut extra, "dockerLabels", container.docker_labels().map(text_map_value));
        put(
            &mut extra,
            "logConfiguration",
            container.log_configuration().map(|log| {
                object([
                    ("logDriver", named(log.log_driver()).map(Value::from)),
                    ("options", log.options().map(text_map_value)),
                    (
                        "secretOptions",
                        array(slice(log.secret_options()).iter().map(|s| {
                            object([
                                ("name", owned(s.name()).map(Value::from)),
                                ("valueFrom", owned(s.value_from()).map(Value::from)),
                            ])
                        })),
                    ),
                ])
            }),
        );
        put(
            &mut extra,
            "healthCheck",
            container.health_check().map(|check| {
                object([
                    ("command", strings(slice(check.command()))),
                    ("interval", count(check.interval()).map(Value::from)),
                    ("timeout", count(check.timeout()).map(Value::from)),
                    ("retries", count(check.retries()).map(Value::from)),
                    ("startPeriod", count(check.start_period()).map(Value::from)),
                ])
            }),
        );
        put(
            &mut extra,
            "dependsOn",
            array(slice(container.depends_on()).iter().map(|d| {
                object([
                    ("containerName", owned(d.container_name()).map(Value::from)),
                    ("condition", named(d.condition()).map(Value::from)),
                ])
            })),
        );
        put(
            &mut extra,
            "ulimits",
            array(slice(container.ulimits()).iter().map(|u| {
                object([
                    ("name", named(u.name()).map(Value::from)),
                    ("softLimit", count(u.soft_limit()).map(Value::from)),
                    ("hardLimit", count(u.hard_limit()).map(Value::from)),
                ])
            })),
        );
        put(
            &mut extra,
            "environmentFiles",
            array(slice(container.environment_files()).iter().map(|f| {
                object([
                    ("value", owned(f.value()).map(Value::from)),
                    ("type", named(f.r#type()).map(Value::from)),
                ])
            })),
        );
        put(
            &mut extra,
            "repositoryCredentials",
            container.repository_credentials().map(|c| {
                object([(
                    "credentialsParameter",
                    owned(c.credentials_parameter()).map(Value::from),
                )])
            }),
        );

        Self {
            name: owned(container.name()).unwrap_or_default(),
            image: owned(container.image()),
            cpu: count(container.cpu()).map(i64::from),
            essential: flag(container.essential()),
            environment: slice(container.environment())
                .iter()
                .map(|kv| KeyValuePair {
                    name: owned(kv.name()).unwrap_or_default(),
                    value: owned(kv.value()),
                })
                .collect(),
            port_mappings: slice(container.port_mappings())
                .iter()
                .map(|p| {
                    let mut extra = Extra::new();
                    put(&mut extra, "name", owned(p.name()).map(Value::from));
                    put(&mut extra, "appProtocol", named(p.app_protocol()).map(Value::from));
                    put(
                        &mut extra,
                        "containerPortRange",
                        owned(p.container_port_range()).map(Value::from),
                    );
                    PortMapping {
                        container_port: count(p.container_port()),
                        host_port: count(p.host_port()),
                        protocol: named(p.protocol()),
                        extra,
                    }
                })
                .collect(),
            mount_points: slice(container.mount_points())
                .iter()
                .map(|m| MountPoint {
                    source_volume: owned(m.source_volume()),
                    container_path: owned(m.container_path()),
                    read_only: flag(m.read_only()),
                })
                .collect(),
            secrets: slice(container.secrets())
                .iter()
                .map(|s| Secret {
                    name: owned(s.name()).unwrap_or_default(),
                    value_from: owned(s.value_from()).unwrap_or_default(),
                })
                .collect(),
            volumes_from: slice(container.volumes_from())
                .iter()
                .map(|v| VolumeFrom {
                    source_container: owned(v.source_container()),
                    read_only: flag(v.read_only()),
                })
                .collect(),
            extra,
        }
    }
}

fn volume_value(volume: &ecs::Volume) -> Value {
    object([
        ("name", owned(volume.name()).map(Value::from)),
        (
            "host",
            volume
                .host()
                .map(|host| object([("sourcePath", owned(host.source_path()).map(Value::from))])),
        ),
        (
            "efsVolumeConfiguration",
            volume.efs_volume_configuration().map(|efs| {
                object([
                    ("fileSystemId", owned(efs.file_system_id()).map(Value::from)),
                    ("rootDirectory", owned(efs.root_directory()).map(Value::from)),
                    ("transitEncryption", named(efs.transit_encryption()).map(Value::from)),
                ])
            }),
        ),
    ])
}

fn tag_values(tags: &[ecs::Tag]) -> Option<Value> {
    array(tags.iter().map(|tag| {
        object([
            ("key", owned(tag.key()).map(Value::from)),
            ("value", owned(tag.value()).map(Value::from)),
        ])
    }))
}

impl From<&ecs::Service> for Service {
    fn from(service: &ecs::Service) -> Self {
        let mut extra = Extra::new();
        put(
            &mut extra,
            "serviceRegistries",
            array(slice(service.service_registries()).iter().map(|r| {
                object([
                    ("registryArn", owned(r.registry_arn()).map(Value::from)),
                    ("port", count(r.port()).map(Value::from)),
                    ("containerName", owned(r.container_name()).map(Value::from)),
                    ("containerPort", count(r.container_port()).map(Value::from)),
                ])
            })),
        );
        put(&mut extra, "tags", tag_values(slice(service.tags())));
        put(&mut extra, "propagateTags", named(service.propagate_tags()).map(Value::from));
        put(
            &mut extra,
            "enableECSManagedTags",
            flag(service.enable_ecs_managed_tags()).map(Value::from),
        );
        put(
            &mut extra,
            "enableExecuteCommand",
            flag(service.enable_execute_command()).map(Value::from),
        );

        Self {
            service_arn: owned(service.service_arn()),
            service_name: owned(service.service_name()),
            cluster_arn: owned(service.cluster_arn()),
            status: owned(service.status()),
            desired_count: count(service.desired_count()),
            running_count: count(service.running_count()),
            pending_count: count(service.pending_count()),
            launch_type: named(service.launch_type()),
            platform_version: owned(service.platform_version()),
            task_definition: owned(service.task_definition()),
            deployment_configuration: service
                .deployment_configuration()
                .map(DeploymentConfiguration::from),
            deployment_controller: service
                .deployment_controller()
                .and_then(|c| named(c.r#type()))
                .map(|controller_type| DeploymentControllerSpec { controller_type }),
            scheduling_strategy: named(service.scheduling_strategy()).and_then(|s| {
                match s.as_str() {
                    "REPLICA" => Some(SchedulingStrategy::Replica),
                    "DAEMON" => Some(SchedulingStrategy::Daemon),
                    _ => None,
                }
            }),
            health_check_grace_period_seconds: count(service.health_check_grace_period_seconds()),
            network_configuration: service.network_configuration().map(|network| {
                NetworkConfiguration {
                    awsvpc_configuration: network.awsvpc_configuration().map(|vpc| {
                        AwsVpcConfiguration {
                            subnets: slice(vpc.subnets()).to_vec(),
                            security_groups: slice(vpc.security_groups()).to_vec(),
                            assign_public_ip: named(vpc.assign_public_ip()),
                        }
                    }),
                }
            }),
            load_balancers: slice(service.load_balancers())
                .iter()
                .map(|lb| LoadBalancer {
                    target_group_arn: owned(lb.target_group_arn()),
                    load_balancer_name: owned(lb.load_balancer_name()),
                    container_name: owned(lb.container_name()),
                    container_port: count(lb.container_port()),
                })
                .collect(),
            placement_constraints: slice(service.placement_constraints())
                .iter()
                .map(|c| {
                    object([
                        ("type", named(c.r#type()).map(Value::from)),
                        ("expression", owned(c.expression()).map(Value::from)),
                    ])
                })
                .collect(),
            placement_strategy: slice(service.placement_strategy())
                .iter()
                .map(|s| {
                    object([
                        ("type", named(s.r#type()).map(Value::from)),
                        ("field", owned(s.field()).map(Value::from)),
                    ])
                })
                .collect(),
            capacity_provider_strategy: slice(service.capacity_provider_strategy())
                .iter()
                .map(|item| {
                    object([
                        ("capacityProvider", owned(item.capacity_provider()).map(Value::from)),
                        ("weight", count(item.weight()).map(Value::from)),
                        ("base", count(item.base()).map(Value::from)),
                    ])
                })
                .collect(),
            role_arn: owned(service.role_arn()),
            deployments: slice(service.deployments())
                .iter()
                .map(Deployment::from)
                .collect(),
            events: slice(service.events())
                .iter()
                .map(|event| ServiceEvent {
                    id: owned(event.id()).unwrap_or_default(),
                    created_at: epoch(event.created_at()),
                    message: owned(event.message()).unwrap_or_default(),
                })
                .collect(),
            task_sets: non_empty(
                slice(service.task_sets())
                    .iter()
                    .map(|set| {
                        object([
                            ("id", owned(set.id()).map(Value::from)),
                            ("status", owned(set.status()).map(Value::from)),
                            ("taskDefinition", owned(set.task_definition()).map(Value::from)),
                        ])
                    })
                    .collect(),
            ),
            created_at: epoch(service.created_at()),
            created_by: owned(service.created_by()),
            extra,
        }
    }
}

impl From<&ecs::DeploymentConfiguration> for DeploymentConfiguration {
    fn from(configuration: &ecs::DeploymentConfiguration) -> Self {
        let mut extra = Extra::new();
        put(
            &mut extra,
            "alarms",
            configuration.alarms().map(|alarms| {
                object([
                    ("alarmNames", Some(Value::from(slice(alarms.alarm_names()).to_vec()))),
                    ("enable", flag(alarms.enable()).map(Value::from)),
                    ("rollback", flag(alarms.rollback()).map(Value::from)),
                ])
            }),
        );
        Self {
            maximum_percent: count(configuration.maximum_percent()),
            minimum_healthy_percent: count(configuration.minimum_healthy_percent()),
            deployment_circuit_breaker: configuration.deployment_circuit_breaker().map(|b| {
                CircuitBreaker {
                    enable: flag(b.enable()).unwrap_or_default(),
                    rollback: flag(b.rollback()).unwrap_or_default(),
                }
            }),
            extra,
        }
    }
}

impl From<&ecs::Deployment> for Deployment {
    fn from(deployment: &ecs::Deployment) -> Self {
        Self {
            id: owned(deployment.id()).unwrap_or_default(),
            status: owned(deployment.status()).unwrap_or_default(),
            task_definition: owned(deployment.task_definition()).unwrap_or_default(),
            desired_count: count(deployment.desired_count()).unwrap_or_default(),
            pending_count: count(deployment.pending_count()).unwrap_or_default(),
            running_count: count(deployment.running_count()).unwrap_or_default(),
            failed_tasks: count(deployment.failed_tasks()).unwrap_or_default(),
            rollout_state: named(deployment.rollout_state()),
            rollout_state_reason: owned(deployment.rollout_state_reason()),
            created_at: epoch(deployment.created_at()),
            updated_at: epoch(deployment.updated_at()),
        }
    }
}

fn put(extra: &mut Extra, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        extra.insert(key.to_string(), value);
    }
}

fn object<const N: usize>(fields: [(&str, Option<Value>); N]) -> Value {
    let mut map = Map::new();
    for (key, value) in fields {
        put(&mut map, key, value);
    }
    Value::Object(map)
}

fn array(values: impl Iterator<Item = Value>) -> Option<Value> {
    let values: Vec<_> = values.collect();
    if values.is_empty() { None } else { Some(Value::Array(values)) }
}

fn strings(values: &[String]) -> Option<Value> {
    if values.is_empty() { None } else { Some(Value::from(values.to_vec())) }
}

fn text_map_value(map: &HashMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect(),
    )
}

pub(crate) fn owned<'a>(value: impl Into<Option<&'a str>>) -> Option<String> {
    value.into().map(str::to_string)
}

pub(crate) fn named<'a, T: AsRef<str> + 'a>(value: impl Into<Option<&'a T>>) -> Option<String> {
    value.into().map(|v| v.as_ref().to_string())
}

pub(crate) fn count(value: impl Into<Option<i32>>) -> Option<i32> {
    value.into()
}

pub(crate) fn flag(value: impl Into<Option<bool>>) -> Option<bool> {
    value.into()
}

pub(crate) fn slice<'a, T>(values: impl Into<Option<&'a [T]>>) -> &'a [T] {
    values.into().unwrap_or_default()
}

fn epoch<'a>(value: impl Into<Option<&'a DateTime>>) -> Option<f64> {
    value.into().map(DateTime::as_secs_f64)
}
