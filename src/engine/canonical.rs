//! Canonical forms of task and service definitions.
//!
//! A declared definition and the one the control plane echoes back differ in
//! ways that carry no meaning: list order, defaults filled in server side,
//! runtime bookkeeping. Both sides are put through the same function before
//! they are compared, so only real differences survive.

use serde::Serialize;
use serde_json::Value;

use crate::aws::types::{
    CONTROLLER_ECS, CircuitBreaker, ContainerDefinition, DeploymentConfiguration,
    DeploymentControllerSpec, Extra, RUNTIME_SERVICE_KEYS, SchedulingStrategy, Service,
    TaskDefinition,
};

/// Returns the canonical form of a task definition.
#[must_use]
pub fn canonical_task_definition(definition: &TaskDefinition) -> TaskDefinition {
    let mut td = definition.clone();
    td.clear_runtime_fields();

    let awsvpc = td.is_awsvpc();
    for container in &mut td.container_definitions {
        canonical_container(container, awsvpc);
    }
    td.container_definitions.sort_by(|a, b| a.name.cmp(&b.name));

    sort_by_json(&mut td.placement_constraints);
    td.requires_compatibilities.sort();
    td.requires_compatibilities.dedup();

    // Task-level cpu and memory come back as strings.
    for key in ["cpu", "memory"] {
        if let Some(Value::Number(n)) = td.extra.get(key) {
            let text = n.to_string();
            td.extra.insert(key.to_string(), Value::String(text));
        }
    }
    prune_extra(&mut td.extra);
    td
}

fn canonical_container(container: &mut ContainerDefinition, awsvpc: bool) {
    container.cpu.get_or_insert(0);
    container.essential.get_or_insert(true);

    container.environment.sort_by(|a, b| a.name.cmp(&b.name));
    container.secrets.sort_by(|a, b| a.name.cmp(&b.name));

    for mapping in &mut container.port_mappings {
        mapping.protocol.get_or_insert_with(|| String::from("tcp"));
        if awsvpc && mapping.host_port.is_none() {
            mapping.host_port = mapping.container_port;
        }
        prune_extra(&mut mapping.extra);
    }
    sort_by_json(&mut container.port_mappings);

    for mount in &mut container.mount_points {
        mount.read_only.get_or_insert(false);
    }
    sort_by_json(&mut container.mount_points);

    for volume in &mut container.volumes_from {
        volume.read_only.get_or_insert(false);
    }
    sort_by_json(&mut container.volumes_from);

    prune_extra(&mut container.extra);
}

/// Returns the canonical form of a service definition.
///
/// The desired count is dropped: it is owned by `scale` and auto-scaling,
/// not by the definition file.
#[must_use]
pub fn canonical_service(definition: &Service) -> Service {
    let mut sv = definition.clone();
    sv.clear_runtime_fields();
    sv.service_name = None;
    sv.task_definition = None;
    sv.desired_count = None;

    sv.health_check_grace_period_seconds.get_or_insert(0);

    if let Some(awsvpc) = sv
        .network_configuration
        .as_mut()
        .and_then(|n| n.awsvpc_configuration.as_mut())
    {
        awsvpc
            .assign_public_ip
            .get_or_insert_with(|| String::from("DISABLED"));
        awsvpc.subnets.sort();
        awsvpc.security_groups.sort();
    }

    if sv.launch_type.as_deref() == Some("FARGATE") && sv.platform_version.is_none() {
        sv.platform_version = Some(String::from("LATEST"));
    }

    let scheduling = sv.scheduling();
    sv.scheduling_strategy = Some(scheduling);

    if sv.deployment_controller.is_none() {
        sv.deployment_controller = Some(DeploymentControllerSpec {
            controller_type: CONTROLLER_ECS.to_string(),
        });
    }
    let rolling = sv.controller_type() == CONTROLLER_ECS;

    let (max_default, min_default) = match scheduling {
        SchedulingStrategy::Replica => (200, 100),
        SchedulingStrategy::Daemon => (100, 0),
    };
    let config = sv
        .deployment_configuration
        .get_or_insert_with(DeploymentConfiguration::default);
    config.maximum_percent.get_or_insert(max_default);
    config.minimum_healthy_percent.get_or_insert(min_default);
    if rolling {
        config
            .deployment_circuit_breaker
            .get_or_insert(CircuitBreaker::default());
    }
    if config.extra.get("alarms").is_some_and(is_default_alarms) {
        config.extra.remove("alarms");
    }
    prune_extra(&mut config.extra);

    sort_by_json(&mut sv.placement_constraints);
    sort_by_json(&mut sv.placement_strategy);
    for item in &mut sv.capacity_provider_strategy {
        if let Value::Object(item) = item {
            item.entry("base").or_insert(Value::from(0));
        }
    }
    sort_by_json(&mut sv.capacity_provider_strategy);

    for key in RUNTIME_SERVICE_KEYS {
        sv.extra.remove(*key);
    }
    prune_extra(&mut sv.extra);
    sv.extra
        .entry("propagateTags")
        .or_insert_with(|| Value::from("NONE"));
    sv.extra
        .entry("enableECSManagedTags")
        .or_insert(Value::Bool(false));
    sv.extra
        .entry("enableExecuteCommand")
        .or_insert(Value::Bool(false));
    sv
}

/// Alarms that are off and name no alarm are what the control plane reports
/// when none were configured.
fn is_default_alarms(alarms: &Value) -> bool {
    let enabled = alarms.get("enable").and_then(Value::as_bool).unwrap_or(false);
    let named = alarms
        .get("alarmNames")
        .and_then(Value::as_array)
        .is_some_and(|names| !names.is_empty());
    !enabled && !named
}

/// Sorts a list by the JSON text of its elements.
fn sort_by_json<T: Serialize>(items: &mut [T]) {
    items.sort_by_cached_key(|item| serde_json::to_string(item).unwrap_or_default());
}

/// Drops nulls and empty arrays/objects, recursively.
fn prune_extra(extra: &mut Extra) {
    extra.retain(|_, value| !prune(value));
}

/// Prunes `value` in place and returns true if nothing is left of it.
fn prune(value: &mut Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => {
            items.retain_mut(|item| !prune(item));
            items.is_empty()
        }
        Value::Object(map) => {
            map.retain(|_, v| !prune(v));
            map.is_empty()
        }
        _ => false,
    }
}
