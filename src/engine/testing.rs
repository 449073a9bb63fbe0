//! In-memory control plane and coordinator for engine tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::aws::codedeploy::{
    CreateDeploymentRequest, DeploymentCoordinator, DeploymentGroupRef, DeploymentStatus,
};
use crate::aws::ecs::ControlPlane;
use crate::aws::types::{
    CreateServiceRequest, Service, TaskDefinition, UpdateServiceRequest, parse_task_definition_ref,
};
use crate::error::{NotFoundError, Result, WaitError};

/// Fake ECS control plane.
#[derive(Debug, Default)]
pub struct FakeControlPlane {
    service: Mutex<Option<Service>>,
    task_definitions: Mutex<Vec<TaskDefinition>>,
    updates: Mutex<Vec<UpdateServiceRequest>>,
    created: Mutex<Vec<CreateServiceRequest>>,
    calls: Mutex<Vec<String>>,
    describes: AtomicUsize,
    /// `None` never stabilizes.
    stable_after: Option<Duration>,
    /// When each stable wait began and the bound it was given.
    stable_waits: Mutex<Vec<(Instant, Duration)>>,
}

pub fn task_definition_arn(family: &str, revision: u32) -> String {
    format!("arn:aws:ecs:us-east-1:123456789012:task-definition/{family}:{revision}")
}

impl FakeControlPlane {
    pub fn with_service(self, service: Service) -> Self {
        *self.service.lock().unwrap() = Some(service);
        self
    }

    /// Registers revisions `1..=count` of `family`.
    pub fn with_revisions(self, family: &str, count: u32) -> Self {
        {
            let mut tds = self.task_definitions.lock().unwrap();
            for revision in 1..=count {
                tds.push(registered(family, revision));
            }
        }
        self
    }

    pub fn with_stable_after(mut self, after: Duration) -> Self {
        self.stable_after = Some(after);
        self
    }

    pub fn updates(&self) -> Vec<UpdateServiceRequest> {
        self.updates.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<CreateServiceRequest> {
        self.created.lock().unwrap().clone()
    }

    /// Operation names in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Names of mutating operations that were called.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                c.starts_with("UpdateService")
                    || c.starts_with("CreateService")
                    || c.starts_with("RegisterTaskDefinition")
                    || c.starts_with("DeregisterTaskDefinition")
            })
            .collect()
    }

    pub fn stable_waits(&self) -> Vec<(Instant, Duration)> {
        self.stable_waits.lock().unwrap().clone()
    }

    pub fn describe_count(&self) -> usize {
        self.describes.load(Ordering::SeqCst)
    }

    pub fn status_of(&self, family: &str, revision: u32) -> Option<String> {
        self.task_definitions
            .lock()
            .unwrap()
            .iter()
            .find(|td| td.family == family && td.revision == Some(revision))
            .and_then(|td| td.status.clone())
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

fn registered(family: &str, revision: u32) -> TaskDefinition {
    TaskDefinition {
        family: family.to_string(),
        revision: Some(revision),
        task_definition_arn: Some(task_definition_arn(family, revision)),
        status: Some(String::from("ACTIVE")),
        ..TaskDefinition::default()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn describe_service(&self, cluster: &str, service: &str) -> Result<Service> {
        self.describes.fetch_add(1, Ordering::SeqCst);
        self.record("DescribeServices");
        self.service.lock().unwrap().clone().ok_or_else(|| {
            NotFoundError::Service {
                cluster: cluster.to_string(),
                service: service.to_string(),
            }
            .into()
        })
    }

    async fn create_service(&self, request: &CreateServiceRequest) -> Result<Service> {
        self.record("CreateService");
        self.created.lock().unwrap().push(request.clone());
        let mut service = request.definition.clone();
        service.service_name = Some(request.service_name.clone());
        service.task_definition = Some(request.task_definition.clone());
        service.desired_count = request.desired_count;
        *self.service.lock().unwrap() = Some(service.clone());
        Ok(service)
    }

    async fn update_service(&self, request: &UpdateServiceRequest) -> Result<Service> {
        self.record(format!(
            "UpdateService:{}",
            request.task_definition.as_deref().unwrap_or("-")
        ));
        self.updates.lock().unwrap().push(request.clone());
        let mut guard = self.service.lock().unwrap();
        let service = guard.get_or_insert_with(Service::default);
        if let Some(td) = &request.task_definition {
            service.task_definition = Some(td.clone());
        }
        if request.desired_count.is_some() {
            service.desired_count = request.desired_count;
        }
        Ok(service.clone())
    }

    async fn describe_task_definition(&self, task_definition: &str) -> Result<TaskDefinition> {
        self.record(format!("DescribeTaskDefinition:{task_definition}"));
        let tds = self.task_definitions.lock().unwrap();
        let found = match parse_task_definition_ref(task_definition) {
            Some((family, revision)) => tds
                .iter()
                .find(|td| td.family == family && td.revision == Some(revision)),
            None => tds
                .iter()
                .filter(|td| {
                    td.family == task_definition && td.status.as_deref() == Some("ACTIVE")
                })
                .max_by_key(|td| td.revision),
        };
        found.cloned().ok_or_else(|| {
            NotFoundError::TaskDefinition {
                task_definition: task_definition.to_string(),
            }
            .into()
        })
    }

    async fn register_task_definition(&self, definition: &TaskDefinition) -> Result<TaskDefinition> {
        self.record(format!("RegisterTaskDefinition:{}", definition.family));
        let mut tds = self.task_definitions.lock().unwrap();
        let revision = tds
            .iter()
            .filter(|td| td.family == definition.family)
            .filter_map(|td| td.revision)
            .max()
            .unwrap_or(0)
            + 1;
        let mut td = definition.to_register_input();
        td.revision = Some(revision);
        td.task_definition_arn = Some(task_definition_arn(&definition.family, revision));
        td.status = Some(String::from("ACTIVE"));
        tds.push(td.clone());
        Ok(td)
    }

    async fn deregister_task_definition(&self, task_definition: &str) -> Result<TaskDefinition> {
        self.record(format!("DeregisterTaskDefinition:{task_definition}"));
        let mut tds = self.task_definitions.lock().unwrap();
        let td = tds
            .iter_mut()
            .find(|td| td.task_definition_arn.as_deref() == Some(task_definition))
            .ok_or_else(|| NotFoundError::TaskDefinition {
                task_definition: task_definition.to_string(),
            })?;
        td.status = Some(String::from("INACTIVE"));
        Ok(td.clone())
    }

    async fn list_task_definitions(&self, family: &str) -> Result<Vec<String>> {
        self.record(format!("ListTaskDefinitions:{family}"));
        let tds = self.task_definitions.lock().unwrap();
        let mut active: Vec<_> = tds
            .iter()
            .filter(|td| td.family == family && td.status.as_deref() == Some("ACTIVE"))
            .collect();
        active.sort_by_key(|td| td.revision);
        Ok(active
            .into_iter()
            .filter_map(|td| td.task_definition_arn.clone())
            .collect())
    }

    async fn wait_services_stable(
        &self,
        _cluster: &str,
        service: &str,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.record("WaitServicesStable");
        self.stable_waits
            .lock()
            .unwrap()
            .push((Instant::now(), max_wait));
        let cancelled = WaitError::Cancelled {
            target: format!("service {service}"),
        };
        match self.stable_after {
            Some(after) => tokio::select! {
                () = cancel.cancelled() => Err(cancelled.into()),
                () = tokio::time::sleep(after) => Ok(()),
            },
            None => {
                cancel.cancelled().await;
                Err(cancelled.into())
            }
        }
    }
}

/// Fake CodeDeploy coordinator.
#[derive(Debug, Default)]
pub struct FakeCoordinator {
    group: Option<DeploymentGroupRef>,
    in_progress: Vec<String>,
    failure: Option<DeploymentStatus>,
    created: Mutex<Vec<CreateDeploymentRequest>>,
    waited: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCoordinator {
    pub fn with_group(mut self, group: DeploymentGroupRef) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_in_progress(mut self, ids: &[&str]) -> Self {
        self.in_progress = ids.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with_failure(mut self, status: DeploymentStatus) -> Self {
        self.failure = Some(status);
        self
    }

    pub fn created(&self) -> Vec<CreateDeploymentRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn waited(&self) -> Vec<String> {
        self.waited.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeploymentCoordinator for FakeCoordinator {
    async fn create_deployment(&self, request: &CreateDeploymentRequest) -> Result<String> {
        self.calls.lock().unwrap().push(String::from("CreateDeployment"));
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        Ok(format!("d-{:07}", created.len()))
    }

    async fn list_deployments(
        &self,
        _application_name: &str,
        _deployment_group_name: &str,
        _statuses: &[DeploymentStatus],
    ) -> Result<Vec<String>> {
        self.calls.lock().unwrap().push(String::from("ListDeployments"));
        Ok(self.in_progress.clone())
    }

    async fn find_deployment_group(
        &self,
        _cluster: &str,
        _service: &str,
    ) -> Result<Option<DeploymentGroupRef>> {
        self.calls.lock().unwrap().push(String::from("FindDeploymentGroup"));
        Ok(self.group.clone())
    }

    async fn wait_deployment_successful(
        &self,
        deployment_id: &str,
        _max_wait: Duration,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.waited.lock().unwrap().push(deployment_id.to_string());
        match self.failure {
            Some(status) => Err(WaitError::Failed {
                target: format!("deployment {deployment_id}"),
                status: status.to_string(),
                reason: String::from("fake failure"),
            }
            .into()),
            None => Ok(()),
        }
    }
}
