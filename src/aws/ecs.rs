//! ECS control-plane client.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ecs::Client;
use aws_sdk_ecs::client::Waiters;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::types::{SortOrder, TaskDefinitionField, TaskDefinitionStatus};
use aws_sdk_ecs::waiters::services_stable::WaitUntilServicesStableError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{ApiError, NotFoundError, Result, RolloutError, WaitError};

use super::convert::{self, owned, slice};
use super::sdk::api_error;
use super::types::{
    CreateServiceRequest, Service, TaskDefinition, UpdateServiceRequest, parse_task_definition_ref,
};

/// Shortest wait the SDK waiter accepts; its first retry is 15s out.
const MIN_WAITER_SECS: u64 = 16;

/// Operations the engine needs from the container control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Describes one service.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError::Service` when the service does not exist.
    async fn describe_service(&self, cluster: &str, service: &str) -> Result<Service>;

    /// Creates a service.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn create_service(&self, request: &CreateServiceRequest) -> Result<Service>;

    /// Updates a service.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn update_service(&self, request: &UpdateServiceRequest) -> Result<Service>;

    /// Describes a task definition by family, `family:revision` or ARN.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError::TaskDefinition` when it cannot be described.
    async fn describe_task_definition(&self, task_definition: &str) -> Result<TaskDefinition>;

    /// Registers a new revision and returns it as registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn register_task_definition(&self, definition: &TaskDefinition) -> Result<TaskDefinition>;

    /// Deregisters a revision.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn deregister_task_definition(&self, task_definition: &str) -> Result<TaskDefinition>;

    /// Lists the ARNs of the ACTIVE revisions of exactly `family`, oldest
    /// first, following every page.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn list_task_definitions(&self, family: &str) -> Result<Vec<String>>;

    /// Blocks until the service has a single deployment whose running count
    /// matches the desired count, for at most `max_wait`.
    ///
    /// # Errors
    ///
    /// Returns `WaitError::Failed` when the service is missing, draining or
    /// inactive, `WaitError::TimedOut` after `max_wait`, and
    /// `WaitError::Cancelled` as soon as `cancel` fires, even mid-request.
    async fn wait_services_stable(
        &self,
        cluster: &str,
        service: &str,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// ECS client over the AWS SDK.
#[derive(Debug, Clone)]
pub struct EcsClient {
    client: Client,
}

impl EcsClient {
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
impl ControlPlane for EcsClient {
    async fn describe_service(&self, cluster: &str, service: &str) -> Result<Service> {
        debug!("Describing service {service} in cluster {cluster}");
        let output = self
            .client
            .describe_services()
            .cluster(cluster)
            .services(service)
            .send()
            .await
            .map_err(|e| api_error("ecs:DescribeServices", &e))?;

        if let Some(failure) = slice(output.failures()).first() {
            trace!(
                "DescribeServices failure: {}",
                owned(failure.reason()).as_deref().unwrap_or("unknown")
            );
        }

        slice(output.services())
            .first()
            .map(Service::from)
            .ok_or_else(|| {
                NotFoundError::Service {
                    cluster: cluster.to_string(),
                    service: service.to_string(),
                }
                .into()
            })
    }

    async fn create_service(&self, request: &CreateServiceRequest) -> Result<Service> {
        debug!("Creating service {}", request.service_name);
        let output = convert::create_service(self.client.create_service(), request)?
            .send()
            .await
            .map_err(|e| api_error("ecs:CreateService", &e))?;
        output.service().map(Service::from).ok_or_else(|| {
            ApiError::invalid_response("ecs:CreateService", "no service returned").into()
        })
    }

    async fn update_service(&self, request: &UpdateServiceRequest) -> Result<Service> {
        debug!("Updating service {}", request.service);
        let output = convert::update_service(self.client.update_service(), request)?
            .send()
            .await
            .map_err(|e| api_error("ecs:UpdateService", &e))?;
        output.service().map(Service::from).ok_or_else(|| {
            ApiError::invalid_response("ecs:UpdateService", "no service returned").into()
        })
    }

    async fn describe_task_definition(&self, task_definition: &str) -> Result<TaskDefinition> {
        debug!("Describing task definition {task_definition}");
        let output = self
            .client
            .describe_task_definition()
            .task_definition(task_definition)
            .include(TaskDefinitionField::from("TAGS"))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|e| e.is_client_exception()) {
                    RolloutError::from(NotFoundError::TaskDefinition {
                        task_definition: task_definition.to_string(),
                    })
                } else {
                    api_error("ecs:DescribeTaskDefinition", &e).into()
                }
            })?;

        output
            .task_definition()
            .map(|td| convert::with_tags(TaskDefinition::from(td), slice(output.tags())))
            .ok_or_else(|| {
                NotFoundError::TaskDefinition {
                    task_definition: task_definition.to_string(),
                }
                .into()
            })
    }

    async fn register_task_definition(&self, definition: &TaskDefinition) -> Result<TaskDefinition> {
        debug!("Registering task definition family {}", definition.family);
        let output =
            convert::register_task_definition(self.client.register_task_definition(), definition)?
                .send()
                .await
                .map_err(|e| api_error("ecs:RegisterTaskDefinition", &e))?;

        output
            .task_definition()
            .map(|td| convert::with_tags(TaskDefinition::from(td), slice(output.tags())))
            .ok_or_else(|| {
                ApiError::invalid_response(
                    "ecs:RegisterTaskDefinition",
                    "no task definition returned",
                )
                .into()
            })
    }

    async fn deregister_task_definition(&self, task_definition: &str) -> Result<TaskDefinition> {
        debug!("Deregistering task definition {task_definition}");
        let output = self
            .client
            .deregister_task_definition()
            .task_definition(task_definition)
            .send()
            .await
            .map_err(|e| api_error("ecs:DeregisterTaskDefinition", &e))?;

        output.task_definition().map(TaskDefinition::from).ok_or_else(|| {
            ApiError::invalid_response(
                "ecs:DeregisterTaskDefinition",
                "no task definition returned",
            )
            .into()
        })
    }

    async fn list_task_definitions(&self, family: &str) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_task_definitions()
                .family_prefix(family)
                .status(TaskDefinitionStatus::from("ACTIVE"))
                .sort(SortOrder::from("ASC"))
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| api_error("ecs:ListTaskDefinitions", &e))?;

            // familyPrefix is a prefix match; keep only this exact family.
            arns.extend(
                slice(output.task_definition_arns())
                    .iter()
                    .filter(|arn| parse_task_definition_ref(arn).is_some_and(|(f, _)| f == family))
                    .cloned(),
            );

            match owned(output.next_token()) {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        debug!("Found {} active revisions of {family}", arns.len());
        Ok(arns)
    }

    async fn wait_services_stable(
        &self,
        cluster: &str,
        service: &str,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let target = format!("service {service}");
        let waiter = self
            .client
            .wait_until_services_stable()
            .cluster(cluster)
            .services(service)
            .wait(max_wait.max(Duration::from_secs(MIN_WAITER_SECS)));

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(WaitError::Cancelled { target }.into()),
            result = waiter => result,
        };

        match result {
            Ok(_) => Ok(()),
            Err(WaitUntilServicesStableError::ExceededMaxWait(_)) => Err(WaitError::TimedOut {
                target,
                waited_secs: max_wait.as_secs(),
            }
            .into()),
            Err(WaitUntilServicesStableError::FailureState(_)) => {
                let (status, reason) = match self.describe_service(cluster, service).await {
                    Ok(live) => (
                        live.status.unwrap_or_else(|| String::from("UNKNOWN")),
                        "service is no longer active",
                    ),
                    Err(RolloutError::NotFound(_)) => {
                        (String::from("MISSING"), "service does not exist")
                    }
                    Err(e) => return Err(e),
                };
                Err(WaitError::Failed {
                    target,
                    status,
                    reason: reason.to_string(),
                }
                .into())
            }
            Err(e) => Err(ApiError::network(
                "ecs:DescribeServices",
                DisplayErrorContext(&e).to_string(),
            )
            .into()),
        }
    }
}
