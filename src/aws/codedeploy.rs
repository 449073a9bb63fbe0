//! CodeDeploy client for blue/green rollouts.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_codedeploy::Client;
use aws_sdk_codedeploy::client::Waiters;
use aws_sdk_codedeploy::error::DisplayErrorContext;
use aws_sdk_codedeploy::types::{AppSpecContent, RevisionLocation, RevisionLocationType};
use aws_sdk_codedeploy::waiters::deployment_successful::WaitUntilDeploymentSuccessfulError;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{ApiError, Result, WaitError};

use super::convert::{named, owned, slice};
use super::sdk::api_error;
use super::types::short_name;

/// `BatchGetDeploymentGroups` accepts at most this many names per call.
const BATCH_GET_LIMIT: usize = 25;

/// Shortest wait the SDK waiter accepts; its first retry is 15s out.
const MIN_WAITER_SECS: u64 = 16;

/// A CodeDeploy application and deployment group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentGroupRef {
    /// CodeDeploy application name.
    pub application_name: String,
    /// Deployment group name.
    pub deployment_group_name: String,
    /// Deployment config overriding the group's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_config_name: Option<String>,
}

impl DeploymentGroupRef {
    /// Creates a group reference without a deployment config override.
    #[must_use]
    pub fn new(application_name: impl Into<String>, deployment_group_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            deployment_group_name: deployment_group_name.into(),
            deployment_config_name: None,
        }
    }

    /// Sets the deployment config override.
    #[must_use]
    pub fn with_deployment_config(mut self, name: Option<String>) -> Self {
        self.deployment_config_name = name;
        self
    }
}

impl fmt::Display for DeploymentGroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application_name, self.deployment_group_name)
    }
}

/// CodeDeploy deployment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentStatus {
    /// Created, not yet queued.
    Created,
    /// Waiting for an earlier deployment.
    Queued,
    /// Traffic is being shifted.
    InProgress,
    /// Waiting before terminating the original task set.
    Baking,
    /// Waiting for traffic to be rerouted manually.
    Ready,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Stopped by a user or an alarm.
    Stopped,
    /// A status this client does not know about.
    Unknown,
}

impl DeploymentStatus {
    /// Statuses of a deployment that has not finished yet.
    pub const PENDING: [Self; 3] = [Self::Created, Self::Queued, Self::InProgress];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Queued => "Queued",
            Self::InProgress => "InProgress",
            Self::Baking => "Baking",
            Self::Ready => "Ready",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Stopped => "Stopped",
            Self::Unknown => "Unknown",
        }
    }
}

impl From<&str> for DeploymentStatus {
    fn from(s: &str) -> Self {
        match s {
            "Created" => Self::Created,
            "Queued" => Self::Queued,
            "InProgress" => Self::InProgress,
            "Baking" => Self::Baking,
            "Ready" => Self::Ready,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            "Stopped" => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `CreateDeployment` input deploying an inline AppSpec document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDeploymentRequest {
    /// Target group and optional deployment config override.
    pub group: DeploymentGroupRef,
    /// YAML or JSON AppSpec document.
    pub appspec: String,
    /// Free-form description.
    pub description: Option<String>,
}

impl CreateDeploymentRequest {
    /// Creates a request deploying an inline AppSpec document.
    #[must_use]
    pub fn inline(group: &DeploymentGroupRef, appspec: impl Into<String>) -> Self {
        Self {
            group: group.clone(),
            appspec: appspec.into(),
            description: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Summary of a deployment as returned by `GetDeployment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentInfo {
    /// Deployment id.
    pub deployment_id: String,
    /// Current status.
    pub status: DeploymentStatus,
    /// Error message, or the error code when there is no message.
    pub error: Option<String>,
}

/// Operations the engine needs from the blue/green deployment coordinator.
#[async_trait]
pub trait DeploymentCoordinator: Send + Sync {
    /// Submits a deployment and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn create_deployment(&self, request: &CreateDeploymentRequest) -> Result<String>;

    /// Lists deployment ids of a group in any of `statuses`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn list_deployments(
        &self,
        application_name: &str,
        deployment_group_name: &str,
        statuses: &[DeploymentStatus],
    ) -> Result<Vec<String>>;

    /// Finds the ECS deployment group that manages `service` in `cluster`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn find_deployment_group(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Option<DeploymentGroupRef>>;

    /// Blocks until the deployment succeeds, for at most `max_wait`.
    ///
    /// # Errors
    ///
    /// Returns `WaitError::Failed` when the deployment fails or is stopped,
    /// `WaitError::TimedOut` after `max_wait`, and `WaitError::Cancelled` as
    /// soon as `cancel` fires.
    async fn wait_deployment_successful(
        &self,
        deployment_id: &str,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Returns the console URL of a deployment.
#[must_use]
pub fn console_url(region: &str, deployment_id: &str) -> String {
    format!(
        "https://{region}.console.aws.amazon.com/codesuite/codedeploy/deployments/{deployment_id}?region={region}"
    )
}

/// CodeDeploy client over the AWS SDK.
#[derive(Debug, Clone)]
pub struct CodeDeployClient {
    client: Client,
}

impl CodeDeployClient {
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

    /// Fetches one deployment.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn get_deployment(&self, deployment_id: &str) -> Result<DeploymentInfo> {
        let output = self
            .client
            .get_deployment()
            .deployment_id(deployment_id)
            .send()
            .await
            .map_err(|e| api_error("codedeploy:GetDeployment", &e))?;

        let info = output.deployment_info().ok_or_else(|| {
            ApiError::invalid_response("codedeploy:GetDeployment", "no deployment info returned")
        })?;
        Ok(DeploymentInfo {
            deployment_id: owned(info.deployment_id()).unwrap_or_else(|| deployment_id.to_string()),
            status: named(info.status())
                .map_or(DeploymentStatus::Unknown, |s| DeploymentStatus::from(s.as_str())),
            error: info
                .error_information()
                .and_then(|e| owned(e.message()).or_else(|| named(e.code()))),
        })
    }

    async fn list_applications(&self) -> Result<Vec<String>> {
        let mut applications = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_applications()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| api_error("codedeploy:ListApplications", &e))?;
            applications.extend_from_slice(slice(output.applications()));
            match owned(output.next_token()) {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
        Ok(applications)
    }

    async fn list_deployment_groups(&self, application_name: &str) -> Result<Vec<String>> {
        let mut groups = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_deployment_groups()
                .application_name(application_name)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| api_error("codedeploy:ListDeploymentGroups", &e))?;
            groups.extend_from_slice(slice(output.deployment_groups()));
            match owned(output.next_token()) {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
        Ok(groups)
    }
}

#[async_trait]
impl DeploymentCoordinator for CodeDeployClient {
    async fn create_deployment(&self, request: &CreateDeploymentRequest) -> Result<String> {
        let group = &request.group;
        debug!("Creating deployment for {group}");
        let revision = RevisionLocation::builder()
            .revision_type(RevisionLocationType::from("AppSpecContent"))
            .app_spec_content(AppSpecContent::builder().content(&request.appspec).build())
            .build();

        let output = self
            .client
            .create_deployment()
            .application_name(&group.application_name)
            .deployment_group_name(&group.deployment_group_name)
            .set_deployment_config_name(group.deployment_config_name.clone())
            .revision(revision)
            .set_description(request.description.clone())
            .send()
            .await
            .map_err(|e| api_error("codedeploy:CreateDeployment", &e))?;

        owned(output.deployment_id()).ok_or_else(|| {
            ApiError::invalid_response("codedeploy:CreateDeployment", "no deployment id returned")
                .into()
        })
    }

    async fn list_deployments(
        &self,
        application_name: &str,
        deployment_group_name: &str,
        statuses: &[DeploymentStatus],
    ) -> Result<Vec<String>> {
        let statuses: Vec<_> = statuses
            .iter()
            .map(|s| aws_sdk_codedeploy::types::DeploymentStatus::from(s.as_str()))
            .collect();
        let mut deployments = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_deployments()
                .application_name(application_name)
                .deployment_group_name(deployment_group_name)
                .set_include_only_statuses(Some(statuses.clone()))
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| api_error("codedeploy:ListDeployments", &e))?;
            deployments.extend_from_slice(slice(output.deployments()));
            match owned(output.next_token()) {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
        Ok(deployments)
    }

    async fn find_deployment_group(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Option<DeploymentGroupRef>> {
        debug!("Looking up deployment group for {cluster}/{service}");
        for application in self.list_applications().await? {
            let groups = self.list_deployment_groups(&application).await?;
            for names in groups.chunks(BATCH_GET_LIMIT) {
                let output = self
                    .client
                    .batch_get_deployment_groups()
                    .application_name(&application)
                    .set_deployment_group_names(Some(names.to_vec()))
                    .send()
                    .await
                    .map_err(|e| api_error("codedeploy:BatchGetDeploymentGroups", &e))?;

                let found = slice(output.deployment_groups_info()).iter().find(|info| {
                    named(info.compute_platform()).as_deref() == Some("ECS")
                        && slice(info.ecs_services()).iter().any(|s| {
                            owned(s.service_name()).as_deref() == Some(service)
                                && owned(s.cluster_name())
                                    .is_some_and(|c| short_name(&c) == short_name(cluster))
                        })
                });
                if let Some(info) = found {
                    return Ok(Some(DeploymentGroupRef::new(
                        owned(info.application_name()).unwrap_or_else(|| application.clone()),
                        owned(info.deployment_group_name()).unwrap_or_default(),
                    )));
                }
            }
        }
        Ok(None)
    }

    async fn wait_deployment_successful(
        &self,
        deployment_id: &str,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let target = format!("deployment {deployment_id}");
        let waiter = self
            .client
            .wait_until_deployment_successful()
            .deployment_id(deployment_id)
            .wait(max_wait.max(Duration::from_secs(MIN_WAITER_SECS)));

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(WaitError::Cancelled { target }.into()),
            result = waiter => result,
        };

        match result {
            Ok(_) => Ok(()),
            Err(WaitUntilDeploymentSuccessfulError::ExceededMaxWait(_)) => {
                Err(WaitError::TimedOut {
                    target,
                    waited_secs: max_wait.as_secs(),
                }
                .into())
            }
            Err(WaitUntilDeploymentSuccessfulError::FailureState(_)) => {
                let info = self.get_deployment(deployment_id).await?;
                trace!("Deployment {deployment_id} is {}", info.status);
                Err(WaitError::Failed {
                    target,
                    status: info.status.to_string(),
                    reason: info.error.unwrap_or_default(),
                }
                .into())
            }
            Err(e) => Err(ApiError::network(
                "codedeploy:GetDeployment",
                DisplayErrorContext(&e).to_string(),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::sdk::testing;
    use crate::error::RolloutError;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn codedeploy_client(server: &MockServer) -> CodeDeployClient {
        let config = aws_sdk_codedeploy::config::Builder::new()
            .region(testing::region())
            .endpoint_url(server.uri())
            .credentials_provider(testing::credentials())
            .behavior_version_latest()
            .build();
        CodeDeployClient::with_client(Client::from_conf(config))
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(DeploymentStatus::from("InProgress"), DeploymentStatus::InProgress);
        assert_eq!(DeploymentStatus::from("SomethingNew"), DeploymentStatus::Unknown);
        let pending: Vec<_> = DeploymentStatus::PENDING.iter().map(|s| s.as_str()).collect();
        assert_eq!(pending, ["Created", "Queued", "InProgress"]);
        assert_eq!(DeploymentStatus::Stopped.to_string(), "Stopped");
    }

    #[test]
    fn test_console_url() {
        assert_eq!(
            console_url("ap-northeast-1", "d-ABC"),
            "https://ap-northeast-1.console.aws.amazon.com/codesuite/codedeploy/deployments/d-ABC?region=ap-northeast-1"
        );
    }

    #[tokio::test]
    async fn test_create_deployment_sends_inline_appspec() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "CodeDeploy_20141006.CreateDeployment"))
            .and(body_partial_json(json!({
                "applicationName": "AppECS-default-web",
                "deploymentGroupName": "DgpECS-default-web",
                "deploymentConfigName": "CodeDeployDefault.ECSAllAtOnce",
                "revision": {
                    "revisionType": "AppSpecContent",
                    "appSpecContent": {"content": "version: 0.0\n"}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deploymentId": "d-1"})))
            .mount(&server)
            .await;

        let group = DeploymentGroupRef::new("AppECS-default-web", "DgpECS-default-web")
            .with_deployment_config(Some(String::from("CodeDeployDefault.ECSAllAtOnce")));
        let request = CreateDeploymentRequest::inline(&group, "version: 0.0\n");
        assert!(request.description.is_none());

        let codedeploy = codedeploy_client(&server);
        let id = codedeploy.create_deployment(&request).await.expect("create");
        assert_eq!(id, "d-1");
    }

    #[tokio::test]
    async fn test_list_deployments_filters_by_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "CodeDeploy_20141006.ListDeployments"))
            .and(body_partial_json(json!({
                "includeOnlyStatuses": ["Created", "Queued", "InProgress"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deployments": ["d-9"]})))
            .mount(&server)
            .await;

        let codedeploy = codedeploy_client(&server);
        let ids = codedeploy
            .list_deployments("AppECS-default-web", "DgpECS-default-web", &DeploymentStatus::PENDING)
            .await
            .expect("list");
        assert_eq!(ids, vec!["d-9"]);
    }

    #[tokio::test]
    async fn test_find_deployment_group_matches_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "CodeDeploy_20141006.ListApplications"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"applications": ["AppECS-default-web"]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "CodeDeploy_20141006.ListDeploymentGroups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deploymentGroups": ["other", "DgpECS-default-web"]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "CodeDeploy_20141006.BatchGetDeploymentGroups"))
            .and(body_partial_json(json!({"applicationName": "AppECS-default-web"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "deploymentGroupsInfo": [
                    {
                        "applicationName": "AppECS-default-web",
                        "deploymentGroupName": "other",
                        "computePlatform": "ECS",
                        "ecsServices": [{"serviceName": "api", "clusterName": "default"}]
                    },
                    {
                        "applicationName": "AppECS-default-web",
                        "deploymentGroupName": "DgpECS-default-web",
                        "computePlatform": "ECS",
                        "ecsServices": [{"serviceName": "web", "clusterName": "default"}]
                    }
                ]
            })))
            .mount(&server)
            .await;

        let codedeploy = codedeploy_client(&server);
        let group = codedeploy
            .find_deployment_group("arn:aws:ecs:us-east-1:1:cluster/default", "web")
            .await
            .expect("lookup")
            .expect("group found");
        assert_eq!(group.deployment_group_name, "DgpECS-default-web");
    }

    #[tokio::test]
    async fn test_wait_deployment_fails_on_stopped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "CodeDeploy_20141006.GetDeployment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "deploymentInfo": {
                    "deploymentId": "d-1",
                    "status": "Stopped",
                    "errorInformation": {"code": "ALARM_ACTIVE", "message": "alarm fired"}
                }
            })))
            .mount(&server)
            .await;

        let codedeploy = codedeploy_client(&server);
        let err = codedeploy
            .wait_deployment_successful("d-1", Duration::from_secs(60), &CancellationToken::new())
            .await
            .expect_err("stopped");
        match err {
            RolloutError::Wait(WaitError::Failed { status, reason, .. }) => {
                assert_eq!(status, "Stopped");
                assert_eq!(reason, "alarm fired");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_slow_deployment_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"deploymentInfo": {"status": "InProgress"}}))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let codedeploy = codedeploy_client(&server);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            codedeploy.wait_deployment_successful("d-1", Duration::from_secs(600), &cancel),
        )
        .await
        .expect("returns before the response arrives")
        .expect_err("cancelled");
        assert!(matches!(err, RolloutError::Wait(WaitError::Cancelled { .. })));
    }
}
