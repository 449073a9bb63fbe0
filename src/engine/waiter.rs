//! Waits for a submitted rollout to settle.
//!
//! Rolling rollouts block on the control plane's stable-service primitive
//! while a background task reports deployment progress and new service
//! events. Blue/green rollouts block on the coordinator's deployment
//! primitive. Both are bounded by the caller's timeout and observe the
//! caller's cancellation token.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info};

use crate::aws::codedeploy::{DeploymentCoordinator, DeploymentGroupRef, DeploymentStatus};
use crate::aws::ecs::ControlPlane;
use crate::aws::types::{Deployment, Service, ServiceEvent};
use crate::error::{NotFoundError, Result, RolloutError, WaitError};

use super::strategy::DeploymentHandle;

/// Delay before the first progress report.
pub const PROGRESS_GRACE: Duration = Duration::from_secs(3);

/// Interval between progress reports.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Snapshot of a rolling deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceProgress {
    /// Service name.
    pub service: String,
    /// Deployments tracked by the service.
    pub deployments: Vec<Deployment>,
    /// Events newer than the previous report, oldest first.
    pub events: Vec<ServiceEvent>,
}

impl ServiceProgress {
    /// Builds a snapshot keeping only events created after `since`
    /// (epoch seconds).
    #[must_use]
    pub fn from_service(service: &Service, since: f64) -> Self {
        let mut events: Vec<_> = service
            .events
            .iter()
            .filter(|e| e.created_at.is_some_and(|t| t > since))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.unwrap_or_default().total_cmp(&b.created_at.unwrap_or_default()));

        Self {
            service: service.service_name.clone().unwrap_or_default(),
            deployments: service.deployments.clone(),
            events,
        }
    }

    /// Creation time of the newest event, if any.
    #[must_use]
    pub fn latest_event_at(&self) -> Option<f64> {
        self.events.iter().filter_map(|e| e.created_at).reduce(f64::max)
    }
}

/// Receives progress snapshots.
pub trait ProgressSink: Send + Sync {
    /// Called once per poll.
    fn report(&self, progress: &ServiceProgress);
}

/// Writes progress through the operation's logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, progress: &ServiceProgress) {
        for d in &progress.deployments {
            info!(
                "{:>8} {} desired:{} pending:{} running:{} {}",
                d.status,
                d.task_definition.rsplit('/').next().unwrap_or_default(),
                d.desired_count,
                d.pending_count,
                d.running_count,
                d.rollout_state.as_deref().unwrap_or_default()
            );
        }
        for event in &progress.events {
            let at = event
                .created_at
                .and_then(epoch_to_datetime)
                .map(|t| t.format("%Y/%m/%d %H:%M:%S").to_string())
                .unwrap_or_default();
            info!("{at} {}", event.message);
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs.trunc() as i64, (secs.fract() * 1e9) as u32)
}

#[allow(clippy::cast_precision_loss)]
fn datetime_to_epoch(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// Waits for rollouts to become stable.
#[derive(Clone)]
pub struct StabilityWaiter {
    control_plane: Arc<dyn ControlPlane>,
    coordinator: Arc<dyn DeploymentCoordinator>,
    sink: Arc<dyn ProgressSink>,
    grace: Duration,
    interval: Duration,
}

impl StabilityWaiter {
    /// Creates a waiter reporting progress through `sink`.
    #[must_use]
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        coordinator: Arc<dyn DeploymentCoordinator>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            control_plane,
            coordinator,
            sink,
            grace: PROGRESS_GRACE,
            interval: PROGRESS_INTERVAL,
        }
    }

    /// Waits until the rollout behind `handle` is stable.
    ///
    /// `started_at` filters the service events worth reporting. The timeout
    /// runs from the moment this call starts.
    ///
    /// # Errors
    ///
    /// Returns `WaitError::TimedOut` at the deadline, `WaitError::Failed` for
    /// a failed or stopped rollout, `WaitError::Cancelled` when `cancel`
    /// fires, and `WaitError::Ambiguous` or
    /// `NotFoundError::InProgressDeployment` when a blue/green deployment
    /// cannot be identified.
    pub async fn wait(
        &self,
        handle: &DeploymentHandle,
        started_at: DateTime<Utc>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("Waiting for {handle} to be stable (timeout {}s)", timeout.as_secs());
        match handle {
            DeploymentHandle::Service { cluster, service } => {
                self.wait_service(cluster, service, started_at, timeout, cancel)
                    .await
            }
            DeploymentHandle::CodeDeploy {
                group,
                deployment_id,
            } => {
                let deployment_id = match deployment_id {
                    Some(id) => id.clone(),
                    None => self.find_in_progress(group).await?,
                };
                self.wait_deployment(&deployment_id, timeout, cancel).await
            }
        }
    }

    async fn wait_service(
        &self,
        cluster: &str,
        service: &str,
        started_at: DateTime<Utc>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let progress_cancel = cancel.child_token();
        let progress = tokio::spawn(
            progress_loop(
                Arc::clone(&self.control_plane),
                Arc::clone(&self.sink),
                cluster.to_string(),
                service.to_string(),
                datetime_to_epoch(started_at),
                self.grace,
                self.interval,
                progress_cancel.clone(),
            )
            .with_current_subscriber(),
        );

        // The stable wait starts after the same grace as the first progress
        // report, inside the caller's deadline.
        let deadline = Instant::now() + timeout;
        let target = format!("service {service}");
        let stable = async {
            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(RolloutError::from(WaitError::Cancelled { target: target.clone() }));
                }
                () = tokio::time::sleep(self.grace) => {}
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.control_plane
                .wait_services_stable(cluster, service, remaining, cancel)
                .await
        };
        let result = tokio::time::timeout_at(deadline, stable).await;

        progress_cancel.cancel();
        if let Err(e) = progress.await {
            debug!("Progress task ended abnormally: {e}");
        }

        match result {
            Ok(Ok(())) => {
                info!("Service {service} is stable");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(WaitError::TimedOut {
                target,
                waited_secs: timeout.as_secs(),
            }
            .into()),
        }
    }

    async fn find_in_progress(&self, group: &DeploymentGroupRef) -> Result<String> {
        let mut ids = self
            .coordinator
            .list_deployments(
                &group.application_name,
                &group.deployment_group_name,
                &DeploymentStatus::PENDING,
            )
            .await?;

        match ids.len() {
            0 => Err(NotFoundError::InProgressDeployment {
                application: group.application_name.clone(),
                deployment_group: group.deployment_group_name.clone(),
            }
            .into()),
            1 => Ok(ids.remove(0)),
            n => Err(WaitError::Ambiguous {
                message: format!("{n} deployments in progress for {group}: {}", ids.join(", ")),
            }
            .into()),
        }
    }

    async fn wait_deployment(
        &self,
        deployment_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("Waiting for deployment {deployment_id}");
        match tokio::time::timeout(
            timeout,
            self.coordinator
                .wait_deployment_successful(deployment_id, timeout, cancel),
        )
        .await
        {
            Ok(Ok(())) => {
                info!("Deployment {deployment_id} succeeded");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(WaitError::TimedOut {
                target: format!("deployment {deployment_id}"),
                waited_secs: timeout.as_secs(),
            }
            .into()),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn progress_loop(
    control_plane: Arc<dyn ControlPlane>,
    sink: Arc<dyn ProgressSink>,
    cluster: String,
    service: String,
    started_at: f64,
    grace: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        () = cancel.cancelled() => return,
        () = tokio::time::sleep(grace) => {}
    }

    let mut since = started_at;
    loop {
        let described = tokio::select! {
            () = cancel.cancelled() => return,
            described = control_plane.describe_service(&cluster, &service) => described,
        };
        match described {
            Ok(live) => {
                let progress = ServiceProgress::from_service(&live, since);
                if let Some(latest) = progress.latest_event_at() {
                    since = latest;
                }
                sink.report(&progress);
            }
            Err(e) => debug!("Progress describe failed: {e}"),
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(interval) => {}
        }
    }
}
