//! Auto-scaling coordination around a rollout.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aws::autoscaling::{
    DESIRED_COUNT_DIMENSION, ECS_NAMESPACE, RegisterScalableTargetRequest, ScalingRegistry,
    SuspendedState,
};
use crate::error::Result;

/// Requested changes to a service's scalable target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoScalingPolicy {
    /// Suspend (`true`) or resume (`false`) every scaling activity.
    pub suspend: Option<bool>,
    /// New minimum capacity.
    pub min: Option<i32>,
    /// New maximum capacity.
    pub max: Option<i32>,
}

impl AutoScalingPolicy {
    /// Returns true when nothing would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.suspend.is_none() && self.min.is_none() && self.max.is_none()
    }
}

/// What `apply` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalingOutcome {
    /// The policy was empty; no remote call was made.
    Skipped,
    /// The service has no scalable target.
    NotRegistered,
    /// The target was re-registered with these settings.
    Applied(RegisterScalableTargetRequest),
}

/// Suspends, resumes and resizes the scalable target of a service.
#[derive(Clone)]
pub struct AutoScalingCoordinator {
    registry: Arc<dyn ScalingRegistry>,
}

impl AutoScalingCoordinator {
    /// Creates a new coordinator.
    #[must_use]
    pub fn new(registry: Arc<dyn ScalingRegistry>) -> Self {
        Self { registry }
    }

    /// Applies `policy` to the target of `resource_id`.
    ///
    /// Unset fields keep the values of the existing registration. A service
    /// without a scalable target only produces a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or the registration fails.
    pub async fn apply(&self, resource_id: &str, policy: AutoScalingPolicy) -> Result<ScalingOutcome> {
        if policy.is_empty() {
            info!("Auto scaling settings unchanged, skipping");
            return Ok(ScalingOutcome::Skipped);
        }

        let Some(current) = self.registry.describe_scalable_target(resource_id).await? else {
            warn!("No scalable target registered for {resource_id}");
            return Ok(ScalingOutcome::NotRegistered);
        };

        let request = RegisterScalableTargetRequest {
            service_namespace: ECS_NAMESPACE.to_string(),
            resource_id: resource_id.to_string(),
            scalable_dimension: DESIRED_COUNT_DIMENSION.to_string(),
            min_capacity: Some(policy.min.unwrap_or(current.min_capacity)),
            max_capacity: Some(policy.max.unwrap_or(current.max_capacity)),
            suspended_state: Some(
                policy
                    .suspend
                    .map_or(current.suspended_state, SuspendedState::all),
            ),
        };

        info!(
            "Registering scalable target {resource_id}: min {:?}, max {:?}, suspended {:?}",
            request.min_capacity, request.max_capacity, policy.suspend
        );
        self.registry.register_scalable_target(&request).await?;
        Ok(ScalingOutcome::Applied(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::autoscaling::{MockScalingRegistry, ScalableTarget};

    const RESOURCE: &str = "service/default/web";

    fn target() -> ScalableTarget {
        ScalableTarget {
            service_namespace: ECS_NAMESPACE.to_string(),
            resource_id: RESOURCE.to_string(),
            scalable_dimension: DESIRED_COUNT_DIMENSION.to_string(),
            min_capacity: 1,
            max_capacity: 4,
            suspended_state: SuspendedState::default(),
        }
    }

    #[tokio::test]
    async fn test_empty_policy_makes_no_calls() {
        let mut registry = MockScalingRegistry::new();
        registry.expect_describe_scalable_target().never();
        registry.expect_register_scalable_target().never();

        let coordinator = AutoScalingCoordinator::new(Arc::new(registry));
        let outcome = coordinator
            .apply(RESOURCE, AutoScalingPolicy::default())
            .await
            .expect("apply");
        assert_eq!(outcome, ScalingOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_unregistered_target_is_not_an_error() {
        let mut registry = MockScalingRegistry::new();
        registry
            .expect_describe_scalable_target()
            .times(1)
            .returning(|_| Ok(None));
        registry.expect_register_scalable_target().never();

        let coordinator = AutoScalingCoordinator::new(Arc::new(registry));
        let policy = AutoScalingPolicy {
            suspend: Some(true),
            ..AutoScalingPolicy::default()
        };
        let outcome = coordinator.apply(RESOURCE, policy).await.expect("apply");
        assert_eq!(outcome, ScalingOutcome::NotRegistered);
    }

    #[tokio::test]
    async fn test_suspend_merges_existing_capacity() {
        let mut registry = MockScalingRegistry::new();
        registry
            .expect_describe_scalable_target()
            .withf(|id| id == RESOURCE)
            .times(1)
            .returning(|_| Ok(Some(target())));
        registry
            .expect_register_scalable_target()
            .withf(|request| {
                request.min_capacity == Some(1)
                    && request.max_capacity == Some(10)
                    && request.suspended_state == Some(SuspendedState::all(true))
            })
            .times(1)
            .returning(|_| Ok(()));

        let coordinator = AutoScalingCoordinator::new(Arc::new(registry));
        let policy = AutoScalingPolicy {
            suspend: Some(true),
            min: None,
            max: Some(10),
        };
        let outcome = coordinator.apply(RESOURCE, policy).await.expect("apply");
        assert!(matches!(outcome, ScalingOutcome::Applied(_)));
    }

    #[tokio::test]
    async fn test_resize_keeps_suspension_flags() {
        let mut existing = target();
        existing.suspended_state = SuspendedState::all(true);

        let mut registry = MockScalingRegistry::new();
        registry
            .expect_describe_scalable_target()
            .returning(move |_| Ok(Some(existing.clone())));
        registry
            .expect_register_scalable_target()
            .withf(|request| request.suspended_state == Some(SuspendedState::all(true)))
            .times(1)
            .returning(|_| Ok(()));

        let coordinator = AutoScalingCoordinator::new(Arc::new(registry));
        let policy = AutoScalingPolicy {
            min: Some(2),
            ..AutoScalingPolicy::default()
        };
        coordinator.apply(RESOURCE, policy).await.expect("apply");
    }
}
