//! Rollback target resolution.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::aws::ecs::ControlPlane;
use crate::aws::types::parse_task_definition_ref;
use crate::error::{NotFoundError, Result};

/// Finds the revision to roll back to.
#[derive(Clone)]
pub struct RollbackResolver {
    control_plane: Arc<dyn ControlPlane>,
}

impl RollbackResolver {
    /// Creates a new resolver.
    #[must_use]
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self { control_plane }
    }

    /// Returns the ARN of the newest ACTIVE revision strictly older than
    /// `current_arn` that can still be described.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError::RollbackTarget` when there is none, or an
    /// error if listing the family fails.
    pub async fn find_rollback_target(&self, current_arn: &str) -> Result<String> {
        let not_found = || NotFoundError::RollbackTarget {
            current: current_arn.to_string(),
        };
        let (family, current_revision) = parse_task_definition_ref(current_arn).ok_or_else(not_found)?;

        let arns = self.control_plane.list_task_definitions(family).await?;
        debug!("{} active revisions of {family}", arns.len());

        for arn in arns.iter().rev() {
            let Some((_, revision)) = parse_task_definition_ref(arn) else {
                continue;
            };
            if revision >= current_revision {
                continue;
            }
            match self.control_plane.describe_task_definition(arn).await {
                Ok(_) => return Ok(arn.clone()),
                Err(e) if e.is_not_found() => warn!("Skipping {arn}: {e}"),
                Err(e) => return Err(e),
            }
        }

        Err(not_found().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FakeControlPlane, task_definition_arn};

    #[tokio::test]
    async fn test_previous_revision_is_target() {
        let control_plane = Arc::new(FakeControlPlane::default().with_revisions("web", 45));
        let resolver = RollbackResolver::new(control_plane);

        let target = resolver
            .find_rollback_target(&task_definition_arn("web", 45))
            .await
            .expect("target");
        assert_eq!(target, task_definition_arn("web", 44));
    }

    #[tokio::test]
    async fn test_single_revision_has_no_target() {
        let control_plane = Arc::new(FakeControlPlane::default().with_revisions("web", 1));
        let resolver = RollbackResolver::new(control_plane);

        let err = tokio_test::assert_err!(
            resolver
                .find_rollback_target(&task_definition_arn("web", 1))
                .await
        );
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_skips_deregistered_revisions() {
        let control_plane = Arc::new(FakeControlPlane::default().with_revisions("web", 5));
        control_plane
            .deregister_task_definition(&task_definition_arn("web", 4))
            .await
            .expect("deregister");
        let resolver = RollbackResolver::new(control_plane);

        let target = resolver
            .find_rollback_target(&task_definition_arn("web", 5))
            .await
            .expect("target");
        assert_eq!(target, task_definition_arn("web", 3));
    }

    #[tokio::test]
    async fn test_current_not_latest() {
        let control_plane = Arc::new(FakeControlPlane::default().with_revisions("web", 10));
        let resolver = RollbackResolver::new(control_plane);

        let target = resolver
            .find_rollback_target(&task_definition_arn("web", 7))
            .await
            .expect("target");
        assert_eq!(target, task_definition_arn("web", 6));
    }
}
