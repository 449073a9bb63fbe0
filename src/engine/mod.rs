//! Deployment orchestration engine.
//!
//! This module decides how a service moves from its running revision to a
//! new one, waits for the move to settle, and works out where to go back
//! to when it has to be undone.

pub mod appspec;
pub mod canonical;
pub mod count;
pub mod diff;
pub mod rollback;
pub mod scaling;
pub mod strategy;
pub mod waiter;

#[cfg(test)]
pub(crate) mod testing;

pub use appspec::AppSpec;
pub use count::{DesiredCountPolicy, resolve};
pub use diff::{DiffEngine, DiffReport};
pub use rollback::RollbackResolver;
pub use scaling::{AutoScalingCoordinator, AutoScalingPolicy, ScalingOutcome};
pub use strategy::{
    BlueGreenExecutor, DeploymentHandle, RollingExecutor, RolloutExecutor, RolloutRequest,
    RolloutStrategy,
};
pub use waiter::{ProgressSink, ServiceProgress, StabilityWaiter, TracingProgress};
