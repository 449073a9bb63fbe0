//! AWS control-plane clients.
//!
//! Typed clients over the AWS SDK for the three remote APIs a rollout
//! touches: ECS, CodeDeploy and Application Auto Scaling. Each client sits
//! behind a trait so the engine can be driven by fakes in tests.

pub mod autoscaling;
pub mod codedeploy;
mod convert;
pub mod ecs;
pub mod sdk;
pub mod types;

pub use autoscaling::{AutoScalingClient, ScalableTarget, ScalingRegistry, SuspendedState};
pub use codedeploy::{
    CodeDeployClient, DeploymentCoordinator, DeploymentGroupRef, DeploymentStatus,
};
pub use ecs::{ControlPlane, EcsClient};
pub use sdk::load_sdk_config;
pub use types::{Service, TaskDefinition};
