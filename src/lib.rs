// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items should be documented
#![warn(dead_code)]                   // Unused code is reported
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are reported
#![warn(unused_variables)]            // Unused variables are reported
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # ecs-rollout
//!
//! Declarative deployment orchestration for Amazon ECS services.
//!
//! ## Overview
//!
//! ecs-rollout moves a running ECS service from its current task definition
//! revision to a new one, letting you:
//!
//! - Keep task and service definitions as files next to your code
//! - Roll out in place, or hand blue/green rollouts to CodeDeploy
//! - Suspend and resume auto scaling around a rollout
//! - Diff local definitions against the live service
//! - Roll back to the previous revision
//!
//! ## Architecture
//!
//! The live service is the single source of truth; nothing is stored
//! between invocations:
//!
//! 1. **Declared state**: `ecs-rollout.yaml` and the definition files
//! 2. **Live state**: queried from ECS, CodeDeploy and Application Auto Scaling
//! 3. **Engine**: picks a rollout strategy, submits it and waits for it
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation and definition loading
//! - [`aws`]: Signed JSON transport and API clients
//! - [`engine`]: Diff, rollout strategies, stability waits and rollback
//! - [`deployer`]: Top-level operations
//! - [`logging`]: Per-operation logger construction
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! region: ap-northeast-1
//! cluster: default
//! service: web
//! service_definition: ecs-service-def.json
//! task_definition: ecs-task-def.json
//! timeout_secs: 600
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod aws;
pub mod cli;
pub mod config;
pub mod deployer;
pub mod engine;
pub mod error;
pub mod logging;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, DefinitionLoader, RolloutConfig};
pub use deployer::{
    CreateOptions, DeployOptions, Deployer, RefreshOptions, RollbackOptions, RolloutOutcome,
    ScaleOptions,
};
pub use engine::{DiffEngine, DiffReport, RolloutStrategy, StabilityWaiter};
pub use error::{Result, RolloutError};
pub use logging::{LogFormat, LogSettings};
