//! CLI module for the ecs-rollout tool.
//!
//! This module provides the command-line interface for deploying and
//! managing ECS services.

mod commands;
mod output;

pub use commands::{AutoScalingArgs, Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
