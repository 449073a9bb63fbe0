//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::deployer::{
    CreateOptions, DeployOptions, RefreshOptions, RollbackOptions, ScaleOptions,
};
use crate::engine::{AutoScalingPolicy, DesiredCountPolicy};
use crate::logging::{LogDestination, LogFormat, LogSettings};

/// ecs-rollout - Declarative deployments for ECS services.
#[derive(Parser, Debug)]
#[command(name = "ecs-rollout")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "ECS_ROLLOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log line format.
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register the task definition and roll it out.
    Deploy {
        /// Show what would change without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Return once the rollout is submitted.
        #[arg(long)]
        no_wait: bool,

        /// Desired count; -1 keeps the current count.
        #[arg(long, allow_negative_numbers = true)]
        tasks: Option<i32>,

        /// Start new tasks even when nothing changed.
        #[arg(long)]
        force_new_deployment: bool,

        /// Apply the service definition too.
        #[arg(long)]
        update_service: bool,

        /// Keep the task definition the service runs now.
        #[arg(long, conflicts_with = "latest_task_definition")]
        skip_task_definition: bool,

        /// Roll out the latest registered revision instead of registering.
        #[arg(long)]
        latest_task_definition: bool,

        /// Auto-scaling changes.
        #[command(flatten)]
        auto_scaling: AutoScalingArgs,
    },

    /// Change the desired count.
    Scale {
        /// Show what would change without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Return once the update is submitted.
        #[arg(long)]
        no_wait: bool,

        /// Desired count; -1 keeps the current count.
        #[arg(long, allow_negative_numbers = true)]
        tasks: Option<i32>,

        /// Auto-scaling changes.
        #[command(flatten)]
        auto_scaling: AutoScalingArgs,
    },

    /// Replace every task with a fresh one on the same revision.
    Refresh {
        /// Show what would change without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Return once the rollout is submitted.
        #[arg(long)]
        no_wait: bool,
    },

    /// Roll back to the previous task definition revision.
    Rollback {
        /// Show what would change without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Return once the rollback is submitted.
        #[arg(long)]
        no_wait: bool,

        /// Deregister the rolled-back revision once the service is stable.
        #[arg(long)]
        deregister_task_definition: bool,
    },

    /// Show differences between the local definitions and the live service.
    Diff,

    /// Create the service.
    Create {
        /// Show what would change without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Return once the service is created.
        #[arg(long)]
        no_wait: bool,

        /// Desired count; -1 uses the service definition.
        #[arg(long, allow_negative_numbers = true)]
        tasks: Option<i32>,
    },

    /// Register the task definition without deploying it.
    Register {
        /// Show what would change without changing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Wait until the service or its blue/green deployment is stable.
    Wait,

    /// Show the service status.
    Status {
        /// Number of recent events to show.
        #[arg(long, default_value = "2")]
        events: usize,
    },

    /// Validate the configuration and definitions.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },
}

/// Auto-scaling flags shared by `deploy` and `scale`.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct AutoScalingArgs {
    /// Suspend auto scaling.
    #[arg(long, conflicts_with = "resume_auto_scaling")]
    pub suspend_auto_scaling: bool,

    /// Resume auto scaling.
    #[arg(long)]
    pub resume_auto_scaling: bool,

    /// New minimum capacity.
    #[arg(long)]
    pub auto_scaling_min: Option<i32>,

    /// New maximum capacity.
    #[arg(long)]
    pub auto_scaling_max: Option<i32>,
}

impl AutoScalingArgs {
    /// Converts the flags to a policy.
    #[must_use]
    pub const fn to_policy(self) -> AutoScalingPolicy {
        let suspend = if self.suspend_auto_scaling {
            Some(true)
        } else if self.resume_auto_scaling {
            Some(false)
        } else {
            None
        };
        AutoScalingPolicy {
            suspend,
            min: self.auto_scaling_min,
            max: self.auto_scaling_max,
        }
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logger settings from the global flags.
    #[must_use]
    pub fn log_settings(&self) -> LogSettings {
        let mut settings = LogSettings::default()
            .with_color(!self.no_color)
            .with_format(self.log_format);
        if self.debug {
            settings = settings.with_level("debug");
        }
        if let Some(path) = &self.log_file {
            settings = settings.with_destination(LogDestination::File(path.clone()));
        }
        settings
    }
}

impl Commands {
    /// Options for `deploy`, if this is one.
    #[must_use]
    pub fn deploy_options(&self) -> Option<DeployOptions> {
        match *self {
            Self::Deploy {
                dry_run,
                no_wait,
                tasks,
                force_new_deployment,
                update_service,
                skip_task_definition,
                latest_task_definition,
                auto_scaling,
            } => Some(DeployOptions {
                dry_run,
                no_wait,
                desired_count: DesiredCountPolicy::from_cli(tasks),
                force_new_deployment,
                update_service,
                skip_task_definition,
                latest_task_definition,
                auto_scaling: auto_scaling.to_policy(),
            }),
            _ => None,
        }
    }

    /// Options for `scale`, if this is one.
    #[must_use]
    pub fn scale_options(&self) -> Option<ScaleOptions> {
        match *self {
            Self::Scale {
                dry_run,
                no_wait,
                tasks,
                auto_scaling,
            } => Some(ScaleOptions {
                dry_run,
                no_wait,
                desired_count: DesiredCountPolicy::from_cli(tasks),
                auto_scaling: auto_scaling.to_policy(),
            }),
            _ => None,
        }
    }

    /// Options for `refresh`, if this is one.
    #[must_use]
    pub fn refresh_options(&self) -> Option<RefreshOptions> {
        match *self {
            Self::Refresh { dry_run, no_wait } => Some(RefreshOptions { dry_run, no_wait }),
            _ => None,
        }
    }

    /// Options for `rollback`, if this is one.
    #[must_use]
    pub fn rollback_options(&self) -> Option<RollbackOptions> {
        match *self {
            Self::Rollback {
                dry_run,
                no_wait,
                deregister_task_definition,
            } => Some(RollbackOptions {
                dry_run,
                no_wait,
                deregister_task_definition,
            }),
            _ => None,
        }
    }

    /// Options for `create`, if this is one.
    #[must_use]
    pub fn create_options(&self) -> Option<CreateOptions> {
        match *self {
            Self::Create {
                dry_run,
                no_wait,
                tasks,
            } => Some(CreateOptions {
                dry_run,
                no_wait,
                desired_count: DesiredCountPolicy::from_cli(tasks),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ecs-rollout").chain(args.iter().copied()))
            .expect("parse")
    }

    #[test]
    fn test_deploy_keep_sentinel() {
        let cli = parse(&["deploy", "--tasks", "-1", "--dry-run"]);
        let options = cli.command.deploy_options().expect("deploy");
        assert!(options.dry_run);
        assert_eq!(options.desired_count, DesiredCountPolicy::Keep);

        let cli = parse(&["deploy", "--tasks", "4"]);
        let options = cli.command.deploy_options().expect("deploy");
        assert_eq!(options.desired_count, DesiredCountPolicy::Exactly(4));
    }

    #[test]
    fn test_auto_scaling_flags() {
        let cli = parse(&[
            "scale",
            "--tasks",
            "3",
            "--suspend-auto-scaling",
            "--auto-scaling-max",
            "6",
        ]);
        let options = cli.command.scale_options().expect("scale");
        assert_eq!(
            options.auto_scaling,
            AutoScalingPolicy {
                suspend: Some(true),
                min: None,
                max: Some(6),
            }
        );

        let err = Cli::try_parse_from([
            "ecs-rollout",
            "deploy",
            "--suspend-auto-scaling",
            "--resume-auto-scaling",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = parse(&["status", "--debug", "--no-color", "--output", "json", "--log-format", "json"]);
        assert!(cli.debug);
        assert!(cli.no_color);
        assert!(matches!(cli.output, OutputFormat::Json));
        let settings = cli.log_settings();
        assert_eq!(settings.level.as_deref(), Some("debug"));
        assert!(!settings.color);
        assert_eq!(settings.format, LogFormat::Json);
        assert!(cli.command.deploy_options().is_none());
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
