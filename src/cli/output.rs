//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::aws::autoscaling::ScalableTarget;
use crate::aws::types::{Deployment, ServiceEvent};
use crate::config::ValidationResult;
use crate::deployer::{RollbackOutcome, RolloutOutcome, StatusReport};
use crate::engine::{DeploymentHandle, DiffReport};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Deployment row for table display.
#[derive(Tabled)]
struct DeploymentRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Task definition")]
    task_definition: String,
    #[tabled(rename = "Desired")]
    desired: i32,
    #[tabled(rename = "Pending")]
    pending: i32,
    #[tabled(rename = "Running")]
    running: i32,
    #[tabled(rename = "Rollout")]
    rollout: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the outcome of deploy, scale, refresh or create.
    #[must_use]
    pub fn format_rollout(&self, operation: &str, outcome: &RolloutOutcome) -> String {
        match self.format {
            OutputFormat::Json => to_json(&RolloutJson::new(operation, outcome)),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(
                    output,
                    "{} {operation} {}{}",
                    "✓".green(),
                    outcome.service.bold(),
                    dry_run_marker(outcome.dry_run)
                );
                if let Some(strategy) = &outcome.strategy {
                    let _ = writeln!(output, "   Strategy: {strategy}");
                }
                let _ = writeln!(output, "   Task definition: {}", outcome.task_definition);
                let _ = writeln!(output, "   Desired count: {}", format_count(outcome.desired_count));
                if let Some(handle) = &outcome.handle {
                    let _ = writeln!(output, "   Rollout: {handle}");
                    let state = if outcome.waited {
                        "stable".green()
                    } else {
                        "submitted".yellow()
                    };
                    let _ = writeln!(output, "   State: {state}");
                }
                output
            }
        }
    }

    /// Formats the outcome of a rollback.
    #[must_use]
    pub fn format_rollback(&self, outcome: &RollbackOutcome) -> String {
        match self.format {
            OutputFormat::Json => to_json(&RollbackJson::from(outcome)),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(
                    output,
                    "{} rollback {}{}",
                    "✓".green(),
                    outcome.service.bold(),
                    dry_run_marker(outcome.dry_run)
                );
                let _ = writeln!(
                    output,
                    "   {} -> {}",
                    short_revision(&outcome.from).red(),
                    short_revision(&outcome.to).green()
                );
                if let Some(handle) = &outcome.handle {
                    let _ = writeln!(output, "   Rollout: {handle}");
                }
                if outcome.deregistered {
                    let _ = writeln!(output, "   Deregistered: {}", short_revision(&outcome.from));
                }
                output
            }
        }
    }

    /// Formats a diff report.
    #[must_use]
    pub fn format_diff(&self, report: &DiffReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                if report.is_empty() {
                    return format!("{} No differences.\n", "✓".green());
                }
                let mut output = String::new();
                for diff in [&report.service, &report.task_definition] {
                    for line in diff.lines() {
                        let _ = writeln!(output, "{}", colorize_diff_line(line));
                    }
                }
                output
            }
        }
    }

    /// Formats the service status.
    #[must_use]
    pub fn format_status(&self, report: &StatusReport, events: usize) -> String {
        match self.format {
            OutputFormat::Json => to_json(&StatusJson::new(report, events)),
            OutputFormat::Text => Self::format_status_text(report, events),
        }
    }

    fn format_status_text(report: &StatusReport, events: usize) -> String {
        let service = &report.service;
        let mut output = String::new();

        let _ = writeln!(
            output,
            "\nService: {}",
            service.service_name.as_deref().unwrap_or_default().bold()
        );
        let _ = writeln!(
            output,
            "   Status: {}",
            format_service_status(service.status.as_deref().unwrap_or("UNKNOWN"))
        );
        let _ = writeln!(output, "   Controller: {}", service.controller_type());
        if let Some(launch_type) = &service.launch_type {
            let platform = service.platform_version.as_deref().unwrap_or("-");
            let _ = writeln!(output, "   Launch type: {launch_type} (platform {platform})");
        }
        let _ = writeln!(
            output,
            "   Task definition: {}",
            service
                .task_definition
                .as_deref()
                .map_or("-", short_revision)
        );
        let _ = writeln!(
            output,
            "   Tasks: desired {}, running {}, pending {}",
            format_count(service.desired_count),
            format_count(service.running_count),
            format_count(service.pending_count)
        );

        if !service.deployments.is_empty() {
            let rows: Vec<DeploymentRow> = service.deployments.iter().map(DeploymentRow::from).collect();
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let recent = recent_events(&service.events, events);
        if !recent.is_empty() {
            output.push_str("\nEvents:\n");
            for event in recent {
                let _ = writeln!(output, "   {}", event.message);
            }
        }

        if let Some(target) = &report.scalable_target {
            let _ = writeln!(output, "\nAuto scaling: {}", format_scalable_target(target));
        }

        output
    }

    /// Formats a registered task definition.
    #[must_use]
    pub fn format_registered(&self, task_definition: &str, dry_run: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "task_definition": task_definition,
                "dry_run": dry_run,
            })),
            OutputFormat::Text => format!(
                "{} Registered {}{}\n",
                "✓".green(),
                task_definition,
                dry_run_marker(dry_run)
            ),
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "valid": result.is_valid(),
                "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "warnings": result.warnings,
            })),
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid!\n", "✓".green());
                if show_warnings && result.warning_count() > 0 {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats the end of a successful wait.
    #[must_use]
    pub fn format_stable(&self, service: &str) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({ "service": service, "stable": true })),
            OutputFormat::Text => format!("{} {service} is stable\n", "✓".green()),
        }
    }
}

impl From<&Deployment> for DeploymentRow {
    fn from(d: &Deployment) -> Self {
        Self {
            status: d.status.clone(),
            task_definition: short_revision(&d.task_definition).to_string(),
            desired: d.desired_count,
            pending: d.pending_count,
            running: d.running_count,
            rollout: d.rollout_state.clone().unwrap_or_default(),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn dry_run_marker(dry_run: bool) -> String {
    if dry_run {
        format!(" {}", "(dry run)".dimmed())
    } else {
        String::new()
    }
}

fn format_count(count: Option<i32>) -> String {
    count.map_or_else(|| String::from("-"), |n| n.to_string())
}

/// `family:revision` from a task definition ARN.
fn short_revision(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

fn format_service_status(status: &str) -> String {
    match status {
        "ACTIVE" => status.green().to_string(),
        "DRAINING" => status.yellow().to_string(),
        _ => status.red().to_string(),
    }
}

fn format_scalable_target(target: &ScalableTarget) -> String {
    let suspended = target.suspended_state;
    let state = if suspended.dynamic_scaling_in_suspended
        && suspended.dynamic_scaling_out_suspended
        && suspended.scheduled_scaling_suspended
    {
        "suspended".yellow().to_string()
    } else if suspended.dynamic_scaling_in_suspended
        || suspended.dynamic_scaling_out_suspended
        || suspended.scheduled_scaling_suspended
    {
        "partially suspended".yellow().to_string()
    } else {
        "active".green().to_string()
    };
    format!(
        "min {}, max {} ({state})",
        target.min_capacity, target.max_capacity
    )
}

fn colorize_diff_line(line: &str) -> String {
    if line.starts_with("+++") || line.starts_with("---") {
        line.bold().to_string()
    } else if line.starts_with('+') {
        line.green().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else if line.starts_with("@@") {
        line.cyan().to_string()
    } else {
        line.to_string()
    }
}

/// The newest `count` events, oldest first.
fn recent_events(events: &[ServiceEvent], count: usize) -> Vec<&ServiceEvent> {
    let mut sorted: Vec<_> = events.iter().collect();
    sorted.sort_by(|a, b| {
        b.created_at
            .unwrap_or_default()
            .total_cmp(&a.created_at.unwrap_or_default())
    });
    sorted.truncate(count);
    sorted.reverse();
    sorted
}

// JSON serialization helpers

#[derive(Serialize)]
struct RolloutJson {
    operation: String,
    service: String,
    strategy: Option<String>,
    task_definition: String,
    desired_count: Option<i32>,
    deployment_id: Option<String>,
    waited: bool,
    dry_run: bool,
}

impl RolloutJson {
    fn new(operation: &str, outcome: &RolloutOutcome) -> Self {
        Self {
            operation: operation.to_string(),
            service: outcome.service.clone(),
            strategy: outcome.strategy.as_ref().map(ToString::to_string),
            task_definition: outcome.task_definition.clone(),
            desired_count: outcome.desired_count,
            deployment_id: outcome.handle.as_ref().and_then(deployment_id),
            waited: outcome.waited,
            dry_run: outcome.dry_run,
        }
    }
}

#[derive(Serialize)]
struct RollbackJson {
    service: String,
    from: String,
    to: String,
    deployment_id: Option<String>,
    waited: bool,
    deregistered: bool,
    dry_run: bool,
}

impl From<&RollbackOutcome> for RollbackJson {
    fn from(outcome: &RollbackOutcome) -> Self {
        Self {
            service: outcome.service.clone(),
            from: outcome.from.clone(),
            to: outcome.to.clone(),
            deployment_id: outcome.handle.as_ref().and_then(deployment_id),
            waited: outcome.waited,
            deregistered: outcome.deregistered,
            dry_run: outcome.dry_run,
        }
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    service: &'a crate::aws::types::Service,
    scalable_target: Option<&'a ScalableTarget>,
    recent_events: Vec<&'a ServiceEvent>,
}

impl<'a> StatusJson<'a> {
    fn new(report: &'a StatusReport, events: usize) -> Self {
        Self {
            service: &report.service,
            scalable_target: report.scalable_target.as_ref(),
            recent_events: recent_events(&report.service.events, events),
        }
    }
}

fn deployment_id(handle: &DeploymentHandle) -> Option<String> {
    match handle {
        DeploymentHandle::CodeDeploy { deployment_id, .. } => deployment_id.clone(),
        DeploymentHandle::Service { .. } => None,
    }
}
