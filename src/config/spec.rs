//! Configuration file model.
//!
//! This module defines the structs that map to the `ecs-rollout.yaml` file:
//! which service to manage, where its definitions live, and how blue/green
//! rollouts are submitted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aws::DeploymentGroupRef;

/// Default stability timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RolloutConfig {
    /// AWS region; falls back to the default provider chain.
    #[serde(default)]
    pub region: Option<String>,
    /// Cluster name or ARN.
    #[serde(default = "default_cluster")]
    pub cluster: String,
    /// Service name.
    pub service: String,
    /// Service definition file (JSON or YAML).
    #[serde(default)]
    pub service_definition: Option<PathBuf>,
    /// Task definition file (JSON or YAML).
    pub task_definition: PathBuf,
    /// Stability timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// CodeDeploy settings for blue/green services.
    #[serde(default)]
    pub codedeploy: Option<CodeDeployConfig>,
    /// AppSpec additions for blue/green services.
    #[serde(default)]
    pub appspec: Option<AppSpecConfig>,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// CodeDeploy settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeDeployConfig {
    /// CodeDeploy application.
    pub application_name: String,
    /// Deployment group.
    pub deployment_group_name: String,
    /// Deployment config overriding the group's default.
    #[serde(default)]
    pub deployment_config_name: Option<String>,
}

/// AppSpec additions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppSpecConfig {
    /// Lifecycle hooks, one event per entry.
    #[serde(default)]
    pub hooks: Vec<BTreeMap<String, String>>,
}

fn default_cluster() -> String {
    String::from("default")
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl RolloutConfig {
    /// Returns the stability timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolves a path from the config against the config's directory.
    #[must_use]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Absolute path of the task definition file.
    #[must_use]
    pub fn task_definition_path(&self) -> PathBuf {
        self.resolve_path(&self.task_definition)
    }

    /// Absolute path of the service definition file, if configured.
    #[must_use]
    pub fn service_definition_path(&self) -> Option<PathBuf> {
        self.service_definition
            .as_deref()
            .map(|p| self.resolve_path(p))
    }

    /// The configured deployment group, if any.
    #[must_use]
    pub fn deployment_group(&self) -> Option<DeploymentGroupRef> {
        self.codedeploy.as_ref().map(|cd| {
            DeploymentGroupRef::new(&cd.application_name, &cd.deployment_group_name)
                .with_deployment_config(cd.deployment_config_name.clone())
        })
    }

    /// Configured AppSpec hooks.
    #[must_use]
    pub fn hooks(&self) -> Vec<BTreeMap<String, String>> {
        self.appspec
            .as_ref()
            .map(|a| a.hooks.clone())
            .unwrap_or_default()
    }
}
