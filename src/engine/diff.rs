//! Diff engine for comparing declared and live definitions.
//!
//! Both sides are canonicalized, rendered as pretty JSON with sorted keys,
//! and compared line by line. An empty diff means no semantic difference.

use serde::Serialize;
use similar::TextDiff;
use tracing::debug;

use crate::aws::types::{Service, TaskDefinition};

use super::canonical::{canonical_service, canonical_task_definition};

/// Lines of context around each change.
const CONTEXT_RADIUS: usize = 3;

/// Engine for computing diffs between declared and live definitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

/// Diffs of one service and its task definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    /// Unified diff of the service definition, empty when equal.
    pub service: String,
    /// Unified diff of the task definition, empty when equal.
    pub task_definition: String,
}

impl DiffReport {
    /// Returns true when neither definition differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.service.is_empty() && self.task_definition.is_empty()
    }
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Diffs a live service against its declared definition.
    #[must_use]
    pub fn diff_service(&self, live: &Service, declared: &Service, label: &str) -> String {
        let live = render(&canonical_service(live));
        let declared = render(&canonical_service(declared));
        unified(&live, &declared, label)
    }

    /// Diffs a live task definition against its declared definition.
    #[must_use]
    pub fn diff_task_definition(
        &self,
        live: &TaskDefinition,
        declared: &TaskDefinition,
        label: &str,
    ) -> String {
        let live = render(&canonical_task_definition(live));
        let declared = render(&canonical_task_definition(declared));
        unified(&live, &declared, label)
    }

    /// Computes both diffs.
    ///
    /// `live_service` is `None` when the service does not exist yet, in which
    /// case the whole declared definition shows as added. Without a
    /// `declared_service` there is nothing to compare and the service diff
    /// is empty.
    #[must_use]
    pub fn compute_diff(
        &self,
        live_service: Option<&Service>,
        declared_service: Option<&Service>,
        live_task_definition: Option<&TaskDefinition>,
        declared_task_definition: &TaskDefinition,
    ) -> DiffReport {
        let service_label = live_service
            .and_then(|s| s.service_arn.as_deref())
            .unwrap_or("service");
        let service = match (live_service, declared_service) {
            (_, None) => String::new(),
            (Some(live), Some(declared)) => self.diff_service(live, declared, service_label),
            (None, Some(declared)) => {
                unified("", &render(&canonical_service(declared)), service_label)
            }
        };

        let td_label = live_task_definition
            .and_then(|td| td.task_definition_arn.as_deref())
            .unwrap_or("task definition");
        let task_definition = match live_task_definition {
            Some(live) => self.diff_task_definition(live, declared_task_definition, td_label),
            None => unified(
                "",
                &render(&canonical_task_definition(declared_task_definition)),
                td_label,
            ),
        };

        debug!(
            "Diff computed: service {}, task definition {}",
            if service.is_empty() { "unchanged" } else { "changed" },
            if task_definition.is_empty() { "unchanged" } else { "changed" },
        );

        DiffReport {
            service,
            task_definition,
        }
    }
}

/// Renders a value as pretty JSON with sorted keys.
fn render<T: Serialize>(value: &T) -> String {
    // Going through `Value` sorts object keys.
    let value = serde_json::to_value(value).unwrap_or_default();
    let mut text = serde_json::to_string_pretty(&value).unwrap_or_default();
    text.push('\n');
    text
}

fn unified(old: &str, new: &str, label: &str) -> String {
    if old == new {
        return String::new();
    }
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .header(label, label)
        .to_string()
}
