//! Desired-count resolution.

use serde::{Deserialize, Serialize};

use crate::aws::types::SchedulingStrategy;

/// CLI value meaning "keep the live desired count".
pub const KEEP_DESIRED_COUNT: i32 = -1;

/// What the caller asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesiredCountPolicy {
    /// Keep the live count.
    #[default]
    Keep,
    /// Set this exact count.
    Exactly(i32),
}

impl DesiredCountPolicy {
    /// Maps a CLI value to a policy; `-1` (or no value) keeps the live count.
    #[must_use]
    pub const fn from_cli(value: Option<i32>) -> Self {
        match value {
            None | Some(KEEP_DESIRED_COUNT) => Self::Keep,
            Some(n) => Self::Exactly(n),
        }
    }
}

/// Resolves the desired count to submit.
///
/// Daemon services never carry a count. When the live count is unknown
/// (the service is being created) and nothing was requested, zero is used.
#[must_use]
pub fn resolve(
    live_desired_count: Option<i32>,
    scheduling: SchedulingStrategy,
    requested: DesiredCountPolicy,
) -> Option<i32> {
    if scheduling == SchedulingStrategy::Daemon {
        return None;
    }
    match requested {
        DesiredCountPolicy::Keep => Some(live_desired_count.unwrap_or(0)),
        DesiredCountPolicy::Exactly(n) => Some(n),
    }
}
