//! Per-operation logger construction.
//!
//! Nothing is installed globally: [`LogSettings::build`] produces a
//! `tracing` dispatcher that the caller attaches to the operation future
//! with [`tracing::instrument::WithSubscriber`].

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::Dispatch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::{ConfigError, Result};

/// Environment variable holding a filter directive, e.g. `debug` or
/// `ecs_rollout=trace`.
pub const ENV_LOG: &str = "ECS_ROLLOUT_LOG";

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogDestination {
    /// Standard error.
    #[default]
    Stderr,
    /// Appended to a file.
    File(PathBuf),
}

/// Logger settings for one operation.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Filter directive; `None` reads [`ENV_LOG`] and falls back to `info`.
    pub level: Option<String>,
    /// Emit ANSI colours.
    pub color: bool,
    /// Line format.
    pub format: LogFormat,
    /// Output destination.
    pub destination: LogDestination,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: None,
            color: true,
            format: LogFormat::Text,
            destination: LogDestination::Stderr,
        }
    }
}

impl LogSettings {
    /// Sets the filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Enables or disables colours.
    #[must_use]
    pub const fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Sets the line format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the destination.
    #[must_use]
    pub fn with_destination(mut self, destination: LogDestination) -> Self {
        self.destination = destination;
        self
    }

    /// Builds the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter directive is invalid or the log file
    /// cannot be opened.
    pub fn build(&self) -> Result<Dispatch> {
        let filter = self.filter()?;

        // Colour codes never go to files.
        let (writer, ansi) = match &self.destination {
            LogDestination::Stderr => (BoxMakeWriter::new(std::io::stderr), self.color),
            LogDestination::File(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                (BoxMakeWriter::new(Arc::new(file)), false)
            }
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false);

        Ok(match self.format {
            LogFormat::Text => Dispatch::new(builder.finish()),
            LogFormat::Json => Dispatch::new(builder.json().finish()),
        })
    }

    fn filter(&self) -> Result<EnvFilter> {
        match &self.level {
            Some(level) => EnvFilter::try_new(level)
                .map_err(|e| ConfigError::validation(format!("Invalid log level: {e}"), "level").into()),
            None => Ok(EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing::instrument::WithSubscriber;

    #[tokio::test]
    async fn test_text_log_to_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("rollout.log");
        let dispatch = LogSettings::default()
            .with_level("debug")
            .with_destination(LogDestination::File(path.clone()))
            .build()
            .expect("dispatch");

        async {
            tracing::debug!("describing service web");
        }
        .with_subscriber(dispatch)
        .await;

        let content = std::fs::read_to_string(&path).expect("read");
        assert!(content.contains("describing service web"));
        assert!(!content.contains('\u{1b}'));
    }

    #[test]
    fn test_json_lines_and_filtering() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("rollout.json");
        let dispatch = LogSettings::default()
            .with_level("info")
            .with_format(LogFormat::Json)
            .with_destination(LogDestination::File(path.clone()))
            .build()
            .expect("dispatch");

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!("hidden");
            tracing::info!(service = "web", "deployment started");
        });

        let content = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        let line: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(line["fields"]["message"], "deployment started");
        assert_eq!(line["fields"]["service"], "web");
    }

    #[test]
    fn test_invalid_level() {
        let err = LogSettings::default()
            .with_level("ecs_rollout=loud")
            .build()
            .expect_err("invalid");
        assert!(err.to_string().contains("Invalid log level"));
    }
}
