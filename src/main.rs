//! ecs-rollout CLI entrypoint.
//!
//! This is the main entrypoint for the ecs-rollout command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ecs_rollout::cli::{Cli, Commands, OutputFormatter};
use ecs_rollout::config::{
    ConfigParser, ConfigValidator, DefinitionLoader, RolloutConfig, find_config_file,
};
use ecs_rollout::deployer::Deployer;
use ecs_rollout::error::{Result, RolloutError};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, warn};

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let dispatch = match cli.log_settings().build() {
        Ok(dispatch) => dispatch,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let result = runtime.block_on(
        async {
            let on_signal = cancel.clone();
            tokio::spawn(
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Interrupted, cancelling");
                        on_signal.cancel();
                    }
                }
                .with_current_subscriber(),
            );
            run(cli, &cancel).await
        }
        .with_subscriber(dispatch.clone()),
    );

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::dispatcher::with_default(&dispatch, || error!("{}", failure_message(&e)));
            ExitCode::FAILURE
        }
    }
}

/// Tells a rollout whose outcome is unknown apart from one that failed.
fn failure_message(e: &RolloutError) -> String {
    if e.is_unconfirmed() {
        format!("rollout was submitted but not confirmed: {e}")
    } else {
        e.to_string()
    }
}

/// Main async entry point.
async fn run(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config = load_config(cli.config.as_ref())?;

    if let Commands::Validate { warnings } = cli.command {
        return cmd_validate(&config, warnings, &formatter);
    }

    let deployer = Deployer::connect(config).await?;

    let output = match &cli.command {
        Commands::Deploy { .. } => {
            let options = cli.command.deploy_options().unwrap_or_default();
            let outcome = deployer.deploy(&options, cancel).await?;
            formatter.format_rollout("deploy", &outcome)
        }
        Commands::Scale { .. } => {
            let options = cli.command.scale_options().unwrap_or_default();
            let outcome = deployer.scale(&options, cancel).await?;
            formatter.format_rollout("scale", &outcome)
        }
        Commands::Refresh { .. } => {
            let options = cli.command.refresh_options().unwrap_or_default();
            let outcome = deployer.refresh(&options, cancel).await?;
            formatter.format_rollout("refresh", &outcome)
        }
        Commands::Rollback { .. } => {
            let options = cli.command.rollback_options().unwrap_or_default();
            let outcome = deployer.rollback(&options, cancel).await?;
            formatter.format_rollback(&outcome)
        }
        Commands::Create { .. } => {
            let options = cli.command.create_options().unwrap_or_default();
            let outcome = deployer.create(&options, cancel).await?;
            formatter.format_rollout("create", &outcome)
        }
        Commands::Diff => formatter.format_diff(&deployer.diff().await?),
        Commands::Register { dry_run } => {
            let arn = deployer.register(*dry_run).await?;
            formatter.format_registered(&arn, *dry_run)
        }
        Commands::Wait => {
            deployer.wait(cancel).await?;
            formatter.format_stable(&deployer.config().service)
        }
        Commands::Status { events } => formatter.format_status(&deployer.status().await?, *events),
        Commands::Validate { .. } => String::new(),
    };

    emit(&output)
}

/// Validates the configuration and definitions without contacting AWS.
fn cmd_validate(config: &RolloutConfig, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    let loader = DefinitionLoader::new();
    let task_definition = loader.load_task_definition(&config.task_definition_path())?;
    let service_definition = config
        .service_definition_path()
        .map(|path| loader.load_service_definition(&path))
        .transpose()?;

    let result =
        ConfigValidator::new().validate_all(config, &task_definition, service_definition.as_ref())?;
    emit(&formatter.format_validation(&result, show_warnings))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads `.env`, the configuration file and environment overrides.
fn load_config(config_path: Option<&PathBuf>) -> Result<RolloutConfig> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let base = config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let parser = ConfigParser::new().with_base_path(base);
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
