use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use cli_interface::{Cli, Commands, Report};
use common::utils::{format_bytes, format_duration};
use kilimo_metadata::{AttachOutcome, MetadataAttacher, Verification};
use model_manager::MetadataDisplayer;
use settings::{AttacherConfig, ConfigManager, LoadOptions};

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.check().unwrap_or_else(|err| err.exit());

    let mut manager = ConfigManager::load(&LoadOptions {
        config_file: cli.config.clone(),
        env: None,
    })
    .context("Failed to load configuration")?;
    manager.apply_overrides(&cli.overrides())?;

    logging::init(&manager.config().logging)?;
    if let Some(path) = manager.config_file() {
        info!("Using configuration file {}", path.display());
    }

    let report = Report::new();
    match cli.selected_command() {
        Commands::Attach(_) => attach(manager.config().clone(), &report),
        Commands::Inspect { model } => inspect(&model, &report),
        Commands::Config => {
            report.config(&manager.to_toml()?);
            Ok(())
        }
    }
}

fn attach(config: AttacherConfig, report: &Report) -> Result<()> {
    report.beginning();

    let attacher = MetadataAttacher::new(config);
    let outcome = attacher.run().context("Failed to write the labels file")?;
    info!("Labels file at {}", outcome.labels_path().display());

    match outcome {
        AttachOutcome::Completed {
            report: merged,
            verification,
            ..
        } => {
            report.merged(
                &merged.output_path,
                format_bytes(merged.bytes as u64),
                &merged.sha256,
                format_bytes(merged.metadata_bytes as u64),
                format_duration(merged.elapsed),
            );
            match verification {
                Verification::Verified(verified) => {
                    report.metadata(&verified.json, &verified.packed_files)
                }
                Verification::Skipped => report.verification_skipped(),
                Verification::Failed(reason) => report.verification_failed(reason),
            }
        }
        AttachOutcome::Fallback {
            labels_path,
            stage,
            error,
        } => report.fallback(stage, error, &labels_path),
    }

    Ok(())
}

fn inspect(model: &Path, report: &Report) -> Result<()> {
    let displayer = MetadataDisplayer::with_model_file(model)
        .with_context(|| format!("Failed to read metadata from {}", model.display()))?;

    report.metadata(
        &displayer.get_metadata_json()?,
        &displayer.get_packed_associated_file_list(),
    );
    Ok(())
}
