//! Command line definition

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use settings::ConfigOverrides;

/// Attach metadata and class labels to the KilimoVision TFLite model
#[derive(Debug, Parser)]
#[command(name = "kilimo-metadata")]
#[command(version)]
#[command(about = "Attach metadata and class labels to a TFLite classifier", long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level or filter directive (e.g. debug, model_manager=trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Arguments of the default `attach` command
    #[command(flatten)]
    pub attach: AttachArgs,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Attach metadata and labels to the model (default)
    Attach(AttachArgs),

    /// Print the metadata and packed files of a model
    Inspect {
        /// Model file to read
        model: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, Default, Args)]
pub struct AttachArgs {
    /// Source model file
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Destination of the model with metadata
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Destination of the labels file
    #[arg(short, long)]
    pub labels: Option<PathBuf>,

    /// Skip reading the metadata back after writing
    #[arg(long)]
    pub no_verify: bool,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Attach(_) => "attach",
            Commands::Inspect { .. } => "inspect",
            Commands::Config => "config",
        }
    }
}

impl AttachArgs {
    fn is_set(&self) -> bool {
        self.model.is_some() || self.output.is_some() || self.labels.is_some() || self.no_verify
    }
}

impl Cli {
    /// Rejects attach options given before an explicit subcommand
    pub fn check(&self) -> Result<(), clap::Error> {
        match &self.command {
            Some(command) if self.attach.is_set() => Err(Cli::command().error(
                ErrorKind::ArgumentConflict,
                format!(
                    "--model, --output, --labels and --no-verify go after `{}`, not before it",
                    command.name()
                ),
            )),
            _ => Ok(()),
        }
    }

    /// The command to run; `attach` when none was given
    pub fn selected_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Attach(self.attach.clone()))
    }

    /// Configuration overrides taken from the command line
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            log_level: self.log_level.clone(),
            log_json: self.log_json.then_some(true),
            ..Default::default()
        };

        if let Commands::Attach(args) = self.selected_command() {
            overrides.model_path = args.model;
            overrides.output_path = args.output;
            overrides.labels_path = args.labels;
            overrides.verify = args.no_verify.then_some(false);
        }

        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_invocation_attaches_with_defaults() {
        let cli = Cli::try_parse_from(["kilimo-metadata"]).unwrap();
        assert!(matches!(cli.selected_command(), Commands::Attach(_)));

        let overrides = cli.overrides();
        assert!(overrides.model_path.is_none());
        assert!(overrides.verify.is_none());
        assert!(overrides.log_json.is_none());
    }

    #[test]
    fn top_level_attach_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "kilimo-metadata",
            "--model",
            "in.tflite",
            "-o",
            "out.tflite",
            "--no-verify",
            "--log-level",
            "debug",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.model_path, Some(PathBuf::from("in.tflite")));
        assert_eq!(overrides.output_path, Some(PathBuf::from("out.tflite")));
        assert_eq!(overrides.verify, Some(false));
        assert_eq!(overrides.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn explicit_attach_subcommand_is_accepted() {
        let cli =
            Cli::try_parse_from(["kilimo-metadata", "attach", "--labels", "classes.txt"]).unwrap();
        assert!(cli.check().is_ok());
        assert_eq!(cli.overrides().labels_path, Some(PathBuf::from("classes.txt")));
    }

    #[test]
    fn inspect_takes_a_model_path() {
        let cli =
            Cli::try_parse_from(["kilimo-metadata", "--log-json", "inspect", "model.tflite"])
                .unwrap();
        match cli.selected_command() {
            Commands::Inspect { model } => assert_eq!(model, PathBuf::from("model.tflite")),
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.overrides().log_json, Some(true));
        assert!(cli.overrides().model_path.is_none());
    }

    #[test]
    fn config_file_flag_goes_before_any_subcommand() {
        let cli =
            Cli::try_parse_from(["kilimo-metadata", "--config", "k.toml", "inspect", "m.tflite"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("k.toml")));
        assert!(matches!(cli.selected_command(), Commands::Inspect { .. }));

        let cli = Cli::try_parse_from(["kilimo-metadata", "-c", "k.toml", "config"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("k.toml")));
        assert!(matches!(cli.selected_command(), Commands::Config));

        let cli = Cli::try_parse_from(["kilimo-metadata", "--config", "k.toml", "attach"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("k.toml")));
        assert!(matches!(cli.selected_command(), Commands::Attach(_)));
    }

    #[test]
    fn log_flags_go_before_any_subcommand() {
        for command in [
            vec!["inspect", "m.tflite"],
            vec!["config"],
            vec!["attach", "--no-verify"],
        ] {
            let mut args = vec!["kilimo-metadata", "--log-level", "debug", "--log-json"];
            args.extend(command);

            let cli = Cli::try_parse_from(args).unwrap();
            assert!(cli.check().is_ok());
            let overrides = cli.overrides();
            assert_eq!(overrides.log_level.as_deref(), Some("debug"));
            assert_eq!(overrides.log_json, Some(true));
        }
    }

    #[test]
    fn global_flags_also_go_after_the_subcommand() {
        let cli = Cli::try_parse_from(["kilimo-metadata", "config", "--config", "k.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("k.toml")));
    }

    #[test]
    fn attach_options_before_another_subcommand_are_rejected() {
        let cli =
            Cli::try_parse_from(["kilimo-metadata", "--model", "in.tflite", "inspect", "m.tflite"])
                .unwrap();
        assert_eq!(cli.check().unwrap_err().kind(), ErrorKind::ArgumentConflict);
    }
}
