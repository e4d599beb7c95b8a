// src/main.rs

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use taxi::{CliProgress, LogProgress, PackageController, ProgressTracker, Settings, SilentProgress};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{BucketCommands, Cli, Commands, PackageCommands};

fn init_tracing(cli: &Cli) {
    let filter = if cli.debug {
        EnvFilter::new("taxi=debug")
    } else if cli.verbose {
        EnvFilter::new("taxi=info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_for(cli: &Cli) -> Box<dyn ProgressTracker> {
    if cli.quiet {
        Box::new(SilentProgress::new())
    } else if std::io::stderr().is_terminal() {
        Box::new(CliProgress::new())
    } else {
        Box::new(LogProgress::new("taxi"))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let settings = Settings::load(cli.config.as_deref())?;
    let progress = progress_for(&cli);

    // Connections are opened lazily, so `config` never touches the network.
    run(cli.command, PackageController::live(settings, progress))
}

fn run(command: Commands, mut controller: PackageController) -> Result<()> {
    match command {
        Commands::Package(package_cmd) => match package_cmd {
            PackageCommands::Make { name, path, bucket } => {
                commands::cmd_package_make(&controller, &name, &path, bucket.as_deref())
            }
            PackageCommands::Translate { name, to, from, agency } => {
                commands::cmd_package_translate(&mut controller, &name, &from, &to, agency)
            }
            PackageCommands::Deploy { name, path, to, from, agency, bucket } => {
                commands::cmd_package_deploy(
                    &mut controller,
                    &name,
                    &path,
                    &from,
                    &to,
                    agency,
                    bucket.as_deref(),
                )
            }
        },

        Commands::Status { agency, stage, format } => {
            commands::cmd_status(&mut controller, agency, stage, format)
        }

        Commands::Bucket(bucket_cmd) => match bucket_cmd {
            BucketCommands::Ls { prefix, bucket } => {
                commands::cmd_bucket_ls(&controller, bucket.as_deref(), prefix.as_deref())
            }
        },

        Commands::Config => commands::cmd_config_show(controller.settings()),
    }
}
