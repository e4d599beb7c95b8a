// src/cli/mod.rs
//! CLI definitions for taxi
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! Commands:
//! - `package` - make, translate and deploy translation packages
//! - `status` - packages per stage on an agency server
//! - `bucket` - object store inspection
//! - `config` - effective configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use taxi::Stage;

mod package;

pub use package::PackageCommands;

#[derive(Parser)]
#[command(name = "taxi")]
#[command(author = "Taxi Contributors")]
#[command(version)]
#[command(about = "Move translation packages between S3 and agency SFTP stages", long_about = None)]
pub struct Cli {
    /// Configuration file (default: $TAXI_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log workflow steps
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log every transferred file
    #[arg(long, global = true)]
    pub debug: bool,

    /// Hide progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format of reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, submit and deploy translation packages
    #[command(subcommand)]
    Package(PackageCommands),

    /// List packages per stage on an agency server
    Status {
        /// Agency whose server is listed (default: $SFTP_USER)
        #[arg(short, long)]
        agency: Option<String>,

        /// Only list this stage (open, deploy, done)
        #[arg(short, long)]
        stage: Option<Stage>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Inspect the object store
    #[command(subcommand)]
    Bucket(BucketCommands),

    /// Print the effective configuration with secrets redacted
    Config,
}

#[derive(Subcommand)]
pub enum BucketCommands {
    /// List objects in a bucket
    Ls {
        /// Only list keys starting with this prefix
        prefix: Option<String>,

        /// Bucket name (default: $AWS_DEFAULT_BUCKET)
        #[arg(short, long)]
        bucket: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_status_parses_stage_case_insensitively() {
        let cli = Cli::try_parse_from(["taxi", "status", "--stage", "DEPLOY", "--format", "json"])
            .unwrap();
        match cli.command {
            Commands::Status { stage, format, agency } => {
                assert_eq!(stage, Some(Stage::Deploy));
                assert_eq!(format, OutputFormat::Json);
                assert!(agency.is_none());
            }
            _ => panic!("expected status"),
        }
        assert!(Cli::try_parse_from(["taxi", "status", "--stage", "review"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["taxi", "config", "--verbose", "--config", "/etc/taxi.toml"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/taxi.toml")));
    }
}
