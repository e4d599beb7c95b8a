// src/cli/package.rs
//! Package lifecycle commands: make, translate, deploy

use clap::Subcommand;
use taxi::package::DEFAULT_LANGUAGE;

#[derive(Subcommand)]
pub enum PackageCommands {
    /// Package HTML resources from a bucket into the local cache
    Make {
        /// Package name, i.e. the partner or site
        name: String,

        /// Path to the resources in the bucket
        path: String,

        /// Bucket name (default: $AWS_DEFAULT_BUCKET)
        #[arg(short, long)]
        bucket: Option<String>,
    },

    /// Submit the latest cached package to a translation agency
    Translate {
        /// Package name
        name: String,

        /// Target language and region (e.g. fr_FR)
        to: String,

        /// Source language and region
        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        from: String,

        /// Agency doing the translation; also its SFTP login
        #[arg(short, long)]
        agency: Option<String>,
    },

    /// Deploy translated packages to their language folder in the bucket
    Deploy {
        /// Package name
        name: String,

        /// Path to the resources in the bucket
        path: String,

        /// Target language and region (e.g. fr_FR)
        to: String,

        /// Source language and region
        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        from: String,

        /// Agency that translated the package
        #[arg(short, long)]
        agency: Option<String>,

        /// Bucket name (default: $AWS_DEFAULT_BUCKET)
        #[arg(short, long)]
        bucket: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_translate_defaults_source_language() {
        let cli = Cli::try_parse_from(["taxi", "package", "translate", "Acme", "fr_FR", "-a", "ag1"])
            .unwrap();
        match cli.command {
            Commands::Package(PackageCommands::Translate { name, to, from, agency }) => {
                assert_eq!(name, "Acme");
                assert_eq!(to, "fr_FR");
                assert_eq!(from, "en_US");
                assert_eq!(agency.as_deref(), Some("ag1"));
            }
            _ => panic!("expected package translate"),
        }
    }

    #[test]
    fn test_deploy_arguments() {
        let cli = Cli::try_parse_from([
            "taxi", "package", "deploy", "Acme", "out/", "fr_FR", "--bucket", "b",
        ])
        .unwrap();
        match cli.command {
            Commands::Package(PackageCommands::Deploy { path, to, bucket, agency, .. }) => {
                assert_eq!(path, "out/");
                assert_eq!(to, "fr_FR");
                assert_eq!(bucket.as_deref(), Some("b"));
                assert!(agency.is_none());
            }
            _ => panic!("expected package deploy"),
        }
    }
}
