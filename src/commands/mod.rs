// src/commands/mod.rs
//! Command handlers for the taxi CLI

mod bucket;
mod config;
mod package;
mod status;

// Re-export all command handlers
pub use bucket::cmd_bucket_ls;
pub use config::cmd_config_show;
pub use package::{cmd_package_deploy, cmd_package_make, cmd_package_translate};
pub use status::cmd_status;
