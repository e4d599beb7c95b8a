// src/commands/config.rs
//! Effective configuration display

use anyhow::{Context, Result};
use taxi::Settings;

/// Print the merged file and environment settings with secrets redacted
pub fn cmd_config_show(settings: &Settings) -> Result<()> {
    let rendered = settings
        .to_redacted_toml()
        .context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}
