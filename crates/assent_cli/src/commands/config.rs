use miette::{IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use assent_core::config::{self, AssentConfig};
use std::path::Path;

use crate::output::Output;

/// Show current configuration
pub async fn show(config: &AssentConfig) -> Result<()> {
    let output = Output::new();

    output.section("Current Configuration");
    println!();

    let toml_str = toml::to_string_pretty(config).into_diagnostic()?;
    println!("{}", toml_str);

    Ok(())
}

/// Save current configuration to file
pub async fn save(config: &AssentConfig, path: &Path) -> Result<()> {
    let output = Output::new();

    output.info("💾", &format!("Saving configuration to: {}", path.display()));

    config::save_config(config, path).await?;

    output.success("Configuration saved successfully!");
    println!();
    println!("To use this configuration, run:");
    println!("  {} --config {}", "assent".bright_green(), path.display());

    Ok(())
}
