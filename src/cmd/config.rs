//! Configuration view and validation commands: `sprint config`.

use anyhow::{Context, Result};
use std::process::ExitCode;

use super::super::ConfigCommands;

use sprint::context::SprintContext;

pub fn cmd_config(ctx: &SprintContext, command: Option<ConfigCommands>) -> Result<ExitCode> {
    let config = &ctx.config;
    let config_path = config.sprint_dir.join("sprint.toml");

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", console::style("Sprint Configuration").bold().cyan());
            println!("====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No sprint.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!();
            let rendered = toml::to_string_pretty(&config.effective())
                .context("Failed to render configuration")?;
            for line in rendered.lines() {
                println!("  {}", line);
            }
            println!();

            println!("Session:");
            println!("  session_id = \"{}\"", config.session_id());
            if let Some(bead) = config.bead_id() {
                println!("  bead_id = \"{}\"", bead);
            }
            println!("  skip_budget = {}", config.skip_budget());
            println!("  skip_gate = {}", config.skip_gate());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("{}", console::style("Configuration is valid.").green());
            } else {
                println!("{}", console::style("Configuration warnings:").yellow());
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
    }

    Ok(ExitCode::SUCCESS)
}
