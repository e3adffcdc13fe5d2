//! Complexity scoring commands.

use anyhow::Result;
use std::process::ExitCode;

use sprint::complexity;
use sprint::context::SprintContext;

pub async fn cmd_classify_complexity(ctx: &SprintContext, bead: &str, description: &str) -> Result<ExitCode> {
    println!("{}", complexity::classify_for(ctx, bead, description).await);
    Ok(ExitCode::SUCCESS)
}

pub fn cmd_complexity_label(score: &str) -> Result<ExitCode> {
    println!("{}", complexity::label_from_str(score));
    Ok(ExitCode::SUCCESS)
}
