//! Checkpoint commands. Reads print `{}` / `[]` rather than failing.

use anyhow::Result;
use std::process::ExitCode;
use tracing::debug;

use sprint::checkpoint::{CheckpointStore, clear_legacy};
use sprint::context::SprintContext;

pub async fn cmd_checkpoint_write(
    ctx: &SprintContext,
    bead: &str,
    phase: &str,
    step: &str,
    plan_path: Option<&str>,
    key_decision: Option<&str>,
) -> Result<ExitCode> {
    let plan_path = plan_path.filter(|p| !p.is_empty());
    let key_decision = key_decision.filter(|d| !d.is_empty());
    let written = CheckpointStore::new(ctx)
        .write(bead, phase, step, plan_path, key_decision)
        .await?;
    if written.is_none() {
        debug!(bead, step, "checkpoint skipped");
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_checkpoint_read(ctx: &SprintContext, bead: Option<&str>) -> Result<ExitCode> {
    match CheckpointStore::new(ctx).find(bead).await {
        Some(checkpoint) => println!("{}", serde_json::to_string(&checkpoint)?),
        None => println!("{{}}"),
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_checkpoint_validate(ctx: &SprintContext, bead: Option<&str>) -> Result<ExitCode> {
    if let Some(warning) = CheckpointStore::new(ctx).validate(bead).await {
        eprintln!("{} {}", console::style("WARNING:").yellow().bold(), warning);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn cmd_checkpoint_clear(ctx: &SprintContext) -> Result<ExitCode> {
    clear_legacy(&ctx.config.checkpoint_file());
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_checkpoint_completed_steps(ctx: &SprintContext, bead: Option<&str>) -> Result<ExitCode> {
    let steps = CheckpointStore::new(ctx).completed_steps(bead).await;
    println!("{}", serde_json::to_string(&steps)?);
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_checkpoint_step_done(ctx: &SprintContext, step: &str, bead: Option<&str>) -> Result<ExitCode> {
    if CheckpointStore::new(ctx).is_step_done(step, bead).await {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
