//! Epic child and parent auto-close commands.

use anyhow::Result;
use std::process::ExitCode;

use sprint::children::Hierarchy;
use sprint::context::SprintContext;

pub async fn cmd_close_children(ctx: &SprintContext, epic: &str, reason: Option<&str>) -> Result<ExitCode> {
    let closed = Hierarchy::new(ctx).close_children(epic, reason).await;
    println!("{}", closed);
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_close_parent_if_done(
    ctx: &SprintContext,
    bead: &str,
    reason: Option<&str>,
) -> Result<ExitCode> {
    if let Some(parent) = Hierarchy::new(ctx).close_parent_if_done(bead, reason).await {
        println!("{}", parent);
    }
    Ok(ExitCode::SUCCESS)
}
