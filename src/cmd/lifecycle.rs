//! Sprint lifecycle and agent tracking commands.

use anyhow::{Context, Result};
use std::process::ExitCode;

use sprint::context::SprintContext;
use sprint::errors::SprintError;
use sprint::orchestrator::SprintManager;

pub async fn cmd_sprint_create(
    ctx: &SprintContext,
    title: Option<String>,
    complexity: Option<String>,
    lane: Option<String>,
) -> Result<ExitCode> {
    let complexity = complexity.and_then(|c| c.trim().parse::<i64>().ok());
    let manager = SprintManager::new(ctx);
    match manager
        .create(
            title.as_deref().unwrap_or_default(),
            complexity,
            lane.as_deref().filter(|l| !l.is_empty()),
        )
        .await
    {
        Ok(sprint_id) => {
            println!("{}", sprint_id);
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ SprintError::StoreRequired) => {
            eprintln!("{}", e);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("sprint-create failed"),
    }
}

pub async fn cmd_sprint_find_active(ctx: &SprintContext) -> Result<ExitCode> {
    let active = SprintManager::new(ctx).find_active().await;
    println!("{}", serde_json::to_string(&active)?);
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_sprint_read_state(ctx: &SprintContext, bead: Option<String>) -> Result<ExitCode> {
    let state = match bead.as_deref().filter(|b| !b.is_empty()) {
        Some(bead) => SprintManager::new(ctx).read_state(bead).await,
        None => None,
    };
    match state {
        Some(state) => println!("{}", serde_json::to_string(&state)?),
        None => println!("{{}}"),
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_sprint_track_agent(
    ctx: &SprintContext,
    bead: &str,
    name: &str,
    agent_type: Option<String>,
    dispatch_id: Option<String>,
) -> Result<ExitCode> {
    let agent_id = SprintManager::new(ctx)
        .track_agent(bead, name, agent_type.as_deref(), dispatch_id.as_deref())
        .await;
    if let Some(agent_id) = agent_id {
        println!("{}", agent_id);
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_sprint_complete_agent(
    ctx: &SprintContext,
    agent_id: &str,
    status: Option<String>,
) -> Result<ExitCode> {
    SprintManager::new(ctx)
        .complete_agent(agent_id, status.as_deref())
        .await;
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_sprint_invalidate_caches(ctx: &SprintContext) -> Result<ExitCode> {
    SprintManager::new(ctx).invalidate_caches().await;
    Ok(ExitCode::SUCCESS)
}
