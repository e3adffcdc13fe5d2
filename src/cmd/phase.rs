//! Phase advancement, gates, artifacts, and next-action inference.

use anyhow::{Result, bail};
use std::path::Path;
use std::process::ExitCode;

use sprint::context::SprintContext;
use sprint::orchestrator::{AdvanceOutcome, GateDecision, PhaseRunner, infer_action, infer_bead};

pub async fn cmd_sprint_advance(ctx: &SprintContext, bead: &str, current: &str) -> Result<ExitCode> {
    match PhaseRunner::new(ctx).advance(bead, current).await? {
        AdvanceOutcome::Advanced { from, to } => {
            eprintln!("Phase: {} → {} (auto-advancing)", from, to);
            Ok(ExitCode::SUCCESS)
        }
        AdvanceOutcome::Refused(signal) => {
            println!("{}", signal);
            Ok(ExitCode::FAILURE)
        }
        AdvanceOutcome::NotAdvanced => Ok(ExitCode::FAILURE),
    }
}

pub async fn cmd_sprint_next_step(ctx: &SprintContext, phase: &str) -> Result<ExitCode> {
    println!("{}", PhaseRunner::new(ctx).next_step(phase).await);
    Ok(ExitCode::SUCCESS)
}

/// Inverted exit status: 0 means pause, 1 means keep going.
pub async fn cmd_sprint_should_pause(ctx: &SprintContext, bead: &str, target: &str) -> Result<ExitCode> {
    match PhaseRunner::new(ctx).should_pause(bead, target).await {
        Some(signal) => {
            println!("{}", signal);
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::FAILURE),
    }
}

fn report_gate(decision: GateDecision, bead: &str, target: &str) -> Result<ExitCode> {
    match decision {
        GateDecision::Pass => Ok(ExitCode::SUCCESS),
        GateDecision::Skipped => {
            eprintln!("enforce-gate: skipping gate for {} (SPRINT_SKIP_GATE set)", target);
            Ok(ExitCode::SUCCESS)
        }
        GateDecision::NoRun => {
            eprintln!("enforce-gate: skipped, no run for bead {:?}", bead);
            Ok(ExitCode::SUCCESS)
        }
        GateDecision::Blocked(target) => bail!("gate blocked for {}", target),
    }
}

pub async fn cmd_enforce_gate(ctx: &SprintContext, bead: &str, target: &str) -> Result<ExitCode> {
    let decision = PhaseRunner::new(ctx).enforce_gate(bead, target).await;
    report_gate(decision, bead, target)
}

pub async fn cmd_record_phase(ctx: &SprintContext) -> Result<ExitCode> {
    PhaseRunner::new(ctx).record_phase().await;
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_advance_phase(ctx: &SprintContext, bead: &str, phase: &str) -> Result<ExitCode> {
    let decision = PhaseRunner::new(ctx).advance_phase(bead, phase).await;
    report_gate(decision, bead, phase)
}

pub async fn cmd_set_artifact(ctx: &SprintContext, bead: &str, kind: &str, path: &str) -> Result<ExitCode> {
    PhaseRunner::new(ctx).set_artifact(bead, kind, path).await;
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_get_artifact(ctx: &SprintContext, bead: &str, kind: &str) -> Result<ExitCode> {
    match PhaseRunner::new(ctx).get_artifact(bead, kind).await? {
        Some(path) => {
            println!("{}", path);
            Ok(ExitCode::SUCCESS)
        }
        None => bail!("no artifact of type {:?} found", kind),
    }
}

pub async fn cmd_infer_action(ctx: &SprintContext, bead: &str, status: Option<&str>) -> Result<ExitCode> {
    println!("{}", infer_action(ctx, bead, status).await);
    Ok(ExitCode::SUCCESS)
}

pub fn cmd_infer_bead(ctx: &SprintContext, file: Option<&Path>) -> Result<ExitCode> {
    let bead = infer_bead(ctx.config.bead_id(), file).unwrap_or_default();
    println!("{}", bead);
    Ok(ExitCode::SUCCESS)
}
