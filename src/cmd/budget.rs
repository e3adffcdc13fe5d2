//! Budget query and token recording commands.
//!
//! Queries print a bare integer and fall back to `0` when the sprint, the
//! stage, or the store is missing.

use anyhow::Result;
use std::process::ExitCode;
use tracing::warn;

use sprint::budget::{BudgetService, StageCheck};
use sprint::context::SprintContext;
use sprint_common::Stage;

fn nonempty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn print_count(value: u64) -> Result<ExitCode> {
    println!("{}", value);
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_budget_total(ctx: &SprintContext, bead: Option<String>) -> Result<ExitCode> {
    let Some(bead) = nonempty(bead) else {
        return print_count(0);
    };
    print_count(BudgetService::new(ctx).total(&bead).await)
}

pub async fn cmd_budget_remaining(ctx: &SprintContext, bead: Option<String>) -> Result<ExitCode> {
    let Some(bead) = nonempty(bead) else {
        return print_count(0);
    };
    print_count(BudgetService::new(ctx).remaining(&bead).await)
}

pub async fn cmd_budget_stage(
    ctx: &SprintContext,
    bead: Option<String>,
    stage: Option<String>,
) -> Result<ExitCode> {
    let (Some(bead), Some(stage)) = (nonempty(bead), nonempty(stage)) else {
        return print_count(0);
    };
    let allocated = BudgetService::new(ctx)
        .stage_allocated(&bead, Stage::parse(&stage))
        .await;
    print_count(allocated)
}

pub async fn cmd_budget_stage_remaining(
    ctx: &SprintContext,
    bead: Option<String>,
    stage: Option<String>,
) -> Result<ExitCode> {
    let (Some(bead), Some(stage)) = (nonempty(bead), nonempty(stage)) else {
        return print_count(0);
    };
    let remaining = BudgetService::new(ctx)
        .stage_remaining(&bead, Stage::parse(&stage))
        .await;
    print_count(remaining)
}

pub async fn cmd_budget_stage_check(
    ctx: &SprintContext,
    bead: Option<String>,
    stage: Option<String>,
) -> Result<ExitCode> {
    let (Some(bead), Some(stage)) = (nonempty(bead), nonempty(stage)) else {
        return Ok(ExitCode::SUCCESS);
    };
    match BudgetService::new(ctx)
        .check_stage(&bead, Stage::parse(&stage))
        .await
    {
        StageCheck::Exceeded(signal) => {
            eprintln!("{}", signal);
            Ok(ExitCode::FAILURE)
        }
        StageCheck::Within { .. } | StageCheck::Unbounded => Ok(ExitCode::SUCCESS),
    }
}

pub async fn cmd_stage_tokens_spent(
    ctx: &SprintContext,
    bead: Option<String>,
    stage: Option<String>,
) -> Result<ExitCode> {
    let (Some(bead), Some(stage)) = (nonempty(bead), nonempty(stage)) else {
        return print_count(0);
    };
    let spent = BudgetService::new(ctx)
        .stage_spent(&bead, Stage::parse(&stage))
        .await;
    print_count(spent)
}

pub async fn cmd_record_phase_tokens(
    ctx: &SprintContext,
    bead: Option<String>,
    phase: Option<String>,
    tokens: Option<u64>,
) -> Result<ExitCode> {
    let (Some(bead), Some(phase)) = (nonempty(bead), nonempty(phase)) else {
        return Ok(ExitCode::SUCCESS);
    };
    if let Err(e) = BudgetService::new(ctx)
        .record_phase_tokens(&bead, &phase, tokens)
        .await
    {
        warn!(bead = %bead, phase = %phase, error = %e, "could not record phase tokens");
    }
    Ok(ExitCode::SUCCESS)
}
