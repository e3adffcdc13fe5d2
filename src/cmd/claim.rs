//! Sprint (Layer A) and advisory bead (Layer B) claim commands.

use anyhow::Result;
use std::process::ExitCode;
use tracing::debug;

use sprint::claim::{ClaimCoordinator, ClaimOutcome};
use sprint::context::SprintContext;
use sprint::errors::ClaimError;

/// Conflicts and a missing store refuse with exit 1; anything else is a
/// hard error.
fn refuse(err: ClaimError) -> Result<ExitCode> {
    match err {
        ClaimError::Conflict { .. } => {
            eprintln!("{}", console::style(err).yellow());
            Ok(ExitCode::FAILURE)
        }
        ClaimError::StoreUnavailable
        | ClaimError::NoRun(_)
        | ClaimError::LockContention { .. }
        | ClaimError::RegisterFailed(_) => {
            eprintln!("{}", err);
            Ok(ExitCode::FAILURE)
        }
        other => Err(other.into()),
    }
}

fn report(outcome: ClaimOutcome, bead: &str) -> ExitCode {
    debug!(bead, ?outcome, "claim");
    ExitCode::SUCCESS
}

pub async fn cmd_sprint_claim(ctx: &SprintContext, bead: &str, session: &str) -> Result<ExitCode> {
    match ClaimCoordinator::new(ctx).claim_session(bead, session).await {
        Ok(outcome) => Ok(report(outcome, bead)),
        Err(e) => refuse(e),
    }
}

pub async fn cmd_sprint_release(ctx: &SprintContext, bead: Option<String>) -> Result<ExitCode> {
    if let Some(bead) = bead.filter(|b| !b.is_empty()) {
        let released = ClaimCoordinator::new(ctx).release_session(&bead).await;
        debug!(bead = %bead, released, "released session claims");
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_bead_claim(ctx: &SprintContext, bead: &str, session: Option<String>) -> Result<ExitCode> {
    let session = session
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| ctx.config.session_id());
    match ClaimCoordinator::new(ctx).claim_advisory(bead, &session).await {
        Ok(outcome) => Ok(report(outcome, bead)),
        Err(e) => refuse(e),
    }
}

pub async fn cmd_bead_release(ctx: &SprintContext, bead: &str) -> Result<ExitCode> {
    ClaimCoordinator::new(ctx).release_advisory(bead).await;
    Ok(ExitCode::SUCCESS)
}
