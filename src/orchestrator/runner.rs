//! Phase advancement and the checks around it.
//!
//! Whether a transition is allowed is decided by the run store's gate. This
//! module only asks, interprets the answer, and reconciles with the phase
//! the store actually holds when another session got there first.

use tracing::{debug, info, warn};

use sprint_common::phase::{action_to_step, next_step};
use sprint_common::Signal;

use crate::budget::BudgetService;
use crate::context::SprintContext;
use crate::errors::SprintError;
use crate::orchestrator::state::SprintManager;
use crate::store::BudgetStatus;

/// Recorded as an artifact's phase when the run's phase cannot be read.
const UNKNOWN_PHASE: &str = "unknown";

/// Result of one advance attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Advanced { from: String, to: String },
    /// A flow-control refusal: over budget, gate blocked, manual pause, or
    /// the phase already moved.
    Refused(Signal),
    /// The store declined without a reason this module recognises.
    NotAdvanced,
}

/// Result of a gate enforcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    /// Gate enforcement is switched off by configuration.
    Skipped,
    /// Nothing to check against; passes.
    NoRun,
    Blocked(String),
}

impl GateDecision {
    pub fn allows(&self) -> bool {
        !matches!(self, GateDecision::Blocked(_))
    }
}

pub struct PhaseRunner<'a> {
    ctx: &'a SprintContext,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(ctx: &'a SprintContext) -> Self {
        Self { ctx }
    }

    /// Move the sprint past `current`.
    pub async fn advance(&self, sprint: &str, current: &str) -> Result<AdvanceOutcome, SprintError> {
        let run_id = self.ctx.resolve_run_id(sprint).await?;

        if !self.ctx.config.skip_budget() {
            if let Some(signal) = self.budget_refusal(&run_id, current).await {
                return Ok(AdvanceOutcome::Refused(signal));
            }
        }

        let result = match self.ctx.store.run_advance(&run_id).await {
            Ok(result) => result,
            Err(e) => {
                if let Some(actual) = self.moved_elsewhere(&run_id, current).await {
                    return Ok(AdvanceOutcome::Refused(Signal::stale_phase(current, &actual)));
                }
                return Err(SprintError::AdvanceFailed(e));
            }
        };

        if !result.advanced {
            debug!(run_id = %run_id, event_type = %result.event_type, "advance declined");
            return Ok(match result.event_type.as_str() {
                "block" => AdvanceOutcome::Refused(Signal::gate_blocked(&result.to_phase)),
                "pause" => AdvanceOutcome::Refused(Signal::manual_pause(&result.to_phase)),
                other => {
                    if other.is_empty() {
                        warn!(run_id = %run_id, "run advance returned an unexpected result");
                    }
                    match self.moved_elsewhere(&run_id, current).await {
                        Some(actual) => {
                            AdvanceOutcome::Refused(Signal::stale_phase(current, &actual))
                        }
                        None => AdvanceOutcome::NotAdvanced,
                    }
                }
            });
        }

        SprintManager::new(self.ctx).invalidate_caches().await;
        if let Err(e) = BudgetService::new(self.ctx)
            .record_phase_tokens(sprint, current, None)
            .await
        {
            warn!(sprint, phase = current, error = %e, "could not record phase tokens");
        }

        let from = if result.from_phase.is_empty() {
            current.to_string()
        } else {
            result.from_phase
        };
        info!(sprint, from = %from, to = %result.to_phase, "phase advanced");
        Ok(AdvanceOutcome::Advanced {
            from,
            to: result.to_phase,
        })
    }

    async fn budget_refusal(&self, run_id: &str, current: &str) -> Option<Signal> {
        match self.ctx.store.run_budget(run_id).await {
            Ok(BudgetStatus::Exceeded) => {}
            Ok(BudgetStatus::Within(_)) => return None,
            // A broken budget check fails open; only an explicit exceeded
            // answer refuses the advance.
            Err(e) => {
                debug!(run_id, error = %e, "budget check failed; continuing");
                return None;
            }
        }
        let spent = self.ctx.store.run_tokens(run_id).await.ok().map(|t| t.total());
        let budget = self
            .ctx
            .store
            .run_status(run_id)
            .await
            .ok()
            .map(|run| run.token_budget)
            .filter(|b| *b > 0);
        Some(Signal::budget_exceeded(current, spent, budget))
    }

    /// The store's phase for `run_id` when it differs from `believed`.
    async fn moved_elsewhere(&self, run_id: &str, believed: &str) -> Option<String> {
        let actual = self.ctx.store.run_phase(run_id).await.ok()?;
        (!actual.is_empty() && actual != believed).then_some(actual)
    }

    /// Step to run after `phase`. With a bead in the environment the run's
    /// registered action for the phase wins over the static table.
    pub async fn next_step(&self, phase: &str) -> String {
        if let Some(bead) = self.ctx.config.bead_id() {
            if let Some(command) = self.registered_action(bead, phase).await {
                return action_to_step(&command).to_string();
            }
        }
        next_step(phase).to_string()
    }

    async fn registered_action(&self, sprint: &str, phase: &str) -> Option<String> {
        let run_id = self.ctx.resolve_run_id(sprint).await.ok()?;
        let actions = self.ctx.store.run_actions(&run_id, phase).await.ok()?;
        actions
            .into_iter()
            .next()
            .map(|a| a.command)
            .filter(|c| !c.is_empty())
    }

    /// A `gate_blocked` signal when the sprint should stop before `target`.
    /// `None` means continue.
    pub async fn should_pause(&self, sprint: &str, target: &str) -> Option<Signal> {
        let run_id = self.ctx.resolve_run_id(sprint).await.ok()?;
        let passed = match self.ctx.store.gate_check(&run_id).await {
            Ok(gate) => gate.passed(),
            Err(e) => {
                debug!(run_id = %run_id, error = %e, "gate check failed");
                false
            }
        };
        (!passed).then(|| Signal::gate_blocked(target))
    }

    /// Fail closed on a blocked gate, open on everything else.
    pub async fn enforce_gate(&self, sprint: &str, target: &str) -> GateDecision {
        if self.ctx.config.skip_gate() {
            return GateDecision::Skipped;
        }
        let Ok(run_id) = self.ctx.resolve_run_id(sprint).await else {
            return GateDecision::NoRun;
        };
        if !self.ctx.store.available().await {
            return GateDecision::Pass;
        }
        match self.ctx.store.gate_check(&run_id).await {
            Ok(gate) if gate.passed() => GateDecision::Pass,
            Ok(gate) => {
                for failure in gate.failures() {
                    debug!(check = %failure.check, detail = %failure.detail, "gate condition failed");
                }
                GateDecision::Blocked(target.to_string())
            }
            Err(e) => {
                debug!(run_id = %run_id, error = %e, "gate check failed");
                GateDecision::Blocked(target.to_string())
            }
        }
    }

    /// Phase completion. The store records transitions itself, so this only
    /// drops the cached discovery briefs.
    pub async fn record_phase(&self) {
        SprintManager::new(self.ctx).invalidate_caches().await;
    }

    /// Gate enforcement followed by `record_phase`.
    pub async fn advance_phase(&self, sprint: &str, target: &str) -> GateDecision {
        let decision = self.enforce_gate(sprint, target).await;
        if decision.allows() {
            self.record_phase().await;
        }
        decision
    }

    /// Attach an artifact to the run's current phase. Best effort.
    pub async fn set_artifact(&self, sprint: &str, kind: &str, path: &str) {
        let Ok(run_id) = self.ctx.resolve_run_id(sprint).await else {
            return;
        };
        let phase = self
            .ctx
            .store
            .run_phase(&run_id)
            .await
            .unwrap_or_else(|_| UNKNOWN_PHASE.to_string());
        if let Err(e) = self.ctx.store.artifact_add(&run_id, &phase, path, kind).await {
            warn!(run_id = %run_id, kind, path, error = %e, "could not record artifact");
        }
    }

    /// Path of the first artifact of `kind`. `Ok(None)` when there is none.
    pub async fn get_artifact(&self, sprint: &str, kind: &str) -> Result<Option<String>, SprintError> {
        let run_id = self.ctx.resolve_run_id(sprint).await?;
        let artifacts = self
            .ctx
            .store
            .artifact_list(&run_id)
            .await
            .map_err(|e| SprintError::Other(anyhow::anyhow!("get-artifact: {e}")))?;
        Ok(artifacts.into_iter().find(|a| a.kind == kind).map(|a| a.path))
    }
}
