//! Token budget queries against a sprint's run.
//!
//! Every read fails open: an unresolvable sprint, an unavailable store, or a
//! malformed record all read as zero.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use sprint_common::budget::{StageBudget, StageBudgets, remaining};
use sprint_common::phase::cost_estimate;
use sprint_common::records::{PhaseTokens, TokenAgg};
use sprint_common::{Signal, Stage};

use crate::context::SprintContext;
use crate::sprint_config::SprintConfig;
use crate::store::{BudgetStatus, StoreResult};

/// Run store state key of the per-phase token ledger.
pub const PHASE_TOKENS_KEY: &str = "phase_tokens";

#[derive(Debug, Default, Deserialize)]
struct AgencySpec {
    #[serde(default)]
    stages: BTreeMap<String, StageSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct StageSpec {
    #[serde(default)]
    budget: Option<BudgetSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct BudgetSpec {
    #[serde(default)]
    share: i64,
    #[serde(default)]
    min_tokens: i64,
}

/// Parse the `stages.<stage>.budget` entries of an agency spec. Stages that
/// are not budgeted are ignored.
pub fn parse_agency_spec(content: &str) -> Result<StageBudgets> {
    let spec: AgencySpec = serde_yaml::from_str(content).context("Failed to parse agency spec")?;
    let mut budgets = StageBudgets::new();
    for (name, stage_spec) in spec.stages {
        let stage = Stage::parse(&name);
        if !Stage::BUDGETED.contains(&stage) {
            debug!(stage = %name, "ignoring unbudgeted stage");
            continue;
        }
        if let Some(budget) = stage_spec.budget {
            budgets.insert(stage, StageBudget::new(budget.share, budget.min_tokens));
        }
    }
    Ok(budgets)
}

pub fn load_agency_spec(path: &Path) -> Result<StageBudgets> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_agency_spec(&content)
}

/// Stage budgets from the first agency spec found. Missing or unreadable
/// specs mean no partitioning.
pub fn stage_budgets(config: &SprintConfig) -> StageBudgets {
    let Some(path) = config
        .agency_spec_candidates()
        .into_iter()
        .find(|p| p.is_file())
    else {
        return StageBudgets::new();
    };
    match load_agency_spec(&path) {
        Ok(budgets) => budgets,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring agency spec");
            StageBudgets::new()
        }
    }
}

/// Outcome of a stage budget check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageCheck {
    Within { remaining: u64 },
    /// The total is unknown, so there is nothing to enforce.
    Unbounded,
    Exceeded(Signal),
}

pub struct BudgetService<'a> {
    ctx: &'a SprintContext,
    stages: StageBudgets,
}

impl<'a> BudgetService<'a> {
    pub fn new(ctx: &'a SprintContext) -> Self {
        Self::with_stages(ctx, stage_budgets(&ctx.config))
    }

    pub fn with_stages(ctx: &'a SprintContext, stages: StageBudgets) -> Self {
        Self { ctx, stages }
    }

    /// The sprint's total token budget.
    pub async fn total(&self, sprint: &str) -> u64 {
        let Ok(run_id) = self.ctx.resolve_run_id(sprint).await else {
            return 0;
        };
        match self.ctx.store.run_status(&run_id).await {
            Ok(run) => run.token_budget,
            Err(e) => {
                debug!(run_id = %run_id, error = %e, "run status unavailable");
                0
            }
        }
    }

    /// Run-level tokens left, as reported by the store.
    pub async fn remaining(&self, sprint: &str) -> u64 {
        let Ok(run_id) = self.ctx.resolve_run_id(sprint).await else {
            return 0;
        };
        match self.ctx.store.run_budget(&run_id).await {
            Ok(BudgetStatus::Within(result)) if result.token_budget > 0 => {
                remaining(result.token_budget, result.tokens_used)
            }
            Ok(_) => 0,
            Err(e) => {
                debug!(run_id = %run_id, error = %e, "run budget unavailable");
                0
            }
        }
    }

    pub async fn stage_allocated(&self, sprint: &str, stage: Stage) -> u64 {
        let total = self.total(sprint).await;
        self.stages.allocated(total, stage)
    }

    /// The phase ledger of `run_id`. A store that answers with a failure has
    /// no ledger yet; an unreachable store is an error, so nothing gets
    /// written back over a ledger that could not be read.
    async fn load_phase_tokens(&self, run_id: &str) -> StoreResult<PhaseTokens> {
        match self.ctx.store.state_get(PHASE_TOKENS_KEY, run_id).await {
            Ok(Some(raw)) => Ok(PhaseTokens::from_json(&raw)),
            Ok(None) => Ok(PhaseTokens::default()),
            Err(e) if e.is_unreachable() => Err(e),
            Err(e) => {
                debug!(run_id, error = %e, "no phase tokens recorded");
                Ok(PhaseTokens::default())
            }
        }
    }

    async fn phase_tokens(&self, run_id: &str) -> PhaseTokens {
        self.load_phase_tokens(run_id).await.unwrap_or_else(|e| {
            debug!(run_id, error = %e, "phase tokens unavailable");
            PhaseTokens::default()
        })
    }

    /// Tokens recorded against every phase of `stage`.
    pub async fn stage_spent(&self, sprint: &str, stage: Stage) -> u64 {
        let Ok(run_id) = self.ctx.resolve_run_id(sprint).await else {
            return 0;
        };
        self.phase_tokens(&run_id).await.stage_total(stage)
    }

    pub async fn stage_remaining(&self, sprint: &str, stage: Stage) -> u64 {
        let allocated = self.stage_allocated(sprint, stage).await;
        let spent = self.stage_spent(sprint, stage).await;
        remaining(allocated, spent)
    }

    pub async fn check_stage(&self, sprint: &str, stage: Stage) -> StageCheck {
        if self.total(sprint).await == 0 {
            return StageCheck::Unbounded;
        }
        match self.stage_remaining(sprint, stage).await {
            0 => StageCheck::Exceeded(Signal::stage_depleted(stage.as_str())),
            remaining => StageCheck::Within { remaining },
        }
    }

    /// Add `tokens` (or the phase's cost estimate) to the phase ledger,
    /// split 60/40 between input and output. Returns the recorded usage, or
    /// `None` when the sprint has no run.
    pub async fn record_phase_tokens(
        &self,
        sprint: &str,
        phase: &str,
        tokens: Option<u64>,
    ) -> Result<Option<TokenAgg>> {
        if sprint.is_empty() || phase.is_empty() {
            return Ok(None);
        }
        let Ok(run_id) = self.ctx.resolve_run_id(sprint).await else {
            return Ok(None);
        };

        let total = tokens
            .filter(|t| *t > 0)
            .unwrap_or_else(|| cost_estimate(phase));
        let usage = TokenAgg::split(total);

        let mut ledger = self
            .load_phase_tokens(&run_id)
            .await
            .context("Failed to read phase tokens")?;
        ledger.record(phase, usage);
        let json = serde_json::to_string(&ledger).context("Failed to encode phase tokens")?;
        self.ctx
            .store
            .state_set(PHASE_TOKENS_KEY, &run_id, &json)
            .await
            .context("Failed to store phase tokens")?;
        debug!(run_id = %run_id, phase, total, "recorded phase tokens");
        Ok(Some(usage))
    }
}
