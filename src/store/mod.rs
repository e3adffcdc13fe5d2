//! Collaborator seams: the run store and the issue tracker.
//!
//! Both are external command-line tools. The traits here are the only way the
//! rest of the crate talks to them, so the orchestration logic can run against
//! the in-memory doubles in tests.

pub mod bd;
pub mod exec;
pub mod ic;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use std::path::Path;

use sprint_common::phase::PhaseAction;
use sprint_common::records::{
    AdvanceResult, Artifact, BudgetResult, GateResult, Run, RunAction, RunAgent, RunEvent, TokenAgg,
};
use sprint_common::Phase;

use crate::errors::StoreError;

pub use bd::BdTracker;
pub use ic::IcStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Parameters for creating a run.
#[derive(Debug, Clone)]
pub struct RunCreate {
    pub project_dir: String,
    pub goal: String,
    pub complexity: i64,
    pub phases: Vec<Phase>,
    pub scope_id: String,
    pub token_budget: u64,
    pub actions: Vec<(Phase, PhaseAction)>,
}

/// Outcome of a run-level budget query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetStatus {
    Within(BudgetResult),
    Exceeded,
}

/// The durable run/phase/token ledger.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Installed and healthy.
    async fn available(&self) -> bool;

    async fn run_create(&self, req: &RunCreate) -> StoreResult<String>;
    async fn run_status(&self, run_id: &str) -> StoreResult<Run>;
    /// Run bound to a scope (sprint) identifier.
    async fn run_status_for_scope(&self, scope_id: &str) -> StoreResult<Run>;
    async fn run_phase(&self, run_id: &str) -> StoreResult<String>;
    async fn run_advance(&self, run_id: &str) -> StoreResult<AdvanceResult>;
    async fn run_cancel(&self, run_id: &str) -> StoreResult<()>;
    async fn run_list_active(&self) -> StoreResult<Vec<Run>>;
    /// Active run for a project directory.
    async fn run_current(&self, project_dir: &Path) -> StoreResult<String>;
    async fn run_events(&self, run_id: &str) -> StoreResult<Vec<RunEvent>>;
    async fn run_actions(&self, run_id: &str, phase: &str) -> StoreResult<Vec<RunAction>>;
    async fn run_tokens(&self, run_id: &str) -> StoreResult<TokenAgg>;
    async fn run_budget(&self, run_id: &str) -> StoreResult<BudgetStatus>;

    async fn agent_add(
        &self,
        run_id: &str,
        agent_type: &str,
        name: &str,
        dispatch_id: Option<&str>,
    ) -> StoreResult<String>;
    async fn agent_list(&self, run_id: &str) -> StoreResult<Vec<RunAgent>>;
    async fn agent_update(&self, agent_id: &str, status: &str) -> StoreResult<()>;

    async fn artifact_add(&self, run_id: &str, phase: &str, path: &str, kind: &str) -> StoreResult<()>;
    async fn artifact_list(&self, run_id: &str) -> StoreResult<Vec<Artifact>>;

    /// A blocked gate is an `Ok` result that did not pass, not an error.
    async fn gate_check(&self, run_id: &str) -> StoreResult<GateResult>;

    async fn state_get(&self, key: &str, scope: &str) -> StoreResult<Option<String>>;
    async fn state_set(&self, key: &str, scope: &str, json: &str) -> StoreResult<()>;
    async fn state_list(&self, key: &str) -> StoreResult<Vec<String>>;
    async fn state_delete(&self, key: &str, scope: &str) -> StoreResult<()>;

    async fn lock_acquire(&self, name: &str, scope: &str, timeout_ms: u64) -> StoreResult<()>;
    async fn lock_release(&self, name: &str, scope: &str) -> StoreResult<()>;
}

/// The issue tracker holding sprint epics and their key-value state.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn available(&self) -> bool;

    /// Create an epic and return the tracker's raw confirmation text.
    async fn create_epic(&self, title: &str) -> StoreResult<String>;
    /// Human-oriented rendering of an issue.
    async fn show(&self, id: &str) -> StoreResult<String>;
    async fn close(&self, id: &str, reason: &str) -> StoreResult<()>;
    async fn update_status(&self, id: &str, status: &str) -> StoreResult<()>;
    async fn label_add(&self, id: &str, label: &str) -> StoreResult<()>;

    /// `None` when the key is unset.
    async fn state_get(&self, id: &str, key: &str) -> StoreResult<Option<String>>;
    /// An empty value clears the key.
    async fn state_set(&self, id: &str, key: &str, value: &str) -> StoreResult<()>;
}
