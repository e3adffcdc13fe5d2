//! Sprint lifecycle: creation with rollback, the active-sprint listing, the
//! read-side state snapshot, and agent bookkeeping.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

use sprint_common::budget::default_budget;
use sprint_common::phase::default_actions;
use sprint_common::records::{ActiveSprint, SprintState};
use sprint_common::Phase;

use crate::context::{RUN_ID_KEY, SprintContext};
use crate::errors::SprintError;
use crate::store::RunCreate;

/// Run store state key of the cached discovery briefs.
pub const DISCOVERY_BRIEF_KEY: &str = "discovery_brief";
/// Upper bound on runs scanned by `find_active`.
pub const MAX_ACTIVE_RUNS: usize = 100;

const DEFAULT_TITLE: &str = "Sprint";
const DEFAULT_COMPLEXITY: i64 = 3;
const DEFAULT_AGENT_TYPE: &str = "claude";
const DEFAULT_AGENT_STATUS: &str = "completed";

static EPIC_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]+-[a-z0-9]+").unwrap());

/// Complexity within 1..=5, else the default.
pub fn normalize_complexity(complexity: Option<i64>) -> i64 {
    complexity
        .filter(|c| (1..=5).contains(c))
        .unwrap_or(DEFAULT_COMPLEXITY)
}

/// Title from the first line of a tracker rendering: the text between
/// `· ` and ` [`.
pub fn title_from_show(rendering: &str) -> Option<String> {
    let mut line = rendering.lines().next()?;
    if let Some(idx) = line.find("· ") {
        line = &line[idx + "· ".len()..];
    }
    if let Some(idx) = line.find(" [") {
        line = &line[..idx];
    }
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_string())
}

pub struct SprintManager<'a> {
    ctx: &'a SprintContext,
}

impl<'a> SprintManager<'a> {
    pub fn new(ctx: &'a SprintContext) -> Self {
        Self { ctx }
    }

    /// Create an epic and its run, bind them, and return the sprint
    /// identifier. Empty when the tracker is not available.
    pub async fn create(
        &self,
        title: &str,
        complexity: Option<i64>,
        lane: Option<&str>,
    ) -> Result<String, SprintError> {
        let title = if title.is_empty() { DEFAULT_TITLE } else { title };
        let complexity = normalize_complexity(complexity);

        if !self.ctx.store.available().await {
            return Err(SprintError::StoreRequired);
        }

        let sprint_id = if self.ctx.tracker.available().await {
            self.create_epic(title, lane).await?
        } else {
            String::new()
        };

        let scope_id = if sprint_id.is_empty() {
            format!("sprint-{}", self.ctx.clock.unix())
        } else {
            sprint_id.clone()
        };
        let token_budget = default_budget(complexity);
        let request = RunCreate {
            project_dir: self.ctx.config.project_dir.display().to_string(),
            goal: title.to_string(),
            complexity,
            phases: Phase::ALL.to_vec(),
            scope_id: scope_id.clone(),
            token_budget,
            actions: default_actions(),
        };

        let run_id = match self.ctx.store.run_create(&request).await {
            Ok(id) if !id.is_empty() => id,
            Ok(_) => {
                self.rollback(None, &sprint_id).await;
                return Err(SprintError::CreateFailed("ic run create returned empty ID".into()));
            }
            Err(e) => {
                self.rollback(None, &sprint_id).await;
                return Err(SprintError::CreateFailed(format!("ic run create failed: {e}")));
            }
        };
        debug!(run_id = %run_id, scope_id = %scope_id, complexity, token_budget, "run created");

        let phase = self.ctx.store.run_phase(&run_id).await.unwrap_or_default();
        if phase != Phase::Brainstorm.as_str() {
            self.rollback(Some(&run_id), &sprint_id).await;
            return Err(SprintError::CreateFailed(format!(
                "ic run verification failed (phase={phase})"
            )));
        }

        if !sprint_id.is_empty() {
            if let Err(e) = self.ctx.tracker.state_set(&sprint_id, RUN_ID_KEY, &run_id).await {
                self.rollback(Some(&run_id), &sprint_id).await;
                return Err(SprintError::CreateFailed(format!(
                    "failed to write ic_run_id to bead: {e}"
                )));
            }
            if let Err(e) = self
                .ctx
                .tracker
                .state_set(&sprint_id, "token_budget", &token_budget.to_string())
                .await
            {
                warn!(sprint = %sprint_id, error = %e, "could not record token budget on epic");
            }
        }

        self.ctx.runs.insert(&scope_id, &run_id);
        Ok(sprint_id)
    }

    async fn create_epic(&self, title: &str, lane: Option<&str>) -> Result<String, SprintError> {
        let output = self
            .ctx
            .tracker
            .create_epic(title)
            .await
            .map_err(|e| SprintError::CreateFailed(format!("bead creation failed: {e}")))?;
        let sprint_id = EPIC_ID_RE
            .find(&output)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                SprintError::CreateFailed("could not parse bead ID from bd output".into())
            })?;

        let tracker = &self.ctx.tracker;
        if let Err(e) = tracker.state_set(&sprint_id, "sprint", "true").await {
            warn!(sprint = %sprint_id, error = %e, "could not mark epic as sprint");
        }
        if let Err(e) = tracker.update_status(&sprint_id, "in_progress").await {
            warn!(sprint = %sprint_id, error = %e, "could not mark epic in progress");
        }
        if let Some(lane) = lane.filter(|l| !l.is_empty()) {
            if let Err(e) = tracker.label_add(&sprint_id, &format!("lane:{lane}")).await {
                warn!(sprint = %sprint_id, lane, error = %e, "could not label epic");
            }
        }
        Ok(sprint_id)
    }

    async fn rollback(&self, run_id: Option<&str>, sprint_id: &str) {
        if let Some(run_id) = run_id {
            if let Err(e) = self.ctx.store.run_cancel(run_id).await {
                warn!(run_id, error = %e, "rollback: could not cancel run");
            }
        }
        if !sprint_id.is_empty() {
            if let Err(e) = self.ctx.tracker.update_status(sprint_id, "cancelled").await {
                warn!(sprint = sprint_id, error = %e, "rollback: could not cancel epic");
            }
        }
    }

    /// Active runs bound to a sprint. Empty when the store cannot answer.
    pub async fn find_active(&self) -> Vec<ActiveSprint> {
        if !self.ctx.store.available().await {
            return Vec::new();
        }
        let runs = match self.ctx.store.run_list_active().await {
            Ok(runs) => runs,
            Err(e) => {
                debug!(error = %e, "active run listing unavailable");
                return Vec::new();
            }
        };

        let mut sprints = Vec::new();
        for run in runs.into_iter().take(MAX_ACTIVE_RUNS) {
            if run.scope_id.is_empty() {
                continue;
            }
            let title = if run.goal.is_empty() {
                self.tracker_title(&run.scope_id)
                    .await
                    .unwrap_or_else(|| "Untitled".to_string())
            } else {
                run.goal
            };
            sprints.push(ActiveSprint {
                id: run.scope_id,
                title,
                phase: run.phase,
                run_id: run.id,
            });
        }
        sprints
    }

    async fn tracker_title(&self, id: &str) -> Option<String> {
        let rendering = self.ctx.tracker.show(id).await.ok()?;
        title_from_show(&rendering)
    }

    /// Snapshot of a sprint assembled from the run store. `None` when the
    /// sprint has no readable run.
    pub async fn read_state(&self, sprint: &str) -> Option<SprintState> {
        let run_id = self.ctx.resolve_run_id(sprint).await.ok()?;
        let store = &self.ctx.store;
        let run = match store.run_status(&run_id).await {
            Ok(run) => run,
            Err(e) => {
                debug!(run_id = %run_id, error = %e, "run status unavailable");
                return None;
            }
        };

        let artifacts: BTreeMap<String, String> = store
            .artifact_list(&run_id)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|a| !a.kind.is_empty() && !a.path.is_empty())
            .map(|a| (a.kind, a.path))
            .collect();

        let history: BTreeMap<String, String> = store
            .run_events(&run_id)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|e| e.event_type == "advance" && !e.to_phase.is_empty())
            .map(|e| (format!("{}_at", e.to_phase), e.created_at))
            .collect();

        let active_session = store
            .agent_list(&run_id)
            .await
            .unwrap_or_default()
            .into_iter()
            .find(|a| a.is_active())
            .map(|a| a.name)
            .unwrap_or_default();

        let tokens_spent = store
            .run_tokens(&run_id)
            .await
            .map(|t| t.total())
            .unwrap_or(0);

        Some(SprintState {
            id: sprint.to_string(),
            phase: run.phase,
            artifacts,
            history,
            complexity: run.complexity.to_string(),
            auto_advance: run.auto_advance.to_string(),
            active_session,
            token_budget: run.token_budget,
            tokens_spent,
        })
    }

    /// Register a dispatched agent against the sprint's run. Returns the
    /// agent identifier when the store accepted it.
    pub async fn track_agent(
        &self,
        sprint: &str,
        name: &str,
        agent_type: Option<&str>,
        dispatch_id: Option<&str>,
    ) -> Option<String> {
        if sprint.is_empty() || name.is_empty() {
            return None;
        }
        let run_id = self.ctx.resolve_run_id(sprint).await.ok()?;
        let agent_type = agent_type
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_AGENT_TYPE);
        let dispatch_id = dispatch_id.filter(|d| !d.is_empty());
        match self
            .ctx
            .store
            .agent_add(&run_id, agent_type, name, dispatch_id)
            .await
        {
            Ok(agent_id) => Some(agent_id),
            Err(e) => {
                warn!(run_id = %run_id, name, error = %e, "could not track agent");
                None
            }
        }
    }

    pub async fn complete_agent(&self, agent_id: &str, status: Option<&str>) {
        if agent_id.is_empty() || !self.ctx.store.available().await {
            return;
        }
        let status = status.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_AGENT_STATUS);
        if let Err(e) = self.ctx.store.agent_update(agent_id, status).await {
            warn!(agent_id, status, error = %e, "could not update agent");
        }
    }

    /// Delete every cached discovery brief. Returns how many were removed.
    pub async fn invalidate_caches(&self) -> usize {
        if !self.ctx.store.available().await {
            return 0;
        }
        let scopes = match self.ctx.store.state_list(DISCOVERY_BRIEF_KEY).await {
            Ok(scopes) => scopes,
            Err(e) => {
                debug!(error = %e, "discovery brief listing unavailable");
                return 0;
            }
        };

        let mut removed = 0;
        for scope in scopes.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            match self.ctx.store.state_delete(DISCOVERY_BRIEF_KEY, scope).await {
                Ok(()) => removed += 1,
                Err(e) => debug!(scope, error = %e, "could not delete discovery brief"),
            }
        }
        removed
    }
}
