//! In-memory run store and issue tracker for tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sprint_common::records::{
    AdvanceResult, Artifact, BudgetResult, GateResult, Run, RunAction, RunAgent, RunEvent, TokenAgg,
};
use sprint_common::Phase;

use super::{BudgetStatus, IssueTracker, RunCreate, RunStore, StoreResult};
use crate::context::Clock;
use crate::errors::StoreError;

fn failed(command: &str) -> StoreError {
    StoreError::CommandFailed {
        command: command.to_string(),
        code: 1,
        stderr: String::new(),
    }
}

#[derive(Default)]
struct StoreState {
    next_id: u64,
    runs: BTreeMap<String, Run>,
    current: Option<String>,
    agents: Vec<RunAgent>,
    artifacts: Vec<Artifact>,
    events: BTreeMap<String, Vec<RunEvent>>,
    actions: BTreeMap<String, Vec<RunAction>>,
    tokens: BTreeMap<String, TokenAgg>,
    state: BTreeMap<(String, String), String>,
    locks: BTreeSet<(String, String)>,
    /// Phase reported by the store once an advance fails, simulating a
    /// concurrent session that moved the run first.
    advanced_elsewhere: Option<String>,
    refusal: Option<String>,
}

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<StoreState>,
    unavailable: AtomicBool,
    gate_blocked: AtomicBool,
    fail_advance: AtomicBool,
    fail_create: AtomicBool,
    lock_unavailable: AtomicBool,
    fail_state_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(StoreState::default()),
            unavailable: AtomicBool::new(false),
            gate_blocked: AtomicBool::new(false),
            fail_advance: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            lock_unavailable: AtomicBool::new(false),
            fail_state_reads: AtomicBool::new(false),
        }
    }

    fn next_id(state: &mut StoreState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}{}", state.next_id)
    }

    /// Insert a run at `brainstorm` bound to `scope_id`.
    pub fn seed_run(&self, scope_id: &str, complexity: i64, token_budget: u64) -> String {
        let mut state = self.inner.lock().unwrap();
        let id = Self::next_id(&mut state, "run-");
        state.runs.insert(
            id.clone(),
            Run {
                id: id.clone(),
                goal: String::new(),
                phase: Phase::Brainstorm.as_str().to_string(),
                status: "active".to_string(),
                scope_id: scope_id.to_string(),
                complexity,
                auto_advance: true,
                token_budget,
                phases: Phase::ALL.iter().map(|p| p.as_str().to_string()).collect(),
                ..Run::default()
            },
        );
        id
    }

    pub fn run(&self, run_id: &str) -> Option<Run> {
        self.inner.lock().unwrap().runs.get(run_id).cloned()
    }

    pub fn set_phase(&self, run_id: &str, phase: &str) {
        if let Some(run) = self.inner.lock().unwrap().runs.get_mut(run_id) {
            run.phase = phase.to_string();
        }
    }

    pub fn set_goal(&self, run_id: &str, goal: &str) {
        if let Some(run) = self.inner.lock().unwrap().runs.get_mut(run_id) {
            run.goal = goal.to_string();
        }
    }

    pub fn set_current(&self, run_id: &str) {
        self.inner.lock().unwrap().current = Some(run_id.to_string());
    }

    pub fn add_tokens(&self, run_id: &str, usage: TokenAgg) {
        let mut state = self.inner.lock().unwrap();
        state.tokens.entry(run_id.to_string()).or_default().add(usage);
    }

    pub fn add_action(&self, run_id: &str, action: RunAction) {
        let mut state = self.inner.lock().unwrap();
        state.actions.entry(run_id.to_string()).or_default().push(action);
    }

    pub fn agents(&self) -> Vec<RunAgent> {
        self.inner.lock().unwrap().agents.clone()
    }

    pub fn state_value(&self, key: &str, scope: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .state
            .get(&(key.to_string(), scope.to_string()))
            .cloned()
    }

    pub fn put_state(&self, key: &str, scope: &str, value: &str) {
        self.inner
            .lock()
            .unwrap()
            .state
            .insert((key.to_string(), scope.to_string()), value.to_string());
    }

    pub fn is_locked(&self, name: &str, scope: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .locks
            .contains(&(name.to_string(), scope.to_string()))
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn set_gate_blocked(&self, blocked: bool) {
        self.gate_blocked.store(blocked, Ordering::SeqCst);
    }

    /// Make the next advance fail, leaving the run at `actual` as if another
    /// session had advanced it.
    pub fn fail_advance(&self, actual: Option<&str>) {
        self.fail_advance.store(true, Ordering::SeqCst);
        self.inner.lock().unwrap().advanced_elsewhere = actual.map(str::to_string);
    }

    /// Refuse advances with the given event type (`block`, `pause`, ...).
    pub fn refuse_advance(&self, event_type: &str) {
        self.inner.lock().unwrap().refusal = Some(event_type.to_string());
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn set_lock_unavailable(&self, unavailable: bool) {
        self.lock_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `state get` fail to spawn while writes keep working.
    pub fn fail_state_reads(&self, failing: bool) {
        self.fail_state_reads.store(failing, Ordering::SeqCst);
    }

    fn check(&self, command: &str) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable {
                tool: format!("ic ({command})"),
            })
        } else {
            Ok(())
        }
    }

    fn with_run<T>(&self, run_id: &str, f: impl FnOnce(&mut Run) -> T) -> StoreResult<T> {
        let mut state = self.inner.lock().unwrap();
        state
            .runs
            .get_mut(run_id)
            .map(f)
            .ok_or_else(|| failed(&format!("run {run_id}")))
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    async fn run_create(&self, req: &RunCreate) -> StoreResult<String> {
        self.check("run create")?;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(failed("run create"));
        }
        let mut state = self.inner.lock().unwrap();
        let id = Self::next_id(&mut state, "run-");
        let phases: Vec<String> = req.phases.iter().map(|p| p.as_str().to_string()).collect();
        let actions = req
            .actions
            .iter()
            .map(|(phase, action)| RunAction {
                command: action.command.clone(),
                phase: phase.as_str().to_string(),
                mode: action.mode.clone(),
                priority: 0,
                args: action.args.clone().unwrap_or_default(),
            })
            .collect();
        state.runs.insert(
            id.clone(),
            Run {
                id: id.clone(),
                goal: req.goal.clone(),
                phase: phases.first().cloned().unwrap_or_default(),
                status: "active".to_string(),
                project_dir: req.project_dir.clone(),
                scope_id: req.scope_id.clone(),
                complexity: req.complexity,
                auto_advance: true,
                token_budget: req.token_budget,
                phases,
                ..Run::default()
            },
        );
        state.actions.insert(id.clone(), actions);
        Ok(id)
    }

    async fn run_status(&self, run_id: &str) -> StoreResult<Run> {
        self.check("run status")?;
        self.with_run(run_id, |run| run.clone())
    }

    async fn run_status_for_scope(&self, scope_id: &str) -> StoreResult<Run> {
        self.check("run status --scope")?;
        let state = self.inner.lock().unwrap();
        state
            .runs
            .values()
            .find(|run| run.scope_id == scope_id)
            .cloned()
            .ok_or_else(|| failed("run status --scope"))
    }

    async fn run_phase(&self, run_id: &str) -> StoreResult<String> {
        self.check("run phase")?;
        self.with_run(run_id, |run| run.phase.clone())
    }

    async fn run_advance(&self, run_id: &str) -> StoreResult<AdvanceResult> {
        self.check("run advance")?;
        if self.fail_advance.swap(false, Ordering::SeqCst) {
            let elsewhere = self.inner.lock().unwrap().advanced_elsewhere.take();
            if let Some(phase) = elsewhere {
                self.set_phase(run_id, &phase);
            }
            return Err(failed("run advance"));
        }

        let refusal = self.inner.lock().unwrap().refusal.clone();
        let gate_blocked = self.gate_blocked.load(Ordering::SeqCst);
        let now = self.clock.now().to_rfc3339();
        let result = self.with_run(run_id, |run| {
            let from = run.phase.clone();
            let to = run
                .phases
                .iter()
                .position(|p| *p == from)
                .and_then(|i| run.phases.get(i + 1))
                .cloned()
                .unwrap_or_else(|| from.clone());

            let refusal = refusal.or_else(|| gate_blocked.then(|| "block".to_string()));
            if let Some(event_type) = refusal {
                return AdvanceResult {
                    advanced: false,
                    from_phase: from,
                    to_phase: to,
                    gate_result: "fail".to_string(),
                    event_type,
                    ..AdvanceResult::default()
                };
            }
            run.phase = to.clone();
            AdvanceResult {
                advanced: true,
                from_phase: from,
                to_phase: to,
                gate_result: "pass".to_string(),
                event_type: "advance".to_string(),
                ..AdvanceResult::default()
            }
        })?;

        if result.advanced {
            let mut state = self.inner.lock().unwrap();
            state
                .events
                .entry(run_id.to_string())
                .or_default()
                .push(RunEvent {
                    event_type: "advance".to_string(),
                    to_phase: result.to_phase.clone(),
                    created_at: now,
                });
        }
        Ok(result)
    }

    async fn run_cancel(&self, run_id: &str) -> StoreResult<()> {
        self.check("run cancel")?;
        self.with_run(run_id, |run| run.status = "cancelled".to_string())
    }

    async fn run_list_active(&self) -> StoreResult<Vec<Run>> {
        self.check("run list")?;
        let state = self.inner.lock().unwrap();
        Ok(state
            .runs
            .values()
            .filter(|run| run.status == "active")
            .cloned()
            .collect())
    }

    async fn run_current(&self, _project_dir: &Path) -> StoreResult<String> {
        self.check("run current")?;
        self.inner
            .lock()
            .unwrap()
            .current
            .clone()
            .ok_or_else(|| failed("run current"))
    }

    async fn run_events(&self, run_id: &str) -> StoreResult<Vec<RunEvent>> {
        self.check("run events")?;
        let state = self.inner.lock().unwrap();
        Ok(state.events.get(run_id).cloned().unwrap_or_default())
    }

    async fn run_actions(&self, run_id: &str, phase: &str) -> StoreResult<Vec<RunAction>> {
        self.check("run action list")?;
        let state = self.inner.lock().unwrap();
        Ok(state
            .actions
            .get(run_id)
            .map(|actions| actions.iter().filter(|a| a.phase == phase).cloned().collect())
            .unwrap_or_default())
    }

    async fn run_tokens(&self, run_id: &str) -> StoreResult<TokenAgg> {
        self.check("run tokens")?;
        let state = self.inner.lock().unwrap();
        Ok(state.tokens.get(run_id).copied().unwrap_or_default())
    }

    async fn run_budget(&self, run_id: &str) -> StoreResult<BudgetStatus> {
        self.check("run budget")?;
        let state = self.inner.lock().unwrap();
        let run = state.runs.get(run_id).ok_or_else(|| failed("run budget"))?;
        let used = state.tokens.get(run_id).map(TokenAgg::total).unwrap_or(0);
        if run.token_budget > 0 && used > run.token_budget {
            Ok(BudgetStatus::Exceeded)
        } else {
            Ok(BudgetStatus::Within(BudgetResult {
                run_id: run_id.to_string(),
                token_budget: run.token_budget,
                tokens_used: used,
                exceeded: false,
            }))
        }
    }

    async fn agent_add(
        &self,
        run_id: &str,
        agent_type: &str,
        name: &str,
        _dispatch_id: Option<&str>,
    ) -> StoreResult<String> {
        self.check("run agent add")?;
        let created_at = self.clock.now().to_rfc3339();
        let mut state = self.inner.lock().unwrap();
        if !state.runs.contains_key(run_id) {
            return Err(failed("run agent add"));
        }
        let id = Self::next_id(&mut state, "agent-");
        state.agents.push(RunAgent {
            id: id.clone(),
            run_id: run_id.to_string(),
            agent_type: agent_type.to_string(),
            name: name.to_string(),
            status: "active".to_string(),
            created_at,
        });
        Ok(id)
    }

    async fn agent_list(&self, run_id: &str) -> StoreResult<Vec<RunAgent>> {
        self.check("run agent list")?;
        let state = self.inner.lock().unwrap();
        Ok(state
            .agents
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn agent_update(&self, agent_id: &str, status: &str) -> StoreResult<()> {
        self.check("run agent update")?;
        let mut state = self.inner.lock().unwrap();
        let agent = state
            .agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| failed("run agent update"))?;
        agent.status = status.to_string();
        Ok(())
    }

    async fn artifact_add(&self, run_id: &str, phase: &str, path: &str, kind: &str) -> StoreResult<()> {
        self.check("run artifact add")?;
        let mut state = self.inner.lock().unwrap();
        let id = Self::next_id(&mut state, "artifact-");
        state.artifacts.push(Artifact {
            id,
            run_id: run_id.to_string(),
            phase: phase.to_string(),
            path: path.to_string(),
            kind: kind.to_string(),
        });
        Ok(())
    }

    async fn artifact_list(&self, run_id: &str) -> StoreResult<Vec<Artifact>> {
        self.check("run artifact list")?;
        let state = self.inner.lock().unwrap();
        Ok(state
            .artifacts
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn gate_check(&self, run_id: &str) -> StoreResult<GateResult> {
        self.check("gate check")?;
        let blocked = self.gate_blocked.load(Ordering::SeqCst);
        Ok(GateResult {
            run_id: run_id.to_string(),
            result: if blocked { "fail" } else { "pass" }.to_string(),
            ..GateResult::default()
        })
    }

    async fn state_get(&self, key: &str, scope: &str) -> StoreResult<Option<String>> {
        self.check("state get")?;
        if self.fail_state_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Spawn {
                tool: "ic".to_string(),
                source: std::io::Error::other("state get interrupted"),
            });
        }
        Ok(self.state_value(key, scope))
    }

    async fn state_set(&self, key: &str, scope: &str, json: &str) -> StoreResult<()> {
        self.check("state set")?;
        self.put_state(key, scope, json);
        Ok(())
    }

    async fn state_list(&self, key: &str) -> StoreResult<Vec<String>> {
        self.check("state list")?;
        let state = self.inner.lock().unwrap();
        Ok(state
            .state
            .keys()
            .filter(|(k, _)| k == key)
            .map(|(_, scope)| scope.clone())
            .collect())
    }

    async fn state_delete(&self, key: &str, scope: &str) -> StoreResult<()> {
        self.check("state delete")?;
        self.inner
            .lock()
            .unwrap()
            .state
            .remove(&(key.to_string(), scope.to_string()));
        Ok(())
    }

    async fn lock_acquire(&self, name: &str, scope: &str, _timeout_ms: u64) -> StoreResult<()> {
        self.check("lock acquire")?;
        if self.lock_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                tool: "ic (lock acquire)".to_string(),
            });
        }
        let mut state = self.inner.lock().unwrap();
        if state.locks.insert((name.to_string(), scope.to_string())) {
            Ok(())
        } else {
            Err(failed("lock acquire"))
        }
    }

    async fn lock_release(&self, name: &str, scope: &str) -> StoreResult<()> {
        self.check("lock release")?;
        self.inner
            .lock()
            .unwrap()
            .locks
            .remove(&(name.to_string(), scope.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct TrackerState {
    issues: BTreeMap<String, String>,
    state: BTreeMap<(String, String), String>,
    statuses: BTreeMap<String, String>,
    labels: BTreeMap<String, Vec<String>>,
    closed: Vec<(String, String)>,
    next_id: u64,
}

#[derive(Default)]
pub struct MemoryTracker {
    inner: Mutex<TrackerState>,
    unavailable: AtomicBool,
}

impl MemoryTracker {
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Store the text `show` renders for `id`.
    pub fn set_show(&self, id: &str, rendering: &str) {
        self.inner
            .lock()
            .unwrap()
            .issues
            .insert(id.to_string(), rendering.to_string());
    }

    pub fn set(&self, id: &str, key: &str, value: &str) {
        self.inner
            .lock()
            .unwrap()
            .state
            .insert((id.to_string(), key.to_string()), value.to_string());
    }

    pub fn get(&self, id: &str, key: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .state
            .get(&(id.to_string(), key.to_string()))
            .cloned()
    }

    pub fn status(&self, id: &str) -> Option<String> {
        self.inner.lock().unwrap().statuses.get(id).cloned()
    }

    pub fn labels(&self, id: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .labels
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// `(id, reason)` of every close, in order.
    pub fn closed(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().closed.clone()
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable {
                tool: "bd".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IssueTracker for MemoryTracker {
    async fn available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    async fn create_epic(&self, title: &str) -> StoreResult<String> {
        self.check()?;
        let mut state = self.inner.lock().unwrap();
        state.next_id += 1;
        let id = format!("iv-e{}", state.next_id);
        state
            .issues
            .insert(id.clone(), format!("○ {id} · {title} [● P2 · OPEN]"));
        Ok(format!("✓ Created issue: {id}"))
    }

    async fn show(&self, id: &str) -> StoreResult<String> {
        self.check()?;
        self.inner
            .lock()
            .unwrap()
            .issues
            .get(id)
            .cloned()
            .ok_or_else(|| failed(&format!("bd show {id}")))
    }

    async fn close(&self, id: &str, reason: &str) -> StoreResult<()> {
        self.check()?;
        let mut state = self.inner.lock().unwrap();
        state.closed.push((id.to_string(), reason.to_string()));
        state.statuses.insert(id.to_string(), "closed".to_string());
        Ok(())
    }

    async fn update_status(&self, id: &str, status: &str) -> StoreResult<()> {
        self.check()?;
        self.inner
            .lock()
            .unwrap()
            .statuses
            .insert(id.to_string(), status.to_string());
        Ok(())
    }

    async fn label_add(&self, id: &str, label: &str) -> StoreResult<()> {
        self.check()?;
        self.inner
            .lock()
            .unwrap()
            .labels
            .entry(id.to_string())
            .or_default()
            .push(label.to_string());
        Ok(())
    }

    async fn state_get(&self, id: &str, key: &str) -> StoreResult<Option<String>> {
        self.check()?;
        Ok(self.get(id, key).filter(|v| !v.is_empty()))
    }

    async fn state_set(&self, id: &str, key: &str, value: &str) -> StoreResult<()> {
        self.check()?;
        self.set(id, key, value);
        Ok(())
    }
}
