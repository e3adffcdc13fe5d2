//! Run store client backed by the `ic` command-line tool.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

use sprint_common::records::{
    AdvanceResult, Artifact, BudgetResult, GateResult, Run, RunAction, RunAgent, RunEvent, TokenAgg,
};

use super::exec::{Tool, args};
use super::{BudgetStatus, RunCreate, RunStore, StoreResult};
use crate::errors::StoreError;

pub struct IcStore {
    tool: Tool,
}

impl IcStore {
    /// Resolve `command` (or `ic`, then `intercore`) on `PATH`.
    pub fn new(command: Option<&str>, cwd: &Path) -> Self {
        let tool = match command {
            Some(cmd) => Tool::resolve("ic", &[cmd], cwd),
            None => Tool::resolve("ic", &["ic", "intercore"], cwd),
        };
        Self { tool }
    }

    async fn json<T: serde::de::DeserializeOwned>(&self, parts: &[&str]) -> StoreResult<T> {
        let mut full = vec!["--json".to_string()];
        full.extend(parts.iter().map(|p| p.to_string()));
        self.tool.run_json(&full).await
    }

    async fn text(&self, parts: &[&str]) -> StoreResult<String> {
        self.tool.run(&args(parts.iter().copied())).await
    }
}

fn actions_json(req: &RunCreate) -> StoreResult<String> {
    let map: BTreeMap<&str, _> = req
        .actions
        .iter()
        .map(|(phase, action)| (phase.as_str(), action))
        .collect();
    serde_json::to_string(&map).map_err(|e| StoreError::Other(e.into()))
}

#[async_trait]
impl RunStore for IcStore {
    async fn available(&self) -> bool {
        if !self.tool.is_installed() {
            return false;
        }
        matches!(self.tool.output(&args(["health"]), None).await, Ok(out) if out.success())
    }

    async fn run_create(&self, req: &RunCreate) -> StoreResult<String> {
        let phases: Vec<&str> = req.phases.iter().map(|p| p.as_str()).collect();
        let phases = serde_json::to_string(&phases).map_err(|e| StoreError::Other(e.into()))?;
        let argv = vec![
            "run".to_string(),
            "create".to_string(),
            format!("--project={}", req.project_dir),
            format!("--goal={}", req.goal),
            format!("--complexity={}", req.complexity),
            format!("--phases={phases}"),
            format!("--scope-id={}", req.scope_id),
            format!("--token-budget={}", req.token_budget),
            format!("--actions={}", actions_json(req)?),
        ];
        self.tool.run(&argv).await
    }

    async fn run_status(&self, run_id: &str) -> StoreResult<Run> {
        self.json(&["run", "status", run_id]).await
    }

    async fn run_status_for_scope(&self, scope_id: &str) -> StoreResult<Run> {
        self.json(&["run", "status", "--scope", scope_id]).await
    }

    async fn run_phase(&self, run_id: &str) -> StoreResult<String> {
        self.text(&["run", "phase", run_id]).await
    }

    async fn run_advance(&self, run_id: &str) -> StoreResult<AdvanceResult> {
        self.json(&["run", "advance", run_id, "--priority=0"]).await
    }

    async fn run_cancel(&self, run_id: &str) -> StoreResult<()> {
        self.text(&["run", "cancel", run_id]).await.map(|_| ())
    }

    async fn run_list_active(&self) -> StoreResult<Vec<Run>> {
        self.json(&["run", "list", "--active"]).await
    }

    async fn run_current(&self, project_dir: &Path) -> StoreResult<String> {
        let project = format!("--project={}", project_dir.display());
        let run_id = self.text(&["run", "current", project.as_str()]).await?;
        if run_id.is_empty() {
            return Err(StoreError::Other(anyhow::anyhow!(
                "no active run for {}",
                project_dir.display()
            )));
        }
        Ok(run_id)
    }

    async fn run_events(&self, run_id: &str) -> StoreResult<Vec<RunEvent>> {
        self.json(&["run", "events", run_id]).await
    }

    async fn run_actions(&self, run_id: &str, phase: &str) -> StoreResult<Vec<RunAction>> {
        let phase = format!("--phase={phase}");
        self.json(&["run", "action", "list", run_id, phase.as_str()]).await
    }

    async fn run_tokens(&self, run_id: &str) -> StoreResult<TokenAgg> {
        self.json(&["run", "tokens", run_id]).await
    }

    async fn run_budget(&self, run_id: &str) -> StoreResult<BudgetStatus> {
        let argv = args(["--json", "run", "budget", run_id]);
        let out = self.tool.output(&argv, None).await?;
        match out.code {
            0 => {
                let result: BudgetResult =
                    serde_json::from_str(&out.stdout).map_err(|source| StoreError::Parse {
                        command: format!("ic {}", argv.join(" ")),
                        source,
                    })?;
                if result.exceeded {
                    Ok(BudgetStatus::Exceeded)
                } else {
                    Ok(BudgetStatus::Within(result))
                }
            }
            // Exit 1 is the only "over budget" answer. Any other failure is the
            // tool breaking, which callers treat as unknown and let through.
            1 => Ok(BudgetStatus::Exceeded),
            code => Err(StoreError::CommandFailed {
                command: format!("ic {}", argv.join(" ")),
                code,
                stderr: out.stderr,
            }),
        }
    }

    async fn agent_add(
        &self,
        run_id: &str,
        agent_type: &str,
        name: &str,
        dispatch_id: Option<&str>,
    ) -> StoreResult<String> {
        let mut argv = args(["run", "agent", "add", run_id]);
        argv.push(format!("--type={agent_type}"));
        if !name.is_empty() {
            argv.push(format!("--name={name}"));
        }
        if let Some(id) = dispatch_id.filter(|d| !d.is_empty()) {
            argv.push(format!("--dispatch-id={id}"));
        }
        self.tool.run(&argv).await
    }

    async fn agent_list(&self, run_id: &str) -> StoreResult<Vec<RunAgent>> {
        self.json(&["run", "agent", "list", run_id]).await
    }

    async fn agent_update(&self, agent_id: &str, status: &str) -> StoreResult<()> {
        let status = format!("--status={status}");
        self.text(&["run", "agent", "update", agent_id, status.as_str()])
            .await
            .map(|_| ())
    }

    async fn artifact_add(&self, run_id: &str, phase: &str, path: &str, kind: &str) -> StoreResult<()> {
        let argv = vec![
            "run".to_string(),
            "artifact".to_string(),
            "add".to_string(),
            run_id.to_string(),
            format!("--phase={phase}"),
            format!("--path={path}"),
            format!("--type={kind}"),
        ];
        self.tool.run(&argv).await.map(|_| ())
    }

    async fn artifact_list(&self, run_id: &str) -> StoreResult<Vec<Artifact>> {
        self.json(&["run", "artifact", "list", run_id]).await
    }

    async fn gate_check(&self, run_id: &str) -> StoreResult<GateResult> {
        let out = self
            .tool
            .output(&args(["--json", "gate", "check", run_id]), None)
            .await?;
        let mut gate: GateResult = serde_json::from_str(&out.stdout).unwrap_or_default();
        gate.run_id = run_id.to_string();
        if out.success() {
            if gate.result.is_empty() {
                gate.result = "pass".to_string();
            }
        } else if gate.passed() || gate.result.is_empty() {
            gate.result = "fail".to_string();
        }
        Ok(gate)
    }

    async fn state_get(&self, key: &str, scope: &str) -> StoreResult<Option<String>> {
        let out = self.text(&["state", "get", key, scope]).await?;
        if out.is_empty() || out == "null" {
            Ok(None)
        } else {
            Ok(Some(out))
        }
    }

    async fn state_set(&self, key: &str, scope: &str, json: &str) -> StoreResult<()> {
        let payload = format!("{json}\n");
        self.tool
            .run_with_stdin(&args(["state", "set", key, scope]), Some(&payload))
            .await
            .map(|_| ())
    }

    async fn state_list(&self, key: &str) -> StoreResult<Vec<String>> {
        let out = self.text(&["state", "list", key]).await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn state_delete(&self, key: &str, scope: &str) -> StoreResult<()> {
        self.text(&["state", "delete", key, scope]).await.map(|_| ())
    }

    async fn lock_acquire(&self, name: &str, scope: &str, timeout_ms: u64) -> StoreResult<()> {
        let timeout = format!("--timeout={timeout_ms}ms");
        self.text(&["lock", "acquire", name, scope, timeout.as_str()])
            .await
            .map(|_| ())
    }

    async fn lock_release(&self, name: &str, scope: &str) -> StoreResult<()> {
        self.text(&["lock", "release", name, scope]).await.map(|_| ())
    }
}
