//! Recoverable progress snapshots, stored as the `checkpoint` state record of
//! a sprint's run.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, warn};

use sprint_common::Checkpoint;
use sprint_common::checkpoint::{CheckpointUpdate, short_sha};

use crate::context::SprintContext;
use crate::store::StoreResult;

/// Run store state key of the checkpoint record.
pub const CHECKPOINT_KEY: &str = "checkpoint";
/// Recorded when the code revision cannot be read.
pub const UNKNOWN_SHA: &str = "unknown";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub struct CheckpointStore<'a> {
    ctx: &'a SprintContext,
}

impl<'a> CheckpointStore<'a> {
    pub fn new(ctx: &'a SprintContext) -> Self {
        Self { ctx }
    }

    fn current_sha(&self) -> String {
        self.ctx
            .revisions
            .head_sha()
            .unwrap_or_else(|| UNKNOWN_SHA.to_string())
    }

    /// Merge one completed step into the sprint's checkpoint. Returns the
    /// merged checkpoint, or `None` when the sprint has no run.
    pub async fn write(
        &self,
        sprint: &str,
        phase: &str,
        step: &str,
        plan_path: Option<&str>,
        key_decision: Option<&str>,
    ) -> Result<Option<Checkpoint>> {
        let update = CheckpointUpdate {
            bead: sprint.to_string(),
            phase: phase.to_string(),
            step: step.to_string(),
            plan_path: plan_path.map(str::to_string),
            git_sha: self.current_sha(),
            updated_at: self.ctx.clock.now().format(TIMESTAMP_FORMAT).to_string(),
            key_decision: key_decision.map(str::to_string),
        };

        let Ok(run_id) = self.ctx.resolve_run_id(sprint).await else {
            debug!(sprint, "no run; checkpoint not written");
            return Ok(None);
        };

        let mut checkpoint = self
            .load(&run_id)
            .await
            .context("Failed to read checkpoint")?;
        checkpoint.apply(&update);
        let json = serde_json::to_string(&checkpoint).context("Failed to encode checkpoint")?;
        self.ctx
            .store
            .state_set(CHECKPOINT_KEY, &run_id, &json)
            .await
            .context("Failed to store checkpoint")?;
        Ok(Some(checkpoint))
    }

    /// The checkpoint stored for `run_id`. Errors only when the store could
    /// not be reached; a store that answers with a failure has none yet.
    pub async fn load(&self, run_id: &str) -> StoreResult<Checkpoint> {
        match self.ctx.store.state_get(CHECKPOINT_KEY, run_id).await {
            Ok(Some(raw)) => Ok(Checkpoint::from_json(&raw)),
            Ok(None) => Ok(Checkpoint::default()),
            Err(e) if e.is_unreachable() => Err(e),
            Err(e) => {
                debug!(run_id, error = %e, "no checkpoint stored");
                Ok(Checkpoint::default())
            }
        }
    }

    /// The checkpoint stored for `run_id`, or an empty one.
    pub async fn read(&self, run_id: &str) -> Checkpoint {
        self.load(run_id).await.unwrap_or_else(|e| {
            debug!(run_id, error = %e, "checkpoint unavailable");
            Checkpoint::default()
        })
    }

    /// The non-empty checkpoint for `sprint`, or for the project's current
    /// run when no sprint is given.
    pub async fn find(&self, sprint: Option<&str>) -> Option<Checkpoint> {
        if !self.ctx.store.available().await {
            return None;
        }
        let run_id = self.ctx.resolve_or_current(sprint).await?;
        let checkpoint = self.read(&run_id).await;
        (!checkpoint.is_empty()).then_some(checkpoint)
    }

    /// A drift warning when the code moved since the checkpoint was written.
    /// Never an error.
    pub async fn validate(&self, sprint: Option<&str>) -> Option<String> {
        let checkpoint = self.find(sprint).await?;
        let saved = checkpoint.git_sha.as_str();
        if saved.is_empty() || saved == UNKNOWN_SHA {
            return None;
        }
        let current = self.current_sha();
        (saved != current).then(|| {
            format!(
                "Code changed since checkpoint (was {}, now {})",
                short_sha(saved),
                short_sha(&current)
            )
        })
    }

    pub async fn completed_steps(&self, sprint: Option<&str>) -> Vec<String> {
        self.find(sprint)
            .await
            .map(|c| c.completed_steps)
            .unwrap_or_default()
    }

    pub async fn is_step_done(&self, step: &str, sprint: Option<&str>) -> bool {
        self.find(sprint).await.is_some_and(|c| c.has_step(step))
    }
}

/// Remove the legacy file-based checkpoint. Returns whether a file was removed.
pub fn clear_legacy(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "could not remove legacy checkpoint");
            }
            false
        }
    }
}
