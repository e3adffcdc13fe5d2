//! Two-layer ownership of a sprint.
//!
//! Layer A is an active `session` agent on the sprint's run, registered under
//! a short-held lock so that "list, decide, register" is atomic. Layer B is a
//! `claimed_by` / `claimed_at` pair on the issue record; it is advisory and
//! deliberately unlocked.

pub mod lock;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use sprint_common::ClaimLayer;
use sprint_common::claim::{age_minutes, is_stale, is_unset};

use crate::context::SprintContext;
use crate::errors::ClaimError;

/// Lock name guarding Layer A decisions.
pub const CLAIM_LOCK_NAME: &str = "sprint-claim";
/// Agent type of Layer A records.
pub const SESSION_AGENT_TYPE: &str = "session";
pub const CLAIMED_BY_KEY: &str = "claimed_by";
pub const CLAIMED_AT_KEY: &str = "claimed_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// A new claim was recorded.
    Claimed,
    /// The caller already held the claim.
    AlreadyHeld,
    /// Nothing to claim against (missing identifiers or tracker).
    Skipped,
}

pub struct ClaimCoordinator<'a> {
    ctx: &'a SprintContext,
}

/// Seconds since an RFC 3339 timestamp. Missing or unparseable timestamps
/// count from the Unix epoch, so they always read as stale.
fn age_since(created_at: &str, now: DateTime<Utc>) -> i64 {
    let created = DateTime::parse_from_rfc3339(created_at)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    (now - created).num_seconds()
}

impl<'a> ClaimCoordinator<'a> {
    pub fn new(ctx: &'a SprintContext) -> Self {
        Self { ctx }
    }

    /// Claim `sprint` for `session` (Layer A, then Layer B best effort).
    pub async fn claim_session(&self, sprint: &str, session: &str) -> Result<ClaimOutcome, ClaimError> {
        if sprint.is_empty() || session.is_empty() {
            return Ok(ClaimOutcome::Skipped);
        }
        if !self.ctx.store.available().await {
            return Err(ClaimError::StoreUnavailable);
        }
        let run_id = self
            .ctx
            .resolve_run_id(sprint)
            .await
            .map_err(|_| ClaimError::NoRun(sprint.to_string()))?;

        let guard = lock::acquire(self.ctx, CLAIM_LOCK_NAME, sprint).await?;
        debug!(sprint, lock = guard.kind(), "claim lock held");
        let decision = self.register_session(&run_id, sprint, session).await;
        guard.release().await;

        let outcome = decision?;
        if outcome == ClaimOutcome::Claimed {
            if let Err(e) = self.claim_advisory(sprint, session).await {
                debug!(sprint, error = %e, "advisory claim not taken");
            }
        }
        Ok(outcome)
    }

    /// Decide against the current session agents and register ours. Runs
    /// under the claim lock.
    async fn register_session(
        &self,
        run_id: &str,
        sprint: &str,
        session: &str,
    ) -> Result<ClaimOutcome, ClaimError> {
        let agents = self.ctx.store.agent_list(run_id).await.unwrap_or_else(|e| {
            warn!(run_id, error = %e, "could not list agents; assuming none");
            Vec::new()
        });

        if let Some(existing) = agents.iter().find(|a| a.is_active_session()) {
            let owner = if existing.name.is_empty() {
                "unknown"
            } else {
                existing.name.as_str()
            };
            if owner == session {
                return Ok(ClaimOutcome::AlreadyHeld);
            }

            let age = age_since(&existing.created_at, self.ctx.clock.now());
            if !is_stale(age, self.ctx.config.session_stale_secs()) {
                return Err(ClaimError::Conflict {
                    layer: ClaimLayer::Session,
                    subject: sprint.to_string(),
                    owner: owner.to_string(),
                    age_minutes: age_minutes(age),
                });
            }

            info!(sprint, owner, age_secs = age, "taking over stale session claim");
            if !existing.id.is_empty() {
                if let Err(e) = self.ctx.store.agent_update(&existing.id, "failed").await {
                    warn!(agent = %existing.id, error = %e, "could not mark stale session failed");
                }
            }
        }

        self.ctx
            .store
            .agent_add(run_id, SESSION_AGENT_TYPE, session, None)
            .await
            .map_err(|e| {
                debug!(run_id, error = %e, "agent add failed");
                ClaimError::RegisterFailed(sprint.to_string())
            })?;
        Ok(ClaimOutcome::Claimed)
    }

    /// Release both layers. Returns how many session agents were completed.
    pub async fn release_session(&self, sprint: &str) -> usize {
        if sprint.is_empty() {
            return 0;
        }
        self.release_advisory(sprint).await;

        let Ok(run_id) = self.ctx.resolve_run_id(sprint).await else {
            return 0;
        };
        let Ok(agents) = self.ctx.store.agent_list(&run_id).await else {
            return 0;
        };

        let mut released = 0;
        for agent in agents.iter().filter(|a| a.is_active_session() && !a.id.is_empty()) {
            match self.ctx.store.agent_update(&agent.id, "completed").await {
                Ok(()) => released += 1,
                Err(e) => warn!(agent = %agent.id, error = %e, "could not complete session agent"),
            }
        }
        released
    }

    /// Layer B: record `session` as the advisory owner of `sprint`.
    pub async fn claim_advisory(&self, sprint: &str, session: &str) -> Result<ClaimOutcome, ClaimError> {
        let tracker = &self.ctx.tracker;
        if !tracker.available().await {
            return Ok(ClaimOutcome::Skipped);
        }

        let owner = tracker
            .state_get(sprint, CLAIMED_BY_KEY)
            .await
            .ok()
            .flatten()
            .filter(|v| !is_unset(v));

        if let Some(owner) = owner {
            if owner == session {
                return Ok(ClaimOutcome::AlreadyHeld);
            }
            let claimed_at = tracker
                .state_get(sprint, CLAIMED_AT_KEY)
                .await
                .ok()
                .flatten()
                .and_then(|v| v.trim().parse::<i64>().ok());
            if let Some(epoch) = claimed_at {
                let age = self.ctx.clock.unix() - epoch;
                if !is_stale(age, self.ctx.config.advisory_stale_secs()) {
                    return Err(ClaimError::Conflict {
                        layer: ClaimLayer::Advisory,
                        subject: sprint.to_string(),
                        owner,
                        age_minutes: age_minutes(age),
                    });
                }
            }
        }

        let now = self.ctx.clock.unix().to_string();
        for (key, value) in [(CLAIMED_BY_KEY, session), (CLAIMED_AT_KEY, now.as_str())] {
            if let Err(e) = tracker.state_set(sprint, key, value).await {
                warn!(sprint, key, error = %e, "could not write advisory claim");
            }
        }
        Ok(ClaimOutcome::Claimed)
    }

    /// Layer B: clear the advisory owner.
    pub async fn release_advisory(&self, sprint: &str) {
        let tracker = &self.ctx.tracker;
        if !tracker.available().await {
            return;
        }
        for key in [CLAIMED_BY_KEY, CLAIMED_AT_KEY] {
            if let Err(e) = tracker.state_set(sprint, key, "").await {
                warn!(sprint, key, error = %e, "could not clear advisory claim");
            }
        }
    }
}
