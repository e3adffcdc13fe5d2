//! Typed error hierarchy for the sprint orchestrator.
//!
//! Three top-level enums cover the three subsystems:
//! - `StoreError`: run store and issue tracker round-trips
//! - `ClaimError`: claim acquisition and the mutual exclusion lock
//! - `SprintError`: sprint lifecycle and phase advancement

use sprint_common::ClaimLayer;
use sprint_common::claim::short_owner;
use thiserror::Error;

/// Errors from an external collaborator (run store or issue tracker).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{tool} is not available")]
    Unavailable { tool: String },

    #[error("`{command}` exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to parse output of `{command}`: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Non-zero exit code of the collaborator, if that is what failed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StoreError::CommandFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The collaborator could not be reached at all, as opposed to running
    /// and reporting a failure.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. } | StoreError::Spawn { .. })
    }
}

/// Errors from claim acquisition.
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("{}", conflict_message(*.layer, .subject, .owner, *.age_minutes))]
    Conflict {
        layer: ClaimLayer,
        subject: String,
        owner: String,
        age_minutes: i64,
    },

    #[error("lock contention: {name}/{scope}")]
    LockContention { name: String, scope: String },

    #[error("sprint_claim: ic not available")]
    StoreUnavailable,

    #[error("sprint_claim: no ic run found for {0}")]
    NoRun(String),

    #[error("sprint_claim: failed to register session agent for {0}")]
    RegisterFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn conflict_message(layer: ClaimLayer, subject: &str, owner: &str, age_minutes: i64) -> String {
    let owner = short_owner(owner);
    match layer {
        ClaimLayer::Session => {
            format!("Sprint {subject} is active in session {owner} ({age_minutes}m ago)")
        }
        ClaimLayer::Advisory => {
            format!("Bead {subject} claimed by session {owner} ({age_minutes}m ago)")
        }
    }
}

/// Errors from sprint lifecycle operations.
#[derive(Debug, Error)]
pub enum SprintError {
    #[error("Sprint requires intercore (ic). Install ic or use beads directly for task tracking.")]
    StoreRequired,

    #[error("no run ID for bead {0}")]
    NoRun(String),

    #[error("sprint_create: {0}")]
    CreateFailed(String),

    #[error("sprint-advance: ic run advance failed: {0}")]
    AdvanceFailed(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
