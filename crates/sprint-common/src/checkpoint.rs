//! Checkpoint record and its merge rules.
//!
//! A checkpoint is never replaced wholesale: scalar fields are refreshed on
//! every write, while completed steps and key decisions are deduplicated sets
//! kept in sorted order. Key decisions are bounded; after each insertion only
//! the last [`MAX_KEY_DECISIONS`] entries in sort order survive.

use serde::{Deserialize, Serialize};

/// Upper bound on retained key decisions.
pub const MAX_KEY_DECISIONS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bead: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plan_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_sha: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_decisions: Vec<String>,
}

/// Fields supplied by one checkpoint write.
#[derive(Debug, Clone, Default)]
pub struct CheckpointUpdate {
    pub bead: String,
    pub phase: String,
    pub step: String,
    pub plan_path: Option<String>,
    pub git_sha: String,
    pub updated_at: String,
    pub key_decision: Option<String>,
}

impl Checkpoint {
    /// Parse a stored checkpoint. Malformed or empty input yields an empty
    /// checkpoint.
    pub fn from_json(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(raw).unwrap_or_default()
    }

    /// A checkpoint with neither bead nor phase carries no usable state.
    pub fn is_empty(&self) -> bool {
        self.bead.is_empty() && self.phase.is_empty()
    }

    pub fn has_step(&self, step: &str) -> bool {
        self.completed_steps.iter().any(|s| s == step)
    }

    /// Insert `step` into the completed set. Idempotent.
    pub fn add_completed_step(&mut self, step: &str) {
        if self.has_step(step) {
            return;
        }
        self.completed_steps.push(step.to_string());
        self.completed_steps.sort();
    }

    /// Insert `decision` into the key-decision set, keeping the last
    /// [`MAX_KEY_DECISIONS`] in sort order. Idempotent.
    pub fn add_key_decision(&mut self, decision: &str) {
        if self.key_decisions.iter().any(|d| d == decision) {
            return;
        }
        self.key_decisions.push(decision.to_string());
        self.key_decisions.sort();
        let len = self.key_decisions.len();
        if len > MAX_KEY_DECISIONS {
            self.key_decisions.drain(..len - MAX_KEY_DECISIONS);
        }
    }

    /// Merge one write into this checkpoint.
    pub fn apply(&mut self, update: &CheckpointUpdate) {
        self.bead = update.bead.clone();
        self.phase = update.phase.clone();
        if let Some(plan) = update.plan_path.as_deref().filter(|p| !p.is_empty()) {
            self.plan_path = plan.to_string();
        }
        self.git_sha = update.git_sha.clone();
        self.updated_at = update.updated_at.clone();
        self.add_completed_step(&update.step);
        if let Some(decision) = update.key_decision.as_deref().filter(|d| !d.is_empty()) {
            self.add_key_decision(decision);
        }
    }
}

/// First eight characters of a revision, for human-facing messages.
pub fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(8) {
        Some((idx, _)) => &sha[..idx],
        None => sha,
    }
}
