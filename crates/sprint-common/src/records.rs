//! JSON record shapes exchanged with the run store.
//!
//! Every field the store may omit carries `#[serde(default)]` so partial
//! records still deserialize.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::phase::{Stage, stage_of};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub project_dir: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope_id: String,
    #[serde(default)]
    pub complexity: i64,
    #[serde(default)]
    pub auto_advance: bool,
    #[serde(default)]
    pub force_full: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub token_budget: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Result of a run-level budget query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetResult {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub token_budget: u64,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub exceeded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCondition {
    #[serde(default)]
    pub check: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
    #[serde(default)]
    pub result: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub from_phase: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to_phase: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub tier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<GateEvidence>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateEvidence {
    #[serde(default)]
    pub conditions: Vec<GateCondition>,
}

impl GateResult {
    pub fn passed(&self) -> bool {
        self.result == "pass"
    }

    /// Conditions that did not pass, for diagnostics.
    pub fn failures(&self) -> impl Iterator<Item = &GateCondition> {
        self.evidence
            .iter()
            .flat_map(|e| e.conditions.iter())
            .filter(|c| c.result != "pass")
    }
}

/// Result of a phase advance attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceResult {
    #[serde(default)]
    pub advanced: bool,
    #[serde(default)]
    pub from_phase: String,
    #[serde(default)]
    pub to_phase: String,
    #[serde(default)]
    pub gate_result: String,
    #[serde(default)]
    pub gate_tier: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// `advance`, `block`, or `pause`.
    #[serde(default)]
    pub event_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

/// Input/output token counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAgg {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl TokenAgg {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Split a billing total 60% input / 40% output.
    pub fn split(total: u64) -> Self {
        let input = u64::try_from(u128::from(total) * 60 / 100).unwrap_or(u64::MAX);
        Self::new(input, total - input)
    }

    pub fn add(&mut self, other: TokenAgg) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// Per-phase token usage, stored as the `phase_tokens` state record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseTokens(pub BTreeMap<String, TokenAgg>);

impl PhaseTokens {
    /// Parse a stored record. Malformed input yields an empty ledger.
    pub fn from_json(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(raw).unwrap_or_default()
    }

    /// Add usage to a phase. Usage only accumulates.
    pub fn record(&mut self, phase: &str, usage: TokenAgg) {
        self.0.entry(phase.to_string()).or_default().add(usage);
    }

    pub fn get(&self, phase: &str) -> TokenAgg {
        self.0.get(phase).copied().unwrap_or_default()
    }

    /// Sum of every phase whose stage is `stage`.
    pub fn stage_total(&self, stage: Stage) -> u64 {
        self.0
            .iter()
            .filter(|(phase, _)| stage_of(phase) == stage)
            .fold(0u64, |acc, (_, agg)| acc.saturating_add(agg.total()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAction {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub args: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAgent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub agent_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub status: String,
    /// RFC 3339 timestamp.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
}

impl RunAgent {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    pub fn is_active_session(&self) -> bool {
        self.is_active() && self.agent_type == "session"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub to_phase: String,
    #[serde(default)]
    pub created_at: String,
}

/// Snapshot printed by `sprint-read-state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintState {
    pub id: String,
    pub phase: String,
    pub artifacts: BTreeMap<String, String>,
    pub history: BTreeMap<String, String>,
    pub complexity: String,
    pub auto_advance: String,
    pub active_session: String,
    pub token_budget: u64,
    pub tokens_spent: u64,
}

/// One entry of `sprint-find-active`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSprint {
    pub id: String,
    pub title: String,
    pub phase: String,
    pub run_id: String,
}
