//! Structured flow-control signals: `<kind>|<subject>|<detail>`.
//!
//! These are the machine-parseable outcomes that calling automation branches
//! on. The subject is a phase or stage name; the detail is free text and may
//! itself contain `|`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    BudgetExceeded,
    GateBlocked,
    ManualPause,
    StalePhase,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::BudgetExceeded,
        SignalKind::GateBlocked,
        SignalKind::ManualPause,
        SignalKind::StalePhase,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::BudgetExceeded => "budget_exceeded",
            SignalKind::GateBlocked => "gate_blocked",
            SignalKind::ManualPause => "manual_pause",
            SignalKind::StalePhase => "stale_phase",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub kind: SignalKind,
    pub subject: String,
    pub detail: String,
}

impl Signal {
    pub fn new(kind: SignalKind, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            detail: detail.into(),
        }
    }

    /// `spent/budget` use `?` when the figure could not be read.
    pub fn budget_exceeded(phase: &str, spent: Option<u64>, budget: Option<u64>) -> Self {
        let fmt_or_unknown = |v: Option<u64>| v.map_or_else(|| "?".to_string(), |v| v.to_string());
        Self::new(
            SignalKind::BudgetExceeded,
            phase,
            format!(
                "{}/{} billing tokens",
                fmt_or_unknown(spent),
                fmt_or_unknown(budget)
            ),
        )
    }

    /// A stage has used up its allocation.
    pub fn stage_depleted(stage: &str) -> Self {
        Self::new(SignalKind::BudgetExceeded, stage, "stage budget depleted")
    }

    pub fn gate_blocked(target: &str) -> Self {
        Self::new(SignalKind::GateBlocked, target, "Gate prerequisites not met")
    }

    pub fn manual_pause(target: &str) -> Self {
        Self::new(SignalKind::ManualPause, target, "auto_advance=false")
    }

    pub fn stale_phase(believed: &str, actual: &str) -> Self {
        Self::new(
            SignalKind::StalePhase,
            believed,
            format!("Phase already advanced to {actual}"),
        )
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.kind, self.subject, self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed signal line '{0}'")]
pub struct MalformedSignal(pub String);

impl FromStr for Signal {
    type Err = MalformedSignal;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedSignal(line.to_string());
        let mut parts = line.trim_end().splitn(3, '|');
        let kind = parts.next().ok_or_else(malformed)?;
        let kind = SignalKind::ALL
            .into_iter()
            .find(|k| k.as_str() == kind)
            .ok_or_else(malformed)?;
        let subject = parts.next().ok_or_else(malformed)?;
        let detail = parts.next().ok_or_else(malformed)?;
        Ok(Signal::new(kind, subject, detail))
    }
}
