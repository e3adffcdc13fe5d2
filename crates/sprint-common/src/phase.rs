//! Sprint phases, macro-stages, and the static tables that relate them.
//!
//! The phase sequence is fixed. Nothing here decides whether a transition is
//! *allowed*; that is the run store's gate check. These tables only answer
//! "which stage is this phase in", "what is the canonical next step", and
//! "which action label does this phase suggest".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the nine ordered sprint phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Brainstorm,
    BrainstormReviewed,
    Strategized,
    Planned,
    PlanReviewed,
    Executing,
    Shipping,
    Reflect,
    Done,
}

impl Phase {
    /// All phases in workflow order.
    pub const ALL: [Phase; 9] = [
        Phase::Brainstorm,
        Phase::BrainstormReviewed,
        Phase::Strategized,
        Phase::Planned,
        Phase::PlanReviewed,
        Phase::Executing,
        Phase::Shipping,
        Phase::Reflect,
        Phase::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Brainstorm => "brainstorm",
            Phase::BrainstormReviewed => "brainstorm-reviewed",
            Phase::Strategized => "strategized",
            Phase::Planned => "planned",
            Phase::PlanReviewed => "plan-reviewed",
            Phase::Executing => "executing",
            Phase::Shipping => "shipping",
            Phase::Reflect => "reflect",
            Phase::Done => "done",
        }
    }

    /// Parse a phase name, returning `None` for anything outside the sequence.
    pub fn parse(name: &str) -> Option<Phase> {
        Phase::ALL.into_iter().find(|p| p.as_str() == name)
    }

    pub fn stage(self) -> Stage {
        match self {
            Phase::Brainstorm => Stage::Discover,
            Phase::BrainstormReviewed
            | Phase::Strategized
            | Phase::Planned
            | Phase::PlanReviewed => Stage::Design,
            Phase::Executing => Stage::Build,
            Phase::Shipping => Stage::Ship,
            Phase::Reflect => Stage::Reflect,
            Phase::Done => Stage::Done,
        }
    }

    /// Canonical human-facing next step. `Done` maps to itself.
    pub fn next_step(self) -> &'static str {
        match self {
            Phase::Brainstorm | Phase::BrainstormReviewed => "strategy",
            Phase::Strategized => "write-plan",
            Phase::Planned => "flux-drive",
            Phase::PlanReviewed => "work",
            Phase::Executing => "quality-gates",
            Phase::Shipping => "reflect",
            Phase::Reflect | Phase::Done => "done",
        }
    }

    /// Abstract action label used by action inference, if the phase has one.
    pub fn action(self) -> Option<&'static str> {
        match self {
            Phase::Brainstorm | Phase::BrainstormReviewed => Some("strategize"),
            Phase::Strategized => Some("plan"),
            Phase::Planned | Phase::PlanReviewed => Some("execute"),
            Phase::Executing => Some("continue"),
            Phase::Shipping => Some("ship"),
            Phase::Done => Some("closed"),
            Phase::Reflect => None,
        }
    }

    /// Estimated billing tokens consumed by a phase when no actual figure is known.
    pub fn cost_estimate(self) -> u64 {
        match self {
            Phase::Brainstorm => 30_000,
            Phase::BrainstormReviewed => 15_000,
            Phase::Strategized => 25_000,
            Phase::Planned => 35_000,
            Phase::PlanReviewed => 50_000,
            Phase::Executing => 150_000,
            Phase::Shipping => 100_000,
            Phase::Reflect => 10_000,
            Phase::Done => 5_000,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase '{0}'")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::parse(s).ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

/// Macro-stage grouping used for budget partitioning.
///
/// `Done` is a terminal pseudo-stage and `Unknown` absorbs unrecognised
/// phase names; neither receives a budget share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Discover,
    Design,
    Build,
    Ship,
    Reflect,
    Done,
    Unknown,
}

impl Stage {
    /// The five stages that share the sprint budget, in order.
    pub const BUDGETED: [Stage; 5] = [
        Stage::Discover,
        Stage::Design,
        Stage::Build,
        Stage::Ship,
        Stage::Reflect,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Discover => "discover",
            Stage::Design => "design",
            Stage::Build => "build",
            Stage::Ship => "ship",
            Stage::Reflect => "reflect",
            Stage::Done => "done",
            Stage::Unknown => "unknown",
        }
    }

    /// Parse a stage name. Anything unrecognised is `Unknown`.
    pub fn parse(name: &str) -> Stage {
        match name {
            "discover" => Stage::Discover,
            "design" => Stage::Design,
            "build" => Stage::Build,
            "ship" => Stage::Ship,
            "reflect" => Stage::Reflect,
            "done" => Stage::Done,
            _ => Stage::Unknown,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage of a phase given by name. Total: unknown names map to `Stage::Unknown`.
pub fn stage_of(phase: &str) -> Stage {
    Phase::parse(phase).map_or(Stage::Unknown, Phase::stage)
}

/// Next step for a phase given by name. Unknown or empty input restarts at
/// the beginning of the workflow.
pub fn next_step(phase: &str) -> &'static str {
    Phase::parse(phase).map_or("brainstorm", Phase::next_step)
}

/// Map an external action command to a step name. Unrecognised commands pass
/// through unchanged.
pub fn action_to_step(command: &str) -> &str {
    match command {
        "/clavain:brainstorm" => "brainstorm",
        "/clavain:strategy" => "strategy",
        "/clavain:write-plan" => "write-plan",
        "/interflux:flux-drive" => "flux-drive",
        "/clavain:work" => "work",
        "/clavain:quality-gates" => "quality-gates",
        "/clavain:resolve" => "ship",
        "/reflect" | "/clavain:reflect" => "reflect",
        other => other,
    }
}

/// Action label for a phase given by name, or `""` when no inference is possible.
pub fn phase_to_action(phase: &str) -> &'static str {
    Phase::parse(phase).and_then(Phase::action).unwrap_or("")
}

/// Estimated token cost for a phase given by name (30k for unknown names).
pub fn cost_estimate(phase: &str) -> u64 {
    Phase::parse(phase).map_or(30_000, Phase::cost_estimate)
}

/// A phase-triggered action registered with a new run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseAction {
    pub command: String,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
}

impl PhaseAction {
    fn new(command: &str, mode: &str, args: Option<&str>) -> Self {
        Self {
            command: command.to_string(),
            mode: mode.to_string(),
            args: args.map(str::to_string),
        }
    }
}

/// Default phase → action routing handed to the run store at sprint creation.
pub fn default_actions() -> Vec<(Phase, PhaseAction)> {
    let plan_arg = Some(r#"["${artifact:plan}"]"#);
    vec![
        (Phase::Brainstorm, PhaseAction::new("/clavain:strategy", "interactive", None)),
        (Phase::Strategized, PhaseAction::new("/clavain:write-plan", "interactive", None)),
        (Phase::Planned, PhaseAction::new("/interflux:flux-drive", "interactive", plan_arg)),
        (Phase::PlanReviewed, PhaseAction::new("/clavain:work", "both", plan_arg)),
        (Phase::Executing, PhaseAction::new("/clavain:quality-gates", "interactive", None)),
        (Phase::Shipping, PhaseAction::new("/clavain:reflect", "interactive", None)),
    ]
}
