pub mod infer;
pub mod runner;
pub mod state;

pub use infer::{infer_action, infer_bead};
pub use runner::{AdvanceOutcome, GateDecision, PhaseRunner};
pub use state::SprintManager;
