//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                              |
//! |-----------------|---------------------------------------------------------------|
//! | `lifecycle`     | `SprintCreate`, `SprintFindActive`, `SprintReadState`, agents |
//! | `budget`        | `BudgetTotal`, `SprintBudget*`, token recording               |
//! | `phase`         | `SprintAdvance`, gates, artifacts, inference                  |
//! | `checkpoint`    | `Checkpoint*`                                                 |
//! | `claim`         | `SprintClaim`, `SprintRelease`, `BeadClaim`, `BeadRelease`    |
//! | `children`      | `CloseChildren`, `CloseParentIfDone`                          |
//! | `complexity`    | `ClassifyComplexity`, `ComplexityLabel`                       |
//! | `config`        | `Config`                                                      |

pub mod budget;
pub mod checkpoint;
pub mod children;
pub mod claim;
pub mod complexity;
pub mod config;
pub mod lifecycle;
pub mod phase;

pub use budget::{
    cmd_budget_remaining, cmd_budget_stage, cmd_budget_stage_check, cmd_budget_stage_remaining,
    cmd_budget_total, cmd_record_phase_tokens, cmd_stage_tokens_spent,
};
pub use checkpoint::{
    cmd_checkpoint_clear, cmd_checkpoint_completed_steps, cmd_checkpoint_read,
    cmd_checkpoint_step_done, cmd_checkpoint_validate, cmd_checkpoint_write,
};
pub use children::{cmd_close_children, cmd_close_parent_if_done};
pub use claim::{cmd_bead_claim, cmd_bead_release, cmd_sprint_claim, cmd_sprint_release};
pub use complexity::{cmd_classify_complexity, cmd_complexity_label};
pub use config::cmd_config;
pub use phase::{
    cmd_advance_phase, cmd_enforce_gate, cmd_get_artifact, cmd_infer_action, cmd_infer_bead,
    cmd_record_phase, cmd_set_artifact, cmd_sprint_advance, cmd_sprint_next_step,
    cmd_sprint_should_pause,
};
pub use lifecycle::{
    cmd_sprint_complete_agent, cmd_sprint_create, cmd_sprint_find_active,
    cmd_sprint_invalidate_caches, cmd_sprint_read_state, cmd_sprint_track_agent,
};
