//! Shared domain types for the sprint orchestrator.
//!
//! Everything in this crate is pure: lookup tables, arithmetic, and the JSON
//! record shapes exchanged with the run store. No subprocesses, no filesystem,
//! no clocks.
//!
//! | Module       | Contents                                                  |
//! |--------------|-----------------------------------------------------------|
//! | `phase`      | `Phase` / `Stage` enums and the static transition tables  |
//! | `budget`     | Stage allocation, remaining tokens, overallocation cap    |
//! | `checkpoint` | `Checkpoint` record and its bounded merge rules           |
//! | `claim`      | Claim layers and staleness predicates                     |
//! | `signal`     | Pipe-delimited flow-control signals                       |
//! | `records`    | Run store records (runs, agents, artifacts, tokens)       |

pub mod budget;
pub mod checkpoint;
pub mod claim;
pub mod phase;
pub mod records;
pub mod signal;

pub use budget::{StageBudget, StageBudgets};
pub use checkpoint::Checkpoint;
pub use claim::ClaimLayer;
pub use phase::{Phase, Stage};
pub use signal::{Signal, SignalKind};
