//! Code revision tracking for checkpoints.

pub mod git;

pub use git::{GitTracker, NoRevisions, RevisionSource, revision_source};
