use anyhow::{Context, Result};
use git2::Repository;
use std::path::Path;
use std::sync::Mutex;

/// Source of the current code revision recorded in checkpoints.
pub trait RevisionSource: Send + Sync {
    /// Full revision id of `HEAD`, or `None` when there is none yet.
    fn head_sha(&self) -> Option<String>;
}

pub struct GitTracker {
    repo: Mutex<Repository>,
}

impl GitTracker {
    pub fn new(project_dir: &Path) -> Result<Self> {
        let repo = Repository::discover(project_dir).context("Failed to open git repository")?;
        Ok(Self {
            repo: Mutex::new(repo),
        })
    }
}

impl RevisionSource for GitTracker {
    /// `None` for unborn branches.
    fn head_sha(&self) -> Option<String> {
        let repo = self.repo.lock().ok()?;
        let head = repo.head().ok()?;
        head.peel_to_commit().ok().map(|c| c.id().to_string())
    }
}

/// Revision source for directories outside any repository.
pub struct NoRevisions;

impl RevisionSource for NoRevisions {
    fn head_sha(&self) -> Option<String> {
        None
    }
}

/// Open the repository containing `project_dir`, or fall back to
/// [`NoRevisions`].
pub fn revision_source(project_dir: &Path) -> Box<dyn RevisionSource> {
    match GitTracker::new(project_dir) {
        Ok(tracker) => Box::new(tracker),
        Err(e) => {
            tracing::debug!(error = %e, "no git repository; revisions unavailable");
            Box::new(NoRevisions)
        }
    }
}
