//! Per-invocation wiring: configuration, collaborators, clock, and the
//! sprint-to-run identifier cache.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use sprint_common::claim::is_unset;

use crate::errors::SprintError;
use crate::sprint_config::SprintConfig;
use crate::store::{BdTracker, IcStore, IssueTracker, RunStore};
use crate::tracker::{RevisionSource, revision_source};

/// Tracker state key holding a sprint's run identifier.
pub const RUN_ID_KEY: &str = "ic_run_id";

/// Wall-clock source. Staleness checks read time only through this.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn unix(&self) -> i64 {
        self.now().timestamp()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[cfg(test)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Sprint identifier → run identifier, scoped to one invocation.
#[derive(Debug, Default)]
pub struct RunIdCache {
    entries: Mutex<HashMap<String, String>>,
}

impl RunIdCache {
    pub fn get(&self, sprint: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(sprint).cloned())
    }

    pub fn insert(&self, sprint: &str, run_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(sprint.to_string(), run_id.to_string());
        }
    }
}

/// Everything one command needs to talk to the outside world.
pub struct SprintContext {
    pub config: SprintConfig,
    pub store: Arc<dyn RunStore>,
    pub tracker: Arc<dyn IssueTracker>,
    pub revisions: Arc<dyn RevisionSource>,
    pub clock: Arc<dyn Clock>,
    pub runs: RunIdCache,
}

impl SprintContext {
    /// Wire the real collaborators for `config`.
    pub fn from_config(config: SprintConfig) -> Self {
        let cwd = config.project_dir.clone();
        let store = IcStore::new(config.ic_cmd().as_deref(), &cwd);
        let tracker = BdTracker::new(&config.bd_cmd(), &cwd);
        let revisions: Arc<dyn RevisionSource> = Arc::from(revision_source(&cwd));
        Self::new(
            config,
            Arc::new(store),
            Arc::new(tracker),
            revisions,
            Arc::new(SystemClock),
        )
    }

    pub fn new(
        config: SprintConfig,
        store: Arc<dyn RunStore>,
        tracker: Arc<dyn IssueTracker>,
        revisions: Arc<dyn RevisionSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            tracker,
            revisions,
            clock,
            runs: RunIdCache::default(),
        }
    }

    /// Resolve a sprint identifier to its run through the tracker state.
    pub async fn resolve_run_id(&self, sprint: &str) -> Result<String, SprintError> {
        if sprint.is_empty() {
            return Err(SprintError::NoRun(String::new()));
        }
        if let Some(run_id) = self.runs.get(sprint) {
            return Ok(run_id);
        }

        let value = self.tracker.state_get(sprint, RUN_ID_KEY).await?;
        match value {
            Some(run_id) if !is_unset(&run_id) => {
                debug!(sprint, run_id = %run_id, "resolved run");
                self.runs.insert(sprint, &run_id);
                Ok(run_id)
            }
            _ => Err(SprintError::NoRun(sprint.to_string())),
        }
    }

    /// Resolve `sprint` when given, falling back to the active run for the
    /// project directory. `None` when neither yields a run.
    pub async fn resolve_or_current(&self, sprint: Option<&str>) -> Option<String> {
        if let Some(sprint) = sprint.filter(|s| !s.is_empty()) {
            if let Ok(run_id) = self.resolve_run_id(sprint).await {
                return Some(run_id);
            }
        }
        self.store
            .run_current(&self.config.project_dir)
            .await
            .ok()
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Context wired to the in-memory doubles.

    use super::*;
    use crate::sprint_config::EnvOverrides;
    use crate::store::memory::{MemoryStore, MemoryTracker};
    use crate::tracker::NoRevisions;
    use chrono::TimeZone;

    pub struct Fixture {
        pub ctx: SprintContext,
        pub store: Arc<MemoryStore>,
        pub tracker: Arc<MemoryTracker>,
        pub clock: Arc<ManualClock>,
        pub dir: tempfile::TempDir,
    }

    pub fn fixture() -> Fixture {
        fixture_with_env(EnvOverrides::default())
    }

    pub fn fixture_with_env(env: EnvOverrides) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut env = env;
        if env.lock_dir.is_none() {
            env.lock_dir = Some(dir.path().join("locks"));
        }
        let config = SprintConfig::with_env(dir.path().to_path_buf(), env).unwrap();
        let clock = Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let tracker = Arc::new(MemoryTracker::default());
        let ctx = SprintContext::new(
            config,
            store.clone(),
            tracker.clone(),
            Arc::new(NoRevisions),
            clock.clone(),
        );
        Fixture {
            ctx,
            store,
            tracker,
            clock,
            dir,
        }
    }

    impl Fixture {
        /// Seed a run bound to `sprint` and record it on the tracker.
        pub fn seed_run(&self, sprint: &str, complexity: i64, token_budget: u64) -> String {
            let run_id = self.store.seed_run(sprint, complexity, token_budget);
            self.tracker.set(sprint, RUN_ID_KEY, &run_id);
            run_id
        }
    }
}
