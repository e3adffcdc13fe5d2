//! Short-held mutual exclusion around claim decisions.
//!
//! The run store's lock service is tried first. Only when it cannot be
//! reached does a directory lock under the configured lock root take over:
//! `mkdir` is atomic, so whoever creates `<root>/<name>/<scope>` holds it.
//! A refusal from a reachable lock service is contention and fails fast.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::context::{Clock, SprintContext};
use crate::errors::ClaimError;
use crate::store::RunStore;

/// Acquire/release over a `(name, scope)` pair.
#[async_trait]
pub trait MutexProvider: Send + Sync {
    fn kind(&self) -> &'static str;
    async fn acquire(&self, name: &str, scope: &str) -> Result<(), ClaimError>;
    /// Best effort; release never fails the caller.
    async fn release(&self, name: &str, scope: &str);
}

/// The run store's lock service.
pub struct StoreLock {
    store: Arc<dyn RunStore>,
    timeout: Duration,
}

impl StoreLock {
    pub fn new(store: Arc<dyn RunStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }
}

#[async_trait]
impl MutexProvider for StoreLock {
    fn kind(&self) -> &'static str {
        "store"
    }

    async fn acquire(&self, name: &str, scope: &str) -> Result<(), ClaimError> {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        self.store
            .lock_acquire(name, scope, timeout_ms)
            .await
            .map_err(ClaimError::from)
    }

    async fn release(&self, name: &str, scope: &str) {
        if let Err(e) = self.store.lock_release(name, scope).await {
            warn!(name, scope, error = %e, "failed to release store lock");
        }
    }
}

/// Debug payload written inside a held directory lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub host: String,
    pub owner: String,
    pub created: i64,
}

impl LockOwner {
    fn current(created: i64) -> Self {
        let pid = std::process::id();
        let host = hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().into_owned())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            pid,
            owner: format!("{pid}:{host}"),
            host,
            created,
        }
    }
}

pub const OWNER_FILE: &str = "owner.json";

/// Directory-creation lock with bounded retries.
pub struct DirLock {
    root: PathBuf,
    retries: u32,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl DirLock {
    pub fn new(root: PathBuf, retries: u32, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            root,
            retries,
            interval,
            clock,
        }
    }

    pub fn path(&self, name: &str, scope: &str) -> PathBuf {
        self.root.join(name).join(scope)
    }

    fn write_owner(&self, dir: &Path) {
        let owner = LockOwner::current(self.clock.unix());
        let written = serde_json::to_string(&owner)
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(dir.join(OWNER_FILE), format!("{json}\n")));
        if let Err(e) = written {
            debug!(dir = %dir.display(), error = %e, "could not write lock owner");
        }
    }
}

#[async_trait]
impl MutexProvider for DirLock {
    fn kind(&self) -> &'static str {
        "directory"
    }

    async fn acquire(&self, name: &str, scope: &str) -> Result<(), ClaimError> {
        let dir = self.path(name, scope);
        if let Some(parent) = dir.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        for attempt in 0..self.retries {
            match std::fs::create_dir(&dir) {
                Ok(()) => {
                    self.write_owner(&dir);
                    debug!(dir = %dir.display(), attempt, "directory lock acquired");
                    return Ok(());
                }
                Err(e) => {
                    debug!(dir = %dir.display(), attempt, error = %e, "directory lock busy");
                    tokio::time::sleep(self.interval).await;
                }
            }
        }

        Err(ClaimError::LockContention {
            name: name.to_string(),
            scope: scope.to_string(),
        })
    }

    async fn release(&self, name: &str, scope: &str) {
        let dir = self.path(name, scope);
        let _ = std::fs::remove_file(dir.join(OWNER_FILE));
        if let Err(e) = std::fs::remove_dir(&dir) {
            warn!(dir = %dir.display(), error = %e, "failed to release directory lock");
        }
    }
}

/// A held lock. Release is explicit because it may need the run store.
pub struct LockGuard {
    provider: Box<dyn MutexProvider>,
    name: String,
    scope: String,
}

impl LockGuard {
    pub fn kind(&self) -> &'static str {
        self.provider.kind()
    }

    pub async fn release(self) {
        self.provider.release(&self.name, &self.scope).await;
    }
}

/// Whether a store-lock failure means the lock service is out of reach
/// rather than held by someone else.
fn lock_service_missing(err: &ClaimError) -> bool {
    match err {
        ClaimError::StoreUnavailable => true,
        ClaimError::Store(e) => e.is_unreachable(),
        _ => false,
    }
}

/// Take `(name, scope)` through the store lock, falling back to the
/// directory lock when the store's lock service is unreachable.
pub async fn acquire(ctx: &SprintContext, name: &str, scope: &str) -> Result<LockGuard, ClaimError> {
    let store_lock = StoreLock::new(ctx.store.clone(), ctx.config.lock_timeout());
    let provider: Box<dyn MutexProvider> = match store_lock.acquire(name, scope).await {
        Ok(()) => Box::new(store_lock),
        Err(e) if !lock_service_missing(&e) => {
            debug!(name, scope, error = %e, "store lock refused");
            return Err(ClaimError::LockContention {
                name: name.to_string(),
                scope: scope.to_string(),
            });
        }
        Err(e) => {
            debug!(name, scope, error = %e, "store lock unavailable; using directory lock");
            let dir_lock = DirLock::new(
                ctx.config.lock_dir(),
                ctx.config.lock_retries(),
                ctx.config.lock_retry_interval(),
                ctx.clock.clone(),
            );
            dir_lock.acquire(name, scope).await?;
            Box::new(dir_lock)
        }
    };
    Ok(LockGuard {
        provider,
        name: name.to_string(),
        scope: scope.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SystemClock;
    use crate::context::testing::fixture;
    use crate::errors::StoreError;
    use tempfile::tempdir;

    fn dir_lock(root: &Path, retries: u32) -> DirLock {
        DirLock::new(
            root.to_path_buf(),
            retries,
            Duration::from_millis(1),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn dir_lock_writes_owner_and_releases() {
        let root = tempdir().unwrap();
        let lock = dir_lock(root.path(), 3);
        lock.acquire("sprint-claim", "iv-abc").await.unwrap();

        let owner_path = root.path().join("sprint-claim/iv-abc").join(OWNER_FILE);
        let owner: LockOwner =
            serde_json::from_str(&std::fs::read_to_string(&owner_path).unwrap()).unwrap();
        assert_eq!(owner.pid, std::process::id());
        assert_eq!(owner.owner, format!("{}:{}", owner.pid, owner.host));
        assert!(owner.created > 0);

        lock.release("sprint-claim", "iv-abc").await;
        assert!(!root.path().join("sprint-claim/iv-abc").exists());
    }

    #[tokio::test]
    async fn dir_lock_contention_after_bounded_retries() {
        let root = tempdir().unwrap();
        let lock = dir_lock(root.path(), 3);
        lock.acquire("sprint-claim", "iv-abc").await.unwrap();

        let err = lock.acquire("sprint-claim", "iv-abc").await.unwrap_err();
        assert!(matches!(err, ClaimError::LockContention { .. }));
        assert_eq!(err.to_string(), "lock contention: sprint-claim/iv-abc");

        // other scopes are independent
        lock.acquire("sprint-claim", "iv-def").await.unwrap();
    }

    #[tokio::test]
    async fn zero_retries_never_acquires() {
        let root = tempdir().unwrap();
        let lock = dir_lock(root.path(), 0);
        assert!(lock.acquire("sprint-claim", "iv-abc").await.is_err());
    }

    #[tokio::test]
    async fn prefers_store_lock() {
        let fx = fixture();
        let guard = acquire(&fx.ctx, "sprint-claim", "iv-abc").await.unwrap();
        assert_eq!(guard.kind(), "store");
        assert!(fx.store.is_locked("sprint-claim", "iv-abc"));
        guard.release().await;
        assert!(!fx.store.is_locked("sprint-claim", "iv-abc"));
    }

    #[tokio::test]
    async fn falls_back_to_directory_lock() {
        let fx = fixture();
        fx.store.set_lock_unavailable(true);
        let guard = acquire(&fx.ctx, "sprint-claim", "iv-abc").await.unwrap();
        assert_eq!(guard.kind(), "directory");
        let held = fx.ctx.config.lock_dir().join("sprint-claim/iv-abc");
        assert!(held.is_dir());
        guard.release().await;
        assert!(!held.exists());
    }

    #[tokio::test]
    async fn held_store_lock_fails_fast_without_directory_lock() {
        let fx = fixture();
        let first = acquire(&fx.ctx, "sprint-claim", "iv-abc").await.unwrap();
        assert_eq!(first.kind(), "store");

        let err = match acquire(&fx.ctx, "sprint-claim", "iv-abc").await {
            Ok(guard) => panic!("second claimant acquired a {} lock", guard.kind()),
            Err(e) => e,
        };
        assert!(matches!(err, ClaimError::LockContention { .. }));
        assert!(!fx.ctx.config.lock_dir().join("sprint-claim/iv-abc").exists());

        first.release().await;
        let again = acquire(&fx.ctx, "sprint-claim", "iv-abc").await.unwrap();
        assert_eq!(again.kind(), "store");
    }

    #[tokio::test]
    async fn unavailable_store_falls_back_to_directory_lock() {
        let fx = fixture();
        fx.store.set_available(false);
        let guard = acquire(&fx.ctx, "sprint-claim", "iv-abc").await.unwrap();
        assert_eq!(guard.kind(), "directory");
        guard.release().await;
    }

    #[test]
    fn only_unreachable_lock_service_allows_fallback() {
        let missing = ClaimError::Store(StoreError::Unavailable { tool: "ic".into() });
        assert!(lock_service_missing(&missing));
        let spawn = ClaimError::Store(StoreError::Spawn {
            tool: "ic".into(),
            source: std::io::Error::other("boom"),
        });
        assert!(lock_service_missing(&spawn));
        let refused = ClaimError::Store(StoreError::CommandFailed {
            command: "ic lock acquire".into(),
            code: 1,
            stderr: "timeout".into(),
        });
        assert!(!lock_service_missing(&refused));
    }

    #[test]
    fn owner_records_a_host() {
        let owner = LockOwner::current(1);
        assert!(!owner.host.is_empty());
        assert!(owner.owner.ends_with(&owner.host));
    }
}
