//! Issue tracker client backed by the `bd` command-line tool.

use async_trait::async_trait;
use std::path::Path;

use sprint_common::claim::is_unset;

use super::exec::{Tool, args};
use super::{IssueTracker, StoreResult};

pub struct BdTracker {
    tool: Tool,
}

impl BdTracker {
    pub fn new(command: &str, cwd: &Path) -> Self {
        Self {
            tool: Tool::resolve("bd", &[command], cwd),
        }
    }
}

#[async_trait]
impl IssueTracker for BdTracker {
    async fn available(&self) -> bool {
        self.tool.is_installed()
    }

    async fn create_epic(&self, title: &str) -> StoreResult<String> {
        let title = format!("--title={title}");
        self.tool
            .run(&args(["create", title.as_str(), "--type=epic", "--priority=2"]))
            .await
    }

    async fn show(&self, id: &str) -> StoreResult<String> {
        self.tool.run(&args(["show", id])).await
    }

    async fn close(&self, id: &str, reason: &str) -> StoreResult<()> {
        let reason = format!("--reason={reason}");
        self.tool
            .run(&args(["close", id, reason.as_str()]))
            .await
            .map(|_| ())
    }

    async fn update_status(&self, id: &str, status: &str) -> StoreResult<()> {
        let status = format!("--status={status}");
        self.tool
            .run(&args(["update", id, status.as_str()]))
            .await
            .map(|_| ())
    }

    async fn label_add(&self, id: &str, label: &str) -> StoreResult<()> {
        self.tool
            .run(&args(["label", "add", id, label]))
            .await
            .map(|_| ())
    }

    async fn state_get(&self, id: &str, key: &str) -> StoreResult<Option<String>> {
        let value = self.tool.run(&args(["state", id, key])).await?;
        if is_unset(&value) {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    async fn state_set(&self, id: &str, key: &str, value: &str) -> StoreResult<()> {
        let assignment = format!("{key}={value}");
        self.tool
            .run(&args(["set-state", id, assignment.as_str()]))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let dir = tempdir().unwrap();
        let bd = BdTracker::new("no-such-bd-binary-xyz", dir.path());
        assert!(!bd.available().await);
        let err = bd.state_get("iv-1", "ic_run_id").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unset_state_reads_as_none() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("fake-bd");
        std::fs::write(&path, "#!/bin/sh\necho '(no ic_run_id state set)'\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        let bd = BdTracker::new(path.to_str().unwrap(), dir.path());
        assert!(bd.available().await);
        assert_eq!(bd.state_get("iv-1", "ic_run_id").await.unwrap(), None);
    }
}
