//! Git-backed archive of the stats directory.

use crate::errors::HarvestError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait Archive: Send + Sync {
    /// Whether the working tree has uncommitted modifications.
    async fn has_changes(&self) -> Result<bool, HarvestError>;

    async fn pull(&self) -> Result<(), HarvestError>;

    async fn commit_all(&self, message: &str) -> Result<(), HarvestError>;

    async fn push(&self) -> Result<(), HarvestError>;
}

pub struct GitArchive {
    work_dir: PathBuf,
}

impl GitArchive {
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }

    async fn run_git(&self, args: &[&str]) -> Result<String, HarvestError> {
        debug!("git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.work_dir)
            .output()
            .await
            .map_err(|e| HarvestError::Persistence(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HarvestError::Persistence(format!(
                "git {} failed ({}): {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Archive for GitArchive {
    async fn has_changes(&self) -> Result<bool, HarvestError> {
        let stdout = self.run_git(&["status", "--porcelain"]).await?;
        Ok(stdout.lines().any(|line| !line.trim().is_empty()))
    }

    async fn pull(&self) -> Result<(), HarvestError> {
        // Fast-forward only; a divergent archive needs a human.
        self.run_git(&["pull", "--ff-only"]).await?;
        Ok(())
    }

    async fn commit_all(&self, message: &str) -> Result<(), HarvestError> {
        self.run_git(&["commit", "-a", "-m", message]).await?;
        Ok(())
    }

    async fn push(&self) -> Result<(), HarvestError> {
        self.run_git(&["push"]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn init_repo() -> (TempDir, GitArchive) {
        let dir = TempDir::new().unwrap();
        let archive = GitArchive::new(dir.path().to_path_buf());
        archive.run_git(&["init"]).await.unwrap();
        archive
            .run_git(&["config", "user.email", "tests@localhost"])
            .await
            .unwrap();
        archive
            .run_git(&["config", "user.name", "tests"])
            .await
            .unwrap();
        (dir, archive)
    }

    #[tokio::test]
    async fn test_clean_repo_has_no_changes() {
        let (_dir, archive) = init_repo().await;
        assert!(!archive.has_changes().await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_clears_changes() {
        let (dir, archive) = init_repo().await;
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        archive.run_git(&["add", "."]).await.unwrap();
        assert!(archive.has_changes().await.unwrap());

        archive.commit_all("DATA:2024-06-01").await.unwrap();
        assert!(!archive.has_changes().await.unwrap());

        let log = archive.run_git(&["log", "--format=%s"]).await.unwrap();
        assert_eq!(log.trim(), "DATA:2024-06-01");
    }

    #[tokio::test]
    async fn test_modification_is_detected() {
        let (dir, archive) = init_repo().await;
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        archive.run_git(&["add", "."]).await.unwrap();
        archive.commit_all("DATA:2024-06-01").await.unwrap();

        std::fs::write(dir.path().join("a.json"), r#"{"id":"X"}"#).unwrap();
        assert!(archive.has_changes().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_command_reports_stderr() {
        let (_dir, archive) = init_repo().await;
        let err = archive
            .run_git(&["checkout", "no-such-branch"])
            .await
            .unwrap_err();
        match err {
            HarvestError::Persistence(msg) => assert!(msg.contains("no-such-branch")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
