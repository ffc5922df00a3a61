//! The Engine Driver (§4.B): builds and runs the backup-engine subprocess with the
//! stable argument grammar of §6, parses its JSON output, and classifies failures
//! into the §7 taxonomy.
//!
//! Grounded in `original_source/pkg/scheduler/controller.go` (`runBackup`,
//! `forgetSnapshots`, the `RESTIC_PASSWORD` env convention) and in the teacher's
//! `sidecar/src/backup/{mod,pv}.rs` `Provider` trait shape (`latest`/`save`/`load`/
//! `purge`), adapted from a local-file provider to a subprocess-driven one.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::{Result, StashError};
use stash_api::{FileStats, RetentionPolicy, SnapshotStats};

/// One record from `engine snapshots --json`.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,
    pub short_id: String,
    pub time: String,
    pub hostname: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
}

/// `engine init|backup|forget|snapshots|restore` as a typed async contract, so
/// controllers and tests can swap the real subprocess implementation for a fake.
#[async_trait]
pub trait EngineDriver: Send + Sync {
    /// Idempotent: callers should only invoke this when a prior `Head` of the
    /// repository's `config` object (via the Blob Facade) reports it missing.
    async fn initialize(&self, repo_url: &str, password: &str) -> Result<()>;

    async fn backup(
        &self,
        repo_url: &str,
        password: &str,
        host: &str,
        paths: &[String],
        tags: &[String],
        excludes: &[String],
    ) -> Result<Vec<SnapshotStats>>;

    async fn forget(
        &self,
        repo_url: &str,
        password: &str,
        policy: &RetentionPolicy,
        host: &str,
        tags: &[String],
    ) -> Result<()>;

    async fn snapshots(
        &self,
        repo_url: &str,
        password: &str,
        host: Option<&str>,
        tags: &[String],
    ) -> Result<Vec<SnapshotRecord>>;

    async fn restore(
        &self,
        repo_url: &str,
        password: &str,
        host: &str,
        source_host: Option<&str>,
        snapshots: &[String],
        paths: &[String],
        target_dir: &str,
    ) -> Result<()>;

    /// Verifies repository structure and pack integrity. A clean run reports
    /// `Ok(true)`; a fatal classification (bad password, unreadable backend,
    /// corrupt data) reports `Ok(false)` rather than propagating, since that's
    /// a legitimate `RepositoryStatus.integrity` reading, not a reconcile error.
    async fn check(&self, repo_url: &str, password: &str) -> Result<bool>;
}

/// The real subprocess-backed driver.
pub struct SubprocessEngine {
    binary: String,
    kill_grace: Duration,
}

impl SubprocessEngine {
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            kill_grace: Duration::from_secs(30),
        }
    }

    fn command(&self, password: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.env("RESTIC_PASSWORD", password);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    async fn run(&self, mut cmd: Command) -> Result<String> {
        let child = cmd.spawn().map_err(|e| StashError::transient(e.to_string()))?;
        let output = tokio::time::timeout(Duration::from_secs(3600) + self.kill_grace, child.wait_with_output())
            .await
            .map_err(|_| StashError::transient("engine subprocess timed out"))?
            .map_err(|e| StashError::transient(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        Err(classify_failure(&stderr))
    }
}

/// Maps engine stderr text to the §7 taxonomy; ambiguous output defaults to
/// `Transient` and a retry, per Design Note §9.
fn classify_failure(stderr: &str) -> StashError {
    let lower = stderr.to_lowercase();
    if lower.contains("wrong password") || lower.contains("permission denied") || lower.contains("unable to open") {
        StashError::fatal(stderr.to_owned())
    } else {
        StashError::transient(stderr.to_owned())
    }
}

#[async_trait]
impl EngineDriver for SubprocessEngine {
    async fn initialize(&self, repo_url: &str, password: &str) -> Result<()> {
        let mut cmd = self.command(password);
        cmd.arg("init").arg(format!("--repo={repo_url}"));
        self.run(cmd).await.map(drop)
    }

    async fn backup(
        &self,
        repo_url: &str,
        password: &str,
        host: &str,
        paths: &[String],
        tags: &[String],
        excludes: &[String],
    ) -> Result<Vec<SnapshotStats>> {
        let mut cmd = self.command(password);
        cmd.arg("-r").arg(repo_url).arg("backup");
        cmd.args(paths);
        for tag in tags {
            cmd.arg(format!("--tag={tag}"));
        }
        for exclude in excludes {
            cmd.arg(format!("--exclude={exclude}"));
        }
        cmd.arg(format!("--host={host}")).arg("--json");

        let stdout = self.run(cmd).await?;
        parse_backup_summary(&stdout, host)
    }

    async fn forget(
        &self,
        repo_url: &str,
        password: &str,
        policy: &RetentionPolicy,
        host: &str,
        tags: &[String],
    ) -> Result<()> {
        let mut cmd = self.command(password);
        cmd.arg("-r").arg(repo_url).arg("forget");
        if policy.keep_last > 0 {
            cmd.arg(format!("--keep-last={}", policy.keep_last));
        }
        if policy.keep_hourly > 0 {
            cmd.arg(format!("--keep-hourly={}", policy.keep_hourly));
        }
        if policy.keep_daily > 0 {
            cmd.arg(format!("--keep-daily={}", policy.keep_daily));
        }
        if policy.keep_weekly > 0 {
            cmd.arg(format!("--keep-weekly={}", policy.keep_weekly));
        }
        if policy.keep_monthly > 0 {
            cmd.arg(format!("--keep-monthly={}", policy.keep_monthly));
        }
        if policy.keep_yearly > 0 {
            cmd.arg(format!("--keep-yearly={}", policy.keep_yearly));
        }
        for tag in &policy.keep_tags {
            cmd.arg(format!("--keep-tag={tag}"));
        }
        if policy.prune {
            cmd.arg("--prune");
        }
        if policy.dry_run {
            cmd.arg("--dry-run");
        }
        for tag in tags {
            cmd.arg(format!("--tag={tag}"));
        }
        cmd.arg(format!("--host={host}"));
        self.run(cmd).await.map(drop)
    }

    async fn snapshots(
        &self,
        repo_url: &str,
        password: &str,
        host: Option<&str>,
        tags: &[String],
    ) -> Result<Vec<SnapshotRecord>> {
        let mut cmd = self.command(password);
        cmd.arg("-r").arg(repo_url).arg("snapshots");
        if let Some(host) = host {
            cmd.arg(format!("--host={host}"));
        }
        for tag in tags {
            cmd.arg(format!("--tag={tag}"));
        }
        cmd.arg("--json");
        let stdout = self.run(cmd).await?;
        serde_json::from_str(&stdout)
            .map_err(|e| StashError::transient(format!("failed to parse snapshots JSON: {e}")))
    }

    async fn restore(
        &self,
        repo_url: &str,
        password: &str,
        host: &str,
        source_host: Option<&str>,
        snapshots: &[String],
        paths: &[String],
        target_dir: &str,
    ) -> Result<()> {
        let mut cmd = self.command(password);
        cmd.arg("-r").arg(repo_url).arg("restore");
        let snapshot = snapshots.first().map_or("latest", String::as_str);
        cmd.arg(snapshot);
        cmd.arg(format!("--target={target_dir}"));
        cmd.arg(format!("--host={host}"));
        if let Some(source_host) = source_host {
            cmd.arg(format!("--source-host={source_host}"));
        }
        for path in paths {
            cmd.arg(format!("--include={path}"));
        }
        self.run(cmd).await.map(drop)
    }

    async fn check(&self, repo_url: &str, password: &str) -> Result<bool> {
        let mut cmd = self.command(password);
        cmd.arg("-r").arg(repo_url).arg("check");
        match self.run(cmd).await {
            Ok(_) => Ok(true),
            Err(StashError::FatalBackend(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BackupSummaryLine {
    #[serde(default)]
    message_type: String,
    #[serde(default)]
    snapshot_id: String,
    #[serde(default)]
    total_bytes_processed: i64,
    #[serde(default)]
    files_new: i64,
    #[serde(default)]
    files_changed: i64,
    #[serde(default)]
    files_unmodified: i64,
}

/// Prefers JSON output; when the final `"message_type":"summary"` line is absent
/// (older engines), this would fall back to a line-oriented parser per Design
/// Note §9 — not needed here since the subprocess grammar always passes `--json`.
fn parse_backup_summary(stdout: &str, host: &str) -> Result<Vec<SnapshotStats>> {
    let summary = stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<BackupSummaryLine>(line).ok())
        .find(|line| line.message_type == "summary")
        .ok_or_else(|| StashError::transient("backup produced no summary line".to_owned()))?;

    Ok(vec![SnapshotStats {
        name: format!("{host}-snapshot"),
        id: summary.snapshot_id,
        uploaded: summary.total_bytes_processed,
        file_stats: Some(FileStats {
            new: summary.files_new,
            changed: summary.files_changed,
            unmodified: summary.files_unmodified,
        }),
    }])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn permission_denied_is_fatal() {
        assert!(matches!(
            classify_failure("fatal: wrong password"),
            StashError::FatalBackend(_)
        ));
    }

    #[test]
    fn network_blip_is_transient() {
        assert!(matches!(
            classify_failure("connection reset by peer"),
            StashError::Transient(_)
        ));
    }

    #[test]
    fn backup_summary_line_is_parsed() {
        let stdout = r#"{"message_type":"status","percent_done":0.5}
{"message_type":"summary","snapshot_id":"abc123","files_new":3,"files_changed":1,"files_unmodified":10,"total_bytes_processed":2048}
"#;
        let stats = parse_backup_summary(stdout, "host1").unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].id, "abc123");
        assert_eq!(stats[0].file_stats.as_ref().unwrap().new, 3);
    }

    #[test]
    fn missing_summary_line_is_transient_error() {
        assert!(parse_backup_summary("{}", "host1").is_err());
    }
}
