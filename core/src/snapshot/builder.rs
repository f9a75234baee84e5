//! Snapshot builders.
//!
//! The registry hands a [`SnapshotBuilder`] each new building snapshot and
//! records whatever [`BuildOutcome`] comes back. Builders never call into the
//! registry themselves.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::process::Command;

use crate::repository::RepositoryConfig;

use super::model::{BuildOutcome, Snapshot, SnapshotMetadata};

/// Lock files recognised when recording dependency metadata, in priority order.
pub const LOCK_FILES: &[(&str, &str)] = &[
    ("pnpm-lock.yaml", "pnpm"),
    ("yarn.lock", "yarn"),
    ("package-lock.json", "npm"),
];

/// Number of trailing stderr bytes kept in a failure message.
const STDERR_TAIL: usize = 2000;

/// Produces the artifact for a building snapshot.
#[async_trait]
pub trait SnapshotBuilder: Send + Sync {
    /// Builds `snapshot` from `repo` and reports the outcome.
    ///
    /// Errors are reported as [`BuildOutcome::Failure`], never as panics.
    async fn build(&self, repo: &RepositoryConfig, snapshot: &Snapshot) -> BuildOutcome;

    /// Returns the name of this builder.
    fn name(&self) -> &str;
}

/// Builder that runs the repository's commands in a prepared checkout.
///
/// Setup commands run first, then build commands, each through the shell and
/// in order. The first non-zero exit fails the build.
pub struct CommandBuilder {
    /// Directory holding the checkout at the snapshot's commit.
    checkout_dir: PathBuf,
    /// Shell used to run each command.
    shell: String,
}

impl CommandBuilder {
    /// Creates a builder running commands in `checkout_dir` with `sh`.
    pub fn new(checkout_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkout_dir: checkout_dir.into(),
            shell: "sh".to_string(),
        }
    }

    /// Uses a different shell binary.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    async fn run_command(&self, command: &str, snapshot: &Snapshot) -> Result<(), String> {
        tracing::info!(snapshot_id = %snapshot.id, command = %command, "running build command");

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&self.checkout_dir)
            .env("SNAPSHOT_ID", &snapshot.id)
            .env("SNAPSHOT_BASE_SHA", &snapshot.base_sha)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("failed to spawn `{}`: {}", command, e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail = tail(stderr.trim_end(), STDERR_TAIL);
        Err(format!("`{}` exited with {}: {}", command, output.status, tail))
    }

    async fn collect_metadata(&self, repo: &RepositoryConfig, snapshot: &Snapshot) -> SnapshotMetadata {
        let (package_manager, dependency_hash) = match detect_lock_file(&self.checkout_dir) {
            Some((manager, path)) => (Some(manager.to_string()), hash_file(&path)),
            None => (None, None),
        };

        SnapshotMetadata {
            snapshot_id: snapshot.id.clone(),
            repo_owner: snapshot.repo_owner.clone(),
            repo_name: snapshot.repo_name.clone(),
            base_sha: snapshot.base_sha.clone(),
            base_branch: repo.default_branch.clone(),
            build_timestamp: Utc::now(),
            node_version: probe_version("node", &self.checkout_dir).await,
            python_version: probe_version("python3", &self.checkout_dir).await,
            package_manager,
            dependency_hash,
        }
    }
}

#[async_trait]
impl SnapshotBuilder for CommandBuilder {
    async fn build(&self, repo: &RepositoryConfig, snapshot: &Snapshot) -> BuildOutcome {
        let start = Instant::now();

        for command in repo.setup_commands.iter().chain(&repo.build_commands) {
            if let Err(error) = self.run_command(command, snapshot).await {
                tracing::warn!(snapshot_id = %snapshot.id, error = %error, "build command failed");
                return BuildOutcome::failure(error);
            }
        }

        let metadata = self.collect_metadata(repo, snapshot).await;

        BuildOutcome::Success {
            duration: start.elapsed(),
            metadata: Some(metadata),
        }
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Finds the highest-priority lock file in `dir`.
pub fn detect_lock_file(dir: &Path) -> Option<(&'static str, PathBuf)> {
    LOCK_FILES.iter().find_map(|(file, manager)| {
        let path = dir.join(file);
        path.is_file().then_some((*manager, path))
    })
}

/// Hex SHA-256 of a file's contents, or `None` if it cannot be read.
pub fn hash_file(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    Some(hex::encode(Sha256::digest(&bytes)))
}

/// Runs `<tool> --version` and returns the bare version number.
async fn probe_version(tool: &str, dir: &Path) -> Option<String> {
    let output = Command::new(tool)
        .arg("--version")
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    // python2 printed its version on stderr
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    parse_version(&text)
}

fn parse_version(text: &str) -> Option<String> {
    let token = text.split_whitespace().last()?;
    let version = token.trim_start_matches('v');
    version
        .starts_with(|c: char| c.is_ascii_digit())
        .then(|| version.to_string())
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
