//! Version-control side effects of a run, shelling out to the system `git`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::error::{ArchiverError, Result};

const BOT_NAME: &str = "github-actions[bot]";
const BOT_EMAIL: &str = "github-actions[bot]@users.noreply.github.com";

pub trait History {
  /// Stages `paths` and commits them with `message`.
  fn commit(&mut self, paths: &[&Path], message: &str) -> Result<()>;

  fn push(&mut self) -> Result<()>;
}

/// Commits as the actions bot in a git checkout.
pub struct GitHistory {
  repo_dir: PathBuf,
}

impl GitHistory {
  pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
    GitHistory {
      repo_dir: repo_dir.into(),
    }
  }

  fn git(&self, args: &[&str]) -> Result<()> {
    let command = format!("git {}", args.join(" "));
    debug!("running {}", command);
    let output = Command::new("git")
      .args(args)
      .current_dir(&self.repo_dir)
      .output()?;
    if !output.status.success() {
      return Err(ArchiverError::Git {
        command,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    Ok(())
  }
}

impl History for GitHistory {
  fn commit(&mut self, paths: &[&Path], message: &str) -> Result<()> {
    // git runs inside repo_dir, so workdir-joined paths are staged relative to it
    let mut add = vec!["add".to_string()];
    add.extend(
      paths
        .iter()
        .map(|p| p.strip_prefix(&self.repo_dir).unwrap_or(*p).display().to_string()),
    );
    self.git(&add.iter().map(String::as_str).collect::<Vec<_>>())?;

    let name = format!("user.name={}", BOT_NAME);
    let email = format!("user.email={}", BOT_EMAIL);
    self.git(&["-c", name.as_str(), "-c", email.as_str(), "commit", "-m", message])?;
    info!("committed: {}", message);
    Ok(())
  }

  fn push(&mut self) -> Result<()> {
    self.git(&["push", "origin"])?;
    info!("pushed to origin");
    Ok(())
  }
}

/// Stands in for git when side effects are disabled.
#[derive(Debug, Default)]
pub struct DryRunHistory;

impl History for DryRunHistory {
  fn commit(&mut self, _paths: &[&Path], message: &str) -> Result<()> {
    info!("would commit with message: {}", message);
    Ok(())
  }

  fn push(&mut self) -> Result<()> {
    info!("would push to origin");
    Ok(())
  }
}
