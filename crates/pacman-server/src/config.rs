//! Typed configuration the server and client binaries build from parsed
//! CLI arguments. No global statics carry configuration past this point;
//! every task that needs a setting receives it explicitly.

use crate::errors::ServerError;
use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub levels_dir: PathBuf,
  pub max_games: usize,
  pub rendezvous_pipe: PathBuf,
}

impl ServerConfig {
  pub fn new(levels_dir: PathBuf, max_games: i64, rendezvous_pipe: PathBuf) -> Result<Self> {
    if max_games <= 0 {
      return Err(ServerError::InvalidMaxGames(max_games).into());
    }
    if !levels_dir.is_dir() {
      return Err(ServerError::LevelsDirNotFound(levels_dir).into());
    }
    Ok(Self {
      levels_dir,
      max_games: max_games as usize,
      rendezvous_pipe,
    })
  }

  /// Path the diagnostic top-scores dump is written to, alongside the
  /// rendezvous pipe's parent directory.
  pub fn scores_log_path(&self) -> PathBuf {
    self
      .rendezvous_pipe
      .parent()
      .unwrap_or_else(|| Path::new("."))
      .join("server_top_scores.log")
  }
}

/// Validated client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub id: String,
  pub rendezvous_pipe: PathBuf,
  pub cmd_file: Option<PathBuf>,
}

impl ClientConfig {
  pub fn new(id: String, rendezvous_pipe: PathBuf, cmd_file: Option<PathBuf>) -> Result<Self> {
    if id.is_empty() {
      bail!("client id must not be empty");
    }
    Ok(Self {
      id,
      rendezvous_pipe,
      cmd_file,
    })
  }

  pub fn request_pipe_path(&self) -> PathBuf {
    PathBuf::from(format!("/tmp/{}_request", self.id))
  }

  pub fn notify_pipe_path(&self) -> PathBuf {
    PathBuf::from(format!("/tmp/{}_notification", self.id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn rejects_non_positive_max_games() {
    let dir = tempdir().unwrap();
    let err = ServerConfig::new(dir.path().to_path_buf(), 0, PathBuf::from("/tmp/r")).unwrap_err();
    assert!(err.to_string().contains("max_games"));
  }

  #[test]
  fn client_paths_follow_convention() {
    let cfg = ClientConfig::new("7".to_string(), PathBuf::from("/tmp/r"), None).unwrap();
    assert_eq!(cfg.request_pipe_path(), PathBuf::from("/tmp/7_request"));
    assert_eq!(
      cfg.notify_pipe_path(),
      PathBuf::from("/tmp/7_notification")
    );
  }
}
