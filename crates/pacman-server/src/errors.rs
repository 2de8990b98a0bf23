//! Setup-boundary error taxonomy.
//!
//! Everything past configuration validation and pipe/worker setup is a
//! session-scoped `anyhow::Error`: logged and swallowed so one client's
//! fault never takes down the worker pool. These variants are the ones
//! `main` matches on to decide its exit code.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
  #[error("max_games must be greater than zero, got {0}")]
  InvalidMaxGames(i64),
  #[error("levels_dir {0} is not a directory")]
  LevelsDirNotFound(PathBuf),
  #[error("failed to create rendezvous pipe at {path}: {source}")]
  RendezvousPipeSetup {
    path: PathBuf,
    #[source]
    source: anyhow::Error,
  },
  #[error("failed to spawn worker thread: {0}")]
  WorkerSpawn(std::io::Error),
}
